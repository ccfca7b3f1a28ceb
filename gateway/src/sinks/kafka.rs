use async_trait::async_trait;
use metrics::counter;
use rdkafka::producer::FutureProducer;
use tracing::{error, instrument};

use common_kafka::config::KafkaConfig;
use common_kafka::kafka_producer::{
    create_kafka_producer, ensure_topics, send_to_kafka, KafkaContext, KafkaProduceError,
};
use common_types::event::{subject_for, FunnelStage, Source};
use common_types::PublishEnvelope;

use crate::api::GatewayError;
use crate::sinks::Event;

pub struct KafkaSink {
    producer: FutureProducer<KafkaContext>,
}

impl KafkaSink {
    /// Connect and declare every subject the gateway can route to. Topic
    /// declaration is idempotent, so this is safe on every restart.
    pub async fn new(config: &KafkaConfig) -> anyhow::Result<KafkaSink> {
        let producer = create_kafka_producer(config).await?;
        ensure_topics(config, &all_subjects()).await?;

        Ok(KafkaSink { producer })
    }
}

fn all_subjects() -> Vec<String> {
    let mut subjects = Vec::new();
    for source in [Source::Facebook, Source::Tiktok] {
        for stage in [FunnelStage::Top, FunnelStage::Bottom] {
            subjects.push(subject_for(source, stage));
        }
    }
    subjects
}

#[async_trait]
impl Event for KafkaSink {
    #[instrument(skip_all, fields(subject))]
    async fn send(&self, envelope: PublishEnvelope) -> Result<(), GatewayError> {
        let subject = envelope.subject();
        tracing::Span::current().record("subject", subject.as_str());

        // Keying by event id keeps any later redelivery of the same event
        // on the same partition.
        let key = envelope.event.event_id().to_string();

        send_to_kafka(&self.producer, &subject, Some(&key), &envelope)
            .await
            .map_err(|err| match err {
                KafkaProduceError::SerializationError { .. } => {
                    error!("failed to serialize envelope: {err}");
                    GatewayError::NonRetryableSinkError
                }
                KafkaProduceError::KafkaProduceError { .. }
                | KafkaProduceError::KafkaProduceCanceled => {
                    error!(subject, "failed to publish envelope: {err}");
                    GatewayError::BrokerUnavailable
                }
            })?;

        counter!("gateway_events_published_total").increment(1);
        Ok(())
    }
}
