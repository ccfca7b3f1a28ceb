use std::sync::Arc;
use std::time::{Duration, Instant};

use rdkafka::error::KafkaError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use common_kafka::kafka_consumer::{RecvErr, SingleTopicConsumer};
use common_metrics::outcome::{
    report_accepted, report_failed, report_processed, report_processing_duration,
};
use common_types::event::{subject_for, FunnelStage, Source};
use common_types::PublishEnvelope;

use crate::config::Config;
use crate::sinks::PersistenceSink;

pub fn consumer_group(source: Source, stage: FunnelStage) -> String {
    format!("{source}-collector-{stage}")
}

/// Start one competing-consumer subscription per funnel stage of the source
/// this deployment owns. An unrecognized or unset collector type is a
/// warning with zero subscriptions, not a startup failure.
pub fn start(
    config: &Config,
    sink: Arc<dyn PersistenceSink + Send + Sync>,
    shutdown: CancellationToken,
) -> Result<Vec<JoinHandle<()>>, KafkaError> {
    let Some(collector_type) = config.collector_type.as_deref() else {
        warn!("COLLECTOR_TYPE is not set, starting with no subscriptions");
        return Ok(Vec::new());
    };

    let source = match collector_type.parse::<Source>() {
        Ok(source) => source,
        Err(err) => {
            warn!("starting with no subscriptions: {err}");
            return Ok(Vec::new());
        }
    };

    let mut handles = Vec::new();
    for stage in [FunnelStage::Top, FunnelStage::Bottom] {
        let subject = subject_for(source, stage);
        let group = consumer_group(source, stage);
        let consumer = SingleTopicConsumer::new(&config.kafka, &group, &subject)?;
        info!(subject, group, "starting subscription");
        handles.push(tokio::spawn(run_subscription(
            consumer,
            sink.clone(),
            shutdown.clone(),
        )));
    }

    Ok(handles)
}

/// Consume one subject until shutdown. Messages on a single subscription
/// are handled one at a time; failures are logged and dropped so the loop
/// outlives any individual message.
pub async fn run_subscription(
    consumer: SingleTopicConsumer,
    sink: Arc<dyn PersistenceSink + Send + Sync>,
    shutdown: CancellationToken,
) {
    let subject = consumer.topic().to_string();

    loop {
        let received = tokio::select! {
            _ = shutdown.cancelled() => {
                info!(subject, "draining subscription");
                break;
            }
            received = consumer.json_recv::<PublishEnvelope>() => received,
        };

        match received {
            Ok((envelope, offset)) => {
                // Offsets are stored on receipt: a handler failure is
                // terminal for that message, never redelivered. This is the
                // documented at-most-once window of the pipeline.
                if let Err(err) = offset.store() {
                    error!(subject, "failed to store offset: {err}");
                }
                handle_envelope(&subject, envelope, sink.as_ref()).await;
            }
            Err(RecvErr::Empty) => {
                report_failed("unknown", "unknown", "empty payload");
                warn!(subject, "received empty payload");
            }
            Err(RecvErr::Serde { error, payload }) => {
                report_failed("unknown", "unknown", "failed to deserialize message payload");
                error!(subject, payload, "failed to deserialize message: {error}");
            }
            Err(RecvErr::Kafka(err)) => {
                error!(subject, "receive error: {err}");
                // Don't hot-loop against a dead connection; rdkafka
                // rejoins the group underneath us once brokers are back.
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

/// Per-message handling: outcome metrics plus a forward to the persistence
/// sink. Never returns an error; a failure here is recorded, logged with
/// the subject and serialized payload, and dropped.
pub async fn handle_envelope(
    subject: &str,
    envelope: PublishEnvelope,
    sink: &(dyn PersistenceSink + Send + Sync),
) {
    let start = Instant::now();

    let source = envelope.event.source().as_str();
    let event_type = envelope.event.event_type().to_string();
    let funnel_stage = envelope.event.funnel_stage().as_str();
    report_accepted(source, &event_type, funnel_stage);

    // Externally-injected traffic may carry no correlation id.
    let correlation_id = envelope.correlation_id.clone().unwrap_or_default();

    match sink.persist(&envelope.event, &correlation_id).await {
        Ok(()) => {
            report_processed(source, &event_type, funnel_stage);
            report_processing_duration(source, &event_type, start.elapsed().as_secs_f64());
            debug!(
                subject,
                correlation_id,
                event_id = envelope.event.event_id(),
                "persisted event"
            );
        }
        Err(err) => {
            report_failed(source, &event_type, &err.to_string());
            let payload = serde_json::to_string(&envelope).unwrap_or_default();
            error!(subject, correlation_id, payload, "failed to persist event: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::error::CollectorError;
    use common_types::Event;

    #[derive(Default)]
    struct MemorySink {
        persisted: Mutex<Vec<(Event, String)>>,
    }

    impl MemorySink {
        fn persisted(&self) -> Vec<(Event, String)> {
            self.persisted.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PersistenceSink for MemorySink {
        async fn persist(&self, event: &Event, correlation_id: &str) -> Result<(), CollectorError> {
            self.persisted
                .lock()
                .unwrap()
                .push((event.clone(), correlation_id.to_string()));
            Ok(())
        }
    }

    /// Fails the first persist, then recovers. Used to check that one bad
    /// message does not take the subscription down with it.
    #[derive(Default)]
    struct FlakySink {
        failed_once: AtomicBool,
        inner: MemorySink,
    }

    #[async_trait]
    impl PersistenceSink for FlakySink {
        async fn persist(&self, event: &Event, correlation_id: &str) -> Result<(), CollectorError> {
            if !self.failed_once.swap(true, Ordering::SeqCst) {
                return Err(CollectorError::PersistenceError(
                    "database is on fire".to_string(),
                ));
            }
            self.inner.persist(event, correlation_id).await
        }
    }

    fn envelope(event_id: &str, correlation_id: Option<&str>) -> PublishEnvelope {
        let mut wire = json!({
            "eventId": event_id,
            "timestamp": "2024-03-01T12:00:00.000Z",
            "source": "tiktok",
            "funnelStage": "bottom",
            "eventType": "purchase",
            "data": {
                "user": { "userId": "u-1", "username": "creator", "followers": 42 },
                "engagement": { "purchaseAmount": "19.99" }
            },
            "receivedAt": "2024-03-01T12:00:01.000Z"
        });
        if let Some(id) = correlation_id {
            wire["correlationId"] = json!(id);
        }
        serde_json::from_value(wire).unwrap()
    }

    fn test_config(collector_type: Option<&str>) -> Config {
        // envconfig has no defaults for the nested struct outside the env,
        // so feed it a minimal environment once.
        use envconfig::Envconfig;
        let mut env = std::collections::HashMap::new();
        if let Some(collector_type) = collector_type {
            env.insert(
                "COLLECTOR_TYPE".to_string(),
                collector_type.to_string(),
            );
        }
        Config::init_from_hashmap(&env).unwrap()
    }

    #[test]
    fn consumer_groups_are_stable_per_source_and_stage() {
        assert_eq!(
            consumer_group(Source::Facebook, FunnelStage::Top),
            "facebook-collector-top"
        );
        assert_eq!(
            consumer_group(Source::Tiktok, FunnelStage::Bottom),
            "tiktok-collector-bottom"
        );
    }

    #[tokio::test]
    async fn unrecognized_collector_type_subscribes_to_nothing() {
        let sink: Arc<dyn PersistenceSink + Send + Sync> = Arc::new(MemorySink::default());
        for collector_type in [None, Some("linkedin"), Some("")] {
            let handles = start(
                &test_config(collector_type),
                sink.clone(),
                CancellationToken::new(),
            )
            .expect("startup should not fail");
            assert!(handles.is_empty());
        }
    }

    #[tokio::test]
    async fn delivered_event_is_forwarded_with_its_correlation_id() {
        let sink = MemorySink::default();
        handle_envelope(
            "events.tiktok.bottom",
            envelope("tt-1", Some("gateway-1-abcdefghi")),
            &sink,
        )
        .await;

        let persisted = sink.persisted();
        assert_eq!(persisted.len(), 1);
        assert_eq!(persisted[0].0.event_id(), "tt-1");
        assert_eq!(persisted[0].1, "gateway-1-abcdefghi");
    }

    #[tokio::test]
    async fn missing_correlation_id_is_tolerated() {
        let sink = MemorySink::default();
        handle_envelope("events.tiktok.bottom", envelope("tt-2", None), &sink).await;

        let persisted = sink.persisted();
        assert_eq!(persisted.len(), 1);
        assert_eq!(persisted[0].1, "");
    }

    #[tokio::test]
    async fn failure_on_one_message_does_not_stop_the_next() {
        let sink = FlakySink::default();

        // A fails terminally, B sails through right after.
        handle_envelope("events.tiktok.bottom", envelope("tt-a", None), &sink).await;
        handle_envelope("events.tiktok.bottom", envelope("tt-b", None), &sink).await;

        let persisted = sink.inner.persisted();
        assert_eq!(persisted.len(), 1);
        assert_eq!(persisted[0].0.event_id(), "tt-b");
    }
}
