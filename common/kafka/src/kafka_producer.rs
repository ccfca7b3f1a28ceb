use std::time::Duration;

use metrics::gauge;
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::{ClientConfig, ClientContext};
use serde::Serialize;
use serde_json::error::Error as SerdeError;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::KafkaConfig;

pub struct KafkaContext;

impl ClientContext for KafkaContext {
    fn stats(&self, stats: rdkafka::Statistics) {
        gauge!("kafka_callback_queue_depth").set(stats.replyq as f64);
        gauge!("kafka_producer_queue_depth").set(stats.msg_cnt as f64);
        gauge!("kafka_producer_queue_depth_limit").set(stats.msg_max as f64);
        gauge!("kafka_producer_queue_bytes").set(stats.msg_size as f64);
        gauge!("kafka_producer_queue_bytes_limit").set(stats.msg_size_max as f64);
    }
}

fn base_config(config: &KafkaConfig) -> ClientConfig {
    let mut client_config = ClientConfig::new();
    client_config
        .set("bootstrap.servers", &config.kafka_hosts)
        .set("statistics.interval.ms", "10000");

    if config.kafka_tls {
        client_config
            .set("security.protocol", "ssl")
            .set("enable.ssl.certificate.verification", "false");
    };

    client_config
}

/// Build the process-wide producer and verify broker reachability before
/// handing it out. Connection attempts are bounded: after
/// `kafka_connect_max_attempts` failed metadata fetches, spaced by a fixed
/// `kafka_connect_retry_delay_ms`, the error propagates to the caller
/// instead of queueing work against a dead socket.
pub async fn create_kafka_producer(
    config: &KafkaConfig,
) -> Result<FutureProducer<KafkaContext>, KafkaError> {
    let mut client_config = base_config(config);
    client_config
        .set("linger.ms", config.kafka_producer_linger_ms.to_string())
        .set(
            "message.timeout.ms",
            config.kafka_message_timeout_ms.to_string(),
        )
        .set(
            "compression.codec",
            config.kafka_compression_codec.to_owned(),
        )
        .set(
            "queue.buffering.max.kbytes",
            (config.kafka_producer_queue_mib * 1024).to_string(),
        );

    debug!("rdkafka configuration: {:?}", client_config);
    let producer: FutureProducer<KafkaContext> =
        client_config.create_with_context(KafkaContext)?;

    let mut attempt = 0;
    loop {
        attempt += 1;
        match producer
            .client()
            .fetch_metadata(None, Duration::from_secs(10))
        {
            Ok(metadata) => {
                info!(
                    "connected to Kafka brokers, found {} topics",
                    metadata.topics().len()
                );
                break;
            }
            Err(err) if attempt < config.kafka_connect_max_attempts => {
                warn!(
                    attempt,
                    max_attempts = config.kafka_connect_max_attempts,
                    "failed to reach Kafka brokers, retrying: {err}"
                );
                tokio::time::sleep(Duration::from_millis(config.kafka_connect_retry_delay_ms))
                    .await;
            }
            Err(err) => {
                error!(
                    "failed to reach Kafka brokers after {attempt} attempts: {err}"
                );
                return Err(err);
            }
        }
    }

    Ok(producer)
}

/// Declare the given topics, tolerating prior existence. Declaring an
/// already-existing topic is the steady state on every restart and must not
/// be treated as fatal.
pub async fn ensure_topics(config: &KafkaConfig, topics: &[String]) -> Result<(), KafkaError> {
    let admin: AdminClient<DefaultClientContext> = base_config(config).create()?;

    let new_topics: Vec<NewTopic> = topics
        .iter()
        .map(|name| NewTopic {
            name: name.as_str(),
            num_partitions: config.kafka_topic_partitions,
            replication: TopicReplication::Fixed(1),
            config: vec![],
        })
        .collect();

    let results = admin
        .create_topics(&new_topics, &AdminOptions::new())
        .await?;

    for result in results {
        match result {
            Ok(topic) => info!(topic, "declared topic"),
            Err((topic, RDKafkaErrorCode::TopicAlreadyExists)) => {
                debug!(topic, "topic already exists");
            }
            Err((topic, code)) => {
                error!(topic, "failed to declare topic: {code}");
                return Err(KafkaError::AdminOp(code));
            }
        }
    }

    Ok(())
}

#[derive(Error, Debug)]
pub enum KafkaProduceError {
    #[error("failed to serialize: {error}")]
    SerializationError { error: SerdeError },
    #[error("failed to produce to kafka: {error}")]
    KafkaProduceError { error: KafkaError },
    #[error("failed to produce to kafka (timeout)")]
    KafkaProduceCanceled,
}

/// Publish one JSON-serialized message and wait for the broker delivery
/// ack. `message.timeout.ms` bounds the wait, so a disconnected producer
/// fails instead of queueing silently.
pub async fn send_to_kafka<T, C: ClientContext>(
    producer: &FutureProducer<C>,
    topic: &str,
    key: Option<&str>,
    message: &T,
) -> Result<(), KafkaProduceError>
where
    T: Serialize,
{
    let payload = serde_json::to_string(message)
        .map_err(|error| KafkaProduceError::SerializationError { error })?;

    let record = FutureRecord {
        topic,
        key,
        payload: Some(&payload),
        timestamp: None,
        partition: None,
        headers: None,
    };

    let delivery = producer
        .send_result(record)
        .map_err(|(error, _)| KafkaProduceError::KafkaProduceError { error })?;

    match delivery.await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err((error, _))) => Err(KafkaProduceError::KafkaProduceError { error }),
        Err(_) => Err(KafkaProduceError::KafkaProduceCanceled),
    }
}
