use std::sync::{Arc, Weak};

use rdkafka::{
    consumer::{Consumer, StreamConsumer},
    error::KafkaError,
    ClientConfig, Message,
};
use serde::de::DeserializeOwned;

use crate::config::KafkaConfig;

/// A competing-consumer subscription to one topic. Every instance created
/// with the same consumer group shares the topic's partitions, so each
/// message is delivered to exactly one group member.
#[derive(Clone)]
pub struct SingleTopicConsumer {
    inner: Arc<Inner>,
}

struct Inner {
    consumer: StreamConsumer,
    topic: String,
}

#[derive(Debug, thiserror::Error)]
pub enum RecvErr {
    #[error("Kafka error: {0}")]
    Kafka(#[from] KafkaError),
    #[error("failed to deserialize message payload: {error}")]
    Serde {
        #[source]
        error: serde_json::Error,
        /// Lossy copy of the offending payload, kept for the failure log.
        payload: String,
    },
    #[error("received empty payload")]
    Empty,
}

#[derive(Debug, thiserror::Error)]
pub enum OffsetErr {
    #[error("Kafka error: {0}")]
    Kafka(#[from] KafkaError),
    #[error("consumer gone")]
    Gone,
}

impl SingleTopicConsumer {
    pub fn new(
        config: &KafkaConfig,
        consumer_group: &str,
        topic: &str,
    ) -> Result<Self, KafkaError> {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &config.kafka_hosts)
            .set("statistics.interval.ms", "10000")
            .set("group.id", consumer_group)
            .set("auto.offset.reset", &config.kafka_consumer_offset_reset)
            .set("enable.auto.offset.store", "false");

        if config.kafka_tls {
            client_config
                .set("security.protocol", "ssl")
                .set("enable.ssl.certificate.verification", "false");
        };

        let consumer: StreamConsumer = client_config.create()?;
        consumer.subscribe(&[topic])?;

        let inner = Inner {
            consumer,
            topic: topic.to_string(),
        };
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    pub fn topic(&self) -> &str {
        &self.inner.topic
    }

    /// Receive and deserialize the next message. The returned `Offset` is
    /// not stored until the caller says so; storing it immediately gives
    /// at-most-once handling, storing after processing gives at-least-once.
    pub async fn json_recv<T>(&self) -> Result<(T, Offset), RecvErr>
    where
        T: DeserializeOwned,
    {
        let message = self.inner.consumer.recv().await?;

        let offset = Offset {
            handle: Arc::downgrade(&self.inner),
            partition: message.partition(),
            offset: message.offset(),
        };

        let Some(payload) = message.payload() else {
            // We auto-store poison pills, panicking on failure
            offset.store().unwrap();
            return Err(RecvErr::Empty);
        };

        match serde_json::from_slice(payload) {
            Ok(parsed) => Ok((parsed, offset)),
            Err(error) => {
                let payload = String::from_utf8_lossy(payload).into_owned();
                // We auto-store poison pills, panicking on failure
                offset.store().unwrap();
                Err(RecvErr::Serde { error, payload })
            }
        }
    }
}

pub struct Offset {
    handle: Weak<Inner>,
    partition: i32,
    offset: i64,
}

impl Offset {
    pub fn store(self) -> Result<(), OffsetErr> {
        let inner = self.handle.upgrade().ok_or(OffsetErr::Gone)?;
        inner
            .consumer
            .store_offset(&inner.topic, self.partition, self.offset)?;
        Ok(())
    }
}
