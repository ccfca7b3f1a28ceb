use async_trait::async_trait;
use metrics::counter;

use common_types::PublishEnvelope;

use crate::api::GatewayError;

pub mod kafka;

#[async_trait]
pub trait Event {
    async fn send(&self, envelope: PublishEnvelope) -> Result<(), GatewayError>;
}

/// Log-only stand-in for the durable log, for local development without a
/// broker (`PRINT_SINK=true`).
pub struct PrintSink {}

#[async_trait]
impl Event for PrintSink {
    async fn send(&self, envelope: PublishEnvelope) -> Result<(), GatewayError> {
        tracing::info!(subject = envelope.subject(), "event: {:?}", envelope);
        counter!("gateway_events_published_total").increment(1);

        Ok(())
    }
}
