use async_trait::async_trait;
use metrics::counter;

use common_types::Event;

use crate::error::CollectorError;

/// Seam to the external storage collaborator: takes a delivered event plus
/// its correlation id and is responsible for durable storage.
#[async_trait]
pub trait PersistenceSink {
    async fn persist(&self, event: &Event, correlation_id: &str) -> Result<(), CollectorError>;
}

/// Log-only stand-in used when no database-backed sink is wired up.
pub struct PrintSink {}

#[async_trait]
impl PersistenceSink for PrintSink {
    async fn persist(&self, event: &Event, correlation_id: &str) -> Result<(), CollectorError> {
        tracing::info!(
            correlation_id,
            event_id = event.event_id(),
            "event: {:?}",
            event
        );
        counter!("collector_events_persisted_total").increment(1);

        Ok(())
    }
}
