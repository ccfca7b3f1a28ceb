use serde::{Deserialize, Serialize};

use crate::event::Event;

/// The unit placed on the durable log: the validated event plus the trace
/// and receipt metadata stamped by the gateway. Built once at ingestion and
/// never mutated afterwards.
///
/// `correlation_id` is optional on the way out of the log because
/// externally-injected test traffic may omit it; the gateway always sets it.
/// `event_id` inside the event is the natural idempotency key, should a
/// persistence sink ever need to deduplicate redeliveries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishEnvelope {
    #[serde(flatten)]
    pub event: Event,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    pub received_at: String,
}

impl PublishEnvelope {
    pub fn new(event: Event, correlation_id: String, received_at: String) -> Self {
        Self {
            event,
            correlation_id: Some(correlation_id),
            received_at,
        }
    }

    pub fn subject(&self) -> String {
        self.event.subject()
    }
}
