use std::time::Instant;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use serde_json::Value;
use tracing::instrument;

use common_metrics::outcome::{
    report_accepted, report_failed, report_processed, report_processing_duration,
};
use common_types::correlation::ensure_correlation_id;
use common_types::event::validate_event;
use common_types::PublishEnvelope;

use crate::api::{GatewayError, IngestResponse};
use crate::router;
use crate::sinks;
use crate::time::TimeSource;

pub const CORRELATION_HEADER: &str = "x-correlation-id";

#[instrument(skip_all, fields(correlation_id))]
pub async fn webhook(
    state: State<router::State>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let supplied = headers
        .get(CORRELATION_HEADER)
        .and_then(|value| value.to_str().ok());
    let correlation_id = ensure_correlation_id(supplied);
    tracing::Span::current().record("correlation_id", correlation_id.as_str());

    match receive(
        state.sink.as_ref(),
        state.timesource.as_ref(),
        &body,
        &correlation_id,
    )
    .await
    {
        Ok(event_id) => (
            StatusCode::OK,
            Json(IngestResponse {
                success: true,
                event_id: Some(event_id),
                correlation_id,
                error: None,
            }),
        )
            .into_response(),
        Err(err) => (
            err.status_code(),
            Json(IngestResponse {
                success: false,
                event_id: None,
                correlation_id,
                error: Some(err.to_string()),
            }),
        )
            .into_response(),
    }
}

/// Validate, stamp and publish one raw payload. Either every step succeeds
/// and the envelope is durably handed to the log, or the error propagates
/// and nothing is published; there is no partial state beyond the outcome
/// counters themselves.
#[instrument(skip_all)]
pub async fn receive(
    sink: &(dyn sinks::Event + Send + Sync),
    timesource: &(dyn TimeSource + Send + Sync),
    body: &[u8],
    correlation_id: &str,
) -> Result<String, GatewayError> {
    let start = Instant::now();

    let raw: Value = match serde_json::from_slice(body) {
        Ok(raw) => raw,
        Err(err) => {
            report_failed("unknown", "unknown", "failed to parse request body");
            tracing::warn!(correlation_id, "rejected unparseable payload: {err}");
            return Err(err.into());
        }
    };

    let event = match validate_event(&raw) {
        Ok(event) => event,
        Err(err) => {
            report_failed(
                &best_effort_label(&raw, "source"),
                &best_effort_label(&raw, "eventType"),
                &err.to_string(),
            );
            tracing::warn!(correlation_id, payload = %raw, "rejected invalid event: {err}");
            return Err(err.into());
        }
    };

    let source = event.source().as_str();
    let event_type = event.event_type().to_string();
    let funnel_stage = event.funnel_stage().as_str();
    let event_id = event.event_id().to_string();
    report_accepted(source, &event_type, funnel_stage);
    tracing::debug!(correlation_id, source, event_type, event_id, "accepted event");

    let envelope = PublishEnvelope::new(
        event,
        correlation_id.to_string(),
        timesource.current_time(),
    );

    if let Err(err) = sink.send(envelope).await {
        report_failed(source, &event_type, &err.to_string());
        return Err(err);
    }

    report_processed(source, &event_type, funnel_stage);
    report_processing_duration(source, &event_type, start.elapsed().as_secs_f64());

    Ok(event_id)
}

/// Failure metrics still need labels when the payload never validated, or
/// is not an object at all. `Value::get` returns `None` on scalars and
/// arrays, so this is total over arbitrary JSON.
fn best_effort_label(raw: &Value, key: &str) -> String {
    raw.get(key)
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string()
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use common_types::ValidationError;

    #[derive(Clone)]
    struct FixedTime {
        time: String,
    }

    impl TimeSource for FixedTime {
        fn current_time(&self) -> String {
            self.time.clone()
        }
    }

    #[derive(Clone, Default)]
    struct MemorySink {
        envelopes: Arc<Mutex<Vec<PublishEnvelope>>>,
    }

    impl MemorySink {
        fn envelopes(&self) -> Vec<PublishEnvelope> {
            self.envelopes.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl sinks::Event for MemorySink {
        async fn send(&self, envelope: PublishEnvelope) -> Result<(), GatewayError> {
            self.envelopes.lock().unwrap().push(envelope);
            Ok(())
        }
    }

    struct DisconnectedSink {}

    #[async_trait]
    impl sinks::Event for DisconnectedSink {
        async fn send(&self, _envelope: PublishEnvelope) -> Result<(), GatewayError> {
            Err(GatewayError::BrokerUnavailable)
        }
    }

    fn fixed_time() -> FixedTime {
        FixedTime {
            time: "2024-03-01T12:00:01.000Z".to_string(),
        }
    }

    fn facebook_body() -> Vec<u8> {
        json!({
            "eventId": "fb-event-123",
            "timestamp": "2024-03-01T12:00:00.000Z",
            "source": "facebook",
            "funnelStage": "top",
            "eventType": "ad.view",
            "data": {
                "user": {
                    "userId": "user-1",
                    "name": "Jamie",
                    "age": 31,
                    "gender": "female",
                    "location": { "country": "DE", "city": "Berlin" }
                },
                "engagement": { "adId": "ad-9" }
            }
        })
        .to_string()
        .into_bytes()
    }

    #[tokio::test]
    async fn valid_event_is_stamped_and_published() {
        let sink = MemorySink::default();
        let event_id = receive(&sink, &fixed_time(), &facebook_body(), "corr-1")
            .await
            .expect("valid event rejected");
        assert_eq!(event_id, "fb-event-123");

        let envelopes = sink.envelopes();
        assert_eq!(envelopes.len(), 1);
        assert_eq!(envelopes[0].subject(), "events.facebook.top");
        assert_eq!(envelopes[0].correlation_id.as_deref(), Some("corr-1"));
        assert_eq!(envelopes[0].received_at, "2024-03-01T12:00:01.000Z");
        assert_eq!(envelopes[0].event.event_id(), "fb-event-123");
    }

    #[tokio::test]
    async fn invalid_event_is_rejected_before_any_publish() {
        let sink = MemorySink::default();
        let body = json!({"invalid": "data"}).to_string().into_bytes();

        let err = receive(&sink, &fixed_time(), &body, "corr-2")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GatewayError::InvalidEvent(ValidationError::MissingSource)
        ));
        assert!(sink.envelopes().is_empty());
    }

    #[tokio::test]
    async fn shape_error_reaches_the_caller() {
        let sink = MemorySink::default();
        let mut raw: Value = serde_json::from_slice(&facebook_body()).unwrap();
        raw["data"]["user"]["age"] = json!("31");

        let err = receive(&sink, &fixed_time(), raw.to_string().as_bytes(), "corr-3")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Facebook event format"));
        assert!(sink.envelopes().is_empty());
    }

    #[tokio::test]
    async fn unparseable_body_is_rejected() {
        let sink = MemorySink::default();
        let err = receive(&sink, &fixed_time(), b"not json at all", "corr-4")
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::RequestParsingError(_)));
        assert!(sink.envelopes().is_empty());
    }

    #[tokio::test]
    async fn publish_failure_propagates_as_broker_unavailable() {
        let err = receive(
            &DisconnectedSink {},
            &fixed_time(),
            &facebook_body(),
            "corr-5",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, GatewayError::BrokerUnavailable));
    }

    #[test]
    fn best_effort_labels_are_total_over_arbitrary_json() {
        assert_eq!(best_effort_label(&json!({"source": "tiktok"}), "source"), "tiktok");
        assert_eq!(best_effort_label(&json!({"source": 4}), "source"), "unknown");
        assert_eq!(best_effort_label(&json!(null), "source"), "unknown");
        assert_eq!(best_effort_label(&json!([1, 2]), "eventType"), "unknown");
    }
}
