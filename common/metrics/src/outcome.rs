//! Pipeline outcome counters, recorded on both sides of the durable log.
//!
//! `accepted` fires when an event clears validation (gateway) or arrives off
//! the log (collector); `processed` when it has been durably handed on;
//! `failed` on any terminal error, labeled with the error instead of the
//! funnel stage. The duration histogram covers validation through handoff.

pub const EVENTS_ACCEPTED: &str = "events_accepted_total";
pub const EVENTS_PROCESSED: &str = "events_processed_total";
pub const EVENTS_FAILED: &str = "events_failed_total";
pub const EVENT_PROCESSING_DURATION: &str = "event_processing_duration_seconds";

pub fn report_accepted(source: &str, event_type: &str, funnel_stage: &str) {
    let labels = [
        ("source", source.to_string()),
        ("event_type", event_type.to_string()),
        ("funnel_stage", funnel_stage.to_string()),
    ];
    metrics::counter!(EVENTS_ACCEPTED, &labels).increment(1);
}

pub fn report_processed(source: &str, event_type: &str, funnel_stage: &str) {
    let labels = [
        ("source", source.to_string()),
        ("event_type", event_type.to_string()),
        ("funnel_stage", funnel_stage.to_string()),
    ];
    metrics::counter!(EVENTS_PROCESSED, &labels).increment(1);
}

pub fn report_failed(source: &str, event_type: &str, error: &str) {
    let labels = [
        ("source", source.to_string()),
        ("event_type", event_type.to_string()),
        ("error", error.to_string()),
    ];
    metrics::counter!(EVENTS_FAILED, &labels).increment(1);
}

pub fn report_processing_duration(source: &str, event_type: &str, seconds: f64) {
    let labels = [
        ("source", source.to_string()),
        ("event_type", event_type.to_string()),
    ];
    metrics::histogram!(EVENT_PROCESSING_DURATION, &labels).record(seconds);
}
