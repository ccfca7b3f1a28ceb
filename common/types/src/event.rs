use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;

const FACEBOOK_SHAPE: &str = "Facebook event format";
const TIKTOK_SHAPE: &str = "TikTok event format";

/// Advertising platform an event originated from. Closed set: adding a
/// source means adding a variant, a user shape and a collector deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Facebook,
    Tiktok,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Facebook => "facebook",
            Source::Tiktok => "tiktok",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_ref() {
            "facebook" => Ok(Source::Facebook),
            "tiktok" => Ok(Source::Tiktok),
            _ => Err(format!("unknown event source: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FunnelStage {
    Top,
    Bottom,
}

impl FunnelStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            FunnelStage::Top => "top",
            FunnelStage::Bottom => "bottom",
        }
    }
}

impl fmt::Display for FunnelStage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    #[serde(rename = "male")]
    Male,
    #[serde(rename = "female")]
    Female,
    #[serde(rename = "non-binary")]
    NonBinary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub country: String,
    pub city: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacebookUser {
    pub user_id: String,
    pub name: String,
    pub age: u32,
    pub gender: Gender,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TiktokUser {
    pub user_id: String,
    pub username: String,
    pub followers: u64,
}

/// The engagement payload varies by event type and is interpreted
/// defensively downstream, so it stays an opaque `Value` here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacebookEventData {
    pub user: FacebookUser,
    pub engagement: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TiktokEventData {
    pub user: TiktokUser,
    pub engagement: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacebookEvent {
    pub event_id: String,
    /// Producer-reported event time, distinct from the envelope's receivedAt.
    pub timestamp: String,
    pub source: Source,
    pub funnel_stage: FunnelStage,
    pub event_type: String,
    pub data: FacebookEventData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TiktokEvent {
    pub event_id: String,
    pub timestamp: String,
    pub source: Source,
    pub funnel_stage: FunnelStage,
    pub event_type: String,
    pub data: TiktokEventData,
}

/// A validated marketing event. Any input maps onto exactly one variant or
/// is rejected by `validate_event`.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Facebook(FacebookEvent),
    Tiktok(TiktokEvent),
}

impl Event {
    pub fn source(&self) -> Source {
        match self {
            Event::Facebook(_) => Source::Facebook,
            Event::Tiktok(_) => Source::Tiktok,
        }
    }

    pub fn funnel_stage(&self) -> FunnelStage {
        match self {
            Event::Facebook(event) => event.funnel_stage,
            Event::Tiktok(event) => event.funnel_stage,
        }
    }

    pub fn event_id(&self) -> &str {
        match self {
            Event::Facebook(event) => &event.event_id,
            Event::Tiktok(event) => &event.event_id,
        }
    }

    pub fn event_type(&self) -> &str {
        match self {
            Event::Facebook(event) => &event.event_type,
            Event::Tiktok(event) => &event.event_type,
        }
    }

    /// Routing subject on the durable log, echoing both discriminants so
    /// consumers can subscribe to exactly the slice they own.
    pub fn subject(&self) -> String {
        subject_for(self.source(), self.funnel_stage())
    }
}

pub fn subject_for(source: Source, stage: FunnelStage) -> String {
    format!("events.{source}.{stage}")
}

impl Serialize for Event {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Event::Facebook(event) => event.serialize(serializer),
            Event::Tiktok(event) => event.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Event {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        validate_event(&value).map_err(serde::de::Error::custom)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("event payload must be a JSON object")]
    NotAnObject,
    #[error("event submitted without a source")]
    MissingSource,
    #[error("unrecognized event source: {0}")]
    UnknownSource(String),
    #[error("event source is not {0}")]
    SourceMismatch(&'static str),
    #[error("does not match {shape}: {detail}")]
    ShapeMismatch { shape: &'static str, detail: String },
}

/// Validate an untrusted payload against the Facebook shape, then the
/// TikTok shape, in that order. Source-literal mismatch is reported before
/// any structural checking, so a payload that names a known source gets a
/// shape error for that source and nothing else.
pub fn validate_event(raw: &Value) -> Result<Event, ValidationError> {
    match validate_facebook_event(raw) {
        Ok(event) => return Ok(Event::Facebook(event)),
        Err(ValidationError::SourceMismatch(_)) => {}
        Err(err) => return Err(err),
    }

    match validate_tiktok_event(raw) {
        Ok(event) => Ok(Event::Tiktok(event)),
        Err(ValidationError::SourceMismatch(_)) => {
            match raw.get("source").and_then(Value::as_str) {
                Some(source) => Err(ValidationError::UnknownSource(source.to_string())),
                None => Err(ValidationError::MissingSource),
            }
        }
        Err(err) => Err(err),
    }
}

pub fn validate_facebook_event(raw: &Value) -> Result<FacebookEvent, ValidationError> {
    let object = raw.as_object().ok_or(ValidationError::NotAnObject)?;
    if object.get("source").and_then(Value::as_str) != Some(Source::Facebook.as_str()) {
        return Err(ValidationError::SourceMismatch(Source::Facebook.as_str()));
    }

    serde_json::from_value(raw.clone()).map_err(|err| ValidationError::ShapeMismatch {
        shape: FACEBOOK_SHAPE,
        detail: err.to_string(),
    })
}

pub fn validate_tiktok_event(raw: &Value) -> Result<TiktokEvent, ValidationError> {
    let object = raw.as_object().ok_or(ValidationError::NotAnObject)?;
    if object.get("source").and_then(Value::as_str) != Some(Source::Tiktok.as_str()) {
        return Err(ValidationError::SourceMismatch(Source::Tiktok.as_str()));
    }

    serde_json::from_value(raw.clone()).map_err(|err| ValidationError::ShapeMismatch {
        shape: TIKTOK_SHAPE,
        detail: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use assert_json_diff::assert_json_eq;
    use serde_json::{json, Value};

    use super::*;

    fn facebook_event() -> Value {
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
                    "gender": "non-binary",
                    "location": { "country": "DE", "city": "Berlin" }
                },
                "engagement": { "adId": "ad-9", "videoId": null }
            }
        })
    }

    fn tiktok_event() -> Value {
        json!({
            "eventId": "tt-event-456",
            "timestamp": "2024-03-01T12:00:00.000Z",
            "source": "tiktok",
            "funnelStage": "bottom",
            "eventType": "purchase",
            "data": {
                "user": {
                    "userId": "user-2",
                    "username": "creator",
                    "followers": 125000
                },
                "engagement": { "purchaseAmount": "99.90" }
            }
        })
    }

    #[test]
    fn valid_facebook_event_passes_through() {
        let raw = facebook_event();
        let event = validate_event(&raw).expect("valid event rejected");
        assert_eq!(event.source(), Source::Facebook);
        assert_eq!(event.funnel_stage(), FunnelStage::Top);
        assert_eq!(event.event_id(), "fb-event-123");
        assert_eq!(event.event_type(), "ad.view");
        assert_eq!(event.subject(), "events.facebook.top");

        // The accepted event re-serializes to the exact input.
        assert_json_eq!(serde_json::to_value(&event).unwrap(), raw);
    }

    #[test]
    fn valid_tiktok_event_passes_through() {
        let raw = tiktok_event();
        let event = validate_event(&raw).expect("valid event rejected");
        assert_eq!(event.source(), Source::Tiktok);
        assert_eq!(event.subject(), "events.tiktok.bottom");
        assert_json_eq!(serde_json::to_value(&event).unwrap(), raw);
    }

    #[test]
    fn missing_user_names_the_shape() {
        let mut raw = facebook_event();
        raw["data"].as_object_mut().unwrap().remove("user");

        let err = validate_event(&raw).unwrap_err();
        assert!(
            err.to_string().contains("Facebook event format"),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn numeric_string_age_is_rejected() {
        let mut raw = facebook_event();
        raw["data"]["user"]["age"] = json!("31");

        let err = validate_event(&raw).unwrap_err();
        assert!(err.to_string().contains("Facebook event format"));
    }

    #[test]
    fn unknown_gender_is_rejected() {
        let mut raw = facebook_event();
        raw["data"]["user"]["gender"] = json!("other");

        let err = validate_event(&raw).unwrap_err();
        assert!(err.to_string().contains("Facebook event format"));
    }

    #[test]
    fn numeric_string_followers_is_rejected() {
        let mut raw = tiktok_event();
        raw["data"]["user"]["followers"] = json!("125000");

        let err = validate_event(&raw).unwrap_err();
        assert!(err.to_string().contains("TikTok event format"));
    }

    #[test]
    fn unknown_source_fails_the_union() {
        let mut raw = facebook_event();
        raw["source"] = json!("linkedin");

        assert_eq!(
            validate_event(&raw),
            Err(ValidationError::UnknownSource("linkedin".to_string()))
        );
    }

    #[test]
    fn absent_source_fails_the_union() {
        assert_eq!(
            validate_event(&json!({"invalid": "data"})),
            Err(ValidationError::MissingSource)
        );
    }

    #[test]
    fn non_object_inputs_are_rejected() {
        for raw in [Value::Null, json!(42), json!("event"), json!([1, 2, 3])] {
            assert_eq!(validate_event(&raw), Err(ValidationError::NotAnObject));
        }
    }

    #[test]
    fn per_source_validator_fast_fails_on_source_literal() {
        // A completely malformed payload that names the wrong source is a
        // source mismatch, not a structural error.
        let raw = json!({"source": "tiktok"});
        assert_eq!(
            validate_facebook_event(&raw),
            Err(ValidationError::SourceMismatch("facebook"))
        );
    }

    #[test]
    fn round_trip_preserves_nested_structures() {
        for raw in [facebook_event(), tiktok_event()] {
            let event = validate_event(&raw).unwrap();
            let wire = serde_json::to_string(&event).unwrap();
            let back: Event = serde_json::from_str(&wire).unwrap();
            assert_eq!(back, event);
        }
    }
}
