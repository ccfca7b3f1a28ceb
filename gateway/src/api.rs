use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use common_types::ValidationError;

/// Body of every `/webhook` response. `correlation_id` is always populated,
/// echoed or generated, so callers can grep their own traffic even when the
/// event was rejected.
#[derive(Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    pub correlation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("failed to parse request body: {0}")]
    RequestParsingError(#[from] serde_json::Error),

    #[error(transparent)]
    InvalidEvent(#[from] ValidationError),

    #[error("transient broker error, please retry")]
    BrokerUnavailable,
    #[error("invalid event could not be published")]
    NonRetryableSinkError,
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::RequestParsingError(_)
            | GatewayError::InvalidEvent(_)
            | GatewayError::NonRetryableSinkError => StatusCode::BAD_REQUEST,

            GatewayError::BrokerUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}
