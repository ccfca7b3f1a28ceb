use thiserror::Error;

/// Consumer-side failures are logged and dropped at the subscription
/// boundary; none of these ever propagate back to the producer.
#[derive(Error, Debug)]
pub enum CollectorError {
    #[error("failed to persist event: {0}")]
    PersistenceError(String),
}
