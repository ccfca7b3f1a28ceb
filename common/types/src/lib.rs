pub mod correlation;
pub mod envelope;
pub mod event;

pub use envelope::PublishEnvelope;
pub use event::{Event, FunnelStage, Source, ValidationError};
