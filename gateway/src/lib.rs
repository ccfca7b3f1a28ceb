pub mod api;
pub mod config;
pub mod ingest;
pub mod router;
pub mod server;
pub mod sinks;
pub mod time;
