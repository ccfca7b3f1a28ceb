use envconfig::Envconfig;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use gateway::config::Config;
use gateway::server::serve;

fn setup_tracing() {
    let log_layer = tracing_subscriber::fmt::layer().with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(log_layer).init();
}

async fn shutdown() {
    let mut term = signal::unix::signal(signal::unix::SignalKind::terminate())
        .expect("failed to register SIGTERM handler");

    let mut interrupt = signal::unix::signal(signal::unix::SignalKind::interrupt())
        .expect("failed to register SIGINT handler");

    tokio::select! {
        _ = term.recv() => {},
        _ = interrupt.recv() => {},
    };

    tracing::info!("shutting down gracefully...");
}

#[tokio::main]
async fn main() {
    setup_tracing();

    let config = Config::init_from_env().expect("invalid configuration:");

    let listener = tokio::net::TcpListener::bind(config.address)
        .await
        .expect("could not bind listener");

    serve(config, listener, shutdown()).await
}
