use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Router};
use envconfig::Envconfig;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use common_metrics::{serve, setup_metrics_routes};

use collector::config::Config;
use collector::consumer;
use collector::sinks::{PersistenceSink, PrintSink};

fn setup_tracing() {
    let log_layer = tracing_subscriber::fmt::layer().with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(log_layer).init();
}

async fn index() -> &'static str {
    "marketing events collector"
}

async fn shutdown_signal() {
    let mut term = signal::unix::signal(signal::unix::SignalKind::terminate())
        .expect("failed to register SIGTERM handler");

    let mut interrupt = signal::unix::signal(signal::unix::SignalKind::interrupt())
        .expect("failed to register SIGINT handler");

    tokio::select! {
        _ = term.recv() => {},
        _ = interrupt.recv() => {},
    };
}

#[tokio::main]
async fn main() {
    setup_tracing();

    let config = Config::init_from_env().expect("invalid configuration:");

    let router = Router::new()
        .route("/", get(index))
        .route("/_liveness", get(index));
    let router = setup_metrics_routes(router);
    let bind = config.bind();
    tokio::task::spawn(async move {
        serve(router, &bind)
            .await
            .expect("failed to start serving metrics");
    });

    // Swap in a database-backed sink here once storage is wired up; the
    // print sink keeps single-node deployments observable in the meantime.
    let sink: Arc<dyn PersistenceSink + Send + Sync> = Arc::new(PrintSink {});

    let shutdown = CancellationToken::new();
    let handles = consumer::start(&config, sink, shutdown.clone())
        .expect("failed to start subscriptions");

    shutdown_signal().await;
    tracing::info!("shutting down gracefully...");

    // Stop taking new messages, then give in-flight handlers a bounded
    // grace period before the broker connection drops.
    shutdown.cancel();
    let drain = futures::future::join_all(handles);
    if tokio::time::timeout(Duration::from_secs(config.shutdown_grace_secs), drain)
        .await
        .is_err()
    {
        tracing::warn!("graceful drain timed out, forcing shutdown");
    }
}
