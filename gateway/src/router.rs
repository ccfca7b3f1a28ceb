use std::future::ready;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use common_metrics::{setup_metrics_recorder, track_metrics};

use crate::{ingest, sinks, time::TimeSource};

#[derive(Clone)]
pub struct State {
    pub sink: Arc<dyn sinks::Event + Send + Sync>,
    pub timesource: Arc<dyn TimeSource + Send + Sync>,
}

async fn index() -> &'static str {
    "marketing events gateway"
}

pub fn router<
    TZ: TimeSource + Send + Sync + 'static,
    S: sinks::Event + Send + Sync + 'static,
>(
    timesource: TZ,
    sink: S,
    metrics: bool,
) -> Router {
    let state = State {
        sink: Arc::new(sink),
        timesource: Arc::new(timesource),
    };

    let router = Router::new()
        .route("/", get(index))
        .route("/webhook", post(ingest::webhook))
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(track_metrics))
        .with_state(state);

    // Don't install metrics unless asked to
    // Installing a global recorder when the gateway is used as a library (during tests etc)
    // does not work well.
    if metrics {
        let recorder_handle = setup_metrics_recorder();

        router.route("/metrics", get(move || ready(recorder_handle.render())))
    } else {
        router
    }
}
