use std::future::Future;

use tokio::net::TcpListener;

use crate::config::Config;
use crate::router;
use crate::sinks;
use crate::time::SystemTime;

pub async fn serve<F>(config: Config, listener: TcpListener, shutdown: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = if config.print_sink {
        router::router(
            SystemTime {},
            sinks::PrintSink {},
            config.export_prometheus,
        )
    } else {
        let sink = sinks::kafka::KafkaSink::new(&config.kafka)
            .await
            .expect("failed to start Kafka sink");
        router::router(SystemTime {}, sink, config.export_prometheus)
    };

    tracing::info!("listening on {:?}", listener.local_addr().unwrap());
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .unwrap()
}
