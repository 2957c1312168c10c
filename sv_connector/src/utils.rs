use tokio::signal;
use tower_http::{
    classify::{ServerErrorsAsFailures, SharedClassifier},
    trace::TraceLayer,
};
use tracing::{event, Level};
use tracing_subscriber::EnvFilter;

// initiate tracing, INFO unless RUST_LOG says otherwise
pub fn start_tracing_subscriber() {
    let rust_log = std::env::var("RUST_LOG").ok();

    tracing_subscriber::fmt::fmt()
        .with_env_filter(env_filter(rust_log.as_deref()))
        .init();
}

fn env_filter(rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

// prepare a trace layer for the http server that will connect the server to tracing
pub fn return_trace_layer() -> TraceLayer<SharedClassifier<ServerErrorsAsFailures>> {
    TraceLayer::new_for_http()
        .make_span_with(tower_http::trace::DefaultMakeSpan::new().include_headers(true))
        .on_request(tower_http::trace::DefaultOnRequest::new().level(Level::TRACE))
        .on_response(
            tower_http::trace::DefaultOnResponse::new()
                .level(Level::TRACE)
                .latency_unit(tower_http::LatencyUnit::Micros),
        )
        .on_failure(tower_http::trace::DefaultOnFailure::new().level(Level::ERROR))
}

// resolves on ctrl-c or SIGTERM, used for graceful shutdown of the http server
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            event!(Level::ERROR, "Failed to install Ctrl+C handler: {:?}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                event!(Level::ERROR, "Failed to install signal handler: {:?}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    event!(Level::INFO, "Shutdown signal received");
}
