use axum::routing::get;
use metrics_exporter_prometheus::PrometheusBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use photo_timeline_map::app_state::AppState;
use photo_timeline_map::config::AppConfig;
use photo_timeline_map::routes;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing photo timeline server");

    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");

    metrics::describe_counter!(
        "photo_timeline_requests_total",
        "Photo timeline requests accepted"
    );
    metrics::describe_counter!(
        "photoprism_pages_fetched_total",
        "PhotoPrism result pages fetched"
    );
    metrics::describe_counter!(
        "photoprism_records_fetched_total",
        "Raw PhotoPrism records received before window filtering"
    );
    metrics::describe_counter!(
        "photoprism_fetch_truncated_total",
        "Fetches cut short by a non-success PhotoPrism status"
    );

    let state = AppState::from_config(&config).expect("Failed to build HTTP client");

    if !state.photos.is_configured() {
        tracing::warn!("PhotoPrism credentials are not configured; photo requests will be rejected");
    }

    let app = routes::api_router(state)
        .route(
            "/metrics",
            get(move || {
                let handle = prometheus_handle.clone();
                async move { handle.render() }
            }),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive());

    tracing::info!("Starting photo timeline server on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await.expect("Server error");
}
