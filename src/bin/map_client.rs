use photo_timeline_map::config::ClientConfig;
use photo_timeline_map::services::map::{HeadlessMap, LogNotifier, MarkerLayer};
use photo_timeline_map::services::orchestrator::PhotoMapOrchestrator;
use photo_timeline_map::services::photoprism::build_http_client;
use photo_timeline_map::services::timeline::{
    HttpThumbnailLoader, TimelineClient, TimelineParams, UserSettings,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .with_writer(std::io::stderr)
        .init();

    let config = ClientConfig::from_env().expect("Failed to load MAP_* configuration");
    let zone = config.zone().expect("Invalid MAP_TIMEZONE or MAP_UTC_OFFSET");

    let http = build_http_client(30).expect("Failed to build HTTP client");
    let orchestrator = PhotoMapOrchestrator::new(
        TimelineClient::new(http.clone(), &config.backend_url),
        HttpThumbnailLoader::new(http),
        &config.backend_url,
        zone,
    )
    .with_concurrency(config.concurrency());

    let params = TimelineParams {
        api_key: config.api_key.clone(),
        start_date: config.start_date.clone(),
        end_date: config.end_date.clone(),
        user_settings: UserSettings {
            immich_url: config.immich_url.clone(),
        },
    };

    tracing::info!(
        backend = %config.backend_url,
        start_date = %params.start_date,
        end_date = ?params.end_date,
        "Rendering photo map"
    );

    let mut map = HeadlessMap::new();
    let mut layer = MarkerLayer::new();

    match orchestrator.run(&mut map, &mut layer, &LogNotifier, &params).await {
        Ok(summary) => {
            tracing::info!(
                photos = summary.photos,
                markers = summary.markers,
                attempts = summary.attempts,
                "Photo map ready"
            );
            println!("{}", layer.to_geojson());
        }
        Err(e) => {
            tracing::error!(error = %e, "Photo map failed");
            std::process::exit(1);
        }
    }
}
