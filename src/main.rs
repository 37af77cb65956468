use std::str::FromStr;
use std::sync::Arc;

use axum::http::Method;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use smartclass_backend::api::router;
use smartclass_backend::config::{AppConfig, DetectorConfig};
use smartclass_backend::db::SqliteClassroomStore;
use smartclass_backend::detect::{Detector, HttpDetector, NoopDetector};
use smartclass_backend::error::AppError;
use smartclass_backend::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "smartclass_backend=debug,tower_http=info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    let connect_options =
        SqliteConnectOptions::from_str(&config.database_url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(connect_options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    let store = Arc::new(SqliteClassroomStore::new(pool.clone(), config.list_limit));
    let detector = build_detector(&config.detector)?;
    info!("using {} detector", detector.name());

    let state = AppState::new(store, detector).with_max_upload_bytes(config.max_upload_bytes);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    let app = router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    info!("listening on http://{}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pool.close().await;
    Ok(())
}

fn build_detector(config: &DetectorConfig) -> Result<Arc<dyn Detector>, AppError> {
    match config {
        DetectorConfig::Remote(url) => Ok(Arc::new(HttpDetector::new(url)?)),
        DetectorConfig::Local(path) => load_local_detector(path),
        DetectorConfig::None => {
            warn!("no detector configured, image uploads will echo the original bytes");
            Ok(Arc::new(NoopDetector))
        }
    }
}

#[cfg(feature = "backend-tract")]
fn load_local_detector(path: &std::path::Path) -> Result<Arc<dyn Detector>, AppError> {
    use smartclass_backend::detect::{DetectionParams, TractDetector};

    let size = DetectionParams::default().image_size;
    let detector = TractDetector::load(path, size)
        .map_err(|e| AppError::Config(e.to_string()))?;
    info!("loaded detection model {} at {}x{}", path.display(), size, size);
    Ok(Arc::new(detector))
}

#[cfg(not(feature = "backend-tract"))]
fn load_local_detector(path: &std::path::Path) -> Result<Arc<dyn Detector>, AppError> {
    Err(AppError::Config(format!(
        "DETECTOR_MODEL={} requires building with the backend-tract feature",
        path.display()
    )))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {}", e);
    }
    info!("shutting down");
}
