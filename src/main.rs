use anyhow::Result;
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use mediavault::config::AppConfig;
use mediavault::routes::routes;
use mediavault::services::object_store::{ObjectStore, S3Store};
use mediavault::services::session_table::SessionTable;
use mediavault::services::streaming_service::StreamingService;
use mediavault::services::token_cache::StreamTokenCache;
use mediavault::services::upload_service::UploadCoordinator;
use mediavault::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config ---
    let cfg = AppConfig::from_env_and_args()?;
    tracing::info!(
        endpoint = %cfg.s3_endpoint,
        bucket = %cfg.s3_bucket,
        region = %cfg.s3_region,
        "starting mediavault"
    );

    // --- Connect to the object store ---
    let store: Arc<dyn ObjectStore> = Arc::new(S3Store::connect(&cfg).await);
    store.ensure_bucket().await?;

    // --- Initialize core services ---
    let sessions = SessionTable::new();
    sessions.spawn_janitor(Arc::clone(&store));

    let tokens = StreamTokenCache::new();
    tokens.spawn_janitor();

    let uploads = Arc::new(UploadCoordinator::new(Arc::clone(&store), sessions));
    let streaming = Arc::new(StreamingService::new(store, tokens));

    // --- Build router ---
    let app: Router = routes().with_state(AppState::new(uploads, streaming));

    // --- Start server ---
    let addr = cfg.addr();
    tracing::info!("Server listening on http://{}", addr);

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
