pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod storage;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::db::Database;
use crate::services::batch::BatchCoordinator;
use crate::services::consistency::ConsistencyChecker;
use crate::services::pipeline::UploadPipeline;
use crate::services::ratelimit::RateLimiter;
use crate::storage::ObjectStore;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Arc<Config>,
    pub store: Arc<dyn ObjectStore>,
    pub pipeline: Arc<UploadPipeline>,
    pub batch: Arc<BatchCoordinator>,
    pub checker: Arc<ConsistencyChecker>,
    pub limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(db: Database, config: Arc<Config>, store: Arc<dyn ObjectStore>) -> Self {
        let pipeline = Arc::new(UploadPipeline::new(config.clone(), store.clone(), None));
        // One limiter instance so batch uploads and file replacements share
        // the same windows.
        let limiter = Arc::new(RateLimiter::default());
        let batch = Arc::new(BatchCoordinator::new(
            config.clone(),
            pipeline.clone(),
            limiter.clone(),
        ));
        let checker = Arc::new(ConsistencyChecker::new(config.clone(), store.clone()));

        Self {
            db,
            config,
            store,
            pipeline,
            batch,
            checker,
            limiter,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Room for the largest allowed file plus multipart overhead
    let body_limit = (state.config.storage.max_file_size as usize) * 2 + 1024 * 1024;

    let gallery_routes = Router::new()
        .route("/gallery/upload", post(handlers::gallery::upload))
        .route("/gallery/items", get(handlers::gallery::list_items))
        .route(
            "/gallery/items/:id",
            get(handlers::gallery::get_item)
                .patch(handlers::gallery::update_item)
                .delete(handlers::gallery::delete_item),
        )
        .route(
            "/gallery/items/:id/file",
            put(handlers::gallery::replace_file),
        )
        .route(
            "/gallery/items/:id/download",
            get(handlers::gallery::download_item),
        )
        .route("/gallery/stats", get(handlers::gallery::stats))
        .route("/gallery/consistency", get(handlers::gallery::consistency))
        .route(
            "/gallery/consistency/cleanup",
            post(handlers::gallery::cleanup),
        )
        .route("/gallery/quota", get(handlers::gallery::quota))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::identity::identity_middleware,
        ));

    Router::new()
        .nest("/api/v1", gallery_routes)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
