use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::limit::RequestBodyLimitLayer;
use crate::state::AppState;

pub mod events;
pub mod files;
pub mod handler;
pub mod job;
pub mod service;

pub fn router(state: &AppState) -> axum::Router<AppState> {
    // Uploads are bounded here rather than by axum's 2MB default.
    let ingest_routes = Router::new()
        .route("/compress-video", post(handler::compress_video))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(state.config.max_upload_bytes));

    let mut routes = Router::new().merge(ingest_routes);

    if state.config.storage.is_none() {
        routes = routes.route("/compressed/{name}", get(files::get_compressed));
    }

    routes
}
