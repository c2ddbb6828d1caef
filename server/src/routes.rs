use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::{auth::auth_middleware, handlers, state::AppState};

/// Room for multipart framing on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    let body_limit = usize::try_from(state.service.upload_rules().max_file_size)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    let upload_routes = Router::new()
        .route("/api/scans/upload", post(handlers::upload_scan))
        .route("/api/storage/upload/{ticket}", post(handlers::put_blob))
        .layer(DefaultBodyLimit::max(body_limit));

    let api_routes = Router::new()
        .route("/api/upload-rules", get(handlers::upload_rules))
        .route("/api/storage/upload-url", post(handlers::create_upload_url))
        .route("/api/storage/{file_id}", get(handlers::get_blob))
        .route("/api/files/{file_id}/download-url", get(handlers::download_url))
        .route("/api/scans", get(handlers::list_scans))
        .route("/api/scans/page", get(handlers::list_scans_page))
        .route("/api/scans/events", get(handlers::scan_events))
        .route(
            "/api/scans/{id}",
            get(handlers::get_scan_by_id).delete(handlers::delete_scan),
        )
        .route(
            "/api/scans/file/{file_id}",
            get(handlers::get_scan_by_file).delete(handlers::delete_scan_by_file),
        )
        .route(
            "/api/scans/file/{file_id}/extract",
            post(handlers::trigger_extraction),
        )
        .route("/api/scans/file/{file_id}/retry", post(handlers::retry_scan))
        .route("/api/stats", get(handlers::stats))
        .merge(upload_routes)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/health", get(handlers::health))
        .merge(api_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}
