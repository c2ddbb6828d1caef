//! Request handlers. Each is a thin adapter over a [`ScanService`] call.
//!
//! [`ScanService`]: iepscan::service::ScanService

use std::convert::Infallible;

use axum::{
    extract::{rejection::QueryRejection, Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream, WatchStream};
use tokio_stream::{Stream, StreamExt};

use iepscan::broadcast::ScanEvent;
use iepscan::db::stats_repo::ScanStats;
use iepscan::error::ScanError;
use iepscan::scan::{ScanRecord, ScanStatus};
use iepscan::service::{
    DeleteResult, ScanPage, UploadResult, UploadRules, UploadedFile,
};
use iepscan::storage::UploadTarget;

use crate::auth::CurrentCaller;
use crate::error::{status_for, ApiResult};
use crate::state::AppState;

const FILE_FIELD: &str = "file";

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub limit: Option<u64>,
    pub status: Option<ScanStatus>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub status: Option<ScanStatus>,
}

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredBlob {
    pub storage_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Triggered {
    pub scan_id: String,
}

// ============================================================================
// Health and rules
// ============================================================================

pub async fn health() -> Json<Health> {
    Json(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn upload_rules(State(state): State<AppState>) -> Json<UploadRules> {
    Json(state.service.upload_rules().clone())
}

// ============================================================================
// Uploads and blobs
// ============================================================================

/// Multipart upload. The response body is always an upload envelope.
pub async fn upload_scan(
    State(state): State<AppState>,
    Extension(caller): Extension<CurrentCaller>,
    multipart: Multipart,
) -> Response {
    let file = match read_file_field(multipart).await {
        Ok(file) => file,
        Err(e) => return e.into_response(),
    };

    match state.service.upload(caller.as_ref(), file).await {
        Ok(scan) => Json(UploadResult::ok(scan)).into_response(),
        Err(e) => (status_for(&e), Json(UploadResult::err(&e))).into_response(),
    }
}

pub async fn create_upload_url(
    State(state): State<AppState>,
    Extension(caller): Extension<CurrentCaller>,
) -> ApiResult<Json<UploadTarget>> {
    Ok(Json(state.service.generate_upload_url(caller.as_ref()).await?))
}

/// Target of a one-time upload URL.
pub async fn put_blob(
    State(state): State<AppState>,
    Path(ticket): Path<String>,
    multipart: Multipart,
) -> ApiResult<Json<StoredBlob>> {
    let file = read_file_field(multipart)
        .await?
        .ok_or_else(|| ScanError::InvalidInput("Invalid or missing file".to_string()))?;
    let blob = state.service.put_direct(&ticket, file).await?;
    Ok(Json(StoredBlob { storage_id: blob.id }))
}

pub async fn get_blob(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> ApiResult<Response> {
    let (metadata, bytes) = state.service.read_blob(&file_id).await?;
    let disposition = format!(
        "inline; filename=\"{}\"",
        metadata.file_name.replace(['"', '\\', '\r', '\n'], "_")
    );
    Ok((
        [
            (header::CONTENT_TYPE, metadata.content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

pub async fn download_url(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> Response {
    let result = state.service.get_download_url(&file_id).await;
    let status = if result.success {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    };
    (status, Json(result)).into_response()
}

async fn read_file_field(mut multipart: Multipart) -> ApiResult<Option<UploadedFile>> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await?;
        return Ok(Some(UploadedFile {
            file_name,
            content_type,
            bytes: bytes.to_vec(),
        }));
    }
    Ok(None)
}

// ============================================================================
// Scan queries
// ============================================================================

pub async fn list_scans(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<ScanRecord>>> {
    let Query(query) = query?;
    Ok(Json(state.service.list_scans(query.limit, query.status)?))
}

pub async fn list_scans_page(
    State(state): State<AppState>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> ApiResult<Json<ScanPage>> {
    let Query(query) = query?;
    Ok(Json(state.service.list_scans_page(
        query.limit,
        query.offset,
        query.status,
    )?))
}

pub async fn get_scan_by_id(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ScanRecord>> {
    state
        .service
        .get_scan_by_id(&id)?
        .map(Json)
        .ok_or_else(|| ScanError::NotFound("Scan not found".to_string()).into())
}

pub async fn get_scan_by_file(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> ApiResult<Json<ScanRecord>> {
    state
        .service
        .get_scan(&file_id)?
        .map(Json)
        .ok_or_else(|| ScanError::NotFound("Scan not found".to_string()).into())
}

pub async fn stats(State(state): State<AppState>) -> ApiResult<Json<ScanStats>> {
    Ok(Json(state.service.get_stats()?))
}

// ============================================================================
// Scan mutations
// ============================================================================

pub async fn trigger_extraction(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> ApiResult<Json<Triggered>> {
    let scan_id = state.service.trigger_extraction(&file_id).await?;
    Ok(Json(Triggered { scan_id }))
}

pub async fn retry_scan(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> ApiResult<Json<ScanRecord>> {
    Ok(Json(state.service.retry_scan(&file_id).await?))
}

pub async fn delete_scan(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<DeleteResult>> {
    Ok(Json(state.service.delete_scan(&id).await?))
}

pub async fn delete_scan_by_file(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> ApiResult<Json<DeleteResult>> {
    Ok(Json(state.service.delete_scan_by_file(&file_id).await?))
}

// ============================================================================
// Live updates
// ============================================================================

/// Server-sent stream of scan changes. Lagging subscribers skip what they
/// missed and should refetch the list. The stream ends on server shutdown.
pub async fn scan_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.service.events().subscribe();
    let events = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(event) => Some(Some(to_sse(&event))),
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            log::warn!("Event subscriber lagged, skipped {} events", skipped);
            None
        }
    });
    let stop = WatchStream::from_changes(state.shutdown())
        .filter(|stopping| *stopping)
        .map(|_| None);

    let stream = events
        .merge(stop)
        .take_while(Option::is_some)
        .filter_map(|item| item.map(Ok::<_, Infallible>));

    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn to_sse(event: &ScanEvent) -> Event {
    let json = serde_json::to_string(event).unwrap_or_default();
    Event::default().event(event.kind.as_str()).data(json)
}
