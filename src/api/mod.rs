use axum::Json;
use axum::extract::{Path, Query};
use axum::routing::post;
use axum::{Router, extract::State, http::StatusCode, routing::get};
use serde::{Deserialize, Serialize};

use crate::db::repository::{self, StoreStats};
use crate::error::AppError;
use crate::models::*;
use crate::services::{SyncReport, SyncTrigger};
use crate::sheets::RemoteRecord;
use crate::state::AppState;

#[derive(Deserialize)]
struct EntryQueryParams {
    project: Option<String>,
}

#[derive(Serialize)]
struct StatusReply {
    online: bool,
    status: &'static str,
    syncing: bool,
}

#[derive(Deserialize)]
struct OnlineRequest {
    online: bool,
}

#[derive(Deserialize)]
struct VisibilityRequest {
    foreground: bool,
}

#[derive(Deserialize)]
struct AutoSyncRequest {
    enabled: bool,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/entries", get(list_entries).post(create_entry))
        .route(
            "/entries/{id}",
            get(get_entry).patch(update_entry).delete(delete_entry),
        )
        .route("/stats", get(get_stats))
        .route("/sync", post(sync_now))
        .route("/sync/queue", get(sync_queue))
        .route("/sync/queue/{id}/retry", post(retry_queue_item))
        .route("/sync/auto", post(set_auto_sync))
        .route("/sync/records", get(fetch_remote_records))
        .route("/sync/test", post(test_connection))
        .route("/status", get(get_status))
        .route("/status/online", post(set_online))
        .route("/status/visibility", post(set_visibility))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    sqlx::query("select 1").execute(&state.db).await?;
    Ok(StatusCode::OK)
}

async fn list_entries(
    State(state): State<AppState>,
    Query(params): Query<EntryQueryParams>,
) -> Result<Json<Vec<CostEntry>>, AppError> {
    let entries = match params.project {
        Some(project) => repository::fetch_entries_by_project(&state.db, &project).await?,
        None => repository::fetch_entries(&state.db).await?,
    };
    Ok(Json(entries))
}

async fn create_entry(
    State(state): State<AppState>,
    Json(req): Json<NewEntryRequest>,
) -> Result<Json<CostEntry>, AppError> {
    let entry = repository::insert_entry(&state.db, req).await?;
    Ok(Json(entry))
}

async fn get_entry(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CostEntry>, AppError> {
    let entry = repository::fetch_entry(&state.db, &id)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(entry))
}

async fn update_entry(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateEntryRequest>,
) -> Result<Json<CostEntry>, AppError> {
    let entry = repository::update_entry(&state.db, &id, req).await?;
    Ok(Json(entry))
}

async fn delete_entry(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    repository::delete_entry(&state.db, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_stats(State(state): State<AppState>) -> Result<Json<StoreStats>, AppError> {
    let stats = repository::stats(&state.db).await?;
    Ok(Json(stats))
}

async fn sync_now(State(state): State<AppState>) -> Json<SyncReport> {
    Json(state.engine.sync_all().await)
}

async fn sync_queue(State(state): State<AppState>) -> Result<Json<Vec<OutboxItem>>, AppError> {
    let queue = repository::fetch_queue(&state.db).await?;
    Ok(Json(queue))
}

async fn retry_queue_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    repository::reset_queue_item(&state.db, &id).await?;
    state.monitor.request(SyncTrigger::Manual);
    Ok(StatusCode::NO_CONTENT)
}

async fn set_auto_sync(
    State(state): State<AppState>,
    Json(req): Json<AutoSyncRequest>,
) -> StatusCode {
    state.engine.set_auto_sync(req.enabled);
    StatusCode::NO_CONTENT
}

async fn fetch_remote_records(
    State(state): State<AppState>,
) -> Result<Json<Vec<RemoteRecord>>, AppError> {
    let records = state.engine.fetch_records().await?;
    Ok(Json(records))
}

async fn test_connection(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    state.engine.test_connection().await?;
    Ok(StatusCode::OK)
}

async fn get_status(State(state): State<AppState>) -> Json<StatusReply> {
    Json(StatusReply {
        online: state.monitor.is_online(),
        status: state.monitor.status(),
        syncing: state.engine.is_syncing(),
    })
}

async fn set_online(
    State(state): State<AppState>,
    Json(req): Json<OnlineRequest>,
) -> Json<StatusReply> {
    state.monitor.set_online(req.online);
    Json(StatusReply {
        online: state.monitor.is_online(),
        status: state.monitor.status(),
        syncing: state.engine.is_syncing(),
    })
}

async fn set_visibility(
    State(state): State<AppState>,
    Json(req): Json<VisibilityRequest>,
) -> StatusCode {
    state.monitor.set_foreground(req.foreground);
    StatusCode::NO_CONTENT
}
