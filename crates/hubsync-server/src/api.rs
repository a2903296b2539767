use std::sync::MutexGuard;

use axum::{
    extract::{Path, Query, State},
    http::{Method, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use hubsync_engine::query::{self, ChatDetail, ChatListQuery, MessageListQuery};
use hubsync_engine::{Backfill, BackfillOptions, OlderMessages, SyncEngine, SyncMode, SyncReport};
use hubsync_shared::normalize::PhoneRules;
use hubsync_store::{BackfillControl, ChatSummary, Contact, Database, Message, NewContact};

use crate::error::ApiError;
use crate::scheduler::{SchedulerHandle, SyncTask};

#[derive(Clone)]
pub struct AppState {
    pub engine: SyncEngine,
    pub backfill: Backfill,
    pub scheduler: SchedulerHandle,
    pub phone_rules: PhoneRules,
}

impl AppState {
    fn db(&self) -> Result<MutexGuard<'_, Database>, ApiError> {
        self.engine
            .db()
            .lock()
            .map_err(|_| ApiError::Internal("database mutex poisoned".into()))
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/chats", get(list_chats))
        .route("/chats/:id", get(get_chat))
        .route("/chats/:id/messages", get(list_messages).post(send_message))
        .route("/chats/:id/sync", post(sync_chat))
        .route("/chats/:id/older", post(load_older))
        .route("/chats/:id/focus", post(focus_chat))
        .route("/chats/:id/contact", post(link_contact))
        .route("/messages/:id/retry", post(retry_message))
        .route("/sync", post(run_sync))
        .route("/backfill", get(backfill_status).post(start_backfill))
        .route("/backfill/stop", post(stop_backfill))
        .route("/contacts", get(list_contacts).post(create_contact))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    last_synced_at: Option<DateTime<Utc>>,
    total_chats: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendBody {
    text: String,
    reply_to: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct FocusBody {
    draft_text: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct SyncBody {
    mode: SyncMode,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LinkContactBody {
    contact_id: Option<i64>,
}

#[derive(Serialize)]
struct SyncChatResponse {
    inserted: usize,
}

#[derive(Serialize)]
struct QueuedResponse {
    queued: bool,
}

#[derive(Serialize)]
struct StopResponse {
    stopping: bool,
}

async fn health_check(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    let cursor = state.db()?.get_cursor_state()?;
    Ok(Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        last_synced_at: cursor.last_synced_at,
        total_chats: cursor.total_chats,
    }))
}

async fn list_chats(
    State(state): State<AppState>,
    Query(params): Query<ChatListQuery>,
) -> Result<Json<Vec<ChatSummary>>, ApiError> {
    let db = state.db()?;
    Ok(Json(query::list_chats(&db, &params)?))
}

async fn get_chat(State(state): State<AppState>, Path(chat_id): Path<String>) -> Result<Json<ChatDetail>, ApiError> {
    let db = state.db()?;
    Ok(Json(query::get_chat(&db, &chat_id)?))
}

async fn list_messages(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Query(params): Query<MessageListQuery>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let db = state.db()?;
    Ok(Json(query::list_messages(&db, &chat_id, &params)?))
}

async fn send_message(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Json(body): Json<SendBody>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    let message = state
        .engine
        .send_message(&chat_id, &body.text, body.reply_to.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

async fn retry_message(
    State(state): State<AppState>,
    Path(message_id): Path<String>,
) -> Result<Json<Message>, ApiError> {
    Ok(Json(state.engine.retry_message(&message_id).await?))
}

async fn sync_chat(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
) -> Result<Json<SyncChatResponse>, ApiError> {
    let inserted = state.engine.sync_chat_messages(&chat_id).await?;
    Ok(Json(SyncChatResponse { inserted }))
}

async fn load_older(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
) -> Result<Json<OlderMessages>, ApiError> {
    Ok(Json(state.engine.load_older_messages(&chat_id).await?))
}

async fn focus_chat(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    body: Option<Json<FocusBody>>,
) -> Result<StatusCode, ApiError> {
    let Json(body) = body.unwrap_or_default();
    state
        .engine
        .focus_chat(&chat_id, body.draft_text.as_deref())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn link_contact(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Json(body): Json<LinkContactBody>,
) -> Result<Json<ChatDetail>, ApiError> {
    let db = state.db()?;
    let detail = query::link_chat_contact(&db, &chat_id, body.contact_id)?;
    info!(chat_id, contact_id = ?body.contact_id, "chat contact linked by hand");
    Ok(Json(detail))
}

/// Run a sync pass inline and return its report.
async fn run_sync(State(state): State<AppState>, body: Option<Json<SyncBody>>) -> Json<SyncReport> {
    let Json(body) = body.unwrap_or_default();
    Json(state.engine.run_sync(body.mode).await)
}

async fn start_backfill(
    State(state): State<AppState>,
    body: Option<Json<BackfillOptions>>,
) -> Result<(StatusCode, Json<QueuedResponse>), ApiError> {
    let Json(options) = body.unwrap_or_default();
    if !state.scheduler.enqueue(SyncTask::Backfill(options)) {
        return Err(ApiError::Unavailable("task queue is full".into()));
    }
    Ok((StatusCode::ACCEPTED, Json(QueuedResponse { queued: true })))
}

async fn stop_backfill(State(state): State<AppState>) -> Result<Json<StopResponse>, ApiError> {
    let stopping = state.backfill.request_stop()?;
    Ok(Json(StopResponse { stopping }))
}

async fn backfill_status(State(state): State<AppState>) -> Result<Json<BackfillControl>, ApiError> {
    Ok(Json(state.backfill.status()?))
}

async fn list_contacts(State(state): State<AppState>) -> Result<Json<Vec<Contact>>, ApiError> {
    Ok(Json(state.db()?.list_contacts()?))
}

async fn create_contact(
    State(state): State<AppState>,
    Json(new): Json<NewContact>,
) -> Result<(StatusCode, Json<Contact>), ApiError> {
    if new.name.trim().is_empty() {
        return Err(ApiError::BadRequest("contact name is required".into()));
    }
    let contact = state.db()?.insert_contact(&new, &state.phone_rules)?;
    info!(contact_id = contact.id, "contact created");
    Ok((StatusCode::CREATED, Json(contact)))
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
