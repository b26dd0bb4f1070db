//! HTTP handlers

use std::convert::Infallible;

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    Json,
};
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio_stream::{wrappers::ReceiverStream, StreamExt};
use tracing::{debug, info, instrument};

use relay_core::registry::RegistrySummary;
use relay_core::store::{ChatMessage, Page, Thread, ThreadStatus};
use relay_core::{ChannelSink, SubscriberConnection, TopicKey};

use crate::error::{ApiError, ApiResult};
use crate::server::AppState;

/// Frames handed from the delivery task to the response body
const SSE_BUFFER: usize = 32;

const DEFAULT_THREAD_PAGE: usize = 20;
const DEFAULT_MESSAGE_PAGE: usize = 50;
const MAX_PAGE: usize = 100;

// ============================================================================
// Health
// ============================================================================

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `ok` while the process serves requests
    pub status: &'static str,
    /// Daemon version
    pub version: &'static str,
    /// Live topics and subscribers
    pub subscribers: RegistrySummary,
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        subscribers: state.registry.summary(),
    })
}

// ============================================================================
// Streaming
// ============================================================================

/// Query for `GET /api/chat/stream`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamQuery {
    /// Thread to follow
    pub thread_id: Option<String>,
}

/// `GET /api/chat/stream?threadId=`
///
/// Registers a subscriber for the lifetime of the response body. The body
/// ends after the run's terminal frame; dropping it (client disconnect)
/// closes the sink and the delivery task unregisters.
#[instrument(skip(state))]
pub async fn subscribe(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
) -> ApiResult<impl IntoResponse> {
    let thread_id = query
        .thread_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::bad_request("threadId is required"))?;

    let (sink, frames) = ChannelSink::channel(SSE_BUFFER);
    let connection = SubscriberConnection::open(
        &state.registry,
        TopicKey::from(thread_id),
        sink,
        state.queue_capacity,
    );
    info!(
        topic = %connection.topic(),
        subscriber_id = %connection.id(),
        "Stream opened"
    );
    // Detach: the delivery task owns the registration from here
    drop(connection);

    let headers = [
        (header::CACHE_CONTROL, "no-cache"),
        (header::CONNECTION, "keep-alive"),
    ];
    let sse = Sse::new(frame_events(frames))
        .keep_alive(KeepAlive::new().interval(state.keepalive));

    Ok((headers, sse))
}

fn frame_events(
    frames: tokio::sync::mpsc::Receiver<relay_core::Frame>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    ReceiverStream::new(frames).map(|frame| Ok(Event::default().data(frame.sse_data())))
}

// ============================================================================
// Messages
// ============================================================================

/// Body of `POST /api/chat/messages`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostMessageRequest {
    /// Target thread
    pub thread_id: Option<String>,
    /// User message text
    pub content: Option<String>,
}

/// Reply to a processed message
#[derive(Debug, Serialize)]
pub struct PostMessageResponse {
    /// Always `true`; failures use the error body
    pub success: bool,
    /// Assembled assistant reply
    pub message: String,
}

/// `POST /api/chat/messages`
///
/// Runs the whole generation before responding. Followers of the thread
/// receive the reply token by token in the meantime.
#[instrument(skip_all)]
pub async fn post_message(
    State(state): State<AppState>,
    payload: Result<Json<PostMessageRequest>, JsonRejection>,
) -> ApiResult<Json<PostMessageResponse>> {
    let Json(request) = payload.map_err(|e| {
        debug!(error = %e, "Rejected message body");
        ApiError::bad_request("Invalid JSON body")
    })?;

    let (thread_id, content) = match (request.thread_id, request.content) {
        (Some(thread_id), Some(content)) if !thread_id.is_empty() && !content.is_empty() => {
            (thread_id, content)
        }
        _ => return Err(ApiError::bad_request("threadId and content are required")),
    };

    // Own task: a client hanging up on the POST must not cut the run short
    let orchestrator = state.orchestrator.clone();
    let run = tokio::spawn(async move { orchestrator.handle(&thread_id, &content).await });
    let message = run
        .await
        .map_err(|e| ApiError::internal(format!("generation task failed: {e}")))??;

    Ok(Json(PostMessageResponse {
        success: true,
        message,
    }))
}

/// Body of `PATCH /api/chat/messages/{message_id}`
#[derive(Debug, Deserialize)]
pub struct UpdateMessageRequest {
    /// Replacement text
    pub content: Option<String>,
}

/// `PATCH /api/chat/messages/{message_id}`
///
/// Returns the edited message. Messages of archived threads are read-only.
#[instrument(skip(state, payload))]
pub async fn update_message(
    State(state): State<AppState>,
    Path(message_id): Path<String>,
    payload: Result<Json<UpdateMessageRequest>, JsonRejection>,
) -> ApiResult<Json<ChatMessage>> {
    let Json(request) = payload.map_err(|_| ApiError::bad_request("Invalid JSON body"))?;
    let content = request
        .content
        .filter(|content| !content.is_empty())
        .ok_or_else(|| ApiError::bad_request("content is required"))?;

    let message = state.store.update_message(&message_id, &content).await?;
    info!(message_id = %message_id, thread_id = %message.thread_id, "Message edited");
    Ok(Json(message))
}

/// `DELETE /api/chat/messages/{message_id}`
#[instrument(skip(state))]
pub async fn delete_message(
    State(state): State<AppState>,
    Path(message_id): Path<String>,
) -> ApiResult<StatusCode> {
    state.store.delete_message(&message_id).await?;
    info!(message_id = %message_id, "Message deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Query for `GET /api/threads/{thread_id}/messages`
#[derive(Debug, Deserialize)]
pub struct ListMessagesQuery {
    /// Page size, capped at 100
    pub limit: Option<usize>,
    /// Id of the last message on the previous page
    pub cursor: Option<String>,
}

/// `GET /api/threads/{thread_id}/messages`
pub async fn list_messages(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
    Query(query): Query<ListMessagesQuery>,
) -> ApiResult<Json<Page<ChatMessage>>> {
    let limit = page_size(query.limit, DEFAULT_MESSAGE_PAGE);
    let page = state
        .store
        .list_messages(&thread_id, limit, query.cursor.as_deref())
        .await?;
    Ok(Json(page))
}

// ============================================================================
// Threads
// ============================================================================

/// Query for `GET /api/chat/threads`
#[derive(Debug, Deserialize)]
pub struct ListThreadsQuery {
    /// `active` (default) or `archived`
    pub status: Option<String>,
    /// Page size, capped at 100
    pub limit: Option<usize>,
    /// Id of the last thread on the previous page
    pub cursor: Option<String>,
}

/// `GET /api/chat/threads`
pub async fn list_threads(
    State(state): State<AppState>,
    Query(query): Query<ListThreadsQuery>,
) -> ApiResult<Json<Page<Thread>>> {
    let status = match query.status.as_deref() {
        None | Some("") => ThreadStatus::Active,
        Some(raw) => raw.parse().map_err(ApiError::bad_request)?,
    };
    let limit = page_size(query.limit, DEFAULT_THREAD_PAGE);

    let page = state
        .store
        .list_threads(status, limit, query.cursor.as_deref())
        .await?;
    Ok(Json(page))
}

/// Body of `POST /api/chat/threads`
#[derive(Debug, Default, Deserialize)]
pub struct CreateThreadRequest {
    /// Display title; generated when absent
    pub title: Option<String>,
}

/// `POST /api/chat/threads`
///
/// An empty body creates an untitled thread.
pub async fn create_thread(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<Thread>> {
    let request = if body.is_empty() {
        CreateThreadRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|_| ApiError::bad_request("Invalid JSON body"))?
    };

    let thread = state.store.create_thread(request.title).await?;
    info!(thread_id = %thread.thread_id, "Thread created");
    Ok(Json(thread))
}

/// `GET /api/chat/threads/{thread_id}`
pub async fn get_thread(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
) -> ApiResult<Json<Thread>> {
    state
        .store
        .get_thread(&thread_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Thread not found"))
}

/// Body of `PATCH /api/chat/threads/{thread_id}`
#[derive(Debug, Deserialize)]
pub struct UpdateThreadRequest {
    /// `active` or `archived`
    pub status: Option<String>,
}

/// `PATCH /api/chat/threads/{thread_id}`
pub async fn update_thread(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
    payload: Result<Json<UpdateThreadRequest>, JsonRejection>,
) -> ApiResult<StatusCode> {
    let status: ThreadStatus = payload
        .ok()
        .and_then(|Json(request)| request.status)
        .and_then(|raw| raw.parse().ok())
        .ok_or_else(|| ApiError::bad_request("Invalid status"))?;

    state.store.update_thread_status(&thread_id, status).await?;
    info!(thread_id = %thread_id, status = %status, "Thread status changed");
    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /api/chat/threads/{thread_id}`
pub async fn delete_thread(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
) -> ApiResult<StatusCode> {
    state.store.delete_thread(&thread_id).await?;
    info!(thread_id = %thread_id, "Thread deleted");
    Ok(StatusCode::NO_CONTENT)
}

fn page_size(requested: Option<usize>, default: usize) -> usize {
    requested.unwrap_or(default).min(MAX_PAGE)
}
