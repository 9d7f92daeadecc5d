//! HTTP route handlers for the portfolio agent API.

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::response::sse::{Event, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::Stream;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tower_http::services::ServeDir;

use crate::orchestrator::RequestContext;
use crate::progress::{Drained, HEARTBEAT_INTERVAL, relay};
use crate::state::message::{ChatRole, format_messages};
use crate::state::revision::format_revisions;
use crate::state::sessions::DEFAULT_SESSION;

use super::state::AppState;

/// Create the API router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/chat/stream", post(chat_stream))
        .route("/chat", post(chat_request))
        .route("/chat/history", get(chat_history))
        .route("/ui/history", get(ui_history))
        .route("/ui/history/{id}", get(restore_ui_from_history))
        .nest_service("/", ServeDir::new("static"))
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "folio-agent",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Session identifier for the requesting client: the `x-session-id`
/// header when present, else the fixed single-session identifier.
fn session_key(headers: &HeaderMap) -> String {
    headers
        .get("x-session-id")
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map_or_else(|| DEFAULT_SESSION.to_string(), ToString::to_string)
}

/// Chat request body.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    /// The user's natural-language instruction.
    pub instruction: String,
}

/// One frame of the streaming response before SSE encoding.
#[derive(Clone, Debug)]
enum StreamFrame {
    /// A `data:` JSON payload.
    Data(Value),
    /// A comment frame keeping the connection alive.
    Heartbeat,
}

impl From<StreamFrame> for Event {
    fn from(frame: StreamFrame) -> Self {
        match frame {
            StreamFrame::Data(value) => Self::default().data(value.to_string()),
            StreamFrame::Heartbeat => Self::default().comment("heartbeat"),
        }
    }
}

/// Adapter exposing the pipeline's frame channel as an SSE event stream.
struct EventStream {
    rx: mpsc::UnboundedReceiver<StreamFrame>,
}

impl Stream for EventStream {
    type Item = Result<Event, Infallible>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut()
            .rx
            .poll_recv(cx)
            .map(|frame| frame.map(|frame| Ok(frame.into())))
    }
}

/// Streaming chat endpoint: progress events interleaved with heartbeats,
/// terminated by a `complete` or `error` event.
async fn chat_stream(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Sse<EventStream> {
    let session_id = session_key(&headers);
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(run_chat_pipeline(state, session_id, request.instruction, tx));
    Sse::new(EventStream { rx })
}

/// One request's full lifecycle: record the user turn, run the agent on a
/// secondary worker while draining its progress relay, record the agent
/// turn, then cache the revision and emit the final frame.
async fn run_chat_pipeline(
    state: Arc<AppState>,
    session_id: String,
    instruction: String,
    events: mpsc::UnboundedSender<StreamFrame>,
) {
    let send = |frame: StreamFrame| {
        // A closed receiver just means the client went away.
        let _ = events.send(frame);
    };
    let send_error = |message: String| {
        send(StreamFrame::Data(
            json!({"status": "error", "message": message}),
        ));
    };

    let stores = match state.sessions.session(&session_id).await {
        Ok(stores) => stores,
        Err(error) => {
            tracing::error!(%session_id, %error, "failed to open session state");
            send_error(error.to_string());
            return;
        }
    };

    send(StreamFrame::Data(
        json!({"status": "started", "message": "Processing request..."}),
    ));

    if let Err(error) = stores
        .transcript
        .append(ChatRole::User, instruction.clone())
        .await
    {
        tracing::error!(%session_id, %error, "failed to record user turn");
        send_error(error.to_string());
        return;
    }

    send(StreamFrame::Data(
        json!({"status": "orchestrating", "message": "Analyzing request..."}),
    ));

    let (progress_tx, mut progress_rx) = relay();
    let ctx = RequestContext {
        revisions: Arc::clone(&stores.revisions),
        progress: progress_tx,
        similarity_threshold: state.sessions.similarity_threshold(),
    };
    let agent = Arc::clone(&state.agent);
    let worker = tokio::spawn({
        let instruction = instruction.clone();
        async move {
            let outcome = agent.invoke(&instruction, &ctx).await;
            // Always finalize the relay so the drain loop terminates,
            // success or not.
            ctx.progress.done();
            outcome
        }
    });

    loop {
        match progress_rx.next_or_heartbeat(HEARTBEAT_INTERVAL).await {
            Drained::Message(message) => send(StreamFrame::Data(
                json!({"status": "progress", "message": message}),
            )),
            Drained::Heartbeat => send(StreamFrame::Heartbeat),
            Drained::Finished => break,
        }
    }

    let outcome = match worker.await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(error)) => {
            tracing::error!(%session_id, %error, "agent invocation failed");
            send_error(error.to_string());
            return;
        }
        Err(error) => {
            tracing::error!(%session_id, %error, "agent worker panicked");
            send_error(error.to_string());
            return;
        }
    };

    if let Err(error) = stores
        .transcript
        .append(ChatRole::Agent, outcome.chat_message.clone())
        .await
    {
        tracing::error!(%session_id, %error, "failed to record agent turn");
        send_error(error.to_string());
        return;
    }

    if !outcome.success {
        send_error(
            outcome
                .error_message
                .unwrap_or_else(|| outcome.chat_message.clone()),
        );
        return;
    }

    send(StreamFrame::Data(
        json!({"status": "finalizing", "message": "Finalizing..."}),
    ));

    let html = outcome.html.unwrap_or_default();
    if !html.is_empty() {
        if let Err(error) = stores.revisions.add(instruction, html.clone()).await {
            tracing::error!(%session_id, %error, "failed to cache revision");
            send_error(error.to_string());
            return;
        }
    }

    let history = match stores.transcript.all().await {
        Ok(messages) => format_messages(&messages),
        Err(error) => {
            send_error(error.to_string());
            return;
        }
    };

    send(StreamFrame::Data(json!({
        "status": "complete",
        "success": true,
        "chat_message": outcome.chat_message,
        "html": html,
        "history": history,
    })));
}

/// Fallback non-streaming chat endpoint.
async fn chat_request(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let session_id = session_key(&headers);
    let stores = state
        .sessions
        .session(&session_id)
        .await
        .map_err(internal)?;

    stores
        .transcript
        .append(ChatRole::User, request.instruction.clone())
        .await
        .map_err(internal)?;

    // Progress events have no consumer here; the relay's receiver is
    // simply dropped.
    let (progress_tx, _progress_rx) = relay();
    let ctx = RequestContext {
        revisions: Arc::clone(&stores.revisions),
        progress: progress_tx,
        similarity_threshold: state.sessions.similarity_threshold(),
    };

    match state.agent.invoke(&request.instruction, &ctx).await {
        Ok(outcome) => {
            stores
                .transcript
                .append(ChatRole::Agent, outcome.chat_message.clone())
                .await
                .map_err(internal)?;

            if !outcome.success {
                return Ok(Json(json!({
                    "success": false,
                    "chat_message": outcome.chat_message,
                })));
            }

            let html = outcome.html.unwrap_or_default();
            if !html.is_empty() {
                stores
                    .revisions
                    .add(request.instruction.clone(), html.clone())
                    .await
                    .map_err(internal)?;
            }

            let history = format_messages(&stores.transcript.all().await.map_err(internal)?);
            Ok(Json(json!({
                "success": true,
                "chat_message": outcome.chat_message,
                "html": html,
                "history": history,
            })))
        }
        Err(error) => {
            tracing::error!(%session_id, %error, "agent invocation failed");
            let history = format_messages(&stores.transcript.all().await.map_err(internal)?);
            Ok(Json(json!({
                "success": false,
                "chat_message": error.to_string(),
                "history": history,
            })))
        }
    }
}

/// Chronological chat history for the requesting session.
async fn chat_history(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, (StatusCode, String)> {
    let stores = state
        .sessions
        .session(&session_key(&headers))
        .await
        .map_err(internal)?;
    let entries = format_messages(&stores.transcript.all().await.map_err(internal)?);
    Ok(Json(json!({"success": true, "entries": entries})))
}

/// Reverse-chronological revision listing for the requesting session.
async fn ui_history(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, (StatusCode, String)> {
    let stores = state
        .sessions
        .session(&session_key(&headers))
        .await
        .map_err(internal)?;
    let entries = format_revisions(&stores.revisions.all().await.map_err(internal)?);
    Ok(Json(json!({"success": true, "entries": entries})))
}

/// Restore a past revision by index, promoting it to most recent.
async fn restore_ui_from_history(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(entry_id): Path<usize>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let stores = state
        .sessions
        .session(&session_key(&headers))
        .await
        .map_err(internal)?;

    let Some(entry) = stores.revisions.get(entry_id).await.map_err(internal)? else {
        tracing::debug!(entry_id, "revision cache entry not found");
        return Ok(Json(json!({"success": false})));
    };

    stores.revisions.promote(&entry).await.map_err(internal)?;

    Ok(Json(json!({
        "html": entry.html,
        "query": entry.query,
    })))
}

fn internal(error: impl std::fmt::Display) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, error.to_string())
}
