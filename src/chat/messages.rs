use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, debug_handler};
use serde::Deserialize;
use serde_json::json;

use crate::error::AppResult;
use crate::session::Actor;
use crate::{AppState, service};

/// History plus read receipt: the fetch itself marks the counterpart's
/// messages read and may advance the thread from new to read.
#[debug_handler(state = AppState)]
pub(crate) async fn fetch(
    State(state): State<AppState>,
    actor: Actor,
    Path(feedback_id): Path<i64>,
) -> AppResult<Json<serde_json::Value>> {
    let messages = service::fetch_messages(&state.db_pool, &actor, feedback_id).await?;
    Ok(Json(json!({ "messages": messages })))
}

#[derive(Deserialize)]
pub(crate) struct SendMessage {
    message: String,
}

#[debug_handler(state = AppState)]
pub(crate) async fn send(
    State(state): State<AppState>,
    actor: Actor,
    Path(feedback_id): Path<i64>,
    Json(SendMessage { message }): Json<SendMessage>,
) -> AppResult<Response> {
    let stored =
        service::send_message(&state.db_pool, &state.broadcaster, &actor, feedback_id, &message)
            .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "message": stored })),
    )
        .into_response())
}

#[derive(Deserialize)]
pub(crate) struct MarkRead {
    ids: Vec<i64>,
}

/// Legacy bulk read receipt by message id.
#[debug_handler(state = AppState)]
pub(crate) async fn mark_read(
    State(state): State<AppState>,
    _actor: Actor,
    Json(MarkRead { ids }): Json<MarkRead>,
) -> AppResult<Json<serde_json::Value>> {
    service::mark_read(&state.db_pool, &ids).await?;
    Ok(Json(json!({ "success": true })))
}
