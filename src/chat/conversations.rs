use axum::extract::State;
use axum::{Json, debug_handler};
use sqlx::SqlitePool;

use crate::error::AppResult;
use crate::session::Actor;
use crate::store::ConversationSummary;
use crate::service;

/// Inbox: admins see every thread, visitors only their own, each with an
/// unread count and a preview of the latest message.
#[debug_handler(state = crate::AppState)]
pub(crate) async fn list(
    State(db_pool): State<SqlitePool>,
    actor: Actor,
) -> AppResult<Json<Vec<ConversationSummary>>> {
    Ok(Json(service::list_conversations(&db_pool, &actor).await?))
}
