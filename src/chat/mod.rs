mod conversations;
mod messages;
mod ws;

use axum::routing::{get, patch};
use axum::Router;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", patch(messages::mark_read))
        .route("/conversations", get(conversations::list))
        .route("/ws", get(ws::chat_ws))
        .route("/{feedback_id}", get(messages::fetch).post(messages::send))
}
