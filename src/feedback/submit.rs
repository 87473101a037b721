use axum::extract::State;
use axum::{Json, debug_handler};
use serde_json::{Value, json};
use tower_sessions::Session;

use crate::error::AppResult;
use crate::session::{ACTOR, Actor};
use crate::store::{NewConversation, Role};
use crate::{AppState, service};

/// Contact-form entry point. Opens the conversation and, as a side effect,
/// gives the visitor a session tied to the submitted email so they can keep
/// chatting on the thread they just opened.
#[debug_handler(state = AppState)]
pub(crate) async fn submit(
    State(state): State<AppState>,
    session: Session,
    Json(form): Json<NewConversation>,
) -> AppResult<Json<Value>> {
    let (feedback_id, _) =
        service::create_conversation(&state.db_pool, &state.broadcaster, &form).await?;

    session
        .insert(
            ACTOR,
            &Actor {
                email: form.email.trim().to_owned(),
                role: Role::Visitor,
            },
        )
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": "Message sent! We will get back to you shortly.",
        "feedbackId": feedback_id,
    })))
}
