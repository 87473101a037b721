use axum::extract::{Path, State};
use axum::{Json, debug_handler};
use serde::Deserialize;
use serde_json::{Value, json};
use sqlx::SqlitePool;

use crate::error::{AppError, AppResult};
use crate::session::Actor;
use crate::store::{self, Status};
use crate::service;

/// Raw dump of every thread for the admin dashboard, newest first.
#[debug_handler(state = crate::AppState)]
pub(crate) async fn list_all(
    State(db_pool): State<SqlitePool>,
    actor: Actor,
) -> AppResult<Json<Value>> {
    if !actor.is_admin() {
        return Err(AppError::Forbidden);
    }
    let feedback = store::list_all(&db_pool).await?;
    Ok(Json(json!({ "feedback": feedback })))
}

#[derive(Deserialize)]
pub(crate) struct StatusUpdate {
    status: Status,
}

/// Manual status override; this is how a thread gets resolved.
#[debug_handler(state = crate::AppState)]
pub(crate) async fn set_status(
    State(db_pool): State<SqlitePool>,
    actor: Actor,
    Path(id): Path<i64>,
    Json(StatusUpdate { status }): Json<StatusUpdate>,
) -> AppResult<Json<Value>> {
    if !actor.is_admin() {
        return Err(AppError::Forbidden);
    }
    service::set_status(&db_pool, id, status).await?;
    Ok(Json(json!({ "success": true })))
}
