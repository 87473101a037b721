pub mod auth;
pub mod broadcast;
pub mod chat;
pub mod error;
pub mod feedback;
pub mod service;
pub mod session;
pub mod store;

use std::sync::Arc;

use axum::extract::FromRef;
use sqlx::SqlitePool;

use crate::auth::AdminCredentials;
use crate::broadcast::Broadcaster;

pub use error::{AppError, AppResult};

#[derive(Clone, FromRef)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub broadcaster: Arc<Broadcaster>,
    pub admin: AdminCredentials,
}
