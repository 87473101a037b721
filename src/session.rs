use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use serde::{Deserialize, Serialize};
use tower_sessions::Session;

use crate::error::AppError;
use crate::store::Role;

pub const ACTOR: &str = "actor";

/// Whoever is behind the current session: an email identity plus one of the
/// two roles. Visitors get a session when they submit the contact form or
/// log in with just an email; admins authenticate against the configured
/// credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    pub email: String,
    pub role: Role,
}

impl Actor {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Actor {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state)
            .await
            .map_err(|(_, msg)| AppError::Internal(anyhow::Error::msg(msg)))?;
        session
            .get::<Actor>(ACTOR)
            .await?
            .ok_or(AppError::Unauthenticated)
    }
}
