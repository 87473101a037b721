//! Thin session auth. Real identity lives elsewhere; this layer only turns a
//! request into an [`Actor`]. Admins log in against credentials from the
//! environment, visitors identify themselves by email (the contact form does
//! the same implicitly on submission).

use axum::routing::post;
use axum::{Json, Router, debug_handler, extract::State};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_sessions::Session;
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::session::{ACTOR, Actor};
use crate::store::Role;
use crate::{AppState, service};

#[derive(Clone)]
pub struct AdminCredentials {
    pub email: String,
    pub password: String,
}

impl AdminCredentials {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            email: dotenv::var("ADMIN_EMAIL")?,
            password: dotenv::var("ADMIN_PASSWORD")?,
        })
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
}

#[derive(Deserialize)]
struct LoginRequest {
    email: String,
    password: Option<String>,
}

#[debug_handler(state = AppState)]
async fn login(
    State(admin): State<AdminCredentials>,
    session: Session,
    Json(LoginRequest { email, password }): Json<LoginRequest>,
) -> AppResult<Json<Value>> {
    let actor = match password {
        Some(password) => {
            if email != admin.email || password != admin.password {
                return Err(AppError::Unauthenticated);
            }
            Actor {
                email,
                role: Role::Admin,
            }
        }
        None => {
            if !service::valid_email(&email) {
                return Err(AppError::invalid("invalid email address"));
            }
            Actor {
                email,
                role: Role::Visitor,
            }
        }
    };

    session.insert(ACTOR, &actor).await?;
    info!(email = %actor.email, role = ?actor.role, "logged in");
    Ok(Json(json!({ "email": actor.email, "role": actor.role })))
}

#[debug_handler]
async fn logout(session: Session) -> AppResult<Json<Value>> {
    session.clear().await;
    Ok(Json(json!({ "success": true })))
}
