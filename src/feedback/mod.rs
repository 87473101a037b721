mod list;
mod submit;

use axum::routing::{get, patch};
use axum::Router;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list::list_all).post(submit::submit))
        .route("/{id}", patch(list::set_status))
}
