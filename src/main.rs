use std::sync::Arc;

use axum::Router;
use axum::http::{HeaderValue, Method, header::CONTENT_TYPE};
use helpline::broadcast::Broadcaster;
use helpline::{AppState, auth, chat, feedback, store};
use sqlx::sqlite::SqlitePoolOptions;
use tower_http::cors::CorsLayer;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer, cookie::SameSite};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("helpline=debug,info")),
        )
        .init();

    let session_store = MemoryStore::default();
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(false)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::minutes(30)));

    let db_pool = SqlitePoolOptions::new()
        .max_connections(16)
        .connect(dotenv::var("DATABASE_URL").unwrap().as_str())
        .await
        .unwrap();
    store::init(&db_pool).await.unwrap();

    let app_url = dotenv::var("APP_URL").unwrap_or_else(|_| "http://localhost:3000".to_owned());
    let cors = CorsLayer::new()
        .allow_origin(app_url.parse::<HeaderValue>().unwrap())
        .allow_methods([Method::GET, Method::POST, Method::PATCH])
        .allow_headers([CONTENT_TYPE])
        .allow_credentials(true);

    let app_state = AppState {
        db_pool,
        broadcaster: Arc::new(Broadcaster::new()),
        admin: auth::AdminCredentials::from_env().unwrap(),
    };

    let app = Router::new()
        .nest("/api/feedback", feedback::router())
        .nest("/api/chat", chat::router())
        .merge(auth::router())
        .with_state(app_state)
        .layer(session_layer)
        .layer(cors);

    let addr = dotenv::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_owned());
    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    info!(%addr, "helpline listening");
    axum::serve(listener, app).await.unwrap();
}
