//! API module
//!
//! Contains HTTP request handlers and the router that wires them together

pub mod auth;
pub mod chat;
pub mod dialogs;
pub mod streaming;
pub mod utils;

use crate::state::AppState;
use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
    routing::{get, post, put},
    Json, Router,
};
use serde::Serialize;
use std::time::Instant;
use tower_http::{
    cors::{AllowHeaders, AllowMethods, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

/// Health check body
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `ok` while the server answers
    pub status: String,
    /// Crate version
    pub version: String,
}

/// GET /health - Liveness probe
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Request ID middleware - adds unique ID to each request for tracing
async fn request_id_middleware(request: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let span = info_span!(
        "request",
        request_id = %request_id,
        method = %method,
        uri = %uri,
    );

    let response = next.run(request).instrument(span).await;

    // For streamed bodies this marks the headers, not the end of the body
    let duration = start.elapsed();
    info!(
        request_id = %request_id,
        method = %method,
        uri = %uri,
        status = %response.status().as_u16(),
        duration_ms = duration.as_millis(),
        "Request completed"
    );

    response
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_credentials(true)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .expose_headers([
            HeaderName::from_static(streaming::DIALOG_ID_HEADER),
            HeaderName::from_static(streaming::HAS_REASONING_HEADER),
        ])
}

/// Build the application router with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    let uploads = ServeDir::new(state.uploads_dir());
    let cors = cors_layer(&state.config.server.cors_origins);

    Router::new()
        .route("/health", get(health_check))
        // Accounts
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/verify_token", post(auth::verify_token))
        .route("/logout", post(auth::logout))
        .route("/change_password", post(auth::change_password))
        // Dialogs
        .route("/new_dialog", post(dialogs::new_dialog))
        .route("/dialogs", get(dialogs::list_dialogs))
        .route(
            "/dialog/:dialog_id",
            put(dialogs::update_dialog).delete(dialogs::delete_dialog),
        )
        // Streaming
        .route("/ask", post(chat::ask))
        .route("/stop", post(chat::stop))
        .route("/reasoning/:dialog_id", get(chat::latest_reasoning))
        .route("/reasoning/stream/:dialog_id", get(chat::reasoning_stream))
        .nest_service("/uploads", uploads)
        // Middleware (order matters - request_id should be first)
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }),
        )
        .layer(cors)
        .with_state(state)
}
