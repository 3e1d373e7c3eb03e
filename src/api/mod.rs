//! REST API module using Axum
//!
//! Thin HTTP surface over the pipeline:
//! - `GET /health` — liveness probe
//! - `POST /predict` — classify one window of sensor samples
//! - `POST /train` — train a new artifact from a corpus directory
//! - `POST /evaluate` — evaluate the loaded artifact against labeled trials
//!
//! Authentication, plotting and dataset shuffling live outside this service.

pub mod handlers;

pub use handlers::AppState;

use axum::http::{header, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build a CORS layer that is restrictive by default (same-origin only).
///
/// Set `MOTIONSENSE_CORS_ORIGINS` to a comma-separated list of allowed
/// origins for development.
fn build_cors_layer() -> CorsLayer {
    let methods = [Method::GET, Method::POST];
    match std::env::var("MOTIONSENSE_CORS_ORIGINS") {
        Ok(origins) => {
            let allowed: Vec<_> = origins
                .split(',')
                .filter_map(|o| o.trim().parse().ok())
                .collect();
            tracing::info!(origins = %origins, "CORS: allowing configured origins");
            CorsLayer::new()
                .allow_origin(allowed)
                .allow_methods(methods)
                .allow_headers([header::CONTENT_TYPE])
        }
        Err(_) => CorsLayer::new()
            .allow_methods(methods)
            .allow_headers([header::CONTENT_TYPE]),
    }
}

/// Create the application router.
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/predict", post(handlers::predict))
        .route("/train", post(handlers::train))
        .route("/evaluate", post(handlers::evaluate))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer())
}

/// Uniform error body: `{ "error": { "code": "...", "message": "..." } }`.
#[derive(Debug, Serialize)]
pub(crate) struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub(crate) struct ErrorDetail {
    code: &'static str,
    message: String,
}

pub(crate) fn api_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> Response {
    let body = ErrorBody {
        error: ErrorDetail {
            code,
            message: message.into(),
        },
    };
    (status, axum::Json(body)).into_response()
}
