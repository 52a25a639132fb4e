mod card;
mod contact;
mod error;
mod state;
mod visitors;

use axum::http::header::{InvalidHeaderValue, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use error::*;
pub use state::App;
pub use visitors::ClientHints;

pub type Result<T, E = ApiError> = std::result::Result<T, E>;

pub fn create_router(app: App, cors: CorsLayer) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/track", post(visitors::track))
        .route("/api/stats", get(visitors::stats))
        .route("/api/stats/live", get(visitors::live))
        .route(
            "/api/contact",
            post(contact::send).fallback(contact::method_not_allowed),
        )
        .route("/api/vcard", get(card::download))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(cors))
        .with_state(app)
}

/// Allows `origin` to call the API with its cookies, or any origin without credentials.
pub fn cors(origin: Option<&str>) -> Result<CorsLayer, InvalidHeaderValue> {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE]);

    let layer = match origin {
        Some(origin) => layer
            .allow_origin(HeaderValue::from_str(origin)?)
            .allow_credentials(true),
        None => layer.allow_origin(Any),
    };

    Ok(layer)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
