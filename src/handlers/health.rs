use axum::{Json, extract::State, http::StatusCode};
use serde_json::{Value, json};

use crate::state::AppState;

pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "session-hub",
            "version": env!("CARGO_PKG_VERSION"),
            "connected_clients": state.hub.registry().len().await,
        })),
    )
}
