use axum::{Json, extract::State};
use serde_json::{Value, json};

use crate::state::AppState;

/// Recently broadcast frames, for inspection only
pub async fn recent_messages(State(state): State<AppState>) -> Json<Value> {
    let messages = state.hub.recent().await;
    Json(json!({ "messages": messages }))
}
