use axum::{
    Json,
    extract::State,
    http::{StatusCode, header::SET_COOKIE},
    response::{AppendHeaders, IntoResponse, Response},
};
use serde_json::{Value, json};
use tracing::{error, info};

use crate::middleware::{persist_cookie, session_cookie};
use crate::models::{LoginRequest, LoginResponse, UserInfo};
use crate::session::SessionError;
use crate::state::AppState;

type ApiError = (StatusCode, Json<Value>);

fn api_error(status: StatusCode, message: &str) -> ApiError {
    (status, Json(json!({ "error": message })))
}

fn session_failure(err: SessionError) -> ApiError {
    error!("Login session issue failed: {}", err);
    api_error(err.to_status_code(), "Failed to create session")
}

/// Verify credentials and issue both the session and persistence cookies
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    if payload.email.is_empty() || payload.password.is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "Email and password are required",
        ));
    }

    let account = state
        .directory
        .verify_credentials(&payload.email, &payload.password)
        .await
        .map_err(|e| {
            info!("Login failed for {}: {}", payload.email, e);
            api_error(e.to_status_code(), "Invalid credentials")
        })?;

    let token = state
        .sessions
        .create_session(&account.id)
        .await
        .map_err(session_failure)?;

    let compound_id = state
        .sessions
        .create_persistent_grant(&account.username, &account.id)
        .await
        .map_err(session_failure)?;

    let config = state.sessions.config();
    let cookies = session_cookie(&token, config)
        .and_then(|sid| persist_cookie(&compound_id, config).map(|persist| (sid, persist)))
        .map_err(|e| {
            error!("Failed to build login cookies: {}", e);
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to create session")
        })?;

    info!("User {} logged in", account.username);

    Ok((
        StatusCode::OK,
        AppendHeaders([(SET_COOKIE, cookies.0), (SET_COOKIE, cookies.1)]),
        Json(LoginResponse {
            user: UserInfo::from(account),
        }),
    )
        .into_response())
}
