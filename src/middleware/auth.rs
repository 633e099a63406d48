use axum::{
    Json,
    extract::{Request, State},
    http::header::SET_COOKIE,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, warn};

use super::cookies::{PERSIST_COOKIE, SESSION_COOKIE, read_cookie, session_cookie};
use crate::session::{SessionError, SessionManager};

// Extension to store the authenticated subject in request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSubject {
    pub subject_id: String,
}

/// Session gate for protected routes.
///
/// A `sid` cookie is validated with sliding expiration; without one, a
/// `persist` cookie is redeemed for a fresh session. Requests carrying neither
/// are rejected before the store is touched.
pub async fn session_auth_middleware(
    State(sessions): State<Arc<SessionManager>>,
    mut request: Request,
    next: Next,
) -> Response {
    let session_token = read_cookie(request.headers(), SESSION_COOKIE);

    let (subject_id, issued_token) = if let Some(token) = session_token {
        match sessions.validate(&token).await {
            Ok(Some(validated)) => {
                let refreshed = validated.renewed.then_some(token);
                (validated.subject_id, refreshed)
            }
            Ok(None) => return reject(SessionError::Unauthorized),
            Err(e) => return reject(e),
        }
    } else if let Some(compound_id) = read_cookie(request.headers(), PERSIST_COOKIE) {
        // If session cookie is not present, but persist cookie is, the grant
        // is redeemed and the session renewed accordingly
        match sessions.redeem_persistent(&compound_id).await {
            Ok(redemption) => {
                debug!("Session restored from persistent grant");
                (redemption.subject_id, Some(redemption.token))
            }
            Err(e) => return reject(e),
        }
    } else {
        debug!("Session cookie not present in request");
        return reject(SessionError::Unauthorized);
    };

    request.extensions_mut().insert(AuthSubject { subject_id });

    let mut response = next.run(request).await;

    if let Some(token) = issued_token {
        match session_cookie(&token, sessions.config()) {
            Ok(cookie) => {
                response.headers_mut().append(SET_COOKIE, cookie);
            }
            Err(e) => error!("Failed to build session cookie: {}", e),
        }
    }

    response
}

/// Rejection response. Auth failures carry no detail about why.
fn reject(err: SessionError) -> Response {
    let status = err.to_status_code();

    match &err {
        SessionError::Store(_) | SessionError::Directory(_) | SessionError::Collision => {
            warn!("Session gate failing closed: {}", err);
        }
        _ => debug!("Session gate rejected request: {}", err),
    }

    let code = if status.is_server_error() {
        "service_unavailable"
    } else {
        "unauthorized"
    };

    (status, Json(json!({ "error": code }))).into_response()
}
