use axum::{Extension, Json, http::StatusCode};
use serde_json::{Value, json};

use crate::middleware::AuthSubject;

/// Identity behind the current session
pub async fn get_session(
    Extension(subject): Extension<AuthSubject>,
) -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "subject_id": subject.subject_id,
        })),
    )
}
