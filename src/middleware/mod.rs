pub mod auth;
pub mod cookies;

pub use auth::{AuthSubject, session_auth_middleware};
pub use cookies::{PERSIST_COOKIE, SESSION_COOKIE, persist_cookie, read_cookie, session_cookie};
