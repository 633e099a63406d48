// Shared application state

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::directory::AccountDirectory;
use crate::hub::BroadcastHub;
use crate::session::SessionManager;

/// State handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionManager>,
    pub directory: Arc<dyn AccountDirectory>,
    pub hub: Arc<BroadcastHub>,
    /// Cancelled when the server shuts down; ends every connection read loop
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        sessions: Arc<SessionManager>,
        directory: Arc<dyn AccountDirectory>,
        hub: Arc<BroadcastHub>,
    ) -> Self {
        Self {
            sessions,
            directory,
            hub,
            shutdown: CancellationToken::new(),
        }
    }
}
