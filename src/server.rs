// Router assembly and server lifecycle

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    http::{HeaderValue, Method, header::CONTENT_TYPE},
    middleware::from_fn_with_state,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::config::{AppConfig, ServerConfig, StoreConfig};
use crate::directory::MemoryAccountDirectory;
use crate::handlers;
use crate::hub::BroadcastHub;
use crate::middleware::session_auth_middleware;
use crate::session::{MemorySessionStore, RedisSessionStore, SessionManager, SessionStore};
use crate::state::AppState;
use crate::ws::ws_handler;

/// How often the in-memory store drops expired entries
const PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// Build the router with all routes configured
pub fn create_router(state: AppState) -> Router {
    let gate = from_fn_with_state(state.sessions.clone(), session_auth_middleware);

    let protected = Router::new()
        .route("/api/v1/session", get(handlers::user::get_session))
        .route(
            "/api/v1/messages/recent",
            get(handlers::messages::recent_messages),
        )
        .route_layer(gate.clone());

    let mut ws = Router::new().route("/ws", get(ws_handler));
    if state.hub.config().require_auth {
        ws = ws.route_layer(gate);
    }

    Router::new()
        .route("/", get(handlers::health::health_check))
        .route("/health", get(handlers::health::health_check))
        .route("/api/v1/auth/login", post(handlers::auth::login))
        .merge(protected)
        .merge(ws)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// CORS policy. Cookies only travel cross-origin to an explicitly allowed origin.
pub fn cors_layer(config: &ServerConfig) -> Result<CorsLayer, String> {
    match &config.allowed_origin {
        Some(origin) => {
            let origin = origin
                .parse::<HeaderValue>()
                .map_err(|e| format!("Invalid allowed_origin '{}': {}", origin, e))?;
            Ok(CorsLayer::new()
                .allow_origin(origin)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers([CONTENT_TYPE])
                .allow_credentials(true))
        }
        None => Ok(CorsLayer::permissive()),
    }
}

/// Wire the session manager, directory and hub from configuration
pub async fn build_state(config: &AppConfig) -> Result<AppState, String> {
    let directory = Arc::new(MemoryAccountDirectory::from_seeds(&config.accounts).await);
    info!("Account directory loaded with {} account(s)", config.accounts.len());

    let mut memory_store = None;
    let store: Arc<dyn SessionStore> = match &config.store {
        StoreConfig::Memory => {
            info!("Using in-memory session store");
            let store = Arc::new(MemorySessionStore::new());
            memory_store = Some(store.clone());
            store
        }
        StoreConfig::Redis {
            url,
            command_timeout_ms,
        } => {
            let store = RedisSessionStore::new(url, Duration::from_millis(*command_timeout_ms))
                .await
                .map_err(|e| format!("Failed to connect to session store: {}", e))?;
            store
                .ping()
                .await
                .map_err(|e| format!("Session store did not answer PING: {}", e))?;
            info!("Using Redis session store");
            Arc::new(store)
        }
    };

    let sessions = Arc::new(SessionManager::new(
        store,
        directory.clone(),
        config.session.clone(),
    ));
    let hub = Arc::new(BroadcastHub::new(config.hub.clone()));
    let state = AppState::new(sessions, directory, hub);

    if let Some(store) = memory_store {
        spawn_purge_task(store, state.shutdown.clone());
    }

    Ok(state)
}

fn spawn_purge_task(store: Arc<MemorySessionStore>, shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    store.purge_expired().await;
                }
            }
        }
        debug!("Session purge task stopped");
    });
}

/// Run the server until Ctrl-C
pub async fn run(config: Arc<AppConfig>) -> Result<(), String> {
    let state = build_state(&config).await?;
    let shutdown = state.shutdown.clone();

    let app = create_router(state).layer(cors_layer(&config.server)?);

    let listener = TcpListener::bind(&config.server.bind_addr)
        .await
        .map_err(|e| format!("Failed to bind {}: {}", config.server.bind_addr, e))?;

    info!("Starting session hub on {}", config.server.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .map_err(|e| format!("Server error: {}", e))?;

    info!("Server stopped");
    Ok(())
}

/// Resolves on Ctrl-C or when the token is cancelled elsewhere, and cancels it
/// so every WebSocket read loop ends too
async fn shutdown_signal(shutdown: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!("Failed to listen for Ctrl-C: {}", e);
            }
            info!("Shutdown signal received");
        }
        _ = shutdown.cancelled() => {}
    }
    shutdown.cancel();
}
