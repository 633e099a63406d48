// WebSocket connection handling

use std::sync::Arc;
use std::time::Duration;

use axum::Extension;
use axum::extract::State;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures::stream::SplitStream;
use futures::{Sink, SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::hub::{BroadcastHub, ChannelSink, Client, ClientFrame, ClientId, HubError, OutboundFrame};
use crate::middleware::AuthSubject;
use crate::state::AppState;

/// How long a closing connection's writer may keep flushing queued frames
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    subject: Option<Extension<AuthSubject>>,
) -> Response {
    let subject_id = subject.map(|Extension(s)| s.subject_id);

    if state.hub.config().require_auth && subject_id.is_none() {
        warn!("Rejected unauthenticated upgrade request");
        return StatusCode::UNAUTHORIZED.into_response();
    }

    ws.on_upgrade(move |socket| handle_socket(socket, state, subject_id))
}

/// Why a read loop ended
#[derive(Debug, PartialEq, Eq)]
enum Disconnect {
    Closed,
    Shutdown,
    IdleTimeout,
    TransportError,
    DecodeError,
    Evicted,
    WriterFailed,
}

/// Handle a WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState, subject_id: Option<String>) {
    let hub = state.hub.clone();
    let config = hub.config().clone();

    let client_id = hub.next_client_id();
    // Authenticated connections speak as their subject, never as a name they assert
    let sender_id = subject_id.unwrap_or_else(|| client_id.to_string());

    let (sink, stream) = socket.split();
    let (tx, rx) = mpsc::channel(config.outbound_buffer);

    let client = Client::new(client_id, sender_id, Arc::new(ChannelSink::new(tx)));
    if let Err(e) = hub.register(client).await {
        error!("Failed to register client {}: {}", client_id, e);
        return;
    }

    info!("WebSocket client {} connected", client_id);

    let writer_done = CancellationToken::new();
    let mut writer = tokio::spawn(write_loop(
        client_id,
        sink,
        rx,
        config.delivery_timeout(),
        writer_done.clone(),
    ));

    let reason = read_loop(
        client_id,
        stream,
        &hub,
        config.idle_timeout(),
        &state.shutdown,
        &writer_done,
    )
    .await;

    // Releasing the registry entry drops the last queue sender, which ends the writer
    hub.unregister(client_id).await;

    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer)
        .await
        .is_err()
    {
        debug!("Writer for client {} did not drain in time", client_id);
        writer.abort();
    }

    info!("WebSocket client {} disconnected ({:?})", client_id, reason);
}

/// Decode inbound frames and feed them to the hub until the connection ends
async fn read_loop(
    client_id: ClientId,
    mut stream: SplitStream<WebSocket>,
    hub: &BroadcastHub,
    idle_timeout: Duration,
    shutdown: &CancellationToken,
    writer_done: &CancellationToken,
) -> Disconnect {
    loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => return Disconnect::Shutdown,
            // Nothing more can reach this peer, even if it keeps pinging
            _ = writer_done.cancelled() => return Disconnect::WriterFailed,
            next = tokio::time::timeout(idle_timeout, stream.next()) => next,
        };

        let msg = match next {
            Err(_) => return Disconnect::IdleTimeout,
            Ok(None) => return Disconnect::Closed,
            Ok(Some(Err(e))) => {
                debug!("WebSocket error on client {}: {}", client_id, e);
                return Disconnect::TransportError;
            }
            Ok(Some(Ok(msg))) => msg,
        };

        match msg {
            WsMessage::Text(text) => {
                let frame: ClientFrame = match serde_json::from_str(&text) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!("Undecodable frame from client {}: {}", client_id, e);
                        return Disconnect::DecodeError;
                    }
                };

                match hub.handle(client_id, frame).await {
                    Ok(report) => debug!(
                        "Client {} message delivered to {}/{}",
                        client_id, report.delivered, report.attempted
                    ),
                    // Dropped by a failed delivery; the writer is already gone
                    Err(HubError::UnknownClient(_)) => return Disconnect::Evicted,
                    Err(e) => warn!("Rejected message from client {}: {}", client_id, e),
                }
            }
            WsMessage::Close(_) => {
                debug!("WebSocket client {} sent close frame", client_id);
                return Disconnect::Closed;
            }
            _ => {
                // Pings are answered by the protocol layer; binary frames are not part of the protocol
            }
        }
    }
}

/// Drain the outbound queue into the socket. Each socket write is bounded by
/// `write_timeout` so a peer that stops reading cannot pin the writer.
/// `writer_done` is cancelled whenever the loop exits.
async fn write_loop<S>(
    client_id: ClientId,
    mut sink: S,
    mut rx: mpsc::Receiver<Arc<OutboundFrame>>,
    write_timeout: Duration,
    writer_done: CancellationToken,
) where
    S: Sink<WsMessage> + Unpin,
    S::Error: std::fmt::Display,
{
    let _done = writer_done.drop_guard();

    while let Some(frame) = rx.recv().await {
        let json = match serde_json::to_string(frame.as_ref()) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to encode frame for client {}: {}", client_id, e);
                continue;
            }
        };

        // Dropping the receiver makes further deliveries fail, which evicts the client
        match tokio::time::timeout(write_timeout, sink.send(WsMessage::Text(json.into()))).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!("Write to client {} failed: {}", client_id, e);
                return;
            }
            Err(_) => {
                warn!(
                    "Write to client {} timed out after {:?}",
                    client_id, write_timeout
                );
                return;
            }
        }
    }

    let _ = sink.close().await;
}
