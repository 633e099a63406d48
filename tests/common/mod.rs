// Shared helpers for integration tests
// Some helpers appear unused in individual test binaries because each file
// under tests/ compiles on its own.

use std::net::SocketAddr;
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use session_hub::config::AppConfig;
use session_hub::directory::AccountSeed;
use session_hub::hub::{HubConfig, OutboundFrame};
use session_hub::server::{build_state, create_router};
use session_hub::state::AppState;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderValue, header::COOKIE};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[allow(dead_code)]
pub const PASSWORD: &str = "correct horse battery staple";

fn seed(id: &str, username: &str) -> AccountSeed {
    AccountSeed {
        id: id.to_string(),
        username: username.to_string(),
        email: format!("{}@example.com", username),
        password_hash: bcrypt::hash(PASSWORD, 4).unwrap(),
    }
}

/// State with two accounts: alice (17) and bob (42)
#[allow(dead_code)]
pub async fn test_state(hub: HubConfig) -> AppState {
    let config = AppConfig {
        hub,
        accounts: vec![seed("17", "alice"), seed("42", "bob")],
        ..AppConfig::default()
    };
    build_state(&config).await.unwrap()
}

/// Serve the router on an ephemeral port
#[allow(dead_code)]
pub async fn spawn_server(state: AppState) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = create_router(state);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    addr
}

/// WebSocket test client
#[allow(dead_code)]
pub struct WsConnection {
    sink: SplitSink<WsStream, Message>,
    stream: SplitStream<WsStream>,
}

#[allow(dead_code)]
impl WsConnection {
    /// Connect to the hub, optionally presenting a Cookie header
    pub async fn connect(addr: SocketAddr, cookie: Option<&str>) -> Result<Self, WsError> {
        let mut request = format!("ws://{}/ws", addr).into_client_request()?;
        if let Some(cookie) = cookie {
            request
                .headers_mut()
                .insert(COOKIE, HeaderValue::from_str(cookie).unwrap());
        }

        let (ws, _) = tokio_tungstenite::connect_async(request).await?;
        let (sink, stream) = ws.split();
        Ok(Self { sink, stream })
    }

    pub async fn send_json(&mut self, msg: serde_json::Value) {
        self.sink
            .send(Message::Text(msg.to_string().into()))
            .await
            .unwrap();
    }

    pub async fn join(&mut self, username: &str) {
        self.send_json(serde_json::json!({
            "action": "INITIAL_CONNECTION",
            "username": username,
        }))
        .await;
    }

    pub async fn write(&mut self, body: &str) {
        self.send_json(serde_json::json!({
            "action": "WRITE_MESSAGE",
            "body": body,
        }))
        .await;
    }

    /// Next text frame, or None once the server closes the connection
    pub async fn recv_raw(&mut self) -> Option<String> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Some(text.to_string()),
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return None,
                Some(Ok(_)) => continue,
            }
        }
    }

    pub async fn recv_frame(&mut self) -> OutboundFrame {
        let text = tokio::time::timeout(Duration::from_secs(5), self.recv_raw())
            .await
            .expect("Timed out waiting for frame")
            .expect("WebSocket closed");
        serde_json::from_str(&text).expect("Failed to parse frame")
    }

    /// Receive with timeout, returns None if nothing arrives
    pub async fn recv_timeout(&mut self, duration: Duration) -> Option<String> {
        tokio::time::timeout(duration, self.recv_raw())
            .await
            .ok()
            .flatten()
    }

    pub async fn close(mut self) {
        let _ = self.sink.close().await;
    }
}
