//! Shared harness: spawns the relay on an ephemeral port and drives it
//! with WebSocket and HTTP clients.

#![allow(clippy::panic, dead_code, missing_docs)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use form_relay::api::build_app;
use form_relay::app_state::AppState;
use form_relay::domain::{ContentPolicy, ManualReview, ReviewPolicy, SessionRegistry};
use form_relay::persistence::MemoryStore;
use form_relay::service::{DeliverySettings, RelayService};

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

pub struct TestServer {
    pub addr: SocketAddr,
    pub service: Arc<RelayService>,
}

impl TestServer {
    pub async fn auto() -> Self {
        Self::spawn(Arc::new(ContentPolicy::default())).await
    }

    pub async fn manual() -> Self {
        Self::spawn(Arc::new(ManualReview)).await
    }

    async fn spawn(policy: Arc<dyn ReviewPolicy>) -> Self {
        let settings = DeliverySettings {
            close_grace: Duration::from_millis(100),
            ..DeliverySettings::default()
        };
        let relay_service = Arc::new(RelayService::new(
            Arc::new(SessionRegistry::new()),
            Arc::new(MemoryStore::new()),
            policy,
            settings,
        ));
        let app = build_app(AppState {
            relay_service: Arc::clone(&relay_service),
        });

        let Ok(listener) = tokio::net::TcpListener::bind("127.0.0.1:0").await else {
            panic!("failed to bind test listener");
        };
        let Ok(addr) = listener.local_addr() else {
            panic!("listener has no local address");
        };
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Self {
            addr,
            service: relay_service,
        }
    }

    pub fn http(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    pub async fn connect(&self, query: &str) -> WsClient {
        let url = format!("ws://{}/ws{query}", self.addr);
        match connect_async(url.as_str()).await {
            Ok((ws, _)) => ws,
            Err(err) => panic!("failed to connect to {url}: {err}"),
        }
    }

    /// Connects and consumes the `session` message, returning the client id.
    pub async fn connect_as(&self, query: &str) -> (WsClient, String) {
        let mut ws = self.connect(query).await;
        let session = expect_kind(&mut ws, "session").await;
        let Some(id) = session["payload"]["client_id"].as_str() else {
            panic!("session message without client_id: {session}");
        };
        (ws, id.to_string())
    }

    pub async fn health(&self) -> Value {
        let Ok(resp) = reqwest::get(self.http("/health")).await else {
            panic!("health request failed");
        };
        let Ok(body) = resp.json::<Value>().await else {
            panic!("health body is not JSON");
        };
        body
    }

    /// Polls `/health` until the submitter session count reaches `expected`.
    pub async fn wait_for_submitters(&self, expected: u64) {
        for _ in 0..100 {
            if self.health().await["submitter_sessions"].as_u64() == Some(expected) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("submitter session count never reached {expected}");
    }
}

pub async fn send_json(ws: &mut WsClient, value: &Value) {
    if let Err(err) = ws.send(Message::text(value.to_string())).await {
        panic!("send failed: {err}");
    }
}

pub async fn send_text(ws: &mut WsClient, text: &str) {
    if let Err(err) = ws.send(Message::text(text.to_string())).await {
        panic!("send failed: {err}");
    }
}

/// Receives the next data message as JSON. Panics on close or timeout.
pub async fn recv_json(ws: &mut WsClient) -> Value {
    loop {
        let msg = match tokio::time::timeout(RECV_TIMEOUT, ws.next()).await {
            Ok(Some(Ok(msg))) => msg,
            other => panic!("expected a message, got {other:?}"),
        };
        match msg {
            Message::Text(text) => {
                return serde_json::from_str(text.as_str())
                    .unwrap_or_else(|err| panic!("invalid JSON from server: {err}"));
            }
            Message::Close(frame) => panic!("connection closed unexpectedly: {frame:?}"),
            _ => {}
        }
    }
}

/// Receives the next message and asserts its `kind`.
pub async fn expect_kind(ws: &mut WsClient, kind: &str) -> Value {
    let msg = recv_json(ws).await;
    assert_eq!(msg["kind"], kind, "unexpected message: {msg}");
    msg
}

/// Waits for the server to close the connection.
pub async fn expect_closed(ws: &mut WsClient) {
    loop {
        match tokio::time::timeout(RECV_TIMEOUT, ws.next()).await {
            Ok(Some(Ok(Message::Close(_)))) | Ok(None) | Ok(Some(Err(_))) => return,
            Ok(Some(Ok(Message::Text(text)))) => {
                panic!("expected close, got message {}", text.as_str())
            }
            Ok(Some(Ok(_))) => {}
            Err(_) => panic!("connection was not closed in time"),
        }
    }
}
