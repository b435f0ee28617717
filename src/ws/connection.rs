//! Per-connection read/write loop.
//!
//! One task per WebSocket connection. Inbound frames are handled strictly
//! in receipt order; outbound messages queued by other connections arrive
//! through the session's [`Outbound`] channel.

use std::pin::Pin;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::time::{Duration, Instant, Sleep};

use super::messages::{ClientMessage, DecisionCommand, ServerMessage};
use crate::domain::{ClientId, ClientSession, Outbound, Role};
use crate::error::RelayError;
use crate::service::{Connected, RelayService};

type WsSink = SplitSink<WebSocket, Message>;

/// Runs the read/write loop for a single WebSocket connection.
///
/// - Registers the session, then reads and dispatches client messages.
/// - Forwards queued [`Outbound`] messages to the client.
/// - Closes the socket when asked to (after an optional grace period),
///   when the session is superseded, or when the peer goes away.
pub async fn run_connection(
    socket: WebSocket,
    service: Arc<RelayService>,
    requested_id: Option<ClientId>,
    role: Role,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let Connected {
        session,
        mut outbound,
    } = service.connect(requested_id, role).await;

    let mut close_timer = CloseTimer::new();

    loop {
        tokio::select! {
            // Incoming message from client
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let reply = handle_text_message(text.as_str(), &session, &service).await;
                        if let Some(reply) = reply
                            && send_message(&mut ws_tx, &reply).await.is_err()
                        {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(err)) => {
                        tracing::debug!(client_id = %session.id, error = %err, "ws read error");
                        break;
                    }
                    _ => {}
                }
            }
            // Message queued for this session
            out = outbound.recv() => {
                match out {
                    Some(Outbound::Message(msg)) => {
                        if send_message(&mut ws_tx, &msg).await.is_err() {
                            break;
                        }
                    }
                    Some(Outbound::Close { after }) if after.is_zero() => {
                        let _ = ws_tx.send(Message::Close(None)).await;
                        break;
                    }
                    Some(Outbound::Close { after }) => {
                        close_timer.arm(after);
                    }
                    None => break,
                }
            }
            // Session removed from the registry
            () = session.handle.evicted() => {
                tracing::debug!(client_id = %session.id, "session evicted; closing connection");
                let _ = ws_tx.send(Message::Close(None)).await;
                break;
            }
            () = close_timer.fired() => {
                let _ = ws_tx.send(Message::Close(None)).await;
                break;
            }
        }
    }

    service.disconnect(&session).await;
    tracing::debug!(client_id = %session.id, "ws connection closed");
}

/// Fire-once delayed close. The first [`CloseTimer::arm`] wins; the timer
/// is dropped with the connection task if the peer leaves first.
#[derive(Debug)]
struct CloseTimer {
    sleep: Pin<Box<Sleep>>,
    armed: bool,
}

impl CloseTimer {
    fn new() -> Self {
        Self {
            sleep: Box::pin(tokio::time::sleep(Duration::ZERO)),
            armed: false,
        }
    }

    /// Arms the timer to fire `after` from now. Returns `false` if it was
    /// already armed, leaving the earlier deadline in place.
    fn arm(&mut self, after: Duration) -> bool {
        if self.armed {
            return false;
        }
        self.sleep.as_mut().reset(Instant::now() + after);
        self.armed = true;
        true
    }

    /// Resolves when an armed timer expires; never resolves otherwise.
    async fn fired(&mut self) {
        if self.armed {
            self.sleep.as_mut().await;
        } else {
            std::future::pending::<()>().await;
        }
    }
}

async fn send_message(ws_tx: &mut WsSink, msg: &ServerMessage) -> Result<(), axum::Error> {
    let json = match serde_json::to_string(msg) {
        Ok(json) => json,
        Err(err) => {
            tracing::error!(kind = msg.kind_str(), error = %err, "failed to serialize message");
            return Ok(());
        }
    };
    ws_tx.send(Message::text(json)).await
}

/// Handles a text frame, returning the reply to send on this connection.
///
/// Errors never escape: they become an `error` message and the connection
/// stays open.
async fn handle_text_message(
    text: &str,
    session: &ClientSession,
    service: &RelayService,
) -> Option<ServerMessage> {
    let result = match ClientMessage::parse(text) {
        Ok(msg) => dispatch(msg, session, service).await,
        Err(err) => Err(err),
    };

    match result {
        Ok(reply) => reply,
        Err(err) => {
            if err.is_server_error() {
                tracing::error!(client_id = %session.id, error = %err, "request failed");
            } else {
                tracing::debug!(client_id = %session.id, error = %err, "rejected client message");
            }
            Some(ServerMessage::error(&err))
        }
    }
}

async fn dispatch(
    msg: ClientMessage,
    session: &ClientSession,
    service: &RelayService,
) -> Result<Option<ServerMessage>, RelayError> {
    match msg {
        ClientMessage::Submit(payload) => handle_submit(payload, session, service).await,
        ClientMessage::AdminDecision(cmd) => handle_decision(cmd, session, service).await,
        ClientMessage::Ping => Ok(Some(ServerMessage::Pong)),
    }
}

async fn handle_submit(
    payload: serde_json::Value,
    session: &ClientSession,
    service: &RelayService,
) -> Result<Option<ServerMessage>, RelayError> {
    if session.role != Role::Submitter {
        return Err(RelayError::Forbidden(
            "admin sessions cannot submit forms".to_string(),
        ));
    }
    // The acknowledgment travels through the session queue.
    service.submit(&session.id, payload).await?;
    Ok(None)
}

async fn handle_decision(
    cmd: DecisionCommand,
    session: &ClientSession,
    service: &RelayService,
) -> Result<Option<ServerMessage>, RelayError> {
    if !session.is_admin() {
        return Err(RelayError::Forbidden(
            "only admin sessions can decide submissions".to_string(),
        ));
    }
    service
        .decide(
            cmd.client_id.as_ref(),
            cmd.submission_id,
            cmd.decision,
            cmd.reason,
            Some(&session.id),
        )
        .await?;
    Ok(None)
}
