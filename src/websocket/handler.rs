//! WebSocket Handler
//!
//! Handles WebSocket upgrade requests and manages the connection lifecycle.

use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::Response,
};
use futures_util::{Sink, SinkExt, StreamExt};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};

use super::authenticator::{authenticate, extract_credential, ConnectParams};
use super::messages::{HandlerError, ServerMessage};
use super::publish::handle_publish;
use super::registry::ConnectionId;
use super::session::{Connection, Session};
use super::subscribe::handle_subscribe;
use crate::api::{ApiError, ApiResult, AppState};
use crate::auth::Principal;

/// Sent to a subscriber right before it is disconnected for falling behind
const EVICTED_NOTICE: &str =
    "Measurements were not read fast enough. Reconnect and subscribe again.";

/// Which handler processes a connection's messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Subscribe,
    Publish,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Subscribe => write!(f, "subscribe"),
            Endpoint::Publish => write!(f, "publish"),
        }
    }
}

/// GET /ws/measurements/subscribe
pub async fn subscribe_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(params): Query<ConnectParams>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    upgrade(Endpoint::Subscribe, ws, state, params, headers).await
}

/// GET /ws/measurements/publish
pub async fn publish_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(params): Query<ConnectParams>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    upgrade(Endpoint::Publish, ws, state, params, headers).await
}

/// Authenticate the request, then upgrade it to a WebSocket
async fn upgrade(
    endpoint: Endpoint,
    ws: WebSocketUpgrade,
    state: Arc<AppState>,
    params: ConnectParams,
    headers: HeaderMap,
) -> ApiResult<Response> {
    if !state.has_capacity() {
        return Err(ApiError::ServiceUnavailable(format!(
            "Too many connections (limit: {})",
            state.hub_config.max_connections
        )));
    }

    let credential = extract_credential(&params, &headers);
    let principal = authenticate(state.verifier.as_ref(), credential.as_deref()).await;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, endpoint, principal)))
}

/// Handle an established WebSocket connection
async fn handle_socket(
    socket: WebSocket,
    state: Arc<AppState>,
    endpoint: Endpoint,
    principal: Option<Principal>,
) {
    let (mut sender, mut receiver) = socket.split();

    // Create channel for sending messages to this connection
    let (tx, rx) = mpsc::channel::<ServerMessage>(state.hub_config.outbound_buffer);

    // Register with the registry
    let connection_id = match state.registry.register(tx.clone()) {
        Ok(id) => id,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to register WebSocket connection");
            if let Ok(text) = serde_json::to_string(&ServerMessage::error(e.to_string())) {
                let _ = sender.send(Message::Text(text)).await;
            }
            let _ = sender.close().await;
            return;
        }
    };

    let connection = Connection::new(Session::open(connection_id, principal), tx);
    tracing::info!(
        connection_id = %connection_id,
        endpoint = %endpoint,
        principal = ?connection.session.principal(),
        "WebSocket connected"
    );

    // Task to forward messages from channel to WebSocket
    let evicted = state
        .registry
        .eviction_signal(connection_id)
        .unwrap_or_default();
    let mut send_task = tokio::spawn(async move {
        forward_outbound(&mut sender, rx, &evicted, connection_id).await;
    });

    // Messages are handled one at a time, in arrival order
    let recv_loop = async {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(msg) => {
                    if !handle_ws_message(&state, endpoint, &connection, msg).await {
                        break;
                    }
                }
                Err(e) => {
                    tracing::debug!(
                        connection_id = %connection_id,
                        error = %e,
                        "WebSocket receive error"
                    );
                    break;
                }
            }
        }
    };

    // The receive loop runs on this task, so once select returns no
    // handler can still be touching the registry for this connection.
    // An evicted connection ends through the send task.
    tokio::select! {
        _ = recv_loop => {}
        _ = &mut send_task => {}
    }
    send_task.abort();

    let groups = state.registry.leave_all(connection_id);
    tracing::info!(connection_id = %connection_id, groups, "WebSocket disconnected");
}

/// Write queued messages to the socket until the queue closes, a write
/// fails, or the registry evicts the connection.
///
/// An evicted connection gets one error message and a close frame, so the
/// client knows its subscriptions are gone.
async fn forward_outbound<S>(
    sink: &mut S,
    mut rx: mpsc::Receiver<ServerMessage>,
    evicted: &Notify,
    connection_id: ConnectionId,
) where
    S: Sink<Message> + Unpin,
{
    loop {
        let msg = tokio::select! {
            biased;
            _ = evicted.notified() => {
                tracing::info!(
                    connection_id = %connection_id,
                    "Closing connection after failed delivery"
                );
                if let Ok(text) = serde_json::to_string(&ServerMessage::error(EVICTED_NOTICE)) {
                    let _ = sink.send(Message::Text(text)).await;
                }
                let _ = sink
                    .send(Message::Close(Some(CloseFrame {
                        code: close_code::AGAIN,
                        reason: "subscriber fell behind".into(),
                    })))
                    .await;
                return;
            }
            msg = rx.recv() => match msg {
                Some(msg) => msg,
                None => return,
            },
        };

        match serde_json::to_string(&msg) {
            Ok(text) => {
                if sink.send(Message::Text(text)).await.is_err() {
                    tracing::debug!(
                        connection_id = %connection_id,
                        "WebSocket send failed, closing connection"
                    );
                    return;
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize message");
            }
        }
    }
}

/// Handle a received WebSocket message
///
/// Returns false if the connection should be closed.
async fn handle_ws_message(
    state: &AppState,
    endpoint: Endpoint,
    connection: &Connection,
    message: Message,
) -> bool {
    match message {
        Message::Text(text) => {
            handle_text(state, endpoint, connection, &text).await;
            true
        }
        Message::Binary(_) => {
            connection.reply(HandlerError::BinaryNotSupported.into());
            true
        }
        // Axum answers pings itself
        Message::Ping(_) | Message::Pong(_) => true,
        Message::Close(_) => {
            tracing::debug!(connection_id = %connection.session.id(), "Client requested close");
            false
        }
    }
}

/// Parse a text frame and route it to the endpoint's handler.
///
/// Every rejection becomes a single error reply on this connection.
pub async fn handle_text(
    state: &AppState,
    endpoint: Endpoint,
    connection: &Connection,
    text: &str,
) {
    let result = match serde_json::from_str::<Map<String, Value>>(text) {
        Ok(content) => match endpoint {
            Endpoint::Subscribe => handle_subscribe(state, connection, &content).await,
            Endpoint::Publish => handle_publish(state, connection, &content).await,
        },
        Err(e) => Err(HandlerError::InvalidFormat(e.to_string())),
    };

    if let Err(e) = result {
        tracing::debug!(
            connection_id = %connection.session.id(),
            endpoint = %endpoint,
            error = ?e,
            "Rejected client message"
        );
        connection.reply(e.into());
    }
}
