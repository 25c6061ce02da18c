//! Conversation relay WebSocket handler
//!
//! One task per connection. It owns the [`SessionController`] and multiplexes
//! gateway frames, model events, tool outcomes, silence expiries and the setup
//! deadline through a single `select!` loop. A separate writer task drains
//! outbound frames to the socket.

use axum::{
    Extension,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::{select, time::Duration};
use tracing::{debug, error, info, warn};

use crate::middleware::ClientIp;
use crate::state::AppState;

use super::messages::RelayRoute;
use super::processor::dispatch;
use super::session::{CloseReason, SessionController, SessionState};

/// Outbound frame buffer per connection
const CHANNEL_BUFFER_SIZE: usize = 256;

/// Maximum WebSocket frame size (64 KB)
const MAX_WS_FRAME_SIZE: usize = 64 * 1024;

/// Maximum WebSocket message size (64 KB)
const MAX_WS_MESSAGE_SIZE: usize = 64 * 1024;

/// How long the writer may keep flushing after the session ends
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Conversation relay WebSocket handler
///
/// Upgrades the HTTP connection for a ConversationRelay voice gateway. The
/// connection slot acquired by the connection limit middleware is released
/// when the socket task ends or the upgrade fails.
pub async fn relay_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Extension(ClientIp(client_ip)): Extension<ClientIp>,
) -> Response {
    info!(ip = %client_ip, "Conversation relay upgrade requested");

    let failed_state = state.clone();

    ws.max_frame_size(MAX_WS_FRAME_SIZE)
        .max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_failed_upgrade(move |e| {
            warn!(ip = %client_ip, error = %e, "Conversation relay upgrade failed");
            failed_state.release_connection(client_ip);
        })
        .on_upgrade(move |socket| handle_relay_socket(socket, state, client_ip))
}

async fn handle_relay_socket(socket: WebSocket, app_state: Arc<AppState>, client_ip: IpAddr) {
    let (mut sender, mut receiver) = socket.split();
    let (route_tx, mut route_rx) = mpsc::channel::<RelayRoute>(CHANNEL_BUFFER_SIZE);

    let mut writer = tokio::spawn(async move {
        while let Some(route) = route_rx.recv().await {
            let should_close = matches!(route, RelayRoute::Close);

            let result = match route {
                RelayRoute::Outgoing(frame) => match serde_json::to_string(&frame) {
                    Ok(json_str) => sender.send(Message::Text(json_str.into())).await,
                    Err(e) => {
                        error!("Failed to serialize outbound frame: {}", e);
                        continue;
                    }
                },
                RelayRoute::Close => sender.send(Message::Close(None)).await,
            };

            if let Err(e) = result {
                debug!("Failed to send WebSocket message: {}", e);
                break;
            }

            if should_close {
                break;
            }
        }
    });

    let (mut session, mut receivers) =
        SessionController::open(app_state.services.clone(), route_tx.clone());
    let connection_id = session.connection_id();
    info!(connection_id = %connection_id, ip = %client_ip, "Conversation relay connected");

    let mut setup_deadline = std::pin::pin!(tokio::time::sleep(app_state.config.setup_timeout()));

    let reason = loop {
        select! {
            msg_result = receiver.next() => {
                match msg_result {
                    Some(Ok(msg)) => {
                        if let Some(reason) = process_relay_message(msg, &mut session).await {
                            break reason;
                        }
                    }
                    Some(Err(e)) => {
                        warn!(connection_id = %connection_id, "Relay WebSocket error: {}", e);
                        break CloseReason::TransportError;
                    }
                    None => {
                        info!(connection_id = %connection_id, "Relay WebSocket closed by gateway");
                        break CloseReason::ConnectionClosed;
                    }
                }
            }
            Some(event) = receivers.model_events.recv() => {
                session.handle_model_event(event).await;
            }
            Some(outcome) = receivers.tool_outcomes.recv() => {
                session.handle_tool_outcome(outcome);
            }
            event = session.next_silence_event() => {
                if !session.handle_silence_event(event).await {
                    break CloseReason::SilenceTimeout;
                }
            }
            _ = &mut setup_deadline, if session.state() == SessionState::Uninitialized => {
                warn!(connection_id = %connection_id, "No setup frame received in time");
                break CloseReason::SetupTimeout;
            }
        }
    };

    session.close(reason);

    // Silence exhaustion queues its own close; setup failures are closed here.
    if matches!(reason, CloseReason::SetupFailed | CloseReason::SetupTimeout) {
        let _ = route_tx.send(RelayRoute::Close).await;
    }

    drop(session);
    drop(receivers);
    drop(route_tx);

    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer)
        .await
        .is_err()
    {
        debug!(connection_id = %connection_id, "Writer did not drain in time");
        writer.abort();
    }

    app_state.release_connection(client_ip);

    info!(connection_id = %connection_id, reason = %reason, "Conversation relay terminated");
}

/// Process one WebSocket message. Returns a close reason when the loop must end.
async fn process_relay_message(
    msg: Message,
    session: &mut SessionController,
) -> Option<CloseReason> {
    match msg {
        Message::Text(text) => {
            debug!("Received text frame: {} bytes", text.len());

            if dispatch(text.as_str(), session).await {
                None
            } else {
                Some(CloseReason::SetupFailed)
            }
        }
        Message::Binary(data) => {
            debug!("Ignoring binary frame: {} bytes", data.len());
            None
        }
        Message::Ping(_) => {
            debug!("Received ping");
            None
        }
        Message::Pong(_) => {
            debug!("Received pong");
            None
        }
        Message::Close(_) => {
            info!("Relay WebSocket close received");
            Some(CloseReason::ConnectionClosed)
        }
    }
}
