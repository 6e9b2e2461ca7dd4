//! Remote client sessions
//!
//! One session per WebSocket connection. The shape of the relay depends on
//! the transport and is decided exactly once, when the session starts:
//!
//! - Stream transport: two concurrent directions — instrument lines fan out
//!   to the client as they arrive, client commands go to the gateway — run
//!   under one `select!` loop and tear down together when either side ends.
//! - RequestResponse transport: a single sequential loop, because the
//!   instrument cannot produce unsolicited output; the gateway returns the
//!   correlated reply inline and the session sends it back.
//!
//! The instrument handle outlives every session: closing a client never
//! touches the link.

use futures_util::{SinkExt, StreamExt};
use spd_link::LinkKind;
use spd_protocol::is_query;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};

use crate::error::RelayError;
use crate::events::Origin;
use crate::gateway::{GatewayCommand, SubmitReply};

/// Lifecycle of one client session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Registering with the gateway
    Connecting,
    /// Relaying traffic
    Active,
    /// Torn down; the client is gone
    Closed,
}

/// Buffered lines per client before the broadcaster lags
const CLIENT_LINE_BUFFER: usize = 64;

/// Run one client session to completion
///
/// Registration and teardown are symmetric around the relay loop, so the
/// gateway's client registry (and the status display behind it) always sees
/// a disconnect for every connect.
pub async fn run_session<S>(
    ws: WebSocketStream<S>,
    peer: String,
    kind: LinkKind,
    gateway_tx: mpsc::Sender<GatewayCommand>,
) -> Result<(), RelayError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut state = SessionState::Connecting;
    debug!("Session {} {:?}", peer, state);

    let (line_tx, line_rx) = mpsc::channel(CLIENT_LINE_BUFFER);
    let (resp_tx, resp_rx) = oneshot::channel();
    gateway_tx
        .send(GatewayCommand::RegisterClient {
            peer: peer.clone(),
            line_tx,
            response: resp_tx,
        })
        .await
        .map_err(|_| RelayError::GatewayClosed)?;
    let id = resp_rx.await.map_err(|_| RelayError::GatewayClosed)?;

    state = SessionState::Active;
    debug!("Session {} {:?}", peer, state);
    info!("Client connected: {} ({:?})", peer, kind);

    let result = match kind {
        LinkKind::Stream => relay_stream(ws, &peer, &gateway_tx, line_rx).await,
        LinkKind::RequestResponse => relay_request_response(ws, &peer, &gateway_tx).await,
    };

    state = SessionState::Closed;
    debug!("Session {} {:?}", peer, state);
    let _ = gateway_tx.send(GatewayCommand::UnregisterClient { id }).await;
    info!("Client disconnected: {}", peer);

    result
}

/// Stream transport: both relay directions until either ends
async fn relay_stream<S>(
    ws: WebSocketStream<S>,
    peer: &str,
    gateway_tx: &mpsc::Sender<GatewayCommand>,
    mut line_rx: mpsc::Receiver<String>,
) -> Result<(), RelayError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut ws_tx, mut ws_rx) = ws.split();

    loop {
        tokio::select! {
            // Instrument -> client: broadcast lines from the read loop
            line = line_rx.recv() => {
                match line {
                    Some(line) => ws_tx.send(Message::Text(line)).await?,
                    None => return Err(RelayError::GatewayClosed),
                }
            }

            // Client -> instrument
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let command = text.trim();
                        if command.is_empty() {
                            continue;
                        }
                        // Replies come back through the broadcast direction,
                        // so no direct reply slot is needed.
                        gateway_tx
                            .send(GatewayCommand::Submit {
                                command: command.to_string(),
                                origin: Origin::Client { peer: peer.to_string() },
                                reply: None,
                            })
                            .await
                            .map_err(|_| RelayError::GatewayClosed)?;
                    }
                    Some(Ok(Message::Close(_))) | None => return Ok(()),
                    Some(Ok(_)) => {} // binary/ping/pong: not part of the protocol
                    Some(Err(e)) => return Err(e.into()),
                }
            }
        }
    }
}

/// RequestResponse transport: one sequential exchange per client message
async fn relay_request_response<S>(
    mut ws: WebSocketStream<S>,
    peer: &str,
    gateway_tx: &mpsc::Sender<GatewayCommand>,
) -> Result<(), RelayError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    while let Some(msg) = ws.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => return Err(e.into()),
        };

        let command = text.trim();
        if command.is_empty() {
            continue;
        }

        let reply_rx = if is_query(command) {
            let (tx, rx) = oneshot::channel();
            gateway_tx
                .send(GatewayCommand::Submit {
                    command: command.to_string(),
                    origin: Origin::Client {
                        peer: peer.to_string(),
                    },
                    reply: Some(tx),
                })
                .await
                .map_err(|_| RelayError::GatewayClosed)?;
            Some(rx)
        } else {
            gateway_tx
                .send(GatewayCommand::Submit {
                    command: command.to_string(),
                    origin: Origin::Client {
                        peer: peer.to_string(),
                    },
                    reply: None,
                })
                .await
                .map_err(|_| RelayError::GatewayClosed)?;
            None
        };

        if let Some(rx) = reply_rx {
            match rx.await {
                Ok(SubmitReply::Line(line)) => ws.send(Message::Text(line)).await?,
                Ok(SubmitReply::TimedOut) => {
                    // The instrument never answered; the wire protocol has no
                    // error framing, so the client simply gets nothing.
                    debug!("Query from {} timed out", peer);
                }
                Ok(SubmitReply::Failed(message)) => {
                    warn!("Query from {} failed: {}", peer, message);
                }
                Err(_) => return Err(RelayError::GatewayClosed),
            }
        }
    }

    Ok(())
}
