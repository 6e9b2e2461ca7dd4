//! Error types for the relay

use thiserror::Error;

/// Errors that can occur in the relay
#[derive(Debug, Error)]
pub enum RelayError {
    /// WebSocket transport error
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The gateway actor has shut down
    #[error("gateway closed")]
    GatewayClosed,

    /// Instrument link error
    #[error("link error: {0}")]
    Link(#[from] spd_link::LinkError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
