//! WebSocket server
//!
//! Accepts client connections and hands each one to a relay session. The
//! listener is bound by `main` so a bad address fails the process before
//! anything else starts; from then on, per-connection failures only end
//! that connection.

use spd_link::LinkKind;
use spd_relay::{run_session, GatewayCommand};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Accept connections until the listener fails
pub async fn run_server(
    listener: TcpListener,
    kind: LinkKind,
    gateway_tx: mpsc::Sender<GatewayCommand>,
) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!("Accept failed: {}", e);
                continue;
            }
        };

        info!("Incoming connection from {}", peer);
        let gateway_tx = gateway_tx.clone();
        tokio::spawn(async move {
            let ws = match tokio_tungstenite::accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    warn!("WebSocket handshake failed for {}: {}", peer, e);
                    return;
                }
            };

            if let Err(e) = run_session(ws, peer.to_string(), kind, gateway_tx).await {
                warn!("Session {} ended: {}", peer, e);
            }
        });
    }
}
