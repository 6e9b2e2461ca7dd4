//! Request/response transport over a USBTMC character device
//!
//! USBTMC is strictly turn-taking: the instrument produces output only as the
//! immediate response to a query write. File I/O on the character device is
//! blocking, so a single dedicated thread owns the device and serves queued
//! requests in order. Queueing write→read pairs on one thread keeps exchanges
//! atomic: a late reply to a timed-out query lands in that caller's dropped
//! reply slot, never in a later caller's.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use spd_protocol::terminate;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::error::LinkError;

/// Default bound applied to every reply read
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(2);

/// Largest reply the device will produce in one exchange
const READ_CHUNK: usize = 4096;

enum IoRequest {
    Write {
        bytes: Vec<u8>,
        done: oneshot::Sender<std::io::Result<()>>,
    },
    Query {
        bytes: Vec<u8>,
        reply: oneshot::Sender<std::io::Result<String>>,
    },
}

/// An open USBTMC device
///
/// Cheap to share by reference: all I/O funnels through the worker thread's
/// request queue, so callers never contend on the device itself.
pub struct UsbTmcLink {
    path: String,
    reply_timeout: Duration,
    req_tx: mpsc::Sender<IoRequest>,
}

impl UsbTmcLink {
    /// Open the device and start its I/O thread
    pub fn open(path: &str, reply_timeout: Duration) -> Result<Self, LinkError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| match e.kind() {
                ErrorKind::PermissionDenied => LinkError::PermissionDenied(path.to_string()),
                _ => LinkError::Open {
                    path: path.to_string(),
                    source: e,
                },
            })?;

        info!("Opened USBTMC device {}", path);

        let (req_tx, req_rx) = mpsc::channel();
        let thread_path = path.to_string();
        thread::Builder::new()
            .name("usbtmc-io".to_string())
            .spawn(move || run_io_thread(thread_path, file, req_rx))
            .map_err(|e| LinkError::Open {
                path: path.to_string(),
                source: e,
            })?;

        Ok(Self {
            path: path.to_string(),
            reply_timeout,
            req_tx,
        })
    }

    /// Device path this link was opened on
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Send a non-query command (no reply is produced)
    pub async fn write_command(&self, command: &str) -> Result<(), LinkError> {
        let (done_tx, done_rx) = oneshot::channel();
        self.req_tx
            .send(IoRequest::Write {
                bytes: terminate(command),
                done: done_tx,
            })
            .map_err(|_| LinkError::Closed)?;
        done_rx.await.map_err(|_| LinkError::Closed)??;
        Ok(())
    }

    /// Send a query and wait for its reply, bounded by the reply timeout
    ///
    /// Expiry yields [`LinkError::Timeout`], a distinguishable result rather
    /// than a hang; the worker thread finishes the exchange on its own time
    /// before touching the next request.
    pub async fn query(&self, command: &str) -> Result<String, LinkError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.req_tx
            .send(IoRequest::Query {
                bytes: terminate(command),
                reply: reply_tx,
            })
            .map_err(|_| LinkError::Closed)?;

        match tokio::time::timeout(self.reply_timeout, reply_rx).await {
            Err(_) => Err(LinkError::Timeout(self.reply_timeout)),
            Ok(Err(_)) => Err(LinkError::Closed),
            Ok(Ok(result)) => Ok(result?),
        }
    }
}

fn run_io_thread(path: String, mut file: File, req_rx: mpsc::Receiver<IoRequest>) {
    debug!("USBTMC I/O thread started for {}", path);

    for req in req_rx {
        match req {
            IoRequest::Write { bytes, done } => {
                let result = file.write_all(&bytes).and_then(|()| file.flush());
                if let Err(ref e) = result {
                    warn!("USBTMC write failed on {}: {}", path, e);
                }
                let _ = done.send(result);
            }
            IoRequest::Query { bytes, reply } => {
                if let Err(e) = file.write_all(&bytes).and_then(|()| file.flush()) {
                    warn!("USBTMC write failed on {}: {}", path, e);
                    let _ = reply.send(Err(e));
                    continue;
                }
                let mut buf = vec![0u8; READ_CHUNK];
                let result = file
                    .read(&mut buf)
                    .map(|n| String::from_utf8_lossy(&buf[..n]).trim().to_string());
                if let Err(ref e) = result {
                    warn!("USBTMC read failed on {}: {}", path, e);
                }
                // Receiver may have timed out and gone away; the late reply
                // is discarded here, never delivered to a later query.
                let _ = reply.send(result);
            }
        }
    }

    debug!("USBTMC I/O thread stopped for {}", path);
}
