//! Stream transport over a serial port
//!
//! The serial link is a free-running duplex stream: writes and reads proceed
//! independently. The write half is owned by the command gateway; the read
//! half runs as its own task, decoding lines and forwarding them over a
//! channel for correlation and broadcast.
//!
//! Generic over the I/O type so tests and `--sim` mode can substitute a
//! `DuplexStream` from `tokio::io::duplex()` for the real port.

use std::io::ErrorKind;
use std::time::Duration;

use spd_protocol::{terminate, LineCodec};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_serial::{DataBits, Parity, SerialPortBuilderExt, SerialStream, StopBits};
use tracing::{debug, info, warn};

use crate::error::LinkError;

/// SPD3303X factory default baud rate
pub const DEFAULT_BAUD: u32 = 9600;

/// An open stream-transport connection to the instrument
pub struct StreamLink<T> {
    name: String,
    io: T,
}

impl StreamLink<SerialStream> {
    /// Open a serial port with the SPD3303X's settings (8N1)
    pub fn open(port: &str, baud: u32) -> Result<Self, LinkError> {
        let stream = tokio_serial::new(port, baud)
            .data_bits(DataBits::Eight)
            .stop_bits(StopBits::One)
            .parity(Parity::None)
            .timeout(Duration::from_millis(100))
            .open_native_async()?;

        info!("Opened serial port {} at {} baud", port, baud);

        Ok(Self {
            name: port.to_string(),
            io: stream,
        })
    }
}

impl<T> StreamLink<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Wrap a custom I/O stream (virtual supply, tests)
    pub fn new(name: impl Into<String>, io: T) -> Self {
        Self {
            name: name.into(),
            io,
        }
    }

    /// Device name this link was opened on
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Split into a writer for the gateway and a reader task
    pub fn split(self) -> (StreamWriter, StreamReader) {
        let (read_half, write_half) = tokio::io::split(self.io);
        (
            StreamWriter {
                name: self.name.clone(),
                io: Box::new(write_half),
            },
            StreamReader {
                name: self.name,
                io: Box::new(read_half),
                codec: LineCodec::new(),
            },
        )
    }
}

/// Write half of a stream link
pub struct StreamWriter {
    name: String,
    io: Box<dyn AsyncWrite + Send + Unpin>,
}

impl StreamWriter {
    /// Device name this writer was opened on
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Send one command, appending the line terminator
    pub async fn write_command(&mut self, command: &str) -> Result<(), LinkError> {
        let bytes = terminate(command);
        self.io.write_all(&bytes).await?;
        self.io.flush().await?;
        debug!("-> {} {:?}", self.name, command);
        Ok(())
    }
}

/// Read half of a stream link: the continuous background read loop
pub struct StreamReader {
    name: String,
    io: Box<dyn AsyncRead + Send + Unpin>,
    codec: LineCodec,
}

impl StreamReader {
    /// Run until the port fails, reaches EOF, or the receiver side closes
    ///
    /// Each complete decoded line is forwarded over `line_tx`. Absence of
    /// data is a normal condition for this transport, so reads are
    /// unbounded.
    pub async fn run(mut self, line_tx: mpsc::Sender<String>) -> Result<(), LinkError> {
        info!("Starting read loop on {}", self.name);
        let mut buf = [0u8; 1024];

        loop {
            match self.io.read(&mut buf).await {
                Ok(0) => {
                    debug!("Stream {} reached EOF", self.name);
                    return Ok(());
                }
                Ok(n) => {
                    self.codec.push_bytes(&buf[..n]);
                    while let Some(line) = self.codec.next_line() {
                        debug!("<- {} {:?}", self.name, line);
                        if line_tx.send(line).await.is_err() {
                            // Gateway is gone, nothing left to feed
                            return Ok(());
                        }
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => continue,
                Err(e) => {
                    warn!("Read error on {}: {}", self.name, e);
                    return Err(LinkError::Io(e));
                }
            }
        }
    }
}
