//! Virtual supply actor task
//!
//! Serves a [`VirtualSupply`] over any async stream. The bridge side treats
//! the stream exactly like a serial port, so tests and `--sim` mode exercise
//! the same code paths as real hardware.

use std::io;

use spd_protocol::LineCodec;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

use crate::VirtualSupply;

/// Run the supply until the stream reaches EOF or fails
pub async fn run_supply_task<S>(mut stream: S, mut supply: VirtualSupply) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    info!("Virtual supply task started");
    let mut codec = LineCodec::new();
    let mut buf = [0u8; 1024];

    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            debug!("Virtual supply stream closed");
            break;
        }

        codec.push_bytes(&buf[..n]);
        while let Some(line) = codec.next_line() {
            debug!("Virtual supply received: {:?}", line);
            if let Some(reply) = supply.handle_command(&line) {
                stream.write_all(reply.as_bytes()).await?;
                stream.write_all(b"\n").await?;
                stream.flush().await?;
            }
        }
    }

    info!("Virtual supply task stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn answers_queries_over_duplex() {
        let (bridge_side, supply_side) = tokio::io::duplex(1024);
        let task = tokio::spawn(run_supply_task(supply_side, VirtualSupply::new()));

        let (mut rd, mut wr) = tokio::io::split(bridge_side);
        wr.write_all(b"MEASure:VOLTage? CH1\n").await.unwrap();

        let mut codec = LineCodec::new();
        let mut buf = [0u8; 64];
        let reply = loop {
            let n = rd.read(&mut buf).await.unwrap();
            codec.push_bytes(&buf[..n]);
            if let Some(line) = codec.next_line() {
                break line;
            }
        };
        assert_eq!(reply, "12.000");

        drop(wr);
        drop(rd);
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn set_commands_produce_no_output() {
        let (bridge_side, supply_side) = tokio::io::duplex(1024);
        let task = tokio::spawn(run_supply_task(supply_side, VirtualSupply::new()));

        let (mut rd, mut wr) = tokio::io::split(bridge_side);
        wr.write_all(b"CH1:VOLTage 3.3\nMEASure:VOLTage? CH1\n")
            .await
            .unwrap();

        let mut codec = LineCodec::new();
        let mut buf = [0u8; 64];
        let reply = loop {
            let n = rd.read(&mut buf).await.unwrap();
            codec.push_bytes(&buf[..n]);
            if let Some(line) = codec.next_line() {
                break line;
            }
        };
        // The only output is the measurement reply, already reflecting the set
        assert_eq!(reply, "3.300");

        drop(wr);
        drop(rd);
        task.await.unwrap().unwrap();
    }
}
