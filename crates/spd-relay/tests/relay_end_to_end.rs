//! End-to-end tests for the relay
//!
//! These drive the gateway actor over an in-memory duplex stream — either
//! against the simulated supply or against a bare far end the test scripts
//! by hand — and verify:
//! - query/reply round trips reach the client and the display
//! - FIFO attribution holds under out-of-order and malformed replies
//! - exactly one telemetry flush per completed sample
//! - concurrent submissions never interleave bytes on the wire
//! - WebSocket sessions relay both directions and tear down cleanly

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use spd_link::{InstrumentHandle, LinkKind, StreamLink};
use spd_protocol::MeasField;
use spd_relay::{
    pump_lines, run_gateway, run_session, BridgeEvent, GatewayCommand, MemorySink, Origin,
    SampleFields, TelemetryError, TelemetrySink,
};
use spd_sim::{run_supply_task, VirtualSupply};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

const TICK: Duration = Duration::from_secs(1);

// ============================================================================
// Helpers
// ============================================================================

/// Telemetry sink handle the test can inspect after the gateway owns it
#[derive(Clone, Default)]
struct SharedSink(Arc<Mutex<MemorySink>>);

impl SharedSink {
    fn failing() -> Self {
        let sink = SharedSink::default();
        sink.0.lock().unwrap().fail_writes = true;
        sink
    }

    fn records(&self) -> Vec<(String, SampleFields)> {
        self.0.lock().unwrap().records.clone()
    }
}

impl TelemetrySink for SharedSink {
    fn write(&mut self, measurement: &str, fields: &SampleFields) -> Result<(), TelemetryError> {
        self.0.lock().unwrap().write(measurement, fields)
    }

    fn describe(&self) -> String {
        "shared-memory".to_string()
    }
}

/// A running stream-transport gateway plus the test's ends of everything
struct Harness {
    cmd_tx: mpsc::Sender<GatewayCommand>,
    event_rx: mpsc::Receiver<BridgeEvent>,
}

/// Start a gateway whose stream transport is wired to the virtual supply
fn harness_with_sim(sink: Option<SharedSink>) -> Harness {
    let (bridge_io, supply_io) = tokio::io::duplex(1024);
    tokio::spawn(run_supply_task(supply_io, VirtualSupply::new()));
    harness_over(bridge_io, sink)
}

/// Start a gateway whose stream transport's far end is returned to the test
fn harness_with_far_end(sink: Option<SharedSink>) -> (Harness, DuplexStream) {
    let (bridge_io, far_end) = tokio::io::duplex(1024);
    (harness_over(bridge_io, sink), far_end)
}

fn harness_over(bridge_io: DuplexStream, sink: Option<SharedSink>) -> Harness {
    let (cmd_tx, cmd_rx) = mpsc::channel(256);
    let (event_tx, event_rx) = mpsc::channel(256);

    let (writer, reader) = StreamLink::new("test", bridge_io).split();
    let (line_tx, line_rx) = mpsc::channel(256);
    tokio::spawn(async move {
        let _ = reader.run(line_tx).await;
    });
    tokio::spawn(pump_lines(line_rx, cmd_tx.clone()));

    let boxed: Option<Box<dyn TelemetrySink + Send>> = match sink {
        Some(s) => Some(Box::new(s)),
        None => None,
    };
    tokio::spawn(run_gateway(
        InstrumentHandle::Stream(writer),
        boxed,
        "bench1".to_string(),
        cmd_rx,
        event_tx,
    ));

    Harness { cmd_tx, event_rx }
}

impl Harness {
    async fn submit(&self, command: &str, origin: Origin) {
        self.cmd_tx
            .send(GatewayCommand::Submit {
                command: command.to_string(),
                origin,
                reply: None,
            })
            .await
            .unwrap();
    }

    async fn register_client(&self, peer: &str) -> mpsc::Receiver<String> {
        let (line_tx, line_rx) = mpsc::channel(64);
        let (resp_tx, resp_rx) = oneshot::channel();
        self.cmd_tx
            .send(GatewayCommand::RegisterClient {
                peer: peer.to_string(),
                line_tx,
                response: resp_tx,
            })
            .await
            .unwrap();
        resp_rx.await.unwrap();
        line_rx
    }

    /// Wait for the next Measurement event, skipping everything else
    async fn next_measurement(&mut self) -> (MeasField, f64) {
        loop {
            let event = timeout(TICK, self.event_rx.recv())
                .await
                .expect("timed out waiting for measurement")
                .expect("event channel closed");
            if let BridgeEvent::Measurement { field, value } = event {
                return (field, value);
            }
        }
    }

    /// Wait for the next SampleFlushed event
    async fn next_flush(&mut self) -> u64 {
        loop {
            let event = timeout(TICK, self.event_rx.recv())
                .await
                .expect("timed out waiting for flush")
                .expect("event channel closed");
            if let BridgeEvent::SampleFlushed { total } = event {
                return total;
            }
        }
    }
}

fn client_origin(peer: &str) -> Origin {
    Origin::Client {
        peer: peer.to_string(),
    }
}

// ============================================================================
// Round trips against the simulated supply
// ============================================================================

#[tokio::test]
async fn query_roundtrip_reaches_client_and_display() {
    let mut harness = harness_with_sim(None);
    let mut client_lines = harness.register_client("127.0.0.1:50000").await;

    harness
        .submit("MEASure:VOLTage? CH1", client_origin("127.0.0.1:50000"))
        .await;

    // The client sees the raw reply line
    let line = timeout(TICK, client_lines.recv()).await.unwrap().unwrap();
    assert_eq!(line, "12.000");

    // The display sees the correlated measurement
    let (field, value) = harness.next_measurement().await;
    assert_eq!(field, MeasField::Ch1Voltage);
    assert_eq!(value, 12.0);
}

#[tokio::test]
async fn four_queries_flush_exactly_one_sample() {
    let sink = SharedSink::default();
    let mut harness = harness_with_sim(Some(sink.clone()));

    for field in MeasField::ALL {
        harness.submit(field.query(), Origin::Local).await;
    }

    assert_eq!(harness.next_flush().await, 1);

    let records = sink.records();
    assert_eq!(records.len(), 1);
    let (measurement, fields) = &records[0];
    assert_eq!(measurement, "bench1");
    assert_eq!(fields.len(), 4);
    assert_eq!(fields[&MeasField::Ch1Voltage], 12.0);
    assert_eq!(fields[&MeasField::Ch1Current], 0.5);
    assert_eq!(fields[&MeasField::Ch2Voltage], 5.0);
    assert_eq!(fields[&MeasField::Ch2Current], 0.25);

    // A second full round produces a second, independent sample
    for field in MeasField::ALL {
        harness.submit(field.query(), Origin::Local).await;
    }
    assert_eq!(harness.next_flush().await, 2);
    assert_eq!(sink.records().len(), 2);
}

#[tokio::test]
async fn untracked_commands_relay_without_correlation() {
    let mut harness = harness_with_sim(None);
    let mut client_lines = harness.register_client("peer").await;

    harness.submit("*IDN?", client_origin("peer")).await;

    let line = timeout(TICK, client_lines.recv()).await.unwrap().unwrap();
    assert!(line.contains("SPD3303X"));

    // No Measurement event for an untracked query
    harness.submit("MEASure:CURRent? CH2", client_origin("peer")).await;
    let (field, _) = harness.next_measurement().await;
    assert_eq!(field, MeasField::Ch2Current);
}

// ============================================================================
// FIFO correlation under adversarial reply streams
// ============================================================================

#[tokio::test]
async fn replies_attributed_by_issuance_order_not_arrival() {
    let (mut harness, mut far_end) = harness_with_far_end(None);

    harness.submit("MEASure:VOLTage? CH1", Origin::Local).await;
    harness.submit("MEASure:CURRent? CH2", Origin::Local).await;

    // Drain the two query lines off the wire first
    let mut buf = [0u8; 64];
    let mut seen = Vec::new();
    while !seen.ends_with(b"CH2\n") {
        let n = far_end.read(&mut buf).await.unwrap();
        seen.extend_from_slice(&buf[..n]);
    }

    // Physically CH2's reply arrives first; attribution must still follow
    // issuance order, so 0.250 lands on the CH1 voltage tag.
    far_end.write_all(b"0.250\n12.000\n").await.unwrap();

    let (field, value) = harness.next_measurement().await;
    assert_eq!(field, MeasField::Ch1Voltage);
    assert_eq!(value, 0.25);

    let (field, value) = harness.next_measurement().await;
    assert_eq!(field, MeasField::Ch2Current);
    assert_eq!(value, 12.0);
}

#[tokio::test]
async fn malformed_reply_consumes_one_slot_without_desync() {
    let (mut harness, mut far_end) = harness_with_far_end(None);

    harness.submit("MEASure:VOLTage? CH1", Origin::Local).await;
    harness.submit("MEASure:CURRent? CH1", Origin::Local).await;

    let mut buf = [0u8; 64];
    let mut seen = Vec::new();
    while !seen.ends_with(b"CH1\n") || seen.iter().filter(|&&b| b == b'\n').count() < 2 {
        let n = far_end.read(&mut buf).await.unwrap();
        seen.extend_from_slice(&buf[..n]);
    }

    // Garbage for the first query, then a valid reply for the second
    far_end.write_all(b"ERROR\n0.500\n").await.unwrap();

    let (field, value) = harness.next_measurement().await;
    assert_eq!(field, MeasField::Ch1Current);
    assert_eq!(value, 0.5);
}

// ============================================================================
// Mutual exclusion on the wire
// ============================================================================

#[tokio::test]
async fn concurrent_submissions_never_interleave_on_the_wire() {
    let (harness, mut far_end) = harness_with_far_end(None);

    const PER_ORIGIN: usize = 40;
    let cmd_tx_a = harness.cmd_tx.clone();
    let cmd_tx_b = harness.cmd_tx.clone();

    let submit_all = |cmd_tx: mpsc::Sender<GatewayCommand>, tag: &'static str| async move {
        for i in 0..PER_ORIGIN {
            cmd_tx
                .send(GatewayCommand::Submit {
                    command: format!("SOURce:{tag}:VALue {i:04}"),
                    origin: Origin::Local,
                    reply: None,
                })
                .await
                .unwrap();
        }
    };

    let a = tokio::spawn(submit_all(cmd_tx_a, "AAAA"));
    let b = tokio::spawn(submit_all(cmd_tx_b, "BBBB"));

    // Read everything both origins produced
    let mut wire = Vec::new();
    let mut buf = [0u8; 256];
    while wire.iter().filter(|&&b| b == b'\n').count() < PER_ORIGIN * 2 {
        let n = timeout(TICK, far_end.read(&mut buf)).await.unwrap().unwrap();
        wire.extend_from_slice(&buf[..n]);
    }
    a.await.unwrap();
    b.await.unwrap();

    // Every line on the wire is exactly one complete command: no command's
    // bytes were split by another's.
    let text = String::from_utf8(wire).unwrap();
    let mut a_count = 0;
    let mut b_count = 0;
    for line in text.lines() {
        match line {
            l if l.starts_with("SOURce:AAAA:VALue ") => a_count += 1,
            l if l.starts_with("SOURce:BBBB:VALue ") => b_count += 1,
            other => panic!("interleaved bytes on the wire: {other:?}"),
        }
    }
    assert_eq!(a_count, PER_ORIGIN);
    assert_eq!(b_count, PER_ORIGIN);
}

// ============================================================================
// Telemetry failure tolerance
// ============================================================================

#[tokio::test]
async fn sink_failure_is_reported_but_does_not_stop_the_relay() {
    let sink = SharedSink::failing();
    let mut harness = harness_with_sim(Some(sink.clone()));

    for field in MeasField::ALL {
        harness.submit(field.query(), Origin::Local).await;
    }

    // The failure surfaces as an error event...
    let mut saw_telemetry_error = false;
    let mut saw_flush = false;
    while !(saw_telemetry_error && saw_flush) {
        let event = timeout(TICK, harness.event_rx.recv())
            .await
            .expect("timed out")
            .expect("event channel closed");
        match event {
            BridgeEvent::Error { source, .. } if source == "telemetry" => {
                saw_telemetry_error = true;
            }
            BridgeEvent::SampleFlushed { .. } => saw_flush = true,
            _ => {}
        }
    }
    assert!(sink.records().is_empty());

    // ...and the next round still correlates normally
    harness.submit("MEASure:VOLTage? CH1", Origin::Local).await;
    let (field, value) = harness.next_measurement().await;
    assert_eq!(field, MeasField::Ch1Voltage);
    assert_eq!(value, 12.0);
}

// ============================================================================
// WebSocket session lifecycle
// ============================================================================

#[tokio::test]
async fn websocket_session_relays_and_tears_down() {
    let mut harness = harness_with_sim(None);

    let (server_io, client_io) = tokio::io::duplex(4096);
    let session_cmd_tx = harness.cmd_tx.clone();
    let session = tokio::spawn(async move {
        let ws = tokio_tungstenite::accept_async(server_io).await.unwrap();
        run_session(ws, "test-peer".to_string(), LinkKind::Stream, session_cmd_tx).await
    });

    let (mut client, _response) = tokio_tungstenite::client_async("ws://bridge/", client_io)
        .await
        .unwrap();

    client
        .send(Message::Text("MEASure:VOLTage? CH1".to_string()))
        .await
        .unwrap();

    // The instrument's reply comes back as one text message
    let reply = loop {
        let msg = timeout(TICK, client.next()).await.unwrap().unwrap().unwrap();
        if let Message::Text(text) = msg {
            break text;
        }
    };
    assert_eq!(reply, "12.000");

    // Lifecycle events bracket the session
    let mut saw_connect = false;
    while !saw_connect {
        match timeout(TICK, harness.event_rx.recv()).await.unwrap().unwrap() {
            BridgeEvent::ClientConnected { peer } => {
                assert_eq!(peer, "test-peer");
                saw_connect = true;
            }
            _ => {}
        }
    }

    client.close(None).await.unwrap();
    session.await.unwrap().unwrap();

    let mut saw_disconnect = false;
    while !saw_disconnect {
        match timeout(TICK, harness.event_rx.recv()).await.unwrap().unwrap() {
            BridgeEvent::ClientDisconnected { peer } => {
                assert_eq!(peer, "test-peer");
                saw_disconnect = true;
            }
            _ => {}
        }
    }
}

// ============================================================================
// Ordering property
// ============================================================================

mod proptest_tests {
    use proptest::prelude::*;
    use spd_protocol::MeasField;
    use spd_relay::{MeasurementAccumulator, QueryCorrelator};

    proptest! {
        /// For any issue order of the four measurement queries, with numeric
        /// replies arriving in that same order and set commands interleaved
        /// arbitrarily, exactly one complete sample is emitted and every
        /// value is attributed to the query that produced it.
        #[test]
        fn any_query_order_yields_one_correctly_attributed_sample(
            order in Just(MeasField::ALL.to_vec()).prop_shuffle(),
            values in proptest::collection::vec(0.0f64..100.0, 4),
            interleave in proptest::collection::vec(any::<bool>(), 4),
        ) {
            let mut correlator = QueryCorrelator::new();
            let mut accumulator = MeasurementAccumulator::new();

            for (field, noise) in order.iter().zip(&interleave) {
                if *noise {
                    correlator.on_command_sent("OUTPut CH1,ON");
                }
                correlator.on_command_sent(field.query());
            }

            let mut samples = Vec::new();
            for (field, value) in order.iter().zip(&values) {
                let correlated = correlator
                    .on_line_received(&format!("{value:.3}"))
                    .expect("reply must correlate");
                prop_assert_eq!(correlated.0, *field);
                if let Some(sample) = accumulator.record(correlated.0, correlated.1) {
                    samples.push(sample);
                }
            }

            prop_assert_eq!(samples.len(), 1);
            prop_assert!(accumulator.is_empty());
            let sample = &samples[0];
            for (field, value) in order.iter().zip(&values) {
                let expected: f64 = format!("{value:.3}").parse().unwrap();
                prop_assert_eq!(sample[field], expected);
            }
        }
    }
}

#[tokio::test]
async fn empty_client_messages_are_ignored() {
    let mut harness = harness_with_sim(None);

    let (server_io, client_io) = tokio::io::duplex(4096);
    let session_cmd_tx = harness.cmd_tx.clone();
    tokio::spawn(async move {
        let ws = tokio_tungstenite::accept_async(server_io).await.unwrap();
        run_session(ws, "peer".to_string(), LinkKind::Stream, session_cmd_tx).await
    });

    let (mut client, _response) = tokio_tungstenite::client_async("ws://bridge/", client_io)
        .await
        .unwrap();

    // Whitespace-only messages produce no command at all
    client.send(Message::Text("   ".to_string())).await.unwrap();
    client
        .send(Message::Text("MEASure:VOLTage? CH2".to_string()))
        .await
        .unwrap();

    // The only command the gateway saw is the real one
    let mut saw_command = None;
    while saw_command.is_none() {
        match timeout(TICK, harness.event_rx.recv()).await.unwrap().unwrap() {
            BridgeEvent::CommandSent { command, .. } => saw_command = Some(command),
            _ => {}
        }
    }
    assert_eq!(saw_command.as_deref(), Some("MEASure:VOLTage? CH2"));

    let reply = loop {
        let msg = timeout(TICK, client.next()).await.unwrap().unwrap().unwrap();
        if let Message::Text(text) = msg {
            break text;
        }
    };
    assert_eq!(reply, "5.000");
}
