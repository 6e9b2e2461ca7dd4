//! Command gateway actor
//!
//! A single actor task owns the instrument handle, the correlator, the
//! accumulator, the telemetry sink, and the registry of connected clients.
//! Every command source submits through one channel, so the actor's
//! serialization *is* the mutual-exclusion gate: no two commands can
//! interleave mid-write on the wire, and on the request/response transport
//! at most one exchange is ever in flight.
//!
//! Inbound data takes two shapes depending on the transport:
//! - Stream: the serial read loop feeds decoded lines in as
//!   [`GatewayCommand::LineReceived`]; the actor broadcasts each line to all
//!   registered clients, routes it to the oldest submitter awaiting a direct
//!   reply, and runs correlation.
//! - RequestResponse: the bounded exchange happens inside `Submit` itself,
//!   and the reply goes only to the submitter.

use std::collections::{HashMap, VecDeque};

use spd_link::InstrumentHandle;
use spd_protocol::is_query;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::accumulate::MeasurementAccumulator;
use crate::correlate::QueryCorrelator;
use crate::events::{BridgeEvent, Origin};
use crate::telemetry::TelemetrySink;

/// Unique identifier for a registered client session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(pub u32);

/// Outcome of a submitted query, delivered on the submitter's oneshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitReply {
    /// The instrument's reply line
    Line(String),
    /// No reply within the bound
    TimedOut,
    /// The write or read failed
    Failed(String),
}

/// Commands sent to the gateway actor
#[derive(Debug)]
pub enum GatewayCommand {
    /// Relay one command to the instrument
    Submit {
        /// Command text (no terminator)
        command: String,
        /// Who is asking
        origin: Origin,
        /// Where to deliver the reply, for queries whose submitter wants it
        reply: Option<oneshot::Sender<SubmitReply>>,
    },

    /// A decoded line arrived from the stream transport's read loop
    LineReceived {
        /// Reply text
        line: String,
    },

    /// Register a client session for line broadcast and display
    RegisterClient {
        /// Peer address
        peer: String,
        /// Channel the session drains toward its socket
        line_tx: mpsc::Sender<String>,
        /// Assigned id comes back here
        response: oneshot::Sender<ClientId>,
    },

    /// Remove a client session
    UnregisterClient {
        /// Id returned at registration
        id: ClientId,
    },

    /// Surface an error from an I/O task
    ReportError {
        /// Failing component
        source: String,
        /// Error message
        message: String,
    },

    /// Shut the actor down
    Shutdown,
}

struct ClientEntry {
    peer: String,
    line_tx: mpsc::Sender<String>,
}

struct PendingReply {
    origin: Origin,
    reply: Option<oneshot::Sender<SubmitReply>>,
}

/// Internal state for the gateway actor
struct GatewayState {
    handle: InstrumentHandle,
    correlator: QueryCorrelator,
    accumulator: MeasurementAccumulator,
    sink: Option<Box<dyn TelemetrySink + Send>>,
    measurement_name: String,
    clients: HashMap<ClientId, ClientEntry>,
    next_client: u32,
    /// Stream transport only: queries awaiting their broadcast reply,
    /// oldest first
    pending_replies: VecDeque<PendingReply>,
    samples_flushed: u64,
}

impl GatewayState {
    fn new(
        handle: InstrumentHandle,
        sink: Option<Box<dyn TelemetrySink + Send>>,
        measurement_name: String,
    ) -> Self {
        Self {
            handle,
            correlator: QueryCorrelator::new(),
            accumulator: MeasurementAccumulator::new(),
            sink,
            measurement_name,
            clients: HashMap::new(),
            next_client: 1,
            pending_replies: VecDeque::new(),
            samples_flushed: 0,
        }
    }
}

/// Run the gateway actor until `Shutdown` or all senders drop
pub async fn run_gateway(
    handle: InstrumentHandle,
    sink: Option<Box<dyn TelemetrySink + Send>>,
    measurement_name: String,
    mut cmd_rx: mpsc::Receiver<GatewayCommand>,
    event_tx: mpsc::Sender<BridgeEvent>,
) {
    let mut state = GatewayState::new(handle, sink, measurement_name);
    info!("Gateway actor started ({})", state.handle.describe());

    while let Some(cmd) = cmd_rx.recv().await {
        match cmd {
            GatewayCommand::Submit {
                command,
                origin,
                reply,
            } => {
                submit(&mut state, &event_tx, command, origin, reply).await;
            }

            GatewayCommand::LineReceived { line } => {
                // Broadcast first: remote clients see every instrument line
                // regardless of who asked for it.
                for entry in state.clients.values() {
                    let _ = entry.line_tx.send(line.clone()).await;
                }

                // Route to the oldest submitter still awaiting a direct reply
                if let Some(pending) = state.pending_replies.pop_front() {
                    if let Some(tx) = pending.reply {
                        debug!("Routing reply to {}", pending.origin);
                        let _ = tx.send(SubmitReply::Line(line.clone()));
                    }
                }

                correlate_line(&mut state, &event_tx, &line).await;
            }

            GatewayCommand::RegisterClient {
                peer,
                line_tx,
                response,
            } => {
                let id = ClientId(state.next_client);
                state.next_client += 1;
                state.clients.insert(
                    id,
                    ClientEntry {
                        peer: peer.clone(),
                        line_tx,
                    },
                );
                let _ = response.send(id);
                let _ = event_tx.send(BridgeEvent::ClientConnected { peer }).await;
            }

            GatewayCommand::UnregisterClient { id } => {
                if let Some(entry) = state.clients.remove(&id) {
                    let _ = event_tx
                        .send(BridgeEvent::ClientDisconnected { peer: entry.peer })
                        .await;
                }
            }

            GatewayCommand::ReportError { source, message } => {
                let _ = event_tx.send(BridgeEvent::Error { source, message }).await;
            }

            GatewayCommand::Shutdown => {
                info!("Gateway actor shutting down");
                break;
            }
        }
    }

    info!("Gateway actor stopped");
}

/// Relay one command, handling the reply per the transport's contract
async fn submit(
    state: &mut GatewayState,
    event_tx: &mpsc::Sender<BridgeEvent>,
    command: String,
    origin: Origin,
    reply: Option<oneshot::Sender<SubmitReply>>,
) {
    debug!("Submit from {}: {:?}", origin, command);

    match &mut state.handle {
        InstrumentHandle::Stream(writer) => {
            if let Err(e) = writer.write_command(&command).await {
                warn!("Write failed for {}: {}", origin, e);
                if let Some(tx) = reply {
                    let _ = tx.send(SubmitReply::Failed(e.to_string()));
                }
                let _ = event_tx
                    .send(BridgeEvent::Error {
                        source: "link".to_string(),
                        message: e.to_string(),
                    })
                    .await;
                return;
            }

            state.correlator.on_command_sent(&command);
            if is_query(&command) {
                state.pending_replies.push_back(PendingReply {
                    origin: origin.clone(),
                    reply,
                });
            }
        }

        InstrumentHandle::UsbTmc(link) => {
            if !is_query(&command) {
                if let Err(e) = link.write_command(&command).await {
                    warn!("Write failed for {}: {}", origin, e);
                    let _ = event_tx
                        .send(BridgeEvent::Error {
                            source: "link".to_string(),
                            message: e.to_string(),
                        })
                        .await;
                    return;
                }
            } else {
                // Write-then-read is one atomic exchange on this transport;
                // the tag is tracked once the write has gone out.
                state.correlator.on_command_sent(&command);

                match link.query(&command).await {
                    Ok(line) => {
                        if let Some(tx) = reply {
                            let _ = tx.send(SubmitReply::Line(line.clone()));
                        }
                        correlate_line(state, event_tx, &line).await;
                    }
                    Err(e) if e.is_timeout() => {
                        debug!("Query from {} timed out: {:?}", origin, command);
                        state.correlator.on_reply_timeout();
                        if let Some(tx) = reply {
                            let _ = tx.send(SubmitReply::TimedOut);
                        }
                    }
                    Err(e) => {
                        warn!("Exchange failed for {}: {}", origin, e);
                        state.correlator.on_reply_timeout();
                        if let Some(tx) = reply {
                            let _ = tx.send(SubmitReply::Failed(e.to_string()));
                        }
                        let _ = event_tx
                            .send(BridgeEvent::Error {
                                source: "link".to_string(),
                                message: e.to_string(),
                            })
                            .await;
                    }
                }
            }
        }
    }

    let _ = event_tx
        .send(BridgeEvent::CommandSent { origin, command })
        .await;
}

/// Feed one inbound line through correlation, accumulation, and telemetry
async fn correlate_line(state: &mut GatewayState, event_tx: &mpsc::Sender<BridgeEvent>, line: &str) {
    let Some((field, value)) = state.correlator.on_line_received(line) else {
        return;
    };

    // Display updates happen per field whether or not a sink is configured
    let _ = event_tx
        .send(BridgeEvent::Measurement { field, value })
        .await;

    let Some(sample) = state.accumulator.record(field, value) else {
        return;
    };

    if let Some(sink) = state.sink.as_mut() {
        if let Err(e) = sink.write(&state.measurement_name, &sample) {
            warn!("Telemetry write failed: {}", e);
            let _ = event_tx
                .send(BridgeEvent::Error {
                    source: "telemetry".to_string(),
                    message: e.to_string(),
                })
                .await;
            // The sample is still considered flushed: accumulation state
            // cleared above, so nothing is resubmitted.
        }
    }

    state.samples_flushed += 1;
    let _ = event_tx
        .send(BridgeEvent::SampleFlushed {
            total: state.samples_flushed,
        })
        .await;
}

/// Forward decoded instrument lines from a stream reader into the gateway
pub async fn pump_lines(
    mut line_rx: mpsc::Receiver<String>,
    gateway_tx: mpsc::Sender<GatewayCommand>,
) {
    while let Some(line) = line_rx.recv().await {
        if gateway_tx
            .send(GatewayCommand::LineReceived { line })
            .await
            .is_err()
        {
            break;
        }
    }
    debug!("Line pump stopped");
}
