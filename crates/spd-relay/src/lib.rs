//! SPD3303X Relay Engine
//!
//! This crate is the core of the bridge: it multiplexes every command source
//! (remote WebSocket clients, the local terminal) onto the single instrument
//! connection, and correlates measurement replies back to the queries that
//! produced them.
//!
//! # Architecture
//!
//! All traffic funnels through one gateway actor that owns the
//! [`InstrumentHandle`](spd_link::InstrumentHandle):
//!
//! ```text
//! WebSocket sessions ──┐
//!                      ├─> gateway actor ──> instrument link
//! terminal input ──────┘        │
//!                               ├─> correlator ─> accumulator ─> telemetry
//!                               └─> BridgeEvent stream ─> status display
//! ```
//!
//! Because the actor is the only writer, commands from different origins are
//! never interleaved on the wire and the correlator's FIFO matches reply
//! order to issuance order. A reply that fails to parse (or never arrives)
//! consumes exactly one queue slot, so one bad exchange can never shift the
//! attribution of every later reply.

pub mod accumulate;
pub mod correlate;
pub mod error;
pub mod events;
pub mod gateway;
pub mod session;
pub mod telemetry;

pub use accumulate::{MeasurementAccumulator, SampleFields};
pub use correlate::QueryCorrelator;
pub use error::RelayError;
pub use events::{BridgeEvent, Origin};
pub use gateway::{pump_lines, run_gateway, ClientId, GatewayCommand, SubmitReply};
pub use session::{run_session, SessionState};
pub use telemetry::{JsonlSink, MemorySink, TelemetryError, TelemetrySink};
