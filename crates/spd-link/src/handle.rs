//! Capability-tagged instrument handle
//!
//! One process owns exactly one instrument for its whole lifetime. The handle
//! tags which transport contract applies so the relay dispatches on the
//! variant once, at wiring time, instead of re-checking per command.

use crate::serial::StreamWriter;
use crate::usbtmc::UsbTmcLink;

/// Which transport contract the instrument connection follows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    /// Free-running duplex stream; replies arrive through the read loop
    Stream,
    /// Write-then-read device; replies only follow query writes
    RequestResponse,
}

/// The process-lifetime connection to the instrument
pub enum InstrumentHandle {
    /// Write half of a stream link (the read half runs as its own task)
    Stream(StreamWriter),
    /// USBTMC request/response link
    UsbTmc(UsbTmcLink),
}

impl InstrumentHandle {
    /// Which contract this handle follows
    pub fn kind(&self) -> LinkKind {
        match self {
            InstrumentHandle::Stream(_) => LinkKind::Stream,
            InstrumentHandle::UsbTmc(_) => LinkKind::RequestResponse,
        }
    }

    /// Human-readable transport description for the status display
    pub fn describe(&self) -> String {
        match self {
            InstrumentHandle::Stream(writer) => format!("serial {}", writer.name()),
            InstrumentHandle::UsbTmc(link) => format!("usbtmc {}", link.path()),
        }
    }
}
