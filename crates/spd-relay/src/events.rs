//! Unified event stream for the relay
//!
//! Everything the status display needs to know — measurements, client
//! lifecycle, errors — is emitted through a single event channel, so the
//! display consumes one ordered stream instead of polling shared state.

use spd_protocol::MeasField;

/// Where a command came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    /// The local interactive terminal
    Local,
    /// A remote client session, identified by peer address
    Client {
        /// Peer address string
        peer: String,
    },
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Origin::Local => f.write_str("local"),
            Origin::Client { peer } => write!(f, "client {peer}"),
        }
    }
}

/// Events emitted by the gateway actor
#[derive(Debug, Clone)]
pub enum BridgeEvent {
    /// A remote client connected
    ClientConnected {
        /// Peer address
        peer: String,
    },

    /// A remote client disconnected
    ClientDisconnected {
        /// Peer address
        peer: String,
    },

    /// A measurement reply was correlated to its query
    Measurement {
        /// Which quantity was measured
        field: MeasField,
        /// Measured value
        value: f64,
    },

    /// A complete sample was handed to the telemetry sink
    SampleFlushed {
        /// Samples flushed since startup
        total: u64,
    },

    /// A command was written to the instrument
    CommandSent {
        /// Who issued it
        origin: Origin,
        /// Command text as sent (without terminator)
        command: String,
    },

    /// Something failed without stopping the relay
    Error {
        /// Failing component ("link", "telemetry", ...)
        source: String,
        /// Error message
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_display() {
        assert_eq!(Origin::Local.to_string(), "local");
        assert_eq!(
            Origin::Client {
                peer: "127.0.0.1:50000".into()
            }
            .to_string(),
            "client 127.0.0.1:50000"
        );
    }
}
