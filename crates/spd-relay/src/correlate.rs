//! Query/response correlation
//!
//! The instrument replies with bare numbers — nothing in a reply says which
//! query produced it. Correlation therefore relies entirely on ordering:
//! because the gateway serializes all writes, replies arrive in issuance
//! order, and a FIFO of expected field tags pairs them back up.

use std::collections::VecDeque;

use spd_protocol::{measurement_field, parse_reply, MeasField};
use tracing::{debug, trace};

/// FIFO tracker pairing outgoing measurement queries with inbound replies
///
/// Tags are pushed when a recognized measurement query is sent — regardless
/// of which source sent it — and popped when the next inbound line is
/// processed. A pop happens even when the line fails to parse: consuming the
/// slot drops one field from the current sample instead of permanently
/// shifting every later reply onto the wrong tag.
#[derive(Debug, Default)]
pub struct QueryCorrelator {
    pending: VecDeque<MeasField>,
}

impl QueryCorrelator {
    /// Create an empty correlator
    pub fn new() -> Self {
        Self {
            pending: VecDeque::new(),
        }
    }

    /// Record an outgoing command; tracked queries enqueue their field tag
    pub fn on_command_sent(&mut self, command: &str) {
        if let Some(field) = measurement_field(command) {
            self.pending.push_back(field);
            trace!("Expecting reply for {}", field);
        }
    }

    /// Process an inbound line against the oldest outstanding tag
    ///
    /// Returns the correlated `(field, value)` when the line parses as a
    /// number. With nothing outstanding the line is ignored — it belongs to
    /// an untracked query like `*IDN?`.
    pub fn on_line_received(&mut self, line: &str) -> Option<(MeasField, f64)> {
        let field = self.pending.pop_front()?;
        match parse_reply(line) {
            Ok(value) => Some((field, value)),
            Err(e) => {
                debug!("Dropping reply for {}: {}", field, e);
                None
            }
        }
    }

    /// Consume the oldest tag after a reply timeout
    ///
    /// A query that never answers still spends its queue slot, exactly like
    /// a malformed reply.
    pub fn on_reply_timeout(&mut self) -> Option<MeasField> {
        let field = self.pending.pop_front();
        if let Some(field) = field {
            debug!("Reply timed out, dropping {}", field);
        }
        field
    }

    /// Number of queries still awaiting replies
    pub fn outstanding(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replies_attributed_in_issue_order() {
        let mut corr = QueryCorrelator::new();
        corr.on_command_sent("MEASure:VOLTage? CH1");
        corr.on_command_sent("MEASure:CURRent? CH2");

        assert_eq!(
            corr.on_line_received("12.000"),
            Some((MeasField::Ch1Voltage, 12.0))
        );
        assert_eq!(
            corr.on_line_received("0.250"),
            Some((MeasField::Ch2Current, 0.25))
        );
        assert_eq!(corr.outstanding(), 0);
    }

    #[test]
    fn untracked_commands_do_not_enqueue() {
        let mut corr = QueryCorrelator::new();
        corr.on_command_sent("*IDN?");
        corr.on_command_sent("OUTPut CH1,ON");
        corr.on_command_sent("SYSTem:STATus?");
        assert_eq!(corr.outstanding(), 0);

        // A reply with nothing outstanding is ignored
        assert_eq!(corr.on_line_received("Siglent,SPD3303X"), None);
    }

    #[test]
    fn malformed_reply_consumes_exactly_one_slot() {
        let mut corr = QueryCorrelator::new();
        corr.on_command_sent("MEASure:VOLTage? CH1");
        corr.on_command_sent("MEASure:CURRent? CH1");

        // Garbage for the first query: slot consumed, nothing correlated
        assert_eq!(corr.on_line_received("ERROR"), None);

        // The next numeric reply lands on the second query, not the first
        assert_eq!(
            corr.on_line_received("0.500"),
            Some((MeasField::Ch1Current, 0.5))
        );
    }

    #[test]
    fn timeout_consumes_exactly_one_slot() {
        let mut corr = QueryCorrelator::new();
        corr.on_command_sent("MEASure:VOLTage? CH1");
        corr.on_command_sent("MEASure:VOLTage? CH2");

        assert_eq!(corr.on_reply_timeout(), Some(MeasField::Ch1Voltage));
        assert_eq!(
            corr.on_line_received("5.000"),
            Some((MeasField::Ch2Voltage, 5.0))
        );
        assert_eq!(corr.on_reply_timeout(), None);
    }

    #[test]
    fn interleaved_set_commands_do_not_disturb_attribution() {
        let mut corr = QueryCorrelator::new();
        corr.on_command_sent("MEASure:VOLTage? CH1");
        corr.on_command_sent("OUTPut CH1,ON");
        corr.on_command_sent("CH2:VOLTage 5.0");
        corr.on_command_sent("MEASure:CURRent? CH1");

        // Set commands produce no replies, so only the two tracked replies
        // arrive and both land on the right tag.
        assert_eq!(
            corr.on_line_received("12.000"),
            Some((MeasField::Ch1Voltage, 12.0))
        );
        assert_eq!(
            corr.on_line_received("0.500"),
            Some((MeasField::Ch1Current, 0.5))
        );
    }

    #[test]
    fn untracked_query_reply_consumes_an_outstanding_slot() {
        let mut corr = QueryCorrelator::new();
        corr.on_command_sent("MEASure:VOLTage? CH1");
        corr.on_command_sent("*IDN?");

        // The IDN reply arrives second but the voltage slot is already
        // consumed by its own reply, so the non-numeric text pops nothing
        // it shouldn't: first reply correlates, second is discarded.
        assert_eq!(
            corr.on_line_received("12.000"),
            Some((MeasField::Ch1Voltage, 12.0))
        );
        assert_eq!(corr.on_line_received("Siglent,SPD3303X,..."), None);
        assert_eq!(corr.outstanding(), 0);
    }
}
