//! SCPI command classification and the measurement-query table
//!
//! The bridge relays commands verbatim; the only SCPI it understands are the
//! four measurement queries it tracks for telemetry. Everything else (other
//! queries like `*IDN?` or `SYSTem:STATus?`, and all set commands) passes
//! through untracked.

use crate::error::ParseError;

/// One of the four tracked measurement quantities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum MeasField {
    /// Channel 1 output voltage
    Ch1Voltage,
    /// Channel 1 output current
    Ch1Current,
    /// Channel 2 output voltage
    Ch2Voltage,
    /// Channel 2 output current
    Ch2Current,
}

impl MeasField {
    /// All tracked fields, in channel order
    pub const ALL: [MeasField; 4] = [
        MeasField::Ch1Voltage,
        MeasField::Ch1Current,
        MeasField::Ch2Voltage,
        MeasField::Ch2Current,
    ];

    /// Field name used in telemetry records
    pub fn as_str(&self) -> &'static str {
        match self {
            MeasField::Ch1Voltage => "ch1_voltage",
            MeasField::Ch1Current => "ch1_current",
            MeasField::Ch2Voltage => "ch2_voltage",
            MeasField::Ch2Current => "ch2_current",
        }
    }

    /// The SCPI query that produces this field
    pub fn query(&self) -> &'static str {
        match self {
            MeasField::Ch1Voltage => "MEASure:VOLTage? CH1",
            MeasField::Ch1Current => "MEASure:CURRent? CH1",
            MeasField::Ch2Voltage => "MEASure:VOLTage? CH2",
            MeasField::Ch2Current => "MEASure:CURRent? CH2",
        }
    }

    /// Short label for the status display
    pub fn label(&self) -> &'static str {
        match self {
            MeasField::Ch1Voltage => "CH1 V",
            MeasField::Ch1Current => "CH1 A",
            MeasField::Ch2Voltage => "CH2 V",
            MeasField::Ch2Current => "CH2 A",
        }
    }

    /// Display unit suffix
    pub fn unit(&self) -> &'static str {
        match self {
            MeasField::Ch1Voltage | MeasField::Ch2Voltage => "V",
            MeasField::Ch1Current | MeasField::Ch2Current => "A",
        }
    }
}

impl std::fmt::Display for MeasField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Match a command against the measurement-query table
///
/// The match is case-insensitive but otherwise exact: abbreviated SCPI forms
/// (`MEAS:VOLT? CH1`) are not recognized, matching what the web client
/// actually sends. Non-measurement queries return `None`.
pub fn measurement_field(command: &str) -> Option<MeasField> {
    let trimmed = command.trim();
    MeasField::ALL
        .into_iter()
        .find(|field| trimmed.eq_ignore_ascii_case(field.query()))
}

/// Whether a command expects a reply line
///
/// Queries are distinguished syntactically: they contain a question mark.
/// The instrument produces no output for anything else.
pub fn is_query(command: &str) -> bool {
    command.contains('?')
}

/// Append the protocol line terminator and return the wire bytes
pub fn terminate(command: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(command.len() + 1);
    bytes.extend_from_slice(command.as_bytes());
    bytes.push(b'\n');
    bytes
}

/// Parse a reply line as a measurement value
pub fn parse_reply(line: &str) -> Result<f64, ParseError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Err(ParseError::EmptyReply);
    }
    trimmed
        .parse::<f64>()
        .map_err(|_| ParseError::InvalidNumber(trimmed.to_string()))
}
