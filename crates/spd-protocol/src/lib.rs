//! SCPI Protocol Library
//!
//! This crate provides the wire-level pieces of the SPD3303X bridge:
//!
//! - **Line framing**: SCPI commands and replies are ASCII text terminated by
//!   a single line feed. [`LineCodec`] reassembles complete lines from an
//!   arbitrarily chunked byte stream.
//! - **Query classification**: a command containing `?` expects exactly one
//!   reply line; everything else produces no output.
//! - **Measurement tracking**: the four recognized measurement queries
//!   (voltage/current on channels 1 and 2) map to [`MeasField`] tags so the
//!   relay can correlate replies back to the query that produced them.
//!
//! # Example
//!
//! ```rust
//! use spd_protocol::{LineCodec, MeasField, measurement_field};
//!
//! let mut codec = LineCodec::new();
//! codec.push_bytes(b"12.000\n0.5");
//! assert_eq!(codec.next_line().as_deref(), Some("12.000"));
//! assert_eq!(codec.next_line(), None);
//!
//! assert_eq!(
//!     measurement_field("meas:voltage? ch1"),
//!     None,
//! );
//! assert_eq!(
//!     measurement_field("MEASure:VOLTage? CH1"),
//!     Some(MeasField::Ch1Voltage),
//! );
//! ```

pub mod command;
pub mod error;
pub mod line;

pub use command::{is_query, measurement_field, parse_reply, terminate, MeasField};
pub use error::{ParseError, ProtocolError};
pub use line::LineCodec;
