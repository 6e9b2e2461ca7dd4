//! Error types for SCPI framing and reply parsing

use thiserror::Error;

/// Errors that can occur while interpreting instrument replies
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Reply text is not a number
    #[error("not a numeric reply: {0:?}")]
    InvalidNumber(String),

    /// Reply line was empty
    #[error("empty reply line")]
    EmptyReply,
}

/// Higher-level protocol errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Parse error
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Client message contained no command text
    #[error("empty command")]
    EmptyCommand,
}
