//! Error types for panel message parsing

use thiserror::Error;

/// Errors that can occur while parsing an assembled panel message
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Message contained no usable lines
    #[error("empty message")]
    EmptyMessage,

    /// First line could not be split into identifier and metadata
    #[error("no field separator in line: {0:?}")]
    MissingSeparator(String),

    /// Metadata did not contain both a time and a date token
    #[error("missing date/time fields in line: {0:?}")]
    MissingTimestamp(String),
}
