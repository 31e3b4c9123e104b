//! Error types for the delivery pipeline

use thiserror::Error;

/// Errors that can occur in the pipeline
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Serial device could not be opened
    #[error("serial link unavailable: {0}")]
    LinkUnavailable(#[from] tokio_serial::Error),

    /// Read/write fault on an open link
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Input accumulated past the line-length cap without a terminator
    #[error("unframeable input: {length} bytes without a line terminator")]
    Decode {
        /// Bytes discarded
        length: usize,
    },

    /// Assembled message did not match the panel grammar
    #[error("parse error: {0}")]
    Parse(#[from] facp_protocol::ParseError),

    /// Durable snapshot could not be written or read
    #[error("queue persistence failure: {0}")]
    Persistence(#[source] std::io::Error),

    /// Snapshot bytes could not be encoded or decoded
    #[error("snapshot codec failure: {0}")]
    SnapshotCodec(#[from] serde_json::Error),

    /// Configured panel model identifier is not supported
    #[error("unknown panel model id: {0}")]
    UnknownModel(u32),

    /// A pulse actuator was asked to fire while a pulse was in flight
    #[error("actuator busy: a pulse is already in flight")]
    ActuatorBusy,
}
