/// Error types for relay queue operations
///
/// Enqueue rejections, configuration mistakes and transport/codec failures
/// all surface through `RelayError`. Send failures inside the dispatch loop
/// are not errors: they are handled by the event's retry policy.
use std::io;

use thiserror::Error;

use crate::contracts::NodeAddress;

/// Result type alias for relay queue operations
pub type Result<T> = std::result::Result<T, RelayError>;

/// Relay queue error enumeration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// Queue capacity outside of the range the 2-digit event ids can cover
    #[error("Invalid queue capacity {requested}: must be between 1 and {max}")]
    InvalidQueueCapacity { requested: usize, max: usize },

    /// Configuration needs more node slots than node numbers allow
    #[error("Invalid node count {requested}: at most {max} nodes")]
    InvalidNodeCount { requested: usize, max: usize },

    /// Node index out of range or not configured
    #[error("Invalid node: {0}")]
    InvalidNode(usize),

    /// A confirm event was queued but no ack event name is configured
    #[error("Confirm policy requires an ack event to be configured")]
    ConfirmWithoutAck,

    /// Target is not a configured node and send-to-nodes-only is enabled
    #[error("Unknown target {0}")]
    UnknownTarget(NodeAddress),

    /// Target node is outside its timeout window
    #[error("Target {0} is timed out")]
    TargetTimedOut(NodeAddress),

    /// No buffered event with both a sender and an event id
    #[error("No received event to acknowledge")]
    NothingToAcknowledge,

    /// No free event id left in the 10-99 range
    #[error("Event id range exhausted")]
    EventIdExhausted,

    /// Address text could not be parsed
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// I/O error (network send/receive failure)
    #[error("I/O error: {0}")]
    Io(String),

    /// Frame serialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Frame failed validation while decoding
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// CRC mismatch on a received frame
    #[error("Integrity check failed: expected CRC32 {expected:#x}, got {actual:#x}")]
    IntegrityCheckFailed { expected: u32, actual: u32 },

    /// Frame was built by a different wire version
    #[error("Unsupported frame version {0}")]
    UnsupportedVersion(u16),

    /// Frame tag did not verify against the shared key
    #[error("Frame authentication failed")]
    AuthenticationFailed,

    /// Encoded frame does not fit the datagram buffer
    #[error("Frame too large: required {required}, available {available}")]
    FrameTooLarge { required: usize, available: usize },
}

impl From<io::Error> for RelayError {
    fn from(err: io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
