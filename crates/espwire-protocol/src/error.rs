//! Error types for the AT protocol engine.

use crate::frame::ConnectionId;
use thiserror::Error;

/// Errors that can occur when driving the module.
#[derive(Debug, Error)]
pub enum AtError {
    /// The transport failed or reported an implausible read length.
    #[error("transport fault: {0}")]
    Transport(#[from] std::io::Error),

    /// The command was never acknowledged with `OK`.
    #[error("no acknowledgement for {command:?} after {attempts} attempt(s)")]
    NoAcknowledgement {
        /// Command text that was sent (empty for a pure receive).
        command: String,
        /// Number of attempts made.
        attempts: u32,
        /// Lines collected during the last attempt.
        lines: Vec<String>,
    },

    /// Joining the access point did not complete within the poll budget.
    #[error("network join not acknowledged after {polls} poll(s)")]
    JoinTimedOut {
        /// Number of receive polls made after the join command.
        polls: u32,
    },

    /// The peer closed the connection before a frame arrived.
    #[error("connection {id} closed before a frame arrived")]
    ConnectionClosed {
        /// Connection slot reported by the module.
        id: ConnectionId,
    },

    /// A connection wait ended without a connection notification.
    #[error("no connection notification in {} line(s)", lines.len())]
    NoConnection {
        /// Lines collected while waiting.
        lines: Vec<String>,
    },

    /// The module reported a failed connection attempt.
    #[error("connection {id} failed")]
    ConnectFailed {
        /// Connection slot reported by the module.
        id: ConnectionId,
    },

    /// The transport stalled before the declared frame length was delivered.
    #[error("incomplete frame on connection {id}: expected {expected} bytes, got {}", payload.len())]
    IncompleteFrame {
        /// Connection slot the frame belongs to.
        id: ConnectionId,
        /// Declared payload length from the frame header.
        expected: usize,
        /// Bytes received before the stall.
        payload: Vec<u8>,
    },

    /// The module did not confirm a transmission with `SEND OK`.
    #[error("send on connection {id} not confirmed")]
    SendNotConfirmed {
        /// Connection slot used for the send.
        id: ConnectionId,
    },

    /// A queried field was missing from the response.
    #[error("field {key:?} not found in response")]
    FieldNotFound {
        /// Key that was looked up.
        key: String,
    },

    /// An address value could not be parsed.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Command text is not valid on the wire.
    #[error("invalid command: {0}")]
    InvalidCommand(String),
}

impl AtError {
    /// Check if this error means the module simply never answered.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            AtError::NoAcknowledgement { .. } | AtError::JoinTimedOut { .. }
        )
    }
}

/// Result type alias for AT protocol operations.
pub type AtResult<T> = Result<T, AtError>;
