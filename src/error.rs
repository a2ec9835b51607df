//! Error types for the quiz room client.
//!
//! Only the connection boundary produces errors. The reducer, the action gate,
//! the capability deriver and the cost rules express every failure as a state
//! value or a boolean.

use thiserror::Error;

/// Errors that can occur when connecting to or talking with a quiz room.
#[derive(Debug, Error)]
pub enum QuizRoomError {
    /// Failed to send a message through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a message from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed unexpectedly.
    #[error("transport connection closed")]
    TransportClosed,

    /// Failed to serialize or deserialize a protocol message.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Attempted to send on a channel whose transport loop has exited.
    #[error("not connected to room")]
    NotConnected,

    /// The authority does not know the requested room.
    #[error("room {room_id} not found")]
    RoomNotFound {
        /// The room that was requested.
        room_id: String,
    },

    /// The connector could not establish a room channel.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized [`Result`] type for quiz room client operations.
pub type Result<T> = std::result::Result<T, QuizRoomError>;
