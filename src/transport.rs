//! Transport abstraction for quiz room channels.
//!
//! The [`Transport`] trait defines a bidirectional text message channel between
//! the client and the session authority. Every frame is one JSON envelope
//! (`{"type": ..., "data": ...}`), so implementations handle framing internally
//! (WebSocket frames, length-prefixed TCP, in-process channels).
//!
//! # Connection Setup
//!
//! Connection setup is NOT part of this trait. Handshakes, authentication and
//! socket-level retries belong to a [`RoomConnector`](crate::broker::RoomConnector),
//! which hands a connected transport to the broker.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use quiz_room_client::error::QuizRoomError;
//! use quiz_room_client::transport::Transport;
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn send(&mut self, message: String) -> Result<(), QuizRoomError> {
//!         // Send the JSON text message to the authority
//!         Ok(())
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, QuizRoomError>> {
//!         // Return None when the connection is closed cleanly
//!         None
//!     }
//!
//!     async fn close(&mut self) -> Result<(), QuizRoomError> {
//!         Ok(())
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::QuizRoomError;

/// A bidirectional text message transport to the session authority.
///
/// # Object Safety
///
/// This trait is object-safe. Connectors return `Box<dyn Transport>` so that
/// the broker can cache channels of different transport types side by side.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) **MUST** be cancel-safe because the channel loop
/// polls it inside `tokio::select!`. Channel-based implementations (e.g.
/// wrapping `mpsc::Receiver`) are naturally cancel-safe.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send a JSON text message to the authority.
    ///
    /// # Errors
    ///
    /// Returns [`QuizRoomError::TransportSend`] if the message could not be sent.
    async fn send(&mut self, message: String) -> Result<(), QuizRoomError>;

    /// Receive the next JSON text message from the authority.
    ///
    /// Returns:
    /// - `Some(Ok(text))`: a complete message was received
    /// - `Some(Err(e))`: a transport error occurred
    /// - `None`: the connection was closed cleanly by the authority
    async fn recv(&mut self) -> Option<Result<String, QuizRoomError>>;

    /// Close the transport connection gracefully.
    ///
    /// # Errors
    ///
    /// Returns an error if the graceful shutdown fails. Implementations should
    /// still release resources even if the close handshake fails.
    async fn close(&mut self) -> Result<(), QuizRoomError>;
}

#[async_trait]
impl Transport for Box<dyn Transport> {
    async fn send(&mut self, message: String) -> Result<(), QuizRoomError> {
        (**self).send(message).await
    }

    async fn recv(&mut self) -> Option<Result<String, QuizRoomError>> {
        (**self).recv().await
    }

    async fn close(&mut self) -> Result<(), QuizRoomError> {
        (**self).close().await
    }
}
