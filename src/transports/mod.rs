//! Concrete [`Transport`](crate::transport::Transport) and
//! [`RoomConnector`](crate::broker::RoomConnector) implementations, each
//! behind a Cargo feature.
//!
//! | Feature                | Types                                         |
//! |------------------------|-----------------------------------------------|
//! | `transport-websocket`  | [`WebSocketTransport`], [`WebSocketConnector`] |
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), quiz_room_client::QuizRoomError> {
//! use std::sync::Arc;
//!
//! use quiz_room_client::{ClientConfig, ConnectionBroker, WebSocketConnector};
//!
//! let connector = WebSocketConnector::new("ws://localhost:2567/quiz");
//! let broker = Arc::new(ConnectionBroker::new(connector, ClientConfig::default()));
//! # let _ = broker;
//! # Ok(())
//! # }
//! ```

#[cfg(feature = "transport-websocket")]
pub mod websocket;

#[cfg(feature = "transport-websocket")]
pub use websocket::{WebSocketConnector, WebSocketTransport};
