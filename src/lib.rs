//! # Quiz Room Client
//!
//! State reconciliation and moderation mirroring for classroom quiz rooms.
//!
//! A remote session authority owns the true state of a room and pushes it
//! to every participant two ways: `state-sync` snapshots of its schema and
//! discrete events such as `TEAM_UPDATE` or `CARD_CAST`. This crate folds
//! both into one [`SessionState`] that never regresses visible data, and
//! mirrors the authority's rules locally so a UI can predict what a player
//! may do.
//!
//! ## Layers
//!
//! - **Pure core**: [`reducer::reduce`], [`gate::can_perform_action`],
//!   [`capabilities::derive_capabilities`] and the cost rules in [`rules`].
//!   None of them return errors.
//! - **Connection layer**: [`RoomChannel`] runs one transport,
//!   [`ConnectionBroker`] caches channels across remounts, and
//!   [`QuizSession`] ties a channel to a published state.
//! - **Transports**: implement [`Transport`] or use the default
//!   `transport-websocket` feature's [`WebSocketTransport`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), quiz_room_client::QuizRoomError> {
//! use std::sync::Arc;
//!
//! use quiz_room_client::protocol::{ClientMessage, Role};
//! use quiz_room_client::{ClientConfig, ConnectionBroker, QuizSession, WebSocketConnector};
//!
//! let broker = Arc::new(ConnectionBroker::new(
//!     WebSocketConnector::new("ws://localhost:2567/quiz"),
//!     ClientConfig::default(),
//! ));
//! let session = QuizSession::new(broker, Role::Student)
//!     .with_room_id("room-1")
//!     .with_token("jwt");
//! session.connect().await?;
//!
//! let sent = session.submit(
//!     "p1",
//!     Some("team-a"),
//!     ClientMessage::Suggestion { text: "42".into() },
//! )?;
//! println!("suggestion sent: {sent}");
//! # Ok(())
//! # }
//! ```

pub mod action;
pub mod broker;
pub mod capabilities;
pub mod channel;
pub mod error;
pub mod gate;
pub mod policy;
pub mod protocol;
pub mod reducer;
pub mod rules;
pub mod session;
pub mod state;
pub mod transport;
pub mod transports;
pub mod view;

// Re-export primary types for ergonomic imports.
pub use action::Action;
pub use broker::{ClientConfig, ConnectionBroker, JoinedRoom, RoomConnector};
pub use channel::{Handlers, LeaveReason, RoomChannel};
pub use error::QuizRoomError;
pub use protocol::{ClientMessage, MessageType, Role, ServerMessage, StateSnapshot};
pub use reducer::reduce;
pub use session::QuizSession;
pub use state::SessionState;
pub use transport::Transport;

#[cfg(feature = "transport-websocket")]
pub use transports::{WebSocketConnector, WebSocketTransport};
