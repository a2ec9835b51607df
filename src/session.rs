//! One mounted view of a room: connect, reconcile, observe, act.
//!
//! A [`QuizSession`] turns channel traffic into [`SessionState`] by feeding
//! every message through [`Action::from_server_message`] and
//! [`reduce`](crate::reducer::reduce). The current state is published on a
//! [`tokio::sync::watch`] channel.
//!
//! # Connect ordering
//!
//! For a cached role with an open cached channel, handlers are attached
//! before the held snapshot is applied, so nothing that arrives in between
//! is lost. A fresh channel is marked connected, gets its handlers, applies
//! its held snapshot immediately and once more after
//! [`ClientConfig::fallback_sync_delay`](crate::broker::ClientConfig::fallback_sync_delay).
//! Its loop is already running by then; discrete messages it received before
//! the handlers arrived are replayed to them by [`RoomChannel::attach`].
//!
//! # Liveness
//!
//! [`QuizSession::unmount`] clears a flag every handler checks before
//! dispatching. It does not close a cached channel; that channel keeps
//! running for the next mount.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, Weak};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::action::Action;
use crate::broker::ConnectionBroker;
use crate::channel::{lock, Handlers, RoomChannel};
use crate::error::Result;
use crate::gate::{can_perform_action, ActionRequest};
use crate::policy::role_message_types;
use crate::protocol::{ClientMessage, Role, RoomId, ServerMessage, StateSnapshot};
use crate::reducer::reduce;
use crate::state::{ConnectionStatus, SessionState};

/// Milliseconds since the Unix epoch; 0 if the clock is before it.
fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

// ── Dispatcher ──────────────────────────────────────────────────────

/// Folds actions into the published state while the session is mounted.
#[derive(Clone)]
struct Dispatcher {
    state_tx: Arc<watch::Sender<SessionState>>,
    mounted: Arc<AtomicBool>,
}

impl Dispatcher {
    fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::Acquire)
    }

    fn dispatch(&self, action: &Action) {
        if !self.is_mounted() {
            return;
        }
        self.state_tx
            .send_modify(|state| *state = reduce(std::mem::take(state), action));
    }

    fn sync(&self, snapshot: StateSnapshot) {
        self.dispatch(&Action::StateSync {
            snapshot: Arc::new(snapshot),
            received_at_ms: now_ms(),
        });
    }
}

// ── Session ─────────────────────────────────────────────────────────

/// The state of one room as seen by one role.
///
/// # Example
///
/// ```rust,no_run
/// # async fn example() -> Result<(), quiz_room_client::QuizRoomError> {
/// use std::sync::Arc;
///
/// use quiz_room_client::protocol::Role;
/// use quiz_room_client::{ClientConfig, ConnectionBroker, QuizSession, WebSocketConnector};
///
/// let broker = Arc::new(ConnectionBroker::new(
///     WebSocketConnector::new("ws://localhost:2567/quiz"),
///     ClientConfig::default(),
/// ));
/// let session = QuizSession::new(Arc::clone(&broker), Role::Display);
/// session.connect().await?;
///
/// let mut updates = session.subscribe();
/// while updates.changed().await.is_ok() {
///     let state = updates.borrow_and_update().clone();
///     println!("round {}", state.round.round_number);
/// }
/// # Ok(())
/// # }
/// ```
pub struct QuizSession {
    broker: Arc<ConnectionBroker>,
    role: Role,
    token: Option<String>,
    room_id: Option<RoomId>,
    dispatcher: Dispatcher,
    channel: StdMutex<Option<RoomChannel>>,
    fallback: StdMutex<Option<JoinHandle<()>>>,
}

impl QuizSession {
    pub fn new(broker: Arc<ConnectionBroker>, role: Role) -> Self {
        let (state_tx, _) = watch::channel(SessionState::default());
        Self {
            broker,
            role,
            token: None,
            room_id: None,
            dispatcher: Dispatcher {
                state_tx: Arc::new(state_tx),
                mounted: Arc::new(AtomicBool::new(false)),
            },
            channel: StdMutex::new(None),
            fallback: StdMutex::new(None),
        }
    }

    /// Authentication token handed to the connector.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Join this room instead of the broker's current room.
    #[must_use]
    pub fn with_room_id(mut self, room_id: impl Into<RoomId>) -> Self {
        self.room_id = Some(room_id.into()).filter(|id| !id.is_empty());
        self
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_mounted(&self) -> bool {
        self.dispatcher.is_mounted()
    }

    /// Mount the session and obtain a channel.
    ///
    /// Failures are also reported as [`ConnectionStatus::Error`] in the state
    /// while mounted. Nothing is retried.
    ///
    /// # Errors
    ///
    /// Returns whatever the broker's connector returned.
    pub async fn connect(&self) -> Result<()> {
        self.dispatcher.mounted.store(true, Ordering::Release);
        self.abort_fallback();
        self.dispatcher.dispatch(&Action::ConnectionStatus {
            status: Some(ConnectionStatus::Connecting),
            room_id: None,
            role: Some(self.role),
        });

        let requested = self
            .room_id
            .clone()
            .or_else(|| self.broker.current_room_id());

        if self.broker.config().caches(self.role) {
            if let Some(cached) = self.broker.existing_channel(self.role) {
                if requested.as_deref().is_none_or(|id| id == cached.room_id()) {
                    self.resume(cached);
                    return Ok(());
                }
            }
        }

        let channel = match self
            .broker
            .connect(self.role, requested.as_deref(), self.token.as_deref())
            .await
        {
            Ok(channel) => channel,
            Err(e) => {
                error!(role = %self.role, "connection error: {e}");
                self.dispatcher
                    .dispatch(&Action::status(ConnectionStatus::Error));
                return Err(e);
            }
        };

        if !self.is_mounted() {
            debug!(role = %self.role, "unmounted while connecting, leaving room");
            channel.leave().await;
            return Ok(());
        }

        self.dispatcher.dispatch(&Action::ConnectionStatus {
            status: Some(ConnectionStatus::Connected),
            room_id: Some(channel.room_id().to_owned()).filter(|id| !id.is_empty()),
            role: Some(self.role),
        });

        channel.attach(self.build_handlers());

        let snapshot = channel.snapshot();
        let teams = snapshot.team_count();
        if teams > 0 {
            debug!(role = %self.role, teams, "immediate snapshot sync");
        }
        self.dispatcher.sync(snapshot);

        self.spawn_fallback(channel.clone());
        *lock(&self.channel) = Some(channel);
        info!(role = %self.role, "connected to room");
        Ok(())
    }

    /// Take over a cached channel that is still open.
    fn resume(&self, channel: RoomChannel) {
        info!(role = %self.role, room_id = %channel.room_id(), "resuming cached room channel");
        channel.attach(self.build_handlers());

        let snapshot = channel.snapshot();
        let teams = snapshot.team_count();
        let cached_teams = self.broker.cached_teams();
        if teams > 0 {
            debug!(role = %self.role, teams, "immediate sync from cached channel");
            self.dispatcher.sync(snapshot);
        } else if !cached_teams.is_empty() {
            debug!(role = %self.role, teams = cached_teams.len(), "restoring teams from cache");
            self.dispatcher.dispatch(&Action::TeamUpdate {
                teams: Some(cached_teams),
            });
            self.dispatcher.sync(snapshot.without_teams());
        } else {
            self.dispatcher.sync(snapshot.without_teams());
        }

        let room_id = channel.room_id();
        self.broker.set_current_room_id(room_id);
        self.dispatcher.dispatch(&Action::ConnectionStatus {
            status: Some(ConnectionStatus::Connected),
            room_id: Some(room_id.to_owned()).filter(|id| !id.is_empty()),
            role: Some(self.role),
        });
        *lock(&self.channel) = Some(channel);
    }

    /// Handler table for this session's role.
    fn build_handlers(&self) -> Handlers {
        let role = self.role;
        let mut handlers = Handlers::new();

        for message_type in role_message_types(role) {
            let dispatcher = self.dispatcher.clone();
            let broker = Arc::downgrade(&self.broker);
            handlers = handlers.on_message(message_type, move |message| {
                if !dispatcher.is_mounted() {
                    return;
                }
                observe(&broker, role, message);
                for action in Action::from_server_message(message.clone(), now_ms()) {
                    dispatcher.dispatch(&action);
                }
            });
        }

        let dispatcher = self.dispatcher.clone();
        handlers = handlers.on_state_change(move |snapshot| {
            dispatcher.sync(snapshot.clone());
        });

        let dispatcher = self.dispatcher.clone();
        let broker = Arc::downgrade(&self.broker);
        handlers.on_leave(move |reason| {
            info!(role = %role, %reason, "room left");
            if matches!(role, Role::Teacher | Role::Display) {
                if let Some(broker) = broker.upgrade() {
                    broker.clear_current_room_id();
                }
            }
            dispatcher.dispatch(&Action::status(ConnectionStatus::Disconnected));
        })
    }

    fn spawn_fallback(&self, channel: RoomChannel) {
        let dispatcher = self.dispatcher.clone();
        let delay = self.broker.config().fallback_sync_delay;
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !dispatcher.is_mounted() || !channel.is_open() {
                return;
            }
            let snapshot = channel.snapshot();
            let teams = snapshot.team_count();
            if teams > 0 {
                debug!(teams, "fallback snapshot sync");
                dispatcher.sync(snapshot);
            }
        });
        *lock(&self.fallback) = Some(task);
    }

    fn abort_fallback(&self) {
        if let Some(task) = lock(&self.fallback).take() {
            task.abort();
        }
    }

    /// Stop dispatching. A cached channel stays open for the next mount.
    pub fn unmount(&self) {
        self.dispatcher.mounted.store(false, Ordering::Release);
        self.abort_fallback();
        debug!(role = %self.role, "session unmounted");
    }

    /// Leave the room, including the broker's cached channel for this role.
    pub async fn leave(&self) {
        self.abort_fallback();
        let channel = lock(&self.channel).take();
        if let Some(channel) = channel {
            channel.leave().await;
        }
        if self.broker.config().caches(self.role) {
            self.broker.leave(self.role).await;
        }
    }

    /// The current state.
    pub fn state(&self) -> SessionState {
        self.dispatcher.state_tx.borrow().clone()
    }

    /// Observe state changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.dispatcher.state_tx.subscribe()
    }

    pub fn channel(&self) -> Option<RoomChannel> {
        lock(&self.channel).clone()
    }

    /// Send `message` on behalf of `player_id` if the action gate, evaluated
    /// against the local moderation state, predicts the authority will
    /// accept it.
    ///
    /// Returns `Ok(false)` without sending on a predicted rejection, including
    /// when there is no channel. The authority's decision stays final.
    ///
    /// # Errors
    ///
    /// Returns [`QuizRoomError::NotConnected`](crate::error::QuizRoomError::NotConnected)
    /// if the channel has closed.
    pub fn submit(
        &self,
        player_id: &str,
        team_id: Option<&str>,
        message: ClientMessage,
    ) -> Result<bool> {
        let Some(channel) = self.channel() else {
            return Ok(false);
        };
        let request = ActionRequest::new(
            player_id,
            team_id.map(str::to_owned),
            message.gate_action(),
        );
        let moderation = self.state().moderation;
        if !can_perform_action(Some(&moderation), &request) {
            debug!(role = %self.role, action = ?request.action, "action gated locally");
            return Ok(false);
        }
        channel.send(message)?;
        Ok(true)
    }
}

/// Side effects of a message outside the reducer.
fn observe(broker: &Weak<ConnectionBroker>, role: Role, message: &ServerMessage) {
    match message {
        ServerMessage::TeamUpdate(payload) => {
            if let (Some(teams), Some(broker)) = (&payload.teams, broker.upgrade()) {
                broker.cache_teams(teams);
            }
        }
        ServerMessage::RoomId(payload) => {
            if let (Some(room_id), Some(broker)) = (&payload.room_id, broker.upgrade()) {
                broker.set_current_room_id(room_id);
            }
        }
        ServerMessage::Error(payload) => {
            warn!(
                role = %role,
                error = payload.message.as_deref().unwrap_or_default(),
                "authority reported an error"
            );
        }
        _ => {}
    }
}

impl Drop for QuizSession {
    fn drop(&mut self) {
        self.dispatcher.mounted.store(false, Ordering::Release);
        self.abort_fallback();
    }
}

impl std::fmt::Debug for QuizSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuizSession")
            .field("role", &self.role)
            .field("mounted", &self.is_mounted())
            .field("channel", &self.channel())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::protocol::RoundState;

    fn dispatcher(mounted: bool) -> Dispatcher {
        let (state_tx, _) = watch::channel(SessionState::default());
        Dispatcher {
            state_tx: Arc::new(state_tx),
            mounted: Arc::new(AtomicBool::new(mounted)),
        }
    }

    #[test]
    fn unmounted_dispatcher_is_inert() {
        let d = dispatcher(false);
        d.dispatch(&Action::RoundStateUpdate {
            state: Some(RoundState::Active),
            round_number: Some(1),
        });
        assert_eq!(*d.state_tx.borrow(), SessionState::default());
    }

    #[test]
    fn mounted_dispatcher_reduces_and_notifies() {
        let d = dispatcher(true);
        let mut rx = d.state_tx.subscribe();
        d.dispatch(&Action::RoundStateUpdate {
            state: Some(RoundState::Active),
            round_number: Some(2),
        });
        assert!(rx.has_changed().unwrap());
        let state = rx.borrow_and_update().clone();
        assert_eq!(state.round.round_state, RoundState::Active);
        assert_eq!(state.round.round_number, 2);
    }

    #[test]
    fn now_ms_is_after_2020() {
        assert!(now_ms() > 1_577_836_800_000);
    }
}
