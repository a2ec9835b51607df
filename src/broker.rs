//! Lifecycle-scoped registry of room connections.
//!
//! A [`ConnectionBroker`] is shared by every [`QuizSession`](crate::session::QuizSession)
//! of one application. It owns three things that must outlive a single
//! session mount:
//!
//! - the channel cache, keyed by role (only roles listed in
//!   [`ClientConfig::cached_roles`] are cached),
//! - the teams cache, a copy of the last non-empty team roster seen,
//! - the current room id, used when a connect request names no room.
//!
//! Joining a room is delegated to a [`RoomConnector`]; the broker never
//! retries on its own.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::channel::{lock, RoomChannel};
use crate::error::{QuizRoomError, Result};
use crate::protocol::{RawTeam, Role, RoomId, TeamId};
use crate::transport::Transport;

/// Default grace period for closing a channel before its loop is aborted.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Default delay before the fallback snapshot re-application.
pub const DEFAULT_FALLBACK_SYNC_DELAY: Duration = Duration::from_millis(100);

// ── Configuration ───────────────────────────────────────────────────

/// Tuning for the broker and the sessions built on it.
///
/// # Example
///
/// ```
/// use std::time::Duration;
///
/// use quiz_room_client::broker::ClientConfig;
/// use quiz_room_client::protocol::Role;
///
/// let config = ClientConfig::default()
///     .with_fallback_sync_delay(Duration::from_millis(250))
///     .with_cached_roles([Role::Teacher, Role::Display]);
/// assert!(config.caches(Role::Display));
/// assert!(!config.caches(Role::Student));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// How long [`RoomChannel::leave`] waits for the loop to close the
    /// transport. Defaults to **1 second**; zero aborts immediately.
    pub shutdown_timeout: Duration,
    /// Delay before a fresh connection re-applies the held snapshot once more.
    /// Defaults to **100 ms**.
    pub fallback_sync_delay: Duration,
    /// Roles whose channel survives a session unmount. Defaults to teacher only.
    pub cached_roles: BTreeSet<Role>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            fallback_sync_delay: DEFAULT_FALLBACK_SYNC_DELAY,
            cached_roles: BTreeSet::from([Role::Teacher]),
        }
    }
}

impl ClientConfig {
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_fallback_sync_delay(mut self, delay: Duration) -> Self {
        self.fallback_sync_delay = delay;
        self
    }

    /// Replace the set of cached roles.
    #[must_use]
    pub fn with_cached_roles(mut self, roles: impl IntoIterator<Item = Role>) -> Self {
        self.cached_roles = roles.into_iter().collect();
        self
    }

    pub fn caches(&self, role: Role) -> bool {
        self.cached_roles.contains(&role)
    }
}

// ── Connector ───────────────────────────────────────────────────────

/// A freshly joined room.
pub struct JoinedRoom {
    /// Id of the joined room. Empty when the authority picked the room and
    /// has not named it yet.
    pub room_id: RoomId,
    pub transport: Box<dyn Transport>,
}

impl fmt::Debug for JoinedRoom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinedRoom")
            .field("room_id", &self.room_id)
            .finish_non_exhaustive()
    }
}

/// Establishes the transport for a room join.
///
/// Handshakes and authentication live here, outside the broker.
/// Implementations report an unknown room as [`QuizRoomError::RoomNotFound`].
#[async_trait]
pub trait RoomConnector: Send + Sync + 'static {
    /// Join `room_id`, or a room of the authority's choosing when `None`.
    async fn join(
        &self,
        role: Role,
        room_id: Option<&str>,
        token: Option<&str>,
    ) -> Result<JoinedRoom>;
}

// ── Broker ──────────────────────────────────────────────────────────

/// Registry of cached channels, the teams cache and the current room id.
pub struct ConnectionBroker {
    connector: Arc<dyn RoomConnector>,
    config: ClientConfig,
    channels: StdMutex<HashMap<Role, RoomChannel>>,
    teams_cache: StdMutex<BTreeMap<TeamId, RawTeam>>,
    current_room_id: StdMutex<Option<RoomId>>,
}

impl ConnectionBroker {
    pub fn new(connector: impl RoomConnector, config: ClientConfig) -> Self {
        Self {
            connector: Arc::new(connector),
            config,
            channels: StdMutex::new(HashMap::new()),
            teams_cache: StdMutex::new(BTreeMap::new()),
            current_room_id: StdMutex::new(None),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Get a channel for `role`.
    ///
    /// For a cached role an open cached channel is reused when `room_id` is
    /// `None` or names the cached room. Otherwise the connector joins
    /// `room_id`, falling back to the current room id, and the new channel is
    /// cached for cached roles.
    ///
    /// # Errors
    ///
    /// Propagates connector errors. On [`QuizRoomError::RoomNotFound`] the
    /// current room id is cleared first.
    pub async fn connect(
        &self,
        role: Role,
        room_id: Option<&str>,
        token: Option<&str>,
    ) -> Result<RoomChannel> {
        let room_id = room_id.filter(|id| !id.is_empty());

        if self.config.caches(role) {
            if let Some(cached) = self.existing_channel(role) {
                if room_id.is_none_or(|id| id == cached.room_id()) {
                    info!(role = %role, room_id = %cached.room_id(), "reusing cached room channel");
                    return Ok(cached);
                }
            }
        }

        let target = room_id
            .map(str::to_owned)
            .or_else(|| self.current_room_id());

        match &target {
            Some(id) => debug!(role = %role, room_id = %id, "joining room"),
            None => debug!(role = %role, "joining a new room"),
        }

        let joined = match self.connector.join(role, target.as_deref(), token).await {
            Ok(joined) => joined,
            Err(QuizRoomError::RoomNotFound { room_id }) => {
                warn!(role = %role, room_id = %room_id, "room not found, clearing current room id");
                self.clear_current_room_id();
                return Err(QuizRoomError::RoomNotFound { room_id });
            }
            Err(e) => return Err(e),
        };

        self.set_current_room_id(&joined.room_id);

        let channel = RoomChannel::open(
            joined.transport,
            joined.room_id,
            self.config.shutdown_timeout,
        );

        if self.config.caches(role) {
            lock(&self.channels).insert(role, channel.clone());
            debug!(role = %role, "cached room channel");
        }

        Ok(channel)
    }

    /// The cached, still-open channel for `role`. A closed entry is evicted.
    pub fn existing_channel(&self, role: Role) -> Option<RoomChannel> {
        let mut channels = lock(&self.channels);
        match channels.get(&role) {
            Some(channel) if channel.is_open() => Some(channel.clone()),
            Some(_) => {
                debug!(role = %role, "evicting closed room channel");
                channels.remove(&role);
                None
            }
            None => None,
        }
    }

    /// Leave and forget the cached channel for `role`, if any.
    ///
    /// Leaving a cached role also clears the teams cache, which only exists
    /// for that role's continuity.
    pub async fn leave(&self, role: Role) {
        let channel = lock(&self.channels).remove(&role);
        if let Some(channel) = channel {
            channel.leave().await;
            self.clear_teams_cache();
            info!(role = %role, "left room and cleared cached channel");
        }
    }

    // ── Teams cache ─────────────────────────────────────────────────

    pub fn cached_teams(&self) -> BTreeMap<TeamId, RawTeam> {
        lock(&self.teams_cache).clone()
    }

    /// Remember `teams`. An empty roster never replaces the cache.
    pub fn cache_teams(&self, teams: &BTreeMap<TeamId, RawTeam>) {
        if teams.is_empty() {
            return;
        }
        *lock(&self.teams_cache) = teams.clone();
        debug!(teams = teams.len(), "cached teams");
    }

    pub fn clear_teams_cache(&self) {
        lock(&self.teams_cache).clear();
        debug!("cleared teams cache");
    }

    // ── Current room id ─────────────────────────────────────────────

    pub fn current_room_id(&self) -> Option<RoomId> {
        lock(&self.current_room_id).clone()
    }

    /// Store `room_id` as current. Empty ids are ignored.
    pub fn set_current_room_id(&self, room_id: &str) {
        if room_id.is_empty() {
            return;
        }
        *lock(&self.current_room_id) = Some(room_id.to_owned());
    }

    pub fn clear_current_room_id(&self) {
        lock(&self.current_room_id).take();
    }
}

impl fmt::Debug for ConnectionBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut roles: Vec<Role> = lock(&self.channels).keys().copied().collect();
        roles.sort_unstable();
        f.debug_struct("ConnectionBroker")
            .field("config", &self.config)
            .field("cached_channels", &roles)
            .field("current_room_id", &self.current_room_id())
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
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Transport that never delivers anything and closes cleanly.
    struct IdleTransport {
        closed: tokio::sync::oneshot::Receiver<()>,
    }

    #[async_trait]
    impl Transport for IdleTransport {
        async fn send(&mut self, _message: String) -> Result<()> {
            Ok(())
        }

        async fn recv(&mut self) -> Option<Result<String>> {
            let _ = (&mut self.closed).await;
            None
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    /// Connector that counts joins and fails for room "gone".
    #[derive(Default)]
    struct CountingConnector {
        joins: Arc<AtomicUsize>,
        requested: Arc<StdMutex<Vec<Option<String>>>>,
        senders: Arc<StdMutex<Vec<tokio::sync::oneshot::Sender<()>>>>,
    }

    #[async_trait]
    impl RoomConnector for CountingConnector {
        async fn join(
            &self,
            _role: Role,
            room_id: Option<&str>,
            _token: Option<&str>,
        ) -> Result<JoinedRoom> {
            self.joins.fetch_add(1, Ordering::SeqCst);
            self.requested
                .lock()
                .unwrap()
                .push(room_id.map(str::to_owned));
            if room_id == Some("gone") {
                return Err(QuizRoomError::RoomNotFound {
                    room_id: "gone".into(),
                });
            }
            let (tx, rx) = tokio::sync::oneshot::channel();
            self.senders.lock().unwrap().push(tx);
            Ok(JoinedRoom {
                room_id: room_id.unwrap_or("fresh-room").to_owned(),
                transport: Box::new(IdleTransport { closed: rx }),
            })
        }
    }

    fn broker() -> (ConnectionBroker, Arc<AtomicUsize>, Arc<StdMutex<Vec<Option<String>>>>) {
        let connector = CountingConnector::default();
        let joins = Arc::clone(&connector.joins);
        let requested = Arc::clone(&connector.requested);
        (
            ConnectionBroker::new(connector, ClientConfig::default()),
            joins,
            requested,
        )
    }

    #[test]
    fn config_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
        assert_eq!(config.fallback_sync_delay, Duration::from_millis(100));
        assert!(config.caches(Role::Teacher));
        assert!(!config.caches(Role::Student));
        assert!(!config.caches(Role::Display));
    }

    #[tokio::test]
    async fn teacher_channel_is_reused() {
        let (broker, joins, _) = broker();
        let first = broker.connect(Role::Teacher, None, None).await.unwrap();
        let second = broker.connect(Role::Teacher, None, None).await.unwrap();
        let third = broker
            .connect(Role::Teacher, Some("fresh-room"), None)
            .await
            .unwrap();
        assert!(first.same_channel(&second));
        assert!(first.same_channel(&third));
        assert_eq!(joins.load(Ordering::SeqCst), 1);
        assert_eq!(broker.current_room_id().as_deref(), Some("fresh-room"));
    }

    #[tokio::test]
    async fn teacher_rejoins_for_other_room() {
        let (broker, joins, _) = broker();
        let first = broker.connect(Role::Teacher, Some("r1"), None).await.unwrap();
        let second = broker.connect(Role::Teacher, Some("r2"), None).await.unwrap();
        assert!(!first.same_channel(&second));
        assert_eq!(joins.load(Ordering::SeqCst), 2);
        assert!(broker
            .existing_channel(Role::Teacher)
            .unwrap()
            .same_channel(&second));
    }

    #[tokio::test]
    async fn student_is_never_cached_but_uses_current_room() {
        let (broker, joins, requested) = broker();
        broker.set_current_room_id("r9");
        broker.connect(Role::Student, None, None).await.unwrap();
        broker.connect(Role::Student, None, None).await.unwrap();
        assert_eq!(joins.load(Ordering::SeqCst), 2);
        assert!(broker.existing_channel(Role::Student).is_none());
        assert_eq!(
            *requested.lock().unwrap(),
            vec![Some("r9".to_owned()), Some("r9".to_owned())]
        );
    }

    #[tokio::test]
    async fn room_not_found_clears_current_room() {
        let (broker, _, _) = broker();
        broker.set_current_room_id("gone");
        let err = broker.connect(Role::Display, None, None).await.unwrap_err();
        assert!(matches!(err, QuizRoomError::RoomNotFound { ref room_id } if room_id == "gone"));
        assert_eq!(broker.current_room_id(), None);
    }

    #[tokio::test]
    async fn closed_channel_is_evicted() {
        let (broker, _, _) = broker();
        let channel = broker.connect(Role::Teacher, None, None).await.unwrap();
        channel.leave().await;
        assert!(broker.existing_channel(Role::Teacher).is_none());
        assert!(lock(&broker.channels).is_empty());
    }

    #[tokio::test]
    async fn leave_forgets_channel_and_teams() {
        let (broker, _, _) = broker();
        let channel = broker.connect(Role::Teacher, None, None).await.unwrap();
        broker.cache_teams(&BTreeMap::from([("A".to_owned(), RawTeam::default())]));
        broker.leave(Role::Teacher).await;
        assert!(!channel.is_open());
        assert!(broker.existing_channel(Role::Teacher).is_none());
        assert!(broker.cached_teams().is_empty());
    }

    #[test]
    fn empty_roster_never_replaces_cache() {
        let (broker, _, _) = broker();
        broker.cache_teams(&BTreeMap::from([("A".to_owned(), RawTeam::default())]));
        broker.cache_teams(&BTreeMap::new());
        assert_eq!(broker.cached_teams().len(), 1);
        broker.clear_teams_cache();
        assert!(broker.cached_teams().is_empty());
    }

    #[test]
    fn empty_room_id_is_ignored() {
        let (broker, _, _) = broker();
        broker.set_current_room_id("r1");
        broker.set_current_room_id("");
        assert_eq!(broker.current_room_id().as_deref(), Some("r1"));
        broker.clear_current_room_id();
        assert_eq!(broker.current_room_id(), None);
    }
}
