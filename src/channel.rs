//! One live connection to a room.
//!
//! [`RoomChannel`] is a cheap, cloneable handle around a background loop task
//! that owns the [`Transport`]. The loop decodes inbound frames, folds
//! `state-sync` pushes into the held [`StateSnapshot`], and calls the handler
//! registered for each discrete message. Outbound [`ClientMessage`]s reach the
//! loop over an unbounded command channel.
//!
//! Handlers run synchronously inside the loop task, in arrival order. The
//! loop starts before anyone can call [`RoomChannel::attach`], so everything
//! received until the first attach is queued and replayed, in order, to the
//! first handler table. After that the table can be swapped at any time; a
//! message that arrives while no handler is registered for its type is logged
//! and dropped, but `state-sync` content is always retained in the snapshot.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::error::{QuizRoomError, Result};
use crate::protocol::{ClientMessage, MessageType, RoomId, ServerMessage, StateSnapshot};
use crate::transport::Transport;

/// Lock a std mutex, recovering the data if a handler panicked while holding it.
pub(crate) fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Handlers ────────────────────────────────────────────────────────

/// Why a channel stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaveReason {
    /// [`RoomChannel::leave`] was called.
    Left,
    /// The authority closed the connection.
    ClosedByAuthority,
    /// The transport failed.
    TransportError(String),
}

impl fmt::Display for LeaveReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Left => f.write_str("left"),
            Self::ClosedByAuthority => f.write_str("closed by authority"),
            Self::TransportError(e) => write!(f, "transport error: {e}"),
        }
    }
}

type MessageHandler = Box<dyn Fn(&ServerMessage) + Send + Sync>;
type SnapshotHandler = Box<dyn Fn(&StateSnapshot) + Send + Sync>;
type LeaveHandler = Box<dyn Fn(&LeaveReason) + Send + Sync>;

/// Callbacks for one channel.
///
/// # Example
///
/// ```
/// use quiz_room_client::channel::Handlers;
/// use quiz_room_client::protocol::MessageType;
///
/// let handlers = Handlers::new()
///     .on_message(MessageType::QuestionUpdate, |msg| println!("{}", msg.name()))
///     .on_state_change(|snapshot| println!("{} teams", snapshot.team_count()));
/// assert!(handlers.handles(MessageType::QuestionUpdate));
/// assert!(!handlers.handles(MessageType::TimerUpdate));
/// ```
#[derive(Default)]
pub struct Handlers {
    messages: HashMap<MessageType, MessageHandler>,
    state_change: Option<SnapshotHandler>,
    leave: Option<LeaveHandler>,
}

impl Handlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle every message of `message_type`. Replaces any earlier handler
    /// for the same type.
    #[must_use]
    pub fn on_message(
        mut self,
        message_type: MessageType,
        handler: impl Fn(&ServerMessage) + Send + Sync + 'static,
    ) -> Self {
        self.messages.insert(message_type, Box::new(handler));
        self
    }

    /// Called with the merged snapshot after every `state-sync`.
    #[must_use]
    pub fn on_state_change(
        mut self,
        handler: impl Fn(&StateSnapshot) + Send + Sync + 'static,
    ) -> Self {
        self.state_change = Some(Box::new(handler));
        self
    }

    /// Called once when the channel stops.
    #[must_use]
    pub fn on_leave(mut self, handler: impl Fn(&LeaveReason) + Send + Sync + 'static) -> Self {
        self.leave = Some(Box::new(handler));
        self
    }

    pub fn handles(&self, message_type: MessageType) -> bool {
        self.messages.contains_key(&message_type)
    }
}

impl fmt::Debug for Handlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<_> = self.messages.keys().map(|t| t.as_str()).collect();
        types.sort_unstable();
        f.debug_struct("Handlers")
            .field("messages", &types)
            .field("state_change", &self.state_change.is_some())
            .field("leave", &self.leave.is_some())
            .finish()
    }
}

// ── Shared state ────────────────────────────────────────────────────

/// Most deliveries queued before the first attach. Older ones are dropped.
pub const PENDING_LIMIT: usize = 256;

/// One decoded inbound frame, ready for a handler table.
enum Delivery {
    /// The merged snapshot right after a `state-sync`.
    Snapshot(StateSnapshot),
    Message(ServerMessage),
}

/// Where deliveries go.
enum Router {
    /// No handlers attached yet.
    Pending(VecDeque<Delivery>),
    Attached(Arc<Handlers>),
}

/// State shared between the handles and the loop task.
struct ChannelShared {
    room_id: RoomId,
    open: AtomicBool,
    closed_reason: StdMutex<Option<LeaveReason>>,
    snapshot: StdMutex<StateSnapshot>,
    router: StdMutex<Router>,
    /// Held for a whole delivery, and by `attach` while it swaps and replays,
    /// so handlers never run concurrently or out of order.
    delivery: StdMutex<()>,
}

impl ChannelShared {
    fn handlers(&self) -> Option<Arc<Handlers>> {
        match &*lock(&self.router) {
            Router::Attached(handlers) => Some(Arc::clone(handlers)),
            Router::Pending(_) => None,
        }
    }

    /// Decode one inbound frame and route it.
    fn dispatch(&self, text: &str) {
        let message = match serde_json::from_str::<ServerMessage>(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(room_id = %self.room_id, "failed to deserialize server message: {e}, raw: {text}");
                return;
            }
        };

        let _delivery = lock(&self.delivery);

        let delivery = match message {
            ServerMessage::StateSync(snapshot) => {
                let mut held = lock(&self.snapshot);
                held.absorb(snapshot);
                Delivery::Snapshot(held.clone())
            }
            other => Delivery::Message(other),
        };

        // Handlers run with the router unlocked so they may read the channel.
        let handlers = {
            let mut router = lock(&self.router);
            match &mut *router {
                Router::Attached(handlers) => Arc::clone(handlers),
                Router::Pending(queue) => {
                    if queue.len() >= PENDING_LIMIT {
                        warn!(room_id = %self.room_id, "pending queue full, dropping oldest message");
                        queue.pop_front();
                    }
                    queue.push_back(delivery);
                    return;
                }
            }
        };
        self.deliver(&handlers, &delivery);
    }

    fn deliver(&self, handlers: &Handlers, delivery: &Delivery) {
        match delivery {
            Delivery::Snapshot(merged) => {
                if let Some(handler) = &handlers.state_change {
                    handler(merged);
                }
            }
            Delivery::Message(message) => match message
                .message_type()
                .and_then(|t| handlers.messages.get(&t))
            {
                Some(handler) => handler(message),
                None => warn!(
                    room_id = %self.room_id,
                    message_type = message.name(),
                    "no handler registered, dropping message"
                ),
            },
        }
    }

    /// Mark the channel closed and fire the leave handler, once.
    fn finish(&self, reason: LeaveReason) {
        if !self.open.swap(false, Ordering::AcqRel) {
            return;
        }
        debug!(room_id = %self.room_id, %reason, "room channel closed");
        let _delivery = lock(&self.delivery);
        *lock(&self.closed_reason) = Some(reason.clone());
        if let Some(handler) = self.handlers().as_ref().and_then(|h| h.leave.as_ref()) {
            handler(&reason);
        }
    }
}

// ── Channel handle ──────────────────────────────────────────────────

struct ChannelInner {
    shared: Arc<ChannelShared>,
    cmd_tx: mpsc::UnboundedSender<ClientMessage>,
    task: StdMutex<Option<JoinHandle<()>>>,
    shutdown_tx: StdMutex<Option<oneshot::Sender<()>>>,
    shutdown_timeout: Duration,
}

impl Drop for ChannelInner {
    fn drop(&mut self) {
        // No executor context here for a graceful close; abort instead.
        if let Some(task) = lock(&self.task).take() {
            task.abort();
        }
    }
}

/// Handle to one live room connection. Clones share the same connection;
/// dropping the last clone aborts the loop task.
#[derive(Clone)]
pub struct RoomChannel {
    inner: Arc<ChannelInner>,
}

impl RoomChannel {
    /// Spawn the loop task for a connected transport.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn open(transport: impl Transport, room_id: RoomId, shutdown_timeout: Duration) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<ClientMessage>();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let shared = Arc::new(ChannelShared {
            room_id,
            open: AtomicBool::new(true),
            closed_reason: StdMutex::new(None),
            snapshot: StdMutex::new(StateSnapshot::default()),
            router: StdMutex::new(Router::Pending(VecDeque::new())),
            delivery: StdMutex::new(()),
        });

        let task = tokio::spawn(channel_loop(
            transport,
            cmd_rx,
            Arc::clone(&shared),
            shutdown_rx,
        ));

        Self {
            inner: Arc::new(ChannelInner {
                shared,
                cmd_tx,
                task: StdMutex::new(Some(task)),
                shutdown_tx: StdMutex::new(Some(shutdown_tx)),
                shutdown_timeout,
            }),
        }
    }

    /// Replace the whole handler table.
    ///
    /// The first attach replays everything received so far, in arrival
    /// order, before any later message is delivered. If the channel already
    /// closed, the new leave handler then fires with the recorded reason.
    /// Must not be called from inside a handler.
    pub fn attach(&self, handlers: Handlers) {
        let shared = &self.inner.shared;
        debug!(room_id = %self.room_id(), ?handlers, "attaching handlers");
        let handlers = Arc::new(handlers);

        let _delivery = lock(&shared.delivery);
        let previous = std::mem::replace(
            &mut *lock(&shared.router),
            Router::Attached(Arc::clone(&handlers)),
        );
        let Router::Pending(queue) = previous else {
            return;
        };

        if !queue.is_empty() {
            debug!(room_id = %self.room_id(), count = queue.len(), "replaying queued messages");
        }
        for delivery in &queue {
            shared.deliver(&handlers, delivery);
        }

        let closed = lock(&shared.closed_reason).clone();
        if let (Some(reason), Some(handler)) = (closed, handlers.leave.as_ref()) {
            handler(&reason);
        }
    }

    /// Queue a message for the authority.
    ///
    /// # Errors
    ///
    /// Returns [`QuizRoomError::NotConnected`] if the channel has closed.
    pub fn send(&self, message: ClientMessage) -> Result<()> {
        if !self.is_open() {
            return Err(QuizRoomError::NotConnected);
        }
        self.inner
            .cmd_tx
            .send(message)
            .map_err(|_| QuizRoomError::NotConnected)
    }

    /// The latest merged snapshot.
    pub fn snapshot(&self) -> StateSnapshot {
        lock(&self.inner.shared.snapshot).clone()
    }

    pub fn is_open(&self) -> bool {
        self.inner.shared.open.load(Ordering::Acquire)
    }

    pub fn room_id(&self) -> &str {
        &self.inner.shared.room_id
    }

    /// Whether `other` is a handle to the same connection.
    pub fn same_channel(&self, other: &RoomChannel) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Close the transport and stop the loop. Waits at most the configured
    /// shutdown timeout, then aborts. Calling it again is a no-op. Must not
    /// be called from inside a handler.
    pub async fn leave(&self) {
        debug!(room_id = %self.room_id(), "leaving room channel");

        let shutdown_tx = lock(&self.inner.shutdown_tx).take();
        if let Some(tx) = shutdown_tx {
            let _ = tx.send(());
        }

        let task = lock(&self.inner.task).take();
        if let Some(mut task) = task {
            match tokio::time::timeout(self.inner.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("channel loop terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("channel loop did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("channel loop aborted: {join_err}");
                    }
                }
            }
        }

        self.inner.shared.finish(LeaveReason::Left);
    }
}

impl fmt::Debug for RoomChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoomChannel")
            .field("room_id", &self.room_id())
            .field("open", &self.is_open())
            .finish()
    }
}

// ── Loop ────────────────────────────────────────────────────────────

/// Multiplexes outbound commands, the shutdown signal and inbound frames.
///
/// Exits when shutdown is requested, the command channel closes, the
/// transport reports `None` or any transport error occurs.
async fn channel_loop(
    mut transport: impl Transport,
    mut cmd_rx: mpsc::UnboundedReceiver<ClientMessage>,
    shared: Arc<ChannelShared>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    debug!(room_id = %shared.room_id, "channel loop started");

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(message) => match serde_json::to_string(&message) {
                        Ok(json) => {
                            if let Err(e) = transport.send(json).await {
                                error!("transport send error: {e}");
                                shared.finish(LeaveReason::TransportError(e.to_string()));
                                break;
                            }
                        }
                        Err(e) => {
                            error!("failed to serialize ClientMessage: {e}");
                        }
                    },
                    None => {
                        debug!("command channel closed, shutting down channel loop");
                        let _ = transport.close().await;
                        shared.finish(LeaveReason::Left);
                        break;
                    }
                }
            }

            _ = &mut shutdown_rx => {
                debug!("shutdown signal received");
                if let Err(e) = transport.close().await {
                    debug!("transport close failed: {e}");
                }
                shared.finish(LeaveReason::Left);
                break;
            }

            incoming = transport.recv() => {
                match incoming {
                    Some(Ok(text)) => shared.dispatch(&text),
                    Some(Err(e)) => {
                        error!("transport receive error: {e}");
                        shared.finish(LeaveReason::TransportError(e.to_string()));
                        break;
                    }
                    None => {
                        debug!("transport closed by authority");
                        shared.finish(LeaveReason::ClosedByAuthority);
                        break;
                    }
                }
            }
        }
    }

    debug!(room_id = %shared.room_id, "channel loop exited");
}

// ── Tests ───────────────────────────────────────────────────────────

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
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;

    use super::*;

    /// Transport driven by the test through a pair of channels.
    struct PipeTransport {
        inbound: mpsc::UnboundedReceiver<String>,
        outbound: mpsc::UnboundedSender<String>,
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Transport for PipeTransport {
        async fn send(&mut self, message: String) -> std::result::Result<(), QuizRoomError> {
            self.outbound
                .send(message)
                .map_err(|e| QuizRoomError::TransportSend(e.to_string()))
        }

        async fn recv(&mut self) -> Option<std::result::Result<String, QuizRoomError>> {
            self.inbound.recv().await.map(Ok)
        }

        async fn close(&mut self) -> std::result::Result<(), QuizRoomError> {
            self.closed.store(true, Ordering::Release);
            Ok(())
        }
    }

    struct Pipe {
        to_client: mpsc::UnboundedSender<String>,
        from_client: mpsc::UnboundedReceiver<String>,
        closed: Arc<AtomicBool>,
    }

    fn open_pipe() -> (RoomChannel, Pipe) {
        let (to_client, inbound) = mpsc::unbounded_channel();
        let (outbound, from_client) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        let transport = PipeTransport {
            inbound,
            outbound,
            closed: Arc::clone(&closed),
        };
        let channel = RoomChannel::open(transport, "room-1".into(), Duration::from_secs(1));
        (
            channel,
            Pipe {
                to_client,
                from_client,
                closed,
            },
        )
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn snapshot_is_held_without_handlers() {
        let (channel, pipe) = open_pipe();
        pipe.to_client
            .send(r#"{"type":"state-sync","data":{"questionText":"Q1","teams":{"A":{}}}}"#.into())
            .unwrap();
        pipe.to_client
            .send(r#"{"type":"state-sync","data":{"timeRemaining":12}}"#.into())
            .unwrap();
        settle().await;

        let snapshot = channel.snapshot();
        assert_eq!(snapshot.question_text.as_deref(), Some("Q1"));
        assert_eq!(snapshot.time_remaining, Some(12));
        assert_eq!(snapshot.team_count(), 1);
    }

    #[tokio::test]
    async fn registered_handler_receives_message() {
        let (channel, pipe) = open_pipe();
        let seen = Arc::new(StdMutex::new(Vec::<String>::new()));
        let sink = Arc::clone(&seen);
        channel.attach(Handlers::new().on_message(MessageType::QuestionUpdate, move |m| {
            sink.lock().unwrap().push(m.name().to_owned());
        }));

        pipe.to_client
            .send(r#"{"type":"QUESTION_UPDATE","data":{"question":"Q"}}"#.into())
            .unwrap();
        pipe.to_client
            .send(r#"{"type":"TIMER_UPDATE","data":{"timeRemaining":3}}"#.into())
            .unwrap();
        pipe.to_client.send("not json".into()).unwrap();
        settle().await;

        assert_eq!(*seen.lock().unwrap(), vec!["QUESTION_UPDATE".to_owned()]);
        assert!(channel.is_open());
    }

    #[tokio::test]
    async fn send_serializes_client_message() {
        let (channel, mut pipe) = open_pipe();
        channel
            .send(ClientMessage::Suggestion {
                text: "four".into(),
            })
            .unwrap();
        let sent = tokio::time::timeout(Duration::from_secs(1), pipe.from_client.recv())
            .await
            .unwrap()
            .unwrap();
        let json: serde_json::Value = serde_json::from_str(&sent).unwrap();
        assert_eq!(json["type"], "suggestion");
        assert_eq!(json["data"]["text"], "four");
    }

    #[tokio::test]
    async fn leave_closes_transport_and_fires_leave_handler_once() {
        let (channel, pipe) = open_pipe();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        channel.attach(Handlers::new().on_leave(move |reason| {
            assert_eq!(*reason, LeaveReason::Left);
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        channel.leave().await;
        channel.leave().await;

        assert!(pipe.closed.load(Ordering::Acquire));
        assert!(!channel.is_open());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(matches!(
            channel.send(ClientMessage::LockAnswer {
                answer: "x".into()
            }),
            Err(QuizRoomError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn authority_close_is_reported() {
        let (channel, pipe) = open_pipe();
        let reason = Arc::new(StdMutex::new(None));
        let slot = Arc::clone(&reason);
        channel.attach(Handlers::new().on_leave(move |r| {
            *slot.lock().unwrap() = Some(r.clone());
        }));

        drop(pipe.to_client);
        settle().await;

        assert!(!channel.is_open());
        assert_eq!(
            *reason.lock().unwrap(),
            Some(LeaveReason::ClosedByAuthority)
        );
    }

    /// Records questions as `q:<text>` and snapshots as `sync`.
    fn recording_handlers(log: &Arc<StdMutex<Vec<String>>>) -> Handlers {
        let questions = Arc::clone(log);
        let syncs = Arc::clone(log);
        Handlers::new()
            .on_message(MessageType::QuestionUpdate, move |m| {
                if let ServerMessage::QuestionUpdate(payload) = m {
                    let text = payload.question.clone().unwrap_or_default();
                    questions.lock().unwrap().push(format!("q:{text}"));
                }
            })
            .on_state_change(move |_| syncs.lock().unwrap().push("sync".into()))
    }

    fn question(text: &str) -> String {
        format!(r#"{{"type":"QUESTION_UPDATE","data":{{"question":"{text}"}}}}"#)
    }

    #[tokio::test]
    async fn messages_before_first_attach_are_replayed_in_order() {
        let (channel, pipe) = open_pipe();
        pipe.to_client.send(question("1")).unwrap();
        pipe.to_client
            .send(r#"{"type":"state-sync","data":{"timeRemaining":4}}"#.into())
            .unwrap();
        pipe.to_client.send(question("2")).unwrap();
        settle().await;

        let log = Arc::new(StdMutex::new(Vec::new()));
        channel.attach(recording_handlers(&log));
        assert_eq!(*log.lock().unwrap(), ["q:1", "sync", "q:2"]);

        pipe.to_client.send(question("3")).unwrap();
        settle().await;
        assert_eq!(*log.lock().unwrap(), ["q:1", "sync", "q:2", "q:3"]);

        // Only the first table gets the backlog.
        let later = Arc::new(StdMutex::new(Vec::new()));
        channel.attach(recording_handlers(&later));
        assert!(later.lock().unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn attach_racing_the_loop_keeps_every_message_in_order() {
        for _ in 0..20 {
            let (channel, pipe) = open_pipe();
            let to_client = pipe.to_client.clone();
            let pusher = tokio::spawn(async move {
                for i in 0..100 {
                    to_client.send(question(&i.to_string())).unwrap();
                    if i % 10 == 0 {
                        tokio::task::yield_now().await;
                    }
                }
            });

            let log = Arc::new(StdMutex::new(Vec::new()));
            channel.attach(recording_handlers(&log));
            pusher.await.unwrap();

            let expected: Vec<String> = (0..100).map(|i| format!("q:{i}")).collect();
            let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
            while log.lock().unwrap().len() < expected.len() {
                assert!(tokio::time::Instant::now() < deadline, "messages lost");
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            assert_eq!(*log.lock().unwrap(), expected);
        }
    }

    #[tokio::test]
    async fn pending_queue_is_bounded() {
        let (channel, pipe) = open_pipe();
        for i in 0..PENDING_LIMIT + 5 {
            pipe.to_client.send(question(&i.to_string())).unwrap();
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        let log = Arc::new(StdMutex::new(Vec::new()));
        channel.attach(recording_handlers(&log));
        let log = log.lock().unwrap();
        assert_eq!(log.len(), PENDING_LIMIT);
        assert_eq!(log[0], "q:5");
    }

    #[tokio::test]
    async fn close_before_first_attach_reaches_leave_handler() {
        let (channel, pipe) = open_pipe();
        pipe.to_client.send(question("last")).unwrap();
        drop(pipe.to_client);
        settle().await;
        assert!(!channel.is_open());

        let log = Arc::new(StdMutex::new(Vec::new()));
        let reason = Arc::new(StdMutex::new(None));
        let slot = Arc::clone(&reason);
        channel.attach(recording_handlers(&log).on_leave(move |r| {
            *slot.lock().unwrap() = Some(r.clone());
        }));

        assert_eq!(*log.lock().unwrap(), ["q:last"]);
        assert_eq!(
            *reason.lock().unwrap(),
            Some(LeaveReason::ClosedByAuthority)
        );
    }
}
