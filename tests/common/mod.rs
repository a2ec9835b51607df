#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for quiz room client integration tests.
//!
//! Provides a scripted [`MockTransport`], a [`loopback`] transport driven by
//! an [`Authority`] handle, a [`MockConnector`] that hands out scripted joins,
//! and helpers for building server message JSON.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use quiz_room_client::protocol::Role;
use quiz_room_client::{JoinedRoom, QuizRoomError, RoomConnector, Transport};
use serde_json::{json, Value};
use tokio::sync::mpsc;

// ── MockTransport ───────────────────────────────────────────────────

/// Scripted server frames are consumed in order by `recv()`; everything the
/// client sends is recorded in `sent`.
pub struct MockTransport {
    incoming: VecDeque<Option<Result<String, QuizRoomError>>>,
    pub sent: Arc<StdMutex<Vec<String>>>,
    pub closed: Arc<AtomicBool>,
}

impl MockTransport {
    pub fn new(
        incoming: Vec<Option<Result<String, QuizRoomError>>>,
    ) -> (Self, Arc<StdMutex<Vec<String>>>, Arc<AtomicBool>) {
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let transport = Self {
            incoming: VecDeque::from(incoming),
            sent: Arc::clone(&sent),
            closed: Arc::clone(&closed),
        };
        (transport, sent, closed)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, message: String) -> Result<(), QuizRoomError> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, QuizRoomError>> {
        if let Some(item) = self.incoming.pop_front() {
            item
        } else {
            // Out of script: stay open until the channel shuts down.
            std::future::pending().await
        }
    }

    async fn close(&mut self) -> Result<(), QuizRoomError> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

// ── Loopback ────────────────────────────────────────────────────────

/// Client side of a loopback pair.
pub struct LoopbackTransport {
    inbound: mpsc::UnboundedReceiver<String>,
    sent: Arc<StdMutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&mut self, message: String) -> Result<(), QuizRoomError> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, QuizRoomError>> {
        self.inbound.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), QuizRoomError> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

/// Authority side of a loopback pair.
#[derive(Clone)]
pub struct Authority {
    to_client: Arc<StdMutex<Option<mpsc::UnboundedSender<String>>>>,
    sent: Arc<StdMutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

impl Authority {
    /// Push one frame to the client. Frames pushed before the channel opens
    /// are buffered.
    pub fn push(&self, frame: impl Into<String>) {
        if let Some(tx) = self.to_client.lock().unwrap().as_ref() {
            let _ = tx.send(frame.into());
        }
    }

    /// Everything the client sent, decoded.
    pub fn sent(&self) -> Vec<Value> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|s| serde_json::from_str(s).unwrap())
            .collect()
    }

    /// Whether the client closed the transport.
    pub fn client_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }

    /// Close the connection from the authority side.
    pub fn hang_up(&self) {
        self.to_client.lock().unwrap().take();
    }
}

pub fn loopback() -> (LoopbackTransport, Authority) {
    let (tx, rx) = mpsc::unbounded_channel();
    let sent = Arc::new(StdMutex::new(Vec::new()));
    let closed = Arc::new(AtomicBool::new(false));
    (
        LoopbackTransport {
            inbound: rx,
            sent: Arc::clone(&sent),
            closed: Arc::clone(&closed),
        },
        Authority {
            to_client: Arc::new(StdMutex::new(Some(tx))),
            sent,
            closed,
        },
    )
}

// ── MockConnector ───────────────────────────────────────────────────

/// One recorded call to [`RoomConnector::join`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinCall {
    pub role: Role,
    pub room_id: Option<String>,
    pub token: Option<String>,
}

enum Scripted {
    Room(String, LoopbackTransport),
    Fail(QuizRoomError),
}

/// Hands out scripted joins in order. Clones share the script.
#[derive(Clone, Default)]
pub struct MockConnector {
    script: Arc<StdMutex<VecDeque<Scripted>>>,
    calls: Arc<StdMutex<Vec<JoinCall>>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a successful join of `room_id` and return its authority end.
    pub fn script_room(&self, room_id: &str) -> Authority {
        let (transport, authority) = loopback();
        self.script
            .lock()
            .unwrap()
            .push_back(Scripted::Room(room_id.to_owned(), transport));
        authority
    }

    /// Script a failed join.
    pub fn script_error(&self, error: QuizRoomError) {
        self.script.lock().unwrap().push_back(Scripted::Fail(error));
    }

    pub fn calls(&self) -> Vec<JoinCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RoomConnector for MockConnector {
    async fn join(
        &self,
        role: Role,
        room_id: Option<&str>,
        token: Option<&str>,
    ) -> Result<JoinedRoom, QuizRoomError> {
        self.calls.lock().unwrap().push(JoinCall {
            role,
            room_id: room_id.map(str::to_owned),
            token: token.map(str::to_owned),
        });
        match self.script.lock().unwrap().pop_front() {
            Some(Scripted::Room(room_id, transport)) => Ok(JoinedRoom {
                room_id,
                transport: Box::new(transport),
            }),
            Some(Scripted::Fail(error)) => Err(error),
            None => Err(QuizRoomError::ConnectionFailed("no scripted room".into())),
        }
    }
}

// ── JSON helpers ────────────────────────────────────────────────────

/// A server envelope.
pub fn message(kind: &str, data: Value) -> String {
    json!({ "type": kind, "data": data }).to_string()
}

/// A `state-sync` envelope.
pub fn state_sync(data: Value) -> String {
    message("state-sync", data)
}

/// A raw team record with a name, gold and writer.
pub fn team(name: &str, gold: i64, writer: &str) -> Value {
    json!({ "name": name, "gold": gold, "writerPlayerId": writer })
}

/// Poll `condition` until it holds, failing the test after one second.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not met within 1s");
}

/// Let spawned tasks run without advancing time meaningfully.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}
