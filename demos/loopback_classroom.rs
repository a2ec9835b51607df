//! # Loopback Classroom
//!
//! Runs a teacher, a student and a display against a tiny in-process
//! authority. Shows how to:
//!
//! - implement [`RoomConnector`] for a custom backend,
//! - mount [`QuizSession`]s and watch their state,
//! - submit gated actions and see moderation block them locally.
//!
//! ## Running
//!
//! ```sh
//! RUST_LOG=quiz_room_client=debug cargo run --example loopback_classroom
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use quiz_room_client::protocol::{ClientMessage, Role};
use quiz_room_client::view::{display_view, round_view};
use quiz_room_client::{
    ClientConfig, ConnectionBroker, JoinedRoom, QuizRoomError, QuizSession, RoomConnector,
    Transport,
};
use serde_json::json;
use tokio::sync::{broadcast, mpsc};

// ─────────────────────────────────────────────────────────────────────
// Step 1: A loopback transport per participant
// ─────────────────────────────────────────────────────────────────────

struct LoopbackTransport {
    role: Role,
    inbound: broadcast::Receiver<String>,
    outbound: mpsc::UnboundedSender<(Role, String)>,
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&mut self, message: String) -> Result<(), QuizRoomError> {
        self.outbound
            .send((self.role, message))
            .map_err(|e| QuizRoomError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, QuizRoomError>> {
        loop {
            match self.inbound.recv().await {
                Ok(frame) => return Some(Ok(frame)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "loopback lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    async fn close(&mut self) -> Result<(), QuizRoomError> {
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 2: A connector that joins everyone to the same room
// ─────────────────────────────────────────────────────────────────────

struct LoopbackConnector {
    room_id: String,
    frames: broadcast::Sender<String>,
    outbound: mpsc::UnboundedSender<(Role, String)>,
}

#[async_trait]
impl RoomConnector for LoopbackConnector {
    async fn join(
        &self,
        role: Role,
        room_id: Option<&str>,
        _token: Option<&str>,
    ) -> Result<JoinedRoom, QuizRoomError> {
        if let Some(requested) = room_id {
            if requested != self.room_id {
                return Err(QuizRoomError::RoomNotFound {
                    room_id: requested.to_owned(),
                });
            }
        }
        Ok(JoinedRoom {
            room_id: self.room_id.clone(),
            transport: Box::new(LoopbackTransport {
                role,
                inbound: self.frames.subscribe(),
                outbound: self.outbound.clone(),
            }),
        })
    }
}

fn frame(kind: &str, data: serde_json::Value) -> String {
    json!({ "type": kind, "data": data }).to_string()
}

// ─────────────────────────────────────────────────────────────────────
// Step 3: Drive a round
// ─────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let (frames, _) = broadcast::channel(64);
    let (outbound, mut from_clients) = mpsc::unbounded_channel();
    let broker = Arc::new(ConnectionBroker::new(
        LoopbackConnector {
            room_id: "room-1".into(),
            frames: frames.clone(),
            outbound,
        },
        ClientConfig::default(),
    ));

    let teacher = QuizSession::new(Arc::clone(&broker), Role::Teacher);
    let student = QuizSession::new(Arc::clone(&broker), Role::Student);
    let display = QuizSession::new(Arc::clone(&broker), Role::Display);
    teacher.connect().await?;
    student.connect().await?;
    display.connect().await?;

    // The fake authority: print whatever clients send.
    tokio::spawn(async move {
        while let Some((role, message)) = from_clients.recv().await {
            println!("authority <- {role}: {message}");
        }
    });

    let push = |kind: &str, data: serde_json::Value| {
        let _ = frames.send(frame(kind, data));
    };

    push(
        "state-sync",
        json!({
            "roundState": "ROUND_WAITING",
            "teams": {
                "owls": { "name": "Owls", "gold": 5, "writerPlayerId": "ana" },
                "foxes": { "name": "Foxes", "gold": 3, "writerPlayerId": "ben" }
            }
        }),
    );
    push(
        "ROUND_STARTED",
        json!({ "roundNumber": 1, "question": "What is 6 x 7?", "duration": 30 }),
    );
    tokio::time::sleep(Duration::from_millis(50)).await;

    println!("display: {:?}", display_view(&display.state()).headline);
    println!("student: {:?}", round_view(&student.state()).status_message);

    let sent = student.submit(
        "cy",
        Some("owls"),
        ClientMessage::Suggestion { text: "42".into() },
    )?;
    println!("cy suggestion sent: {sent}");

    push("MODERATION_UPDATE", json!({ "mutedPlayers": ["cy"] }));
    tokio::time::sleep(Duration::from_millis(50)).await;

    let sent = student.submit(
        "cy",
        Some("owls"),
        ClientMessage::Suggestion { text: "43".into() },
    )?;
    println!("cy suggestion after mute sent: {sent}");

    push("ROUND_ENDED", serde_json::Value::Null);
    tokio::time::sleep(Duration::from_millis(50)).await;
    println!("display: {:?}", display_view(&display.state()).headline);

    // Navigating away keeps the teacher channel; coming back reuses it.
    teacher.unmount();
    let teacher_again = QuizSession::new(Arc::clone(&broker), Role::Teacher);
    teacher_again.connect().await?;
    println!(
        "teacher remounted with {} teams",
        teacher_again.state().teams.len()
    );

    teacher_again.leave().await;
    student.leave().await;
    display.leave().await;
    Ok(())
}
