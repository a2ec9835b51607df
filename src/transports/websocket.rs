//! WebSocket transport and connector using `tokio-tungstenite`.
//!
//! [`WebSocketTransport`] carries one JSON envelope per text frame.
//! [`WebSocketConnector`] is a [`RoomConnector`] that maps a join request onto
//! a room URL below a base endpoint:
//!
//! ```text
//! {base}/{room_id}?role={role}&token={token}   join an existing room
//! {base}?role={role}&token={token}             let the authority pick a room
//! ```
//!
//! An HTTP 404 during the upgrade is reported as
//! [`QuizRoomError::RoomNotFound`]. Both `ws://` and `wss://` are supported.
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), quiz_room_client::error::QuizRoomError> {
//! use quiz_room_client::transport::Transport;
//! use quiz_room_client::transports::WebSocketTransport;
//!
//! let mut transport = WebSocketTransport::connect("ws://localhost:2567/quiz/room-1?role=display").await?;
//! if let Some(Ok(msg)) = transport.recv().await {
//!     println!("received: {msg}");
//! }
//! transport.close().await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::broker::{JoinedRoom, RoomConnector};
use crate::error::QuizRoomError;
use crate::protocol::Role;
use crate::transport::Transport;

/// The underlying WebSocket stream.
pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// A [`Transport`] backed by a WebSocket connection.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) is cancel-safe: dropping its future before it
/// completes loses no frames.
#[derive(Debug)]
pub struct WebSocketTransport {
    stream: WsStream,
    closed: bool,
}

impl WebSocketTransport {
    /// Open a WebSocket connection to `url`.
    ///
    /// # Errors
    ///
    /// Returns [`QuizRoomError::RoomNotFound`] if the upgrade is answered with
    /// 404, [`QuizRoomError::Io`] for socket failures and
    /// [`QuizRoomError::ConnectionFailed`] for anything else the handshake
    /// rejects.
    pub async fn connect(url: &str) -> Result<Self, QuizRoomError> {
        tracing::debug!(url = %url, "connecting to quiz room");

        let (stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| map_connect_error(url, e))?;

        tracing::info!(url = %url, "WebSocket connection established");
        Ok(Self::from_stream(stream))
    }

    /// Wrap an already-established stream (custom TLS, proxies, headers).
    pub fn from_stream(stream: WsStream) -> Self {
        Self {
            stream,
            closed: false,
        }
    }

    /// [`connect`](Self::connect) with a deadline.
    ///
    /// # Errors
    ///
    /// Returns [`QuizRoomError::Timeout`] if the deadline elapses, or any
    /// error [`connect`](Self::connect) may return.
    pub async fn connect_with_timeout(url: &str, timeout: Duration) -> Result<Self, QuizRoomError> {
        tokio::time::timeout(timeout, Self::connect(url))
            .await
            .map_err(|_| QuizRoomError::Timeout)?
    }
}

fn map_connect_error(url: &str, e: WsError) -> QuizRoomError {
    match e {
        WsError::Http(response) if response.status().as_u16() == 404 => {
            let room_id = url
                .split('?')
                .next()
                .and_then(|path| path.rsplit('/').next())
                .unwrap_or_default()
                .to_owned();
            QuizRoomError::RoomNotFound { room_id }
        }
        WsError::Io(io) => QuizRoomError::Io(io),
        other => QuizRoomError::ConnectionFailed(other.to_string()),
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, message: String) -> Result<(), QuizRoomError> {
        if self.closed {
            return Err(QuizRoomError::TransportClosed);
        }
        self.stream
            .send(Message::Text(message.into()))
            .await
            .map_err(|e| QuizRoomError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, QuizRoomError>> {
        loop {
            let msg = match self.stream.next().await {
                Some(Ok(msg)) => msg,
                Some(Err(e)) => return Some(Err(QuizRoomError::TransportReceive(e.to_string()))),
                None => return None,
            };

            match msg {
                Message::Text(text) => return Some(Ok(text.to_string())),
                Message::Close(frame) => {
                    tracing::debug!(?frame, "authority sent close frame");
                    return None;
                }
                // tungstenite queues the pong itself.
                Message::Ping(_) | Message::Pong(_) => {}
                Message::Binary(_) => {
                    tracing::warn!("skipping binary frame, quiz rooms speak JSON text only");
                }
                Message::Frame(_) => {}
            }
        }
    }

    async fn close(&mut self) -> Result<(), QuizRoomError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stream
            .close(None)
            .await
            .map_err(|e| QuizRoomError::TransportSend(e.to_string()))
    }
}

// ── Connector ───────────────────────────────────────────────────────

/// Joins rooms by opening a WebSocket per join.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    base_url: String,
    connect_timeout: Duration,
}

impl WebSocketConnector {
    /// Default deadline for the WebSocket upgrade.
    pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            connect_timeout: Self::DEFAULT_CONNECT_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// The URL a join request is sent to.
    pub fn room_url(&self, role: Role, room_id: Option<&str>, token: Option<&str>) -> String {
        let mut url = match room_id.filter(|id| !id.is_empty()) {
            Some(id) => format!("{}/{id}", self.base_url),
            None => self.base_url.clone(),
        };
        url.push_str("?role=");
        url.push_str(role.as_str());
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            url.push_str("&token=");
            url.push_str(token);
        }
        url
    }
}

#[async_trait]
impl RoomConnector for WebSocketConnector {
    async fn join(
        &self,
        role: Role,
        room_id: Option<&str>,
        token: Option<&str>,
    ) -> Result<JoinedRoom, QuizRoomError> {
        let url = self.room_url(role, room_id, token);
        let transport = WebSocketTransport::connect_with_timeout(&url, self.connect_timeout).await?;
        Ok(JoinedRoom {
            // A room picked by the authority is announced later via ROOM_ID.
            room_id: room_id.unwrap_or_default().to_owned(),
            transport: Box::new(transport),
        })
    }
}

#[cfg(test)]
#[cfg(feature = "transport-websocket")]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use tokio::net::TcpListener;

    use super::*;

    #[test]
    fn websocket_transport_is_send_and_debug() {
        fn assert_send<T: Send + std::fmt::Debug>() {}
        assert_send::<WebSocketTransport>();
    }

    #[test]
    fn room_url_layout() {
        let connector = WebSocketConnector::new("ws://localhost:2567/quiz/");
        assert_eq!(
            connector.room_url(Role::Student, Some("r42"), Some("jwt.abc")),
            "ws://localhost:2567/quiz/r42?role=student&token=jwt.abc"
        );
        assert_eq!(
            connector.room_url(Role::Teacher, None, None),
            "ws://localhost:2567/quiz?role=teacher"
        );
    }

    #[tokio::test]
    async fn connect_fails_with_invalid_url() {
        let err = WebSocketTransport::connect("not-a-valid-url")
            .await
            .unwrap_err();
        assert!(matches!(err, QuizRoomError::ConnectionFailed(_)));
    }

    #[tokio::test]
    async fn connect_with_timeout_times_out() {
        let err = WebSocketTransport::connect_with_timeout(
            "ws://192.0.2.1:1",
            Duration::from_millis(50),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, QuizRoomError::Timeout));
    }

    /// Start a local WebSocket server that runs `handler` on the accepted
    /// connection and returns its address.
    async fn start_mock_server<F, Fut>(handler: F) -> String
    where
        F: FnOnce(tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>) -> Fut
            + Send
            + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            handler(ws).await;
        });

        format!("ws://{addr}")
    }

    #[tokio::test]
    async fn recv_skips_binary_and_stops_on_close() {
        let url = start_mock_server(|mut ws| async move {
            ws.send(Message::Binary(vec![0xDE, 0xAD].into()))
                .await
                .unwrap();
            ws.send(Message::Text(r#"{"type":"MATCH_RESET"}"#.into()))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        let msg = transport.recv().await.unwrap().unwrap();
        assert_eq!(msg, r#"{"type":"MATCH_RESET"}"#);
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn send_after_close_returns_transport_closed() {
        let url =
            start_mock_server(|mut ws| async move { while let Some(Ok(_)) = ws.next().await {} })
                .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        transport.close().await.unwrap();
        transport.close().await.unwrap();

        let err = transport.send("late".to_string()).await.unwrap_err();
        assert!(matches!(err, QuizRoomError::TransportClosed));
    }

    #[tokio::test]
    async fn connector_hands_back_requested_room() {
        let url = start_mock_server(|mut ws| async move {
            if let Some(Ok(Message::Text(text))) = ws.next().await {
                ws.send(Message::Text(text)).await.unwrap();
            }
            ws.close(None).await.unwrap();
        })
        .await;

        let connector = WebSocketConnector::new(url);
        // The mock server accepts any path.
        let mut joined = connector
            .join(Role::Display, Some("r7"), None)
            .await
            .unwrap();
        assert_eq!(joined.room_id, "r7");
        joined.transport.send("echo".into()).await.unwrap();
        assert_eq!(joined.transport.recv().await.unwrap().unwrap(), "echo");
    }
}
