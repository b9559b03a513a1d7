//! WebSocket lifecycle for one conversation subscription.
//!
//! [`ConnectionManager::connect`] spawns a driver task that owns the read half
//! of the socket, reconnects with a fixed delay after unexpected closes, and
//! stops for good on cancellation, on an authentication rejection, or once
//! the retry budget is spent. The write half is shared with [`Connection`]
//! and is only present while the socket is open, so sends never queue.

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use crate::auth::{AuthNotifier, CredentialStore};
use crate::config::{ClientConfig, ConfigError};
use crate::protocol::ClientFrame;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type SharedSink = Arc<Mutex<Option<WsSink>>>;

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("no access token available")]
    MissingToken,
    #[error("connection is not open")]
    NotOpen,
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReadyState {
    Connecting,
    Open,
    Closing,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl From<&ClientConfig> for ReconnectPolicy {
    fn from(config: &ClientConfig) -> Self {
        Self {
            attempts: config.reconnect_attempts,
            interval: config.reconnect_interval(),
        }
    }
}

#[derive(Clone)]
pub struct ConnectionManager {
    config: Arc<ClientConfig>,
    credentials: Arc<dyn CredentialStore>,
    auth: AuthNotifier,
}

impl ConnectionManager {
    pub fn new(
        config: Arc<ClientConfig>,
        credentials: Arc<dyn CredentialStore>,
        auth: AuthNotifier,
    ) -> Self {
        Self {
            config,
            credentials,
            auth,
        }
    }

    /// Open the socket for `conversation_id` in the background.
    pub fn connect(&self, conversation_id: &str) -> Result<Connection, ConnectionError> {
        let token = self
            .credentials
            .token()
            .ok_or(ConnectionError::MissingToken)?;
        let url = self.config.ws_url(conversation_id, &token)?;

        let cancel = CancellationToken::new();
        let sink: SharedSink = Arc::new(Mutex::new(None));
        let (state_tx, state_rx) = watch::channel(ReadyState::Connecting);
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        let driver = Driver {
            url: url.to_string(),
            conversation_id: conversation_id.to_string(),
            policy: ReconnectPolicy::from(self.config.as_ref()),
            sink: sink.clone(),
            state: state_tx,
            inbound: inbound_tx,
            cancel: cancel.clone(),
            credentials: self.credentials.clone(),
            auth: self.auth.clone(),
        };
        let handle = tokio::spawn(driver.run());

        Ok(Connection {
            conversation_id: conversation_id.to_string(),
            sink,
            state: state_rx,
            inbound: inbound_rx,
            cancel,
            handle,
        })
    }
}

/// Handle to a live conversation subscription. Dropping it cancels the
/// driver task.
pub struct Connection {
    conversation_id: String,
    sink: SharedSink,
    state: watch::Receiver<ReadyState>,
    inbound: mpsc::UnboundedReceiver<String>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Connection {
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn ready_state(&self) -> ReadyState {
        *self.state.borrow()
    }

    pub fn is_open(&self) -> bool {
        self.ready_state() == ReadyState::Open
    }

    pub fn state_changes(&self) -> watch::Receiver<ReadyState> {
        self.state.clone()
    }

    /// Next inbound text frame. `None` once the connection is gone for good.
    pub async fn recv(&mut self) -> Option<String> {
        self.inbound.recv().await
    }

    pub async fn send(&self, frame: &ClientFrame<'_>) -> Result<(), ConnectionError> {
        self.send_text(frame.encode()?).await
    }

    /// Write one text frame. Fails with [`ConnectionError::NotOpen`] unless
    /// the socket is open right now.
    pub async fn send_text(&self, text: String) -> Result<(), ConnectionError> {
        if !self.is_open() {
            return Err(ConnectionError::NotOpen);
        }
        let mut guard = self.sink.lock().await;
        let sink = guard.as_mut().ok_or(ConnectionError::NotOpen)?;
        sink.send(Message::Text(text)).await?;
        Ok(())
    }

    /// Cancel the driver (including any pending reconnect) and wait for it.
    pub async fn close(mut self) {
        self.cancel.cancel();
        if let Err(e) = (&mut self.handle).await {
            warn!("Connection task for {} ended abnormally: {}", self.conversation_id, e);
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

enum Outcome {
    Cancelled,
    Closed(Option<CloseCode>),
    Failed(tungstenite::Error),
    ReceiverGone,
}

struct Driver {
    url: String,
    conversation_id: String,
    policy: ReconnectPolicy,
    sink: SharedSink,
    state: watch::Sender<ReadyState>,
    inbound: mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
    credentials: Arc<dyn CredentialStore>,
    auth: AuthNotifier,
}

impl Driver {
    async fn run(self) {
        let mut failures = 0u32;

        loop {
            self.state.send_replace(ReadyState::Connecting);
            let attempt = tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = connect_async(self.url.as_str()) => result,
            };

            match attempt {
                Ok((stream, _)) => {
                    failures = 0;
                    info!("Connected to conversation {}", self.conversation_id);
                    let (write, mut read) = stream.split();
                    *self.sink.lock().await = Some(write);
                    self.state.send_replace(ReadyState::Open);

                    let outcome = self.pump(&mut read).await;
                    self.release_sink(matches!(outcome, Outcome::Cancelled)).await;

                    match outcome {
                        Outcome::Cancelled | Outcome::ReceiverGone => break,
                        Outcome::Closed(Some(CloseCode::Policy)) => {
                            self.auth.expire(self.credentials.as_ref());
                            break;
                        }
                        Outcome::Closed(code) => {
                            warn!("Connection to {} closed ({:?})", self.conversation_id, code);
                        }
                        Outcome::Failed(e) => {
                            warn!("Connection to {} failed: {}", self.conversation_id, e);
                        }
                    }
                }
                Err(tungstenite::Error::Http(response))
                    if matches!(response.status().as_u16(), 401 | 403) =>
                {
                    warn!("Handshake rejected with {}", response.status());
                    self.auth.expire(self.credentials.as_ref());
                    break;
                }
                Err(e) => warn!("Could not connect to {}: {}", self.conversation_id, e),
            }

            failures += 1;
            if failures > self.policy.attempts {
                warn!(
                    "Giving up on {} after {} reconnect attempts",
                    self.conversation_id, self.policy.attempts
                );
                break;
            }
            self.state.send_replace(ReadyState::Closed);
            debug!("Reconnecting in {:?} (attempt {})", self.policy.interval, failures);
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.policy.interval) => {}
            }
        }

        self.release_sink(false).await;
        self.state.send_replace(ReadyState::Closed);
    }

    async fn pump(&self, read: &mut SplitStream<WsStream>) -> Outcome {
        loop {
            let next = tokio::select! {
                _ = self.cancel.cancelled() => return Outcome::Cancelled,
                next = read.next() => next,
            };
            match next {
                Some(Ok(Message::Text(text))) => {
                    if self.inbound.send(text).is_err() {
                        return Outcome::ReceiverGone;
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    return Outcome::Closed(frame.map(|frame| frame.code));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Outcome::Failed(e),
                None => return Outcome::Closed(None),
            }
        }
    }

    /// Detach the write half so sends fail fast; say goodbye if we are the
    /// side closing the socket.
    async fn release_sink(&self, graceful: bool) {
        let sink = self.sink.lock().await.take();
        if let Some(mut sink) = sink {
            if graceful {
                self.state.send_replace(ReadyState::Closing);
                if let Err(e) = sink.close().await {
                    debug!("Close handshake for {} failed: {}", self.conversation_id, e);
                }
            }
        }
    }
}
