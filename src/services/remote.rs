use super::assembler::MessageAssembler;
use super::handler::RemoteMessageHandler;
use super::transport::{Connector, Frame, FrameStream, TransportError};
use crate::host::{EffectSender, LogLevel};
use crate::metrics::SyncMetrics;
use crate::models::EngineSettings;
use futures_util::StreamExt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Connection lifecycle, owned by [`RemoteSyncClient`].
///
/// `Disconnected -> Connecting -> Connected -> Disconnected -> ...` until an
/// explicit shutdown moves it to the terminal `Closing` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    Closing = 3,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            3 => ConnectionState::Closing,
            _ => ConnectionState::Disconnected,
        }
    }
}

/// Why a receive loop ended
#[derive(Debug)]
enum ReceiveEnd {
    CloseFrame,
    StreamEnded,
    Failed(TransportError),
    Cancelled,
}

/// Background client for the remote authority.
///
/// Owns one long-lived tokio task that connects, receives and reconnects with
/// a fixed backoff. A single cancellation signal stops the connect attempt,
/// the receive loop and the backoff wait; after [`shutdown()`](Self::shutdown)
/// no further connection is ever made.
pub struct RemoteSyncClient {
    inner: Arc<ClientInner>,
    runtime: Handle,
    task: Mutex<Option<JoinHandle<()>>>,
    shutdown_tx: watch::Sender<bool>,
    enabled: AtomicBool,
}

struct ClientInner {
    endpoint: String,
    backoff: Duration,
    connect_timeout: Duration,
    max_message_bytes: usize,
    connector: Arc<dyn Connector>,
    handler: RemoteMessageHandler,
    effects: EffectSender,
    metrics: Arc<SyncMetrics>,
    state: AtomicU8,
}

impl RemoteSyncClient {
    /// Create a client. Nothing runs until [`start()`](Self::start).
    ///
    /// # Arguments
    /// * `settings` - Endpoint, backoff, timeout and message size limit
    /// * `connector` - Opens connections (WebSocket in production)
    /// * `handler` - Applies decoded messages
    /// * `effects` - Queue for user-visible log lines
    /// * `metrics` - Connection counters
    /// * `runtime` - Runtime the background task is spawned on
    pub fn new(
        settings: &EngineSettings,
        connector: Arc<dyn Connector>,
        handler: RemoteMessageHandler,
        effects: EffectSender,
        metrics: Arc<SyncMetrics>,
        runtime: Handle,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            inner: Arc::new(ClientInner {
                endpoint: settings.endpoint.clone(),
                backoff: settings.reconnect_backoff(),
                connect_timeout: settings.connect_timeout(),
                max_message_bytes: settings.max_message_bytes,
                connector,
                handler,
                effects,
                metrics,
                state: AtomicU8::new(ConnectionState::Disconnected as u8),
            }),
            runtime,
            task: Mutex::new(None),
            shutdown_tx,
            enabled: AtomicBool::new(false),
        }
    }

    /// Enable the client and spawn the connect loop.
    ///
    /// # Returns
    /// `true` if a new connect loop was spawned
    pub fn start(&self) -> bool {
        if self.is_shut_down() {
            return false;
        }
        self.enabled.store(true, Ordering::SeqCst);
        self.request_connect()
    }

    /// Spawn the connect loop unless one is already running.
    ///
    /// Idempotent: with a loop in flight this is a no-op. A finished loop is
    /// replaced and the published state starts over at `Disconnected`. Does
    /// nothing before `start()` or after `shutdown()`.
    pub fn request_connect(&self) -> bool {
        if !self.enabled.load(Ordering::SeqCst) || self.is_shut_down() {
            return false;
        }

        let mut task = self
            .task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return false;
        }

        // A loop that panicked never published Disconnected
        let stale = self.inner.state();
        if task.is_some() && stale != ConnectionState::Disconnected {
            tracing::warn!(
                "Remote connect loop for {} exited while {:?}",
                self.inner.endpoint,
                stale
            );
        }
        self.inner.set_state(ConnectionState::Disconnected);

        let inner = Arc::clone(&self.inner);
        let shutdown_rx = self.shutdown_tx.subscribe();
        *task = Some(self.runtime.spawn(inner.run(shutdown_rx)));

        tracing::debug!("Spawned remote connect loop for {}", self.inner.endpoint);
        true
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    /// True while the background task exists and has not exited
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn is_shut_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    pub fn endpoint(&self) -> &str {
        &self.inner.endpoint
    }

    /// Request cancellation. Terminal: the client never reconnects afterwards.
    pub fn shutdown(&self) {
        if self.shutdown_tx.send_replace(true) {
            return;
        }

        self.enabled.store(false, Ordering::SeqCst);
        self.inner.set_state(ConnectionState::Closing);
        tracing::info!("Remote sync client shutting down");
    }

    /// Wait for the background task to exit (after `shutdown()`)
    pub async fn join(&self) {
        let task = self
            .task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();

        if let Some(handle) = task {
            if let Err(e) = handle.await {
                tracing::error!("Remote connect loop ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for RemoteSyncClient {
    fn drop(&mut self) {
        // Make sure the background task does not outlive its owner
        self.shutdown_tx.send_replace(true);
    }
}

impl ClientInner {
    fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    /// Connect loop: runs until cancelled
    async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }

            self.set_state(ConnectionState::Connecting);
            self.metrics.record_connect_attempt();
            tracing::debug!("Connecting to {}", self.endpoint);

            let attempt = tokio::time::timeout(
                self.connect_timeout,
                self.connector.connect(&self.endpoint),
            );

            let result = tokio::select! {
                _ = cancelled(&mut shutdown) => break,
                result = attempt => result,
            };

            match result {
                Ok(Ok(frames)) => {
                    self.set_state(ConnectionState::Connected);
                    self.metrics.record_connected();
                    self.effects.log(
                        LogLevel::Info,
                        format!("Connected to remote config at {}", self.endpoint),
                    );

                    match self.receive(frames, &mut shutdown).await {
                        ReceiveEnd::Cancelled => break,
                        ReceiveEnd::CloseFrame | ReceiveEnd::StreamEnded => {
                            self.effects.log(
                                LogLevel::Info,
                                format!("Remote config connection to {} closed", self.endpoint),
                            );
                        }
                        ReceiveEnd::Failed(e) => {
                            self.effects.log(
                                LogLevel::Warning,
                                format!("Remote config connection lost: {}", e),
                            );
                        }
                    }
                }
                Ok(Err(e)) => {
                    self.effects.log(
                        LogLevel::Warning,
                        format!("Could not connect to {}: {}", self.endpoint, e),
                    );
                }
                Err(_) => {
                    let e = TransportError::Timeout(self.connect_timeout);
                    self.effects.log(
                        LogLevel::Warning,
                        format!("Could not connect to {}: {}", self.endpoint, e),
                    );
                }
            }

            if *shutdown.borrow() {
                break;
            }

            self.set_state(ConnectionState::Disconnected);
            tracing::debug!("Reconnecting to {} in {:?}", self.endpoint, self.backoff);

            tokio::select! {
                _ = cancelled(&mut shutdown) => break,
                _ = tokio::time::sleep(self.backoff) => {}
            }
        }

        self.set_state(ConnectionState::Closing);
        tracing::debug!("Remote connect loop for {} exited", self.endpoint);
    }

    /// Receive loop for one connection. Dropping `frames` on return disposes
    /// the connection.
    async fn receive(
        &self,
        mut frames: FrameStream,
        shutdown: &mut watch::Receiver<bool>,
    ) -> ReceiveEnd {
        let mut assembler = MessageAssembler::new(self.max_message_bytes);

        loop {
            let next = tokio::select! {
                _ = cancelled(shutdown) => return ReceiveEnd::Cancelled,
                next = frames.next() => next,
            };

            let frame = match next {
                None => return ReceiveEnd::StreamEnded,
                Some(Err(e)) => return ReceiveEnd::Failed(e),
                Some(Ok(Frame::Close)) => return ReceiveEnd::CloseFrame,
                Some(Ok(frame)) => frame,
            };

            match assembler.push(frame) {
                None => {}
                Some(Ok(payload)) => match self.handler.handle_payload(&payload, Instant::now()) {
                    Ok(outcome) => tracing::debug!("Remote message handled: {:?}", outcome),
                    Err(e) => self.handler.report_decode_failure(&e),
                },
                Some(Err(e)) => self.handler.report_decode_failure(&e),
            }
        }
    }
}

/// Resolves once shutdown has been requested (or the sender is gone)
async fn cancelled(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
