// MainThreadBridge - Coordinates between the background network task and the host main thread
//
// Two execution contexts matter:
// 1. The host's cooperative, single-threaded main loop
// 2. The tokio task that owns the remote connection
//
// The bridge provides:
// - A bounded queue of deferred effects (log lines, notifications) any thread may fill
// - A periodic poll, run on the main thread, that emits them in order
// - Throttled persistence and a connection health check on the same poll

use super::{HostServices, LogEntry, LogLevel, NotificationSink};
use crate::config::{FlushOutcome, PersistenceManager};
use crate::metrics::SyncMetrics;
use crate::models::Notification;
use crate::services::{ConnectionState, RemoteSyncClient};
use crate::state::ConfigStore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// A side effect that must run on the host's main thread
#[derive(Debug, Clone, PartialEq)]
pub enum DeferredEffect {
    Log(LogEntry),
    Notify(Vec<Notification>),
}

/// Create the deferred-effect queue.
///
/// # Arguments
/// * `capacity` - Queue bound; effects beyond it are dropped and counted
/// * `metrics` - Where drops are recorded
pub fn deferred_queue(
    capacity: usize,
    metrics: Arc<SyncMetrics>,
) -> (EffectSender, mpsc::Receiver<DeferredEffect>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (EffectSender { tx, metrics }, rx)
}

/// Producer handle for the deferred-effect queue. Cheap to clone, usable from
/// any thread, never blocks.
#[derive(Clone)]
pub struct EffectSender {
    tx: mpsc::Sender<DeferredEffect>,
    metrics: Arc<SyncMetrics>,
}

impl EffectSender {
    /// Queue a log line for emission on the main thread
    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.send(DeferredEffect::Log(LogEntry {
            level,
            message: message.into(),
        }));
    }

    /// Queue notifications for the notification collaborator
    pub fn notify(&self, notifications: Vec<Notification>) {
        self.send(DeferredEffect::Notify(notifications));
    }

    fn send(&self, effect: DeferredEffect) {
        match self.tx.try_send(effect) {
            Ok(_) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.metrics.record_effect_dropped();
                tracing::warn!("Deferred effect queue full - dropping entry to bound memory");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!("Deferred effect dropped - main thread bridge is gone");
            }
        }
    }
}

/// What a poll did, mostly for tests and diagnostics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollReport {
    /// The full poll ran (cadence elapsed); `false` for fast-path ticks
    pub polled: bool,
    /// Deferred effects emitted
    pub drained: usize,
    /// Result of the pending-write check
    pub flush: FlushOutcome,
    /// A new connect attempt was requested by the health check
    pub reconnect_requested: bool,
}

/// Main-thread side of the engine.
///
/// The host calls [`tick()`](Self::tick) as often as it likes (every frame is
/// fine). The full [`poll()`](Self::poll) only runs when the poll interval has
/// elapsed, except that an urgent pending write (the first remote update of
/// a session) is flushed on the very next tick.
///
/// # Threading
///
/// Only the main thread may call `tick`, `poll`, `drain` and `shutdown`.
/// Everything that touches the host or the backing file happens in those.
pub struct MainThreadBridge {
    effects_rx: Mutex<mpsc::Receiver<DeferredEffect>>,
    store: Arc<ConfigStore>,
    persistence: Arc<PersistenceManager>,
    client: Arc<RemoteSyncClient>,
    host: Arc<dyn HostServices>,
    notifications: Arc<dyn NotificationSink>,
    metrics: Arc<SyncMetrics>,
    poll_interval: Duration,
    last_poll: Mutex<Option<Instant>>,
    refresh_pending: AtomicBool,
}

impl MainThreadBridge {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        effects_rx: mpsc::Receiver<DeferredEffect>,
        store: Arc<ConfigStore>,
        persistence: Arc<PersistenceManager>,
        client: Arc<RemoteSyncClient>,
        host: Arc<dyn HostServices>,
        notifications: Arc<dyn NotificationSink>,
        metrics: Arc<SyncMetrics>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            effects_rx: Mutex::new(effects_rx),
            store,
            persistence,
            client,
            host,
            notifications,
            metrics,
            poll_interval,
            last_poll: Mutex::new(None),
            refresh_pending: AtomicBool::new(false),
        }
    }

    /// Cheap per-frame entry point.
    pub fn tick(&self, now: Instant) -> PollReport {
        if self.poll_is_due(now) {
            return self.poll(now);
        }

        let flush = if self.persistence.is_urgent() {
            self.flush_pending(now)
        } else {
            FlushOutcome::Idle
        };

        PollReport {
            polled: false,
            drained: 0,
            flush,
            reconnect_requested: false,
        }
    }

    /// Full poll: emit queued effects, write pending data if the throttle
    /// allows, and check the connection.
    pub fn poll(&self, now: Instant) -> PollReport {
        *self
            .last_poll
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(now);

        let drained = self.drain();

        if self.refresh_pending.load(Ordering::SeqCst) {
            self.request_asset_refresh();
        }

        let flush = self.flush_pending(now);
        let reconnect_requested = self.check_connection();

        PollReport {
            polled: true,
            drained,
            flush,
            reconnect_requested,
        }
    }

    /// Emit every queued effect in enqueue order.
    ///
    /// # Returns
    /// The number of effects emitted
    pub fn drain(&self) -> usize {
        let mut rx = self
            .effects_rx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut drained = 0;
        while let Ok(effect) = rx.try_recv() {
            drained += 1;
            match effect {
                DeferredEffect::Log(entry) => self.host.emit_log(entry.level, &entry.message),
                DeferredEffect::Notify(notifications) => {
                    self.metrics.record_popups(notifications.len());
                    self.notifications.show(&notifications);
                }
            }
        }
        drained
    }

    /// Ask the host to refresh its asset index, or defer the request to the
    /// next poll while the host is mid-update.
    pub fn request_asset_refresh(&self) {
        if self.host.is_updating() {
            tracing::debug!("Host is updating, deferring asset refresh");
            self.refresh_pending.store(true, Ordering::SeqCst);
        } else {
            self.refresh_pending.store(false, Ordering::SeqCst);
            self.host.refresh_asset_index();
        }
    }

    pub fn has_deferred_refresh(&self) -> bool {
        self.refresh_pending.load(Ordering::SeqCst)
    }

    /// Teardown: stop the network task, emit what is queued and write any
    /// pending data regardless of the throttle.
    pub fn shutdown(&self, now: Instant) {
        self.client.shutdown();
        self.drain();

        if self.persistence.has_pending() {
            self.persistence.mark_pending(true);
            if self.flush_pending(now) != FlushOutcome::Written {
                tracing::warn!("Pending configuration could not be saved during shutdown");
            }
        }
    }

    fn poll_is_due(&self, now: Instant) -> bool {
        match *self
            .last_poll
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
        {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.poll_interval,
        }
    }

    fn flush_pending(&self, now: Instant) -> FlushOutcome {
        let outcome = self.persistence.flush_pending(now, || self.store.get());

        match outcome {
            FlushOutcome::Written => {
                self.metrics.record_flush_written();
                self.request_asset_refresh();
            }
            FlushOutcome::Throttled => {
                self.metrics.record_flush_throttled();
                tracing::debug!("Pending configuration write throttled");
            }
            FlushOutcome::Failed => {
                self.metrics.record_flush_failed();
                self.host.emit_log(
                    LogLevel::Error,
                    &format!(
                        "Failed to save configuration to {}, will retry",
                        self.persistence.path()
                    ),
                );
            }
            FlushOutcome::Idle => {}
        }

        outcome
    }

    /// Restart the connect loop if it is not running.
    ///
    /// # Returns
    /// `true` if a new connect attempt was started
    fn check_connection(&self) -> bool {
        let state = self.client.state();
        if state == ConnectionState::Closing {
            return false;
        }

        if self.client.is_running() {
            if state == ConnectionState::Disconnected {
                tracing::debug!("Remote connection down, connect loop is retrying");
            }
            return false;
        }

        let started = self.client.request_connect();
        if started {
            self.host.emit_log(
                LogLevel::Warning,
                "Remote config connection was not running, reconnecting",
            );
        }
        started
    }
}
