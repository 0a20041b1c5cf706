// SyncEngine - the explicit engine handle
//
// Wires the store, persistence, remote client and main-thread bridge together
// and hands collaborators one object instead of ambient globals.

use crate::config::{PersistenceError, PersistenceManager};
use crate::host::{
    HostEvent, HostServices, MainThreadBridge, NotificationSink, PollReport, deferred_queue,
};
use crate::metrics::SyncMetrics;
use crate::models::{ConfigModel, EngineSettings, GameMetadataEntry, KeyIndex, ResourceEntry};
use crate::services::{
    ConnectionState, Connector, RemoteMessageHandler, RemoteSyncClient, WebSocketConnector,
};
use crate::state::{ConfigChange, ConfigStore};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::broadcast;

/// Errors surfaced to callers of the engine handle
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("engine has been shut down")]
    ShutDown,
}

/// One sync session.
///
/// Create it once per host session, call [`start()`](Self::start), forward
/// host lifecycle hooks to [`on_host_event()`](Self::on_host_event) and call
/// [`shutdown()`](Self::shutdown) from the host's teardown hook. Nothing is
/// cleaned up implicitly.
///
/// Reads (`snapshot`, `resources`, `find_*`) are safe from any thread.
/// Everything that writes the backing file or talks to the host (`save`,
/// `tick`, `on_host_event`, `shutdown`) belongs on the host's main thread.
pub struct SyncEngine {
    settings: EngineSettings,
    store: Arc<ConfigStore>,
    persistence: Arc<PersistenceManager>,
    client: Arc<RemoteSyncClient>,
    bridge: MainThreadBridge,
    metrics: Arc<SyncMetrics>,
    shut_down: AtomicBool,
}

impl SyncEngine {
    /// Create an engine that talks WebSocket to `settings.endpoint`.
    ///
    /// # Arguments
    /// * `settings` - Engine settings
    /// * `runtime` - Runtime the network task runs on
    /// * `host` - Host console and asset index
    /// * `notifications` - Receives `popup` notifications on the main thread
    pub fn new(
        settings: EngineSettings,
        runtime: Handle,
        host: Arc<dyn HostServices>,
        notifications: Arc<dyn NotificationSink>,
    ) -> Self {
        Self::with_connector(
            settings,
            Arc::new(WebSocketConnector::new()),
            runtime,
            host,
            notifications,
        )
    }

    /// Create an engine with a custom transport
    pub fn with_connector(
        settings: EngineSettings,
        connector: Arc<dyn Connector>,
        runtime: Handle,
        host: Arc<dyn HostServices>,
        notifications: Arc<dyn NotificationSink>,
    ) -> Self {
        let metrics = Arc::new(SyncMetrics::new());
        let persistence = Arc::new(PersistenceManager::new(
            settings.backing_file.clone(),
            settings.write_throttle(),
        ));
        let store = Arc::new(ConfigStore::new(Arc::clone(&persistence)));
        let (effects, effects_rx) =
            deferred_queue(settings.log_queue_capacity, Arc::clone(&metrics));

        let handler = RemoteMessageHandler::new(
            Arc::clone(&store),
            Arc::clone(&persistence),
            effects.clone(),
            Arc::clone(&metrics),
        );
        let client = Arc::new(RemoteSyncClient::new(
            &settings,
            connector,
            handler,
            effects,
            Arc::clone(&metrics),
            runtime,
        ));
        let bridge = MainThreadBridge::new(
            effects_rx,
            Arc::clone(&store),
            Arc::clone(&persistence),
            Arc::clone(&client),
            host,
            notifications,
            Arc::clone(&metrics),
            settings.poll_interval(),
        );

        Self {
            settings,
            store,
            persistence,
            client,
            bridge,
            metrics,
            shut_down: AtomicBool::new(false),
        }
    }

    /// Load the backing file and, if `auto_connect` is set, start the
    /// remote client.
    pub fn start(&self) -> Result<(), EngineError> {
        self.ensure_running()?;

        let model = self.store.get();
        tracing::info!(
            "Sync engine started: {} resources, {} games loaded from {}",
            model.resources.len(),
            model.game_metadata.len(),
            self.persistence.path()
        );

        if self.settings.auto_connect {
            self.client.start();
        }
        Ok(())
    }

    /// Start the remote client if it is not running
    pub fn connect(&self) -> Result<bool, EngineError> {
        self.ensure_running()?;
        Ok(self.client.start())
    }

    /// Current model
    pub fn snapshot(&self) -> Arc<ConfigModel> {
        self.store.get()
    }

    pub fn resources(&self) -> KeyIndex<ResourceEntry> {
        self.store.resources()
    }

    pub fn game_metadata(&self) -> KeyIndex<GameMetadataEntry> {
        self.store.game_metadata()
    }

    pub fn find_resource(&self, key: &str) -> Option<ResourceEntry> {
        self.store.find_resource(key)
    }

    pub fn find_game(&self, key: &str) -> Option<GameMetadataEntry> {
        self.store.find_game(key)
    }

    /// Explicit local save: publish `model` and write it immediately,
    /// bypassing the throttle.
    ///
    /// A remote update racing with this call either lands before the publish
    /// (and is overwritten) or after it (and stays pending); the two are
    /// never merged.
    pub fn save(&self, model: ConfigModel) -> Result<(), EngineError> {
        self.ensure_running()?;

        self.persistence.clear_pending();
        let published = self.store.replace_model(model);
        self.write_now(&published)
    }

    /// Write the current model immediately, bypassing the throttle
    pub fn save_current(&self) -> Result<(), EngineError> {
        self.ensure_running()?;

        self.persistence.clear_pending();
        let current = self.store.get();
        self.write_now(&current)
    }

    /// Re-read the backing file on the calling (main) thread.
    ///
    /// Readers never observe an unloaded store, so no lazy load can land on
    /// a worker thread.
    pub fn reload(&self) -> Arc<ConfigModel> {
        self.store.reload_now()
    }

    /// Forward a host lifecycle hook.
    ///
    /// # Returns
    /// The poll report for `IdleTick`, `None` for the teardown hooks
    pub fn on_host_event(&self, event: HostEvent, now: Instant) -> Option<PollReport> {
        match event {
            HostEvent::IdleTick => self.tick(now),
            HostEvent::BeforeReload | HostEvent::ShuttingDown => {
                tracing::info!("Host teardown hook received: {:?}", event);
                self.shutdown();
                None
            }
        }
    }

    /// Drive the main-thread bridge. Does nothing after shutdown.
    pub fn tick(&self, now: Instant) -> Option<PollReport> {
        if self.is_shut_down() {
            return None;
        }
        Some(self.bridge.tick(now))
    }

    /// Cancel the network task, emit queued effects and write any pending
    /// data. Terminal and idempotent.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }

        tracing::info!("Shutting down sync engine");
        self.bridge.shutdown(Instant::now());
        self.metrics.log_summary();
    }

    /// Wait until the network task has exited (after `shutdown()`)
    pub async fn join(&self) {
        self.client.join().await;
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.client.state()
    }

    /// Whether any remote update has been accepted this session
    pub fn has_remote_data(&self) -> bool {
        self.store.has_remote_data()
    }

    /// When the last remote update was accepted, for callers deciding
    /// whether to trust remote data over another source
    pub fn last_remote_update(&self) -> Option<Instant> {
        self.store.last_remote_update()
    }

    pub fn has_pending_write(&self) -> bool {
        self.persistence.has_pending()
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn metrics(&self) -> &Arc<SyncMetrics> {
        &self.metrics
    }

    pub fn store(&self) -> &Arc<ConfigStore> {
        &self.store
    }

    /// Subscribe to model change events
    pub fn subscribe(&self) -> broadcast::Receiver<ConfigChange> {
        self.store.subscribe()
    }

    fn ensure_running(&self) -> Result<(), EngineError> {
        if self.is_shut_down() {
            return Err(EngineError::ShutDown);
        }
        Ok(())
    }

    fn write_now(&self, model: &ConfigModel) -> Result<(), EngineError> {
        match self.persistence.flush(model, Instant::now()) {
            Ok(()) => {
                self.metrics.record_flush_written();
                self.bridge.request_asset_refresh();
                Ok(())
            }
            Err(e) => {
                self.metrics.record_flush_failed();
                // Leave it for the next eligible poll
                self.persistence.mark_pending(false);
                tracing::error!("Explicit save failed: {}", e);
                Err(e.into())
            }
        }
    }
}
