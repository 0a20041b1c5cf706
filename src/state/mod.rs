// State management module
//
// This module provides the ConfigStore which owns the current ConfigModel,
// publishes replacements atomically and emits change events for listeners.

use crate::config::PersistenceManager;
use crate::models::{ConfigModel, GameMetadataEntry, KeyIndex, ResourceEntry};
use arc_swap::ArcSwapOption;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tokio::sync::broadcast;

/// Change events emitted after a new model has been published
#[derive(Clone, Debug, PartialEq)]
pub enum ConfigChange {
    /// Only the resource section was replaced
    ResourcesReplaced { count: usize },

    /// Only the game metadata section was replaced
    GameMetadataReplaced { count: usize },

    /// Both sections were replaced in one step
    Replaced { resources: usize, games: usize },

    /// The model was re-read from persistent storage
    Reloaded,
}

/// Thread-safe owner of the current [`ConfigModel`]
///
/// - Readers call [`get()`](Self::get) from any thread. The model is held
///   behind an atomically swapped `Arc`, so a read never waits on a writer.
/// - All mutations serialize through one writer lock. Writers build a new
///   model and publish it; a published model is never modified.
/// - When no model is loaded (fresh store, or after [`reload()`](Self::reload))
///   the next access loads it through the [`PersistenceManager`].
///
/// # Related Types
///
/// - [`crate::config::PersistenceManager`]: Loads the model on first access
/// - [`ConfigChange`]: Event types emitted on publish
/// - [`crate::services::RemoteMessageHandler`]: The background writer
pub struct ConfigStore {
    /// Published model; `None` means "not loaded yet"
    current: ArcSwapOption<ConfigModel>,

    /// Serializes writers (remote updates, local saves, lazy loads)
    write_lock: Mutex<()>,

    /// Source for lazy loads
    persistence: Arc<PersistenceManager>,

    /// Sticky flag: at least one remote update has been accepted this session
    has_remote_data: AtomicBool,

    /// When the last remote update was accepted
    last_remote_update: Mutex<Option<Instant>>,

    /// Broadcast channel for change events
    change_tx: broadcast::Sender<ConfigChange>,
}

impl ConfigStore {
    /// Create a store that loads from `persistence` on first access
    pub fn new(persistence: Arc<PersistenceManager>) -> Self {
        let (change_tx, _) = broadcast::channel(100);
        Self {
            current: ArcSwapOption::empty(),
            write_lock: Mutex::new(()),
            persistence,
            has_remote_data: AtomicBool::new(false),
            last_remote_update: Mutex::new(None),
            change_tx,
        }
    }

    /// Get the current model snapshot, loading it first if needed.
    ///
    /// A lazy load runs on the calling thread and may rewrite a missing or
    /// corrupt backing file. Use [`ConfigStore::reload_now`] to keep that on
    /// a thread of your choosing.
    pub fn get(&self) -> Arc<ConfigModel> {
        if let Some(model) = self.current.load_full() {
            return model;
        }

        let _guard = self.lock_writer();
        self.loaded_under_lock()
    }

    /// True once a model has been published and not discarded by `reload()`
    pub fn is_loaded(&self) -> bool {
        self.current.load().is_some()
    }

    /// Point-in-time resource map keyed case-insensitively
    pub fn resources(&self) -> KeyIndex<ResourceEntry> {
        self.get().resource_index()
    }

    /// Point-in-time game metadata map keyed case-insensitively
    pub fn game_metadata(&self) -> KeyIndex<GameMetadataEntry> {
        self.get().game_index()
    }

    pub fn find_resource(&self, key: &str) -> Option<ResourceEntry> {
        self.resources().get(key).cloned()
    }

    pub fn find_game(&self, key: &str) -> Option<GameMetadataEntry> {
        self.game_metadata().get(key).cloned()
    }

    /// Replace the resource section, keeping game metadata
    pub fn replace_resources(&self, resources: Vec<ResourceEntry>) -> Arc<ConfigModel> {
        let _guard = self.lock_writer();
        let base = self.loaded_under_lock();

        let count = resources.len();
        let model = Arc::new(ConfigModel::new(resources, base.game_metadata.clone()));
        self.publish(model, ConfigChange::ResourcesReplaced { count })
    }

    /// Replace the game metadata section, keeping resources
    pub fn replace_game_metadata(
        &self,
        game_metadata: Vec<GameMetadataEntry>,
    ) -> Arc<ConfigModel> {
        let _guard = self.lock_writer();
        let base = self.loaded_under_lock();

        let count = game_metadata.len();
        let model = Arc::new(ConfigModel::new(base.resources.clone(), game_metadata));
        self.publish(model, ConfigChange::GameMetadataReplaced { count })
    }

    /// Replace both sections as one publish.
    ///
    /// Readers observe either the old model or the new one, never a mix.
    pub fn replace_all(
        &self,
        resources: Vec<ResourceEntry>,
        game_metadata: Vec<GameMetadataEntry>,
    ) -> Arc<ConfigModel> {
        self.replace_model(ConfigModel::new(resources, game_metadata))
    }

    /// Publish a complete model (used by explicit local saves)
    pub fn replace_model(&self, model: ConfigModel) -> Arc<ConfigModel> {
        let _guard = self.lock_writer();

        let change = ConfigChange::Replaced {
            resources: model.resources.len(),
            games: model.game_metadata.len(),
        };
        self.publish(Arc::new(model), change)
    }

    /// Discard the in-memory model; the next access re-reads the backing file
    pub fn reload(&self) {
        let _guard = self.lock_writer();
        self.current.store(None);
        tracing::info!(
            "Configuration discarded, will reload from {}",
            self.persistence.path()
        );
        let _ = self.change_tx.send(ConfigChange::Reloaded);
    }

    /// Re-read the backing file and publish the result before returning.
    ///
    /// Readers keep seeing the previous model until the new one is in place.
    pub fn reload_now(&self) -> Arc<ConfigModel> {
        let _guard = self.lock_writer();
        let model = Arc::new(self.persistence.load());
        tracing::info!(
            "Configuration reloaded from {}: {} resources, {} games",
            self.persistence.path(),
            model.resources.len(),
            model.game_metadata.len()
        );
        self.publish(model, ConfigChange::Reloaded)
    }

    /// Record an accepted remote update.
    ///
    /// # Returns
    /// `true` if this was the first remote update of the session
    pub fn mark_remote_update(&self, at: Instant) -> bool {
        *self
            .last_remote_update
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(at);
        !self.has_remote_data.swap(true, Ordering::SeqCst)
    }

    /// Whether any remote update has been accepted this session (sticky)
    pub fn has_remote_data(&self) -> bool {
        self.has_remote_data.load(Ordering::SeqCst)
    }

    pub fn last_remote_update(&self) -> Option<Instant> {
        *self
            .last_remote_update
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Subscribe to change events
    pub fn subscribe(&self) -> broadcast::Receiver<ConfigChange> {
        self.change_tx.subscribe()
    }

    fn lock_writer(&self) -> MutexGuard<'_, ()> {
        // The guarded value is a unit, so a poisoned lock carries no broken state
        self.write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current model, loading it if absent. Caller must hold the writer lock.
    fn loaded_under_lock(&self) -> Arc<ConfigModel> {
        if let Some(model) = self.current.load_full() {
            return model;
        }

        let model = Arc::new(self.persistence.load());
        self.current.store(Some(Arc::clone(&model)));
        tracing::info!(
            "Configuration loaded: {} resources, {} games",
            model.resources.len(),
            model.game_metadata.len()
        );
        model
    }

    fn publish(&self, model: Arc<ConfigModel>, change: ConfigChange) -> Arc<ConfigModel> {
        self.current.store(Some(Arc::clone(&model)));
        // Ignore send errors - it's OK if no one is listening
        let _ = self.change_tx.send(change);
        model
    }
}
