use crate::models::ConfigModel;
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors from reading or writing the backing file
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode configuration: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Failed to decode {path}: {source}")]
    Decode {
        path: Utf8PathBuf,
        #[source]
        source: crate::models::DecodeError,
    },
}

/// What a call to [`PersistenceManager::flush_pending`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// No write was pending
    Idle,
    /// The backing file was written
    Written,
    /// A write is pending but the throttle interval has not elapsed
    Throttled,
    /// The write failed; the write stays pending
    Failed,
}

/// Persistence manager for the configuration backing file.
///
/// Owns:
/// - The backing file path (`config.json` by default) and its atomic writes
/// - The pending-write flag set by accepted remote updates
/// - The last-write timestamp that drives the write throttle
///
/// Reads never fail: a missing or corrupt file yields a fresh empty model,
/// which is persisted right away.
#[derive(Debug)]
pub struct PersistenceManager {
    path: Utf8PathBuf,
    throttle: Duration,
    last_write: Mutex<Option<Instant>>,
    pending: AtomicBool,
    urgent: AtomicBool,
}

impl PersistenceManager {
    /// Create a new PersistenceManager.
    ///
    /// # Arguments
    /// * `path` - Backing file location
    /// * `throttle` - Minimum interval between throttled flushes
    pub fn new<P: Into<Utf8PathBuf>>(path: P, throttle: Duration) -> Self {
        Self {
            path: path.into(),
            throttle,
            last_write: Mutex::new(None),
            pending: AtomicBool::new(false),
            urgent: AtomicBool::new(false),
        }
    }

    /// Get the backing file path.
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn throttle(&self) -> Duration {
        self.throttle
    }

    /// Load the configuration model.
    ///
    /// # Returns
    /// The decoded model, or a fresh empty model (which is also written to
    /// disk) if the file is missing, unreadable or malformed.
    pub fn load(&self) -> ConfigModel {
        match self.try_load() {
            Ok(Some(model)) => {
                tracing::info!("Loaded configuration from {}", self.path);
                model
            }
            Ok(None) => {
                tracing::warn!(
                    "Configuration file not found at {}, creating an empty one",
                    self.path
                );
                self.persist_fresh()
            }
            Err(e) => {
                tracing::error!("{}; starting from an empty configuration", e);
                self.persist_fresh()
            }
        }
    }

    /// Read and decode the backing file without any fallback.
    ///
    /// # Returns
    /// `Ok(None)` when the file does not exist
    pub fn try_load(&self) -> Result<Option<ConfigModel>, PersistenceError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(PersistenceError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        ConfigModel::from_json_slice(&bytes)
            .map(Some)
            .map_err(|source| PersistenceError::Decode {
                path: self.path.clone(),
                source,
            })
    }

    /// Write `model` now, bypassing the throttle.
    ///
    /// The document is written to a sibling temp file and then renamed over
    /// the target, so readers never see a half-written file. On failure the
    /// previous file is left as it was.
    pub fn flush(&self, model: &ConfigModel, now: Instant) -> Result<(), PersistenceError> {
        let text = model.to_pretty_json()?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| PersistenceError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        let temp_path = self.temp_path();
        if let Err(source) = fs::write(&temp_path, text.as_bytes()) {
            return Err(PersistenceError::Io {
                path: temp_path,
                source,
            });
        }

        if let Err(source) = fs::rename(&temp_path, &self.path) {
            let _ = fs::remove_file(&temp_path);
            return Err(PersistenceError::Io {
                path: self.path.clone(),
                source,
            });
        }

        *self
            .last_write
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(now);

        tracing::info!(
            "Saved configuration to {} ({} resources, {} games)",
            self.path,
            model.resources.len(),
            model.game_metadata.len()
        );
        Ok(())
    }

    /// True if a throttled flush may run at `now`: either nothing has been
    /// written this session, or the throttle interval has elapsed.
    pub fn is_due(&self, now: Instant) -> bool {
        match *self
            .last_write
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
        {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.throttle,
        }
    }

    pub fn last_write(&self) -> Option<Instant> {
        *self
            .last_write
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Mark that the in-memory model has changed and needs writing.
    ///
    /// # Arguments
    /// * `urgent` - Write on the next opportunity regardless of the throttle
    pub fn mark_pending(&self, urgent: bool) {
        self.pending.store(true, Ordering::SeqCst);
        if urgent {
            self.urgent.store(true, Ordering::SeqCst);
        }
    }

    pub fn has_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn is_urgent(&self) -> bool {
        self.urgent.load(Ordering::SeqCst)
    }

    /// Drop any pending write, e.g. after an explicit save covered it
    pub fn clear_pending(&self) {
        self.pending.store(false, Ordering::SeqCst);
        self.urgent.store(false, Ordering::SeqCst);
    }

    /// Write the pending model if the throttle allows it.
    ///
    /// `snapshot` is only called when a write will actually happen, after the
    /// pending flag has been taken, so an update that lands mid-flush marks
    /// the model pending again instead of being lost.
    pub fn flush_pending<F>(&self, now: Instant, snapshot: F) -> FlushOutcome
    where
        F: FnOnce() -> Arc<ConfigModel>,
    {
        if !self.has_pending() {
            return FlushOutcome::Idle;
        }

        if !self.is_urgent() && !self.is_due(now) {
            return FlushOutcome::Throttled;
        }

        self.pending.store(false, Ordering::SeqCst);
        self.urgent.store(false, Ordering::SeqCst);

        let model = snapshot();
        match self.flush(&model, now) {
            Ok(()) => FlushOutcome::Written,
            Err(e) => {
                tracing::error!("Failed to save configuration: {}", e);
                self.pending.store(true, Ordering::SeqCst);
                FlushOutcome::Failed
            }
        }
    }

    fn temp_path(&self) -> Utf8PathBuf {
        let file_name = self.path.file_name().unwrap_or("config.json");
        self.path.with_file_name(format!("{}.tmp", file_name))
    }

    fn persist_fresh(&self) -> ConfigModel {
        let model = ConfigModel::default();
        if let Err(e) = self.flush(&model, Instant::now()) {
            tracing::error!("Failed to create empty configuration: {}", e);
        }
        model
    }
}
