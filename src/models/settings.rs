use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

/// Environment variable prefix for overrides (e.g. `SHADERSYNC_ENDPOINT`)
pub const ENV_PREFIX: &str = "SHADERSYNC";

/// Engine tunables loaded from `shadersync.yaml` and the environment.
///
/// Every field has a default, so an absent settings file is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Address of the remote authority
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Path of the persisted configuration document
    #[serde(default = "default_backing_file")]
    pub backing_file: Utf8PathBuf,

    /// Minimum interval between flushes triggered by remote updates
    #[serde(default = "default_write_throttle_secs")]
    pub write_throttle_secs: u64,

    /// Fixed delay before reconnecting after a lost or failed connection
    #[serde(default = "default_reconnect_backoff_secs")]
    pub reconnect_backoff_secs: u64,

    /// Cadence of the main-thread bridge poll
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Upper bound on a single connect attempt
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Capacity of the deferred-effect queue drained by the main thread
    #[serde(default = "default_log_queue_capacity")]
    pub log_queue_capacity: usize,

    /// Reassembled payloads larger than this are discarded
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,

    /// Start the remote client as soon as the engine starts
    #[serde(default = "default_auto_connect")]
    pub auto_connect: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            backing_file: default_backing_file(),
            write_throttle_secs: default_write_throttle_secs(),
            reconnect_backoff_secs: default_reconnect_backoff_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            log_queue_capacity: default_log_queue_capacity(),
            max_message_bytes: default_max_message_bytes(),
            auto_connect: default_auto_connect(),
        }
    }
}

fn default_endpoint() -> String {
    "ws://127.0.0.1:8765/config".to_string()
}

fn default_backing_file() -> Utf8PathBuf {
    Utf8PathBuf::from("ShaderSync/config.json")
}

fn default_write_throttle_secs() -> u64 {
    10
}

fn default_reconnect_backoff_secs() -> u64 {
    5
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_log_queue_capacity() -> usize {
    1024
}

fn default_max_message_bytes() -> usize {
    16 * 1024 * 1024
}

fn default_auto_connect() -> bool {
    true
}

impl EngineSettings {
    /// Load settings from an optional YAML file plus `SHADERSYNC_*` variables.
    ///
    /// A missing file is not an error. Environment values win over the file.
    pub fn load<P: AsRef<Utf8Path>>(path: P) -> Result<Self> {
        Self::load_with_env(path, None)
    }

    /// Same as [`load`](Self::load), but reads overrides from `env` instead of
    /// the process environment when it is `Some`.
    pub fn load_with_env<P: AsRef<Utf8Path>>(
        path: P,
        env: Option<config::Map<String, String>>,
    ) -> Result<Self> {
        let path = path.as_ref();

        let settings: EngineSettings = Config::builder()
            .add_source(File::new(path.as_str(), FileFormat::Yaml).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .source(env),
            )
            .build()
            .with_context(|| format!("Failed to read settings: {}", path))?
            .try_deserialize()
            .with_context(|| format!("Failed to parse settings: {}", path))?;

        Ok(settings.validated())
    }

    /// Write these settings as YAML, e.g. to create a starter file
    pub fn write_template<P: AsRef<Utf8Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create settings directory: {}", parent))?;
            }
        }

        let yaml_string =
            serde_yaml_ng::to_string(self).context("Failed to serialize settings to YAML")?;

        fs::write(path, yaml_string)
            .with_context(|| format!("Failed to write settings: {}", path))?;

        tracing::info!("Wrote settings template to {}", path);
        Ok(())
    }

    /// Replace zero intervals and capacities with their defaults
    pub fn validated(mut self) -> Self {
        let defaults = EngineSettings::default();

        if self.write_throttle_secs == 0 {
            tracing::warn!(
                "write_throttle_secs must be positive, using {}",
                defaults.write_throttle_secs
            );
            self.write_throttle_secs = defaults.write_throttle_secs;
        }
        if self.reconnect_backoff_secs == 0 {
            tracing::warn!(
                "reconnect_backoff_secs must be positive, using {}",
                defaults.reconnect_backoff_secs
            );
            self.reconnect_backoff_secs = defaults.reconnect_backoff_secs;
        }
        if self.poll_interval_secs == 0 {
            tracing::warn!(
                "poll_interval_secs must be positive, using {}",
                defaults.poll_interval_secs
            );
            self.poll_interval_secs = defaults.poll_interval_secs;
        }
        if self.connect_timeout_secs == 0 {
            tracing::warn!(
                "connect_timeout_secs must be positive, using {}",
                defaults.connect_timeout_secs
            );
            self.connect_timeout_secs = defaults.connect_timeout_secs;
        }
        if self.log_queue_capacity == 0 {
            tracing::warn!(
                "log_queue_capacity must be positive, using {}",
                defaults.log_queue_capacity
            );
            self.log_queue_capacity = defaults.log_queue_capacity;
        }
        if self.max_message_bytes == 0 {
            tracing::warn!(
                "max_message_bytes must be positive, using {}",
                defaults.max_message_bytes
            );
            self.max_message_bytes = defaults.max_message_bytes;
        }

        self
    }

    pub fn write_throttle(&self) -> Duration {
        Duration::from_secs(self.write_throttle_secs)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_secs(self.reconnect_backoff_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}
