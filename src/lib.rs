// ShaderSync - live configuration sync for host editors
//
// This is the library crate containing the sync engine and its data structures.
// The binary crate (main.rs) provides a headless host for running it standalone.

pub mod config;
pub mod engine;
pub mod host;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod state;

// Re-export commonly used types for convenience
pub use config::{FlushOutcome, PersistenceError, PersistenceManager};
pub use engine::{EngineError, SyncEngine};
pub use host::{HeadlessHost, HostEvent, HostServices, LogLevel, NotificationSink};
pub use metrics::SyncMetrics;
pub use models::{ConfigModel, EngineSettings, GameMetadataEntry, Notification, ResourceEntry};
pub use services::ConnectionState;
pub use state::{ConfigChange, ConfigStore};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
