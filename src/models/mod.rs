// Models module - data structures for configuration, wire messages and settings
//
// This module contains:
// - ConfigModel: The in-memory configuration snapshot (resources + game metadata)
// - RemoteMessage: Messages pushed by the remote authority
// - EngineSettings: Tunables loaded from the settings file and environment

pub mod config;
pub mod message;
pub mod settings;

pub use config::{ConfigModel, GameMetadataEntry, KeyIndex, Keyed, ResourceEntry};
pub use message::{DecodeError, MessageKind, Notification, RemoteMessage};
pub use settings::EngineSettings;
