// Host module - the cooperative main-thread side of the engine
//
// This module contains:
// - HostServices / NotificationSink: narrow interfaces onto the host editor
// - MainThreadBridge: Drains deferred effects and runs the periodic health poll

pub mod bridge;

pub use bridge::{DeferredEffect, EffectSender, MainThreadBridge, PollReport, deferred_queue};

use crate::models::Notification;

/// Severity of a deferred log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

/// A log line produced off the main thread, emitted during the next poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
}

/// Lifecycle hooks the host reports to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostEvent {
    /// The host is idle; the bridge may poll if its cadence has elapsed
    IdleTick,
    /// Scripts or assemblies are about to be reloaded or unloaded
    BeforeReload,
    /// The host process or session is ending
    ShuttingDown,
}

/// Host editor services used by the engine.
///
/// Every method is called from the host's main thread only.
#[cfg_attr(test, mockall::automock)]
pub trait HostServices: Send + Sync {
    /// Write a line to the host's console
    fn emit_log(&self, level: LogLevel, message: &str);

    /// Ask the host's asset index to pick up the rewritten backing file
    fn refresh_asset_index(&self);

    /// True while the host is inside an update cycle and cannot refresh assets
    fn is_updating(&self) -> bool;
}

/// Presents `popup` notifications pushed by the remote authority
#[cfg_attr(test, mockall::automock)]
pub trait NotificationSink: Send + Sync {
    fn show(&self, notifications: &[Notification]);
}

/// Host implementation for headless runs: the console is the tracing log and
/// there is no asset index to refresh.
#[derive(Debug, Default, Clone)]
pub struct HeadlessHost;

impl HostServices for HeadlessHost {
    fn emit_log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Debug => tracing::debug!(target: "shadersync::console", "{}", message),
            LogLevel::Info => tracing::info!(target: "shadersync::console", "{}", message),
            LogLevel::Warning => tracing::warn!(target: "shadersync::console", "{}", message),
            LogLevel::Error => tracing::error!(target: "shadersync::console", "{}", message),
        }
    }

    fn refresh_asset_index(&self) {
        tracing::debug!("No asset index in headless mode, skipping refresh");
    }

    fn is_updating(&self) -> bool {
        false
    }
}

impl NotificationSink for HeadlessHost {
    fn show(&self, notifications: &[Notification]) {
        for notification in notifications {
            tracing::info!(
                target: "shadersync::console",
                "[{}] {}",
                notification.title,
                notification.message
            );
        }
    }
}
