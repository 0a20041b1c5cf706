use crate::config::PersistenceManager;
use crate::host::{EffectSender, LogLevel};
use crate::metrics::SyncMetrics;
use crate::models::{DecodeError, MessageKind, RemoteMessage};
use crate::state::ConfigStore;
use std::sync::Arc;
use std::time::Instant;

/// What happened to an accepted message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleOutcome {
    /// `init`/`update`: both sections replaced
    Applied {
        first: bool,
        resources: usize,
        games: usize,
    },
    /// `popup`: notifications queued for the main thread
    Forwarded { popups: usize },
    /// Unrecognized or empty `type`
    Ignored { kind: String },
}

/// Decodes payloads and applies them to the store.
///
/// Runs on the network task. It never touches the backing file or the host:
/// persistence is requested through the pending-write flag and everything
/// user-visible goes through the [`EffectSender`].
#[derive(Clone)]
pub struct RemoteMessageHandler {
    store: Arc<ConfigStore>,
    persistence: Arc<PersistenceManager>,
    effects: EffectSender,
    metrics: Arc<SyncMetrics>,
}

impl RemoteMessageHandler {
    pub fn new(
        store: Arc<ConfigStore>,
        persistence: Arc<PersistenceManager>,
        effects: EffectSender,
        metrics: Arc<SyncMetrics>,
    ) -> Self {
        Self {
            store,
            persistence,
            effects,
            metrics,
        }
    }

    /// Decode and apply one complete payload
    pub fn handle_payload(
        &self,
        payload: &[u8],
        now: Instant,
    ) -> Result<HandleOutcome, DecodeError> {
        let message = RemoteMessage::decode(payload)?;
        Ok(self.apply(message, now))
    }

    /// Apply a decoded message.
    ///
    /// `init` and `update` replace both sections, with omitted lists taken as
    /// empty. The first one of a session is flagged for an immediate write.
    pub fn apply(&self, message: RemoteMessage, now: Instant) -> HandleOutcome {
        match message.message_kind() {
            MessageKind::Init | MessageKind::Update => {
                let (resources, games) = message.into_sections();
                let model = self.store.replace_all(resources, games);

                let first = self.store.mark_remote_update(now);
                self.persistence.mark_pending(first);
                self.metrics.record_message_accepted();

                self.effects.log(
                    LogLevel::Info,
                    format!(
                        "Remote configuration received: {} resources, {} games",
                        model.resources.len(),
                        model.game_metadata.len()
                    ),
                );

                HandleOutcome::Applied {
                    first,
                    resources: model.resources.len(),
                    games: model.game_metadata.len(),
                }
            }
            MessageKind::Popup => {
                let popups = message.popups.unwrap_or_default();
                let count = popups.len();
                if count > 0 {
                    self.effects.notify(popups);
                }
                HandleOutcome::Forwarded { popups: count }
            }
            MessageKind::Unknown(kind) => {
                self.effects.log(
                    LogLevel::Debug,
                    format!("Ignoring remote message with type '{}'", kind),
                );
                HandleOutcome::Ignored { kind }
            }
        }
    }

    /// Log and count a payload that had to be dropped
    pub fn report_decode_failure(&self, error: &DecodeError) {
        self.metrics.record_decode_failure();
        tracing::warn!("Dropping remote message: {}", error);
        self.effects.log(
            LogLevel::Warning,
            format!("Discarded malformed remote message: {}", error),
        );
    }
}
