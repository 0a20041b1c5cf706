use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use super::config::{GameMetadataEntry, ResourceEntry};

/// Errors produced while turning a reassembled payload into a [`RemoteMessage`]
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Malformed JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Payload is not a JSON object")]
    NotAnObject,

    #[error("Payload exceeds {limit} bytes")]
    TooLarge { limit: usize },
}

/// Discriminator carried in the `type` field of a remote message.
///
/// Matching is case-insensitive. `init` and `update` are handled identically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    Init,
    Update,
    Popup,
    Unknown(String),
}

impl MessageKind {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case("init") {
            MessageKind::Init
        } else if trimmed.eq_ignore_ascii_case("update") {
            MessageKind::Update
        } else if trimmed.eq_ignore_ascii_case("popup") {
            MessageKind::Popup
        } else {
            MessageKind::Unknown(trimmed.to_string())
        }
    }

    /// True for message kinds that replace the configuration
    pub fn replaces_config(&self) -> bool {
        matches!(self, MessageKind::Init | MessageKind::Update)
    }
}

/// A notification pushed with a `popup` message.
///
/// Presentation belongs to the host's notification collaborator; only the
/// title and message text are interpreted here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(rename = "Title", default)]
    pub title: String,

    #[serde(rename = "Message", default)]
    pub message: String,

    #[serde(flatten)]
    pub attributes: IndexMap<String, Value>,
}

impl Notification {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            attributes: IndexMap::new(),
        }
    }
}

/// A decoded message from the remote authority.
///
/// Every payload list is optional on the wire. For `init`/`update` a missing
/// list means "this section is now empty", see [`RemoteMessage::into_sections`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RemoteMessage {
    #[serde(rename = "Type", default)]
    pub kind: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub games: Option<Vec<GameMetadataEntry>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<Vec<ResourceEntry>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub popups: Option<Vec<Notification>>,
}

impl RemoteMessage {
    /// Decode a complete payload.
    ///
    /// Field names of the envelope and of every list element are accepted in
    /// PascalCase or lower/camel case. Both spellings bind to the same field;
    /// when a payload carries both, the one appearing later wins.
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let value: Value = serde_json::from_slice(payload)?;
        let Value::Object(map) = value else {
            return Err(DecodeError::NotAnObject);
        };

        let mut map = normalize_object(map);
        normalize_sections(&mut map, &["Games", "Resources", "Popups"]);

        Ok(serde_json::from_value(Value::Object(map))?)
    }

    pub fn message_kind(&self) -> MessageKind {
        MessageKind::parse(self.kind.as_deref().unwrap_or_default())
    }

    /// Split into `(resources, game_metadata)`, treating omitted lists as empty
    pub fn into_sections(self) -> (Vec<ResourceEntry>, Vec<GameMetadataEntry>) {
        (
            self.resources.unwrap_or_default(),
            self.games.unwrap_or_default(),
        )
    }
}

/// Map a wire field name onto its canonical PascalCase spelling
pub(crate) fn canonical_field_name(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Re-key an object with canonical field names, keeping document order.
/// A later spelling of the same field overwrites an earlier one.
pub(crate) fn normalize_object(map: Map<String, Value>) -> Map<String, Value> {
    let mut normalized = Map::with_capacity(map.len());
    for (name, value) in map {
        normalized.insert(canonical_field_name(&name), value);
    }
    normalized
}

/// Normalize the elements of the named array sections in place.
///
/// Only the top level of each element is touched; nested attribute values are
/// opaque data and keep their spelling.
pub(crate) fn normalize_sections(map: &mut Map<String, Value>, sections: &[&str]) {
    for section in sections {
        if let Some(Value::Array(items)) = map.get_mut(*section) {
            for item in items.iter_mut() {
                if let Value::Object(object) = item {
                    *object = normalize_object(std::mem::take(object));
                }
            }
        }
    }
}

/// Canonicalize only the `Key` field of each element in the named sections.
///
/// Every other attribute name is user data and keeps its spelling.
pub(crate) fn normalize_entry_keys(map: &mut Map<String, Value>, sections: &[&str]) {
    for section in sections {
        if let Some(Value::Array(items)) = map.get_mut(*section) {
            for item in items.iter_mut() {
                if let Value::Object(object) = item {
                    if object.contains_key("Key") || !object.contains_key("key") {
                        continue;
                    }
                    let mut renamed = Map::with_capacity(object.len());
                    for (name, value) in std::mem::take(object) {
                        if name == "key" {
                            renamed.insert("Key".to_string(), value);
                        } else {
                            renamed.insert(name, value);
                        }
                    }
                    *object = renamed;
                }
            }
        }
    }
}
