use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use super::message::{normalize_entry_keys, normalize_object, DecodeError};

/// Anything that can be indexed by a case-insensitive string key.
pub trait Keyed {
    fn key(&self) -> &str;
}

/// A texture/model import resource published by the remote authority.
///
/// Only `Key` is interpreted; every other field is carried through untouched
/// (in insertion order) so downstream tooling sees exactly what was pushed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceEntry {
    #[serde(rename = "Key", default)]
    pub key: String,

    #[serde(flatten)]
    pub attributes: IndexMap<String, Value>,
}

/// Per-game shader metadata published by the remote authority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameMetadataEntry {
    #[serde(rename = "Key", default)]
    pub key: String,

    #[serde(flatten)]
    pub attributes: IndexMap<String, Value>,
}

impl ResourceEntry {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            attributes: IndexMap::new(),
        }
    }

    /// Builder-style helper to attach an opaque attribute
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }
}

impl GameMetadataEntry {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            attributes: IndexMap::new(),
        }
    }

    /// Builder-style helper to attach an opaque attribute
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }
}

impl Keyed for ResourceEntry {
    fn key(&self) -> &str {
        &self.key
    }
}

impl Keyed for GameMetadataEntry {
    fn key(&self) -> &str {
        &self.key
    }
}

/// The full in-memory configuration snapshot.
///
/// A `ConfigModel` is never mutated once it has been published by
/// [`crate::state::ConfigStore`]; writers build a new model and swap it in.
/// Empty sequences are a valid, loaded state and are distinct from the store
/// having no model at all.
///
/// # File format
///
/// Pretty-printed JSON with two top-level sequences:
///
/// ```json
/// {
///   "Resources": [ { "Key": "hair_ramp", "Path": "Textures/Ramp.png" } ],
///   "GameMetadata": [ { "Key": "GI", "Shader": "Toon/Character" } ]
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigModel {
    #[serde(rename = "Resources", default)]
    pub resources: Vec<ResourceEntry>,

    #[serde(rename = "GameMetadata", default)]
    pub game_metadata: Vec<GameMetadataEntry>,
}

impl ConfigModel {
    pub fn new(resources: Vec<ResourceEntry>, game_metadata: Vec<GameMetadataEntry>) -> Self {
        Self {
            resources,
            game_metadata,
        }
    }

    /// Build a fresh lookup index over the resource section
    pub fn resource_index(&self) -> KeyIndex<ResourceEntry> {
        KeyIndex::build(&self.resources)
    }

    /// Build a fresh lookup index over the game metadata section
    pub fn game_index(&self) -> KeyIndex<GameMetadataEntry> {
        KeyIndex::build(&self.game_metadata)
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty() && self.game_metadata.is_empty()
    }

    /// Serialize to the pretty, stable text encoding used for the backing file
    pub fn to_pretty_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Parse a backing-file document.
    ///
    /// Section names and each entry's `Key` tolerate a lower-case first
    /// letter. Attribute names are kept exactly as written.
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self, DecodeError> {
        let value: Value = serde_json::from_slice(bytes)?;
        let Value::Object(map) = value else {
            return Err(DecodeError::NotAnObject);
        };

        let mut map = normalize_object(map);
        normalize_entry_keys(&mut map, &["Resources", "GameMetadata"]);

        Ok(serde_json::from_value(Value::Object(map))?)
    }
}

/// Point-in-time, case-insensitive mapping from key to entry.
///
/// Rebuilt on every read so it is never affected by later writes to the
/// store. Entries with an empty key are not indexed; when two entries share a
/// key the later one in iteration order wins.
#[derive(Debug, Clone)]
pub struct KeyIndex<T> {
    entries: HashMap<String, T>,
}

impl<T: Keyed + Clone> KeyIndex<T> {
    pub fn build(items: &[T]) -> Self {
        let mut entries = HashMap::with_capacity(items.len());

        for item in items {
            let key = item.key();
            if key.is_empty() {
                tracing::debug!("Skipping entry with empty key while building index");
                continue;
            }
            entries.insert(key.to_lowercase(), item.clone());
        }

        Self { entries }
    }
}

impl<T> KeyIndex<T> {
    pub fn get(&self, key: &str) -> Option<&T> {
        self.entries.get(&key.to_lowercase())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(&key.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over the indexed entries in no particular order
    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.entries.values()
    }
}
