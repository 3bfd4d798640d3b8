use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// One saved sub-build: a versioned envelope around its encoded selections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredBundle {
    /// Missing versions read as 0, the legacy flat layout.
    #[serde(default)]
    pub version: u32,
    pub data: Value,
}

/// The whole persisted document: bundle kind -> build name -> bundle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SavedBuilds(pub BTreeMap<String, BTreeMap<String, StoredBundle>>);

impl SavedBuilds {
    pub fn get(&self, kind: &str, name: &str) -> Option<&StoredBundle> {
        self.0.get(kind).and_then(|builds| builds.get(name))
    }

    pub fn contains(&self, kind: &str, name: &str) -> bool {
        self.get(kind, name).is_some()
    }

    pub fn builds(&self, kind: &str) -> impl Iterator<Item = (&String, &StoredBundle)> {
        self.0.get(kind).into_iter().flat_map(|builds| builds.iter())
    }

    pub fn count(&self, kind: &str) -> usize {
        self.0.get(kind).map_or(0, BTreeMap::len)
    }

    pub fn insert(&mut self, kind: &str, name: &str, bundle: StoredBundle) -> Option<StoredBundle> {
        self.0
            .entry(kind.to_string())
            .or_default()
            .insert(name.to_string(), bundle)
    }

    pub fn remove(&mut self, kind: &str, name: &str) -> Option<StoredBundle> {
        let builds = self.0.get_mut(kind)?;
        let removed = builds.remove(name);
        if builds.is_empty() {
            self.0.remove(kind);
        }
        removed
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid data: {0}")]
    InvalidData(String),
}

/// Durable home of the saved-builds document. Reads of malformed content
/// degrade to an empty document instead of failing.
pub trait BuildRepository {
    fn load_document(&self) -> Result<SavedBuilds, StoreError>;
    fn store_document(&mut self, builds: &SavedBuilds) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn document_keeps_the_nested_layout() {
        let mut builds = SavedBuilds::default();
        builds.insert(
            "companion",
            "Ash",
            StoredBundle {
                version: 1,
                data: json!({"sets": {}}),
            },
        );
        let encoded = serde_json::to_value(&builds).expect("encode");
        assert_eq!(encoded, json!({"companion": {"Ash": {"version": 1, "data": {"sets": {}}}}}));

        assert_eq!(builds.remove("companion", "Ash").map(|b| b.version), Some(1));
        assert!(builds.0.is_empty());
    }

    #[test]
    fn missing_version_reads_as_legacy() {
        let builds: SavedBuilds =
            serde_json::from_value(json!({"loadout": {"old": {"data": {}}}})).expect("decode");
        assert_eq!(builds.get("loadout", "old").map(|b| b.version), Some(0));
    }
}
