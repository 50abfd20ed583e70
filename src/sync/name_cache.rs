//! Project id → display name cache.
//!
//! Owned by whoever drives the batch loader and handed out by clone; clones
//! share one map. Entries are merged in after every batch and refreshed by
//! project renames and project change notifications.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug, Clone, Default)]
pub struct NameCache {
    names: Arc<RwLock<HashMap<String, String>>>,
}

impl NameCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<String> {
        self.names
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.names
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    /// Ids from `ids` that have no cached name, deduplicated, in first-seen order.
    #[must_use]
    pub fn missing<'a>(&self, ids: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        let names = self.names.read().unwrap_or_else(PoisonError::into_inner);
        let mut out: Vec<String> = Vec::new();
        for id in ids {
            if !names.contains_key(id) && !out.iter().any(|seen| seen == id) {
                out.push(id.to_string());
            }
        }
        out
    }

    pub fn insert(&self, id: impl Into<String>, name: impl Into<String>) {
        self.names
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.into(), name.into());
    }

    /// Merge a batch of `(id, name)` pairs. Later pairs win.
    pub fn merge(&self, entries: impl IntoIterator<Item = (String, String)>) {
        let mut names = self.names.write().unwrap_or_else(PoisonError::into_inner);
        names.extend(entries);
    }

    pub fn invalidate(&self, id: &str) {
        self.names
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
    }

    pub fn clear(&self) {
        self.names
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_entries() {
        let cache = NameCache::new();
        let handle = cache.clone();

        handle.insert("proj_a", "Apollo");
        assert_eq!(cache.get("proj_a").as_deref(), Some("Apollo"));

        cache.invalidate("proj_a");
        assert!(!handle.contains("proj_a"));
    }

    #[test]
    fn test_missing_dedups() {
        let cache = NameCache::new();
        cache.merge([("p1".to_string(), "One".to_string())]);

        let missing = cache.missing(["p2", "p1", "p3", "p2"]);
        assert_eq!(missing, vec!["p2".to_string(), "p3".to_string()]);
    }
}
