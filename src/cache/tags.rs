//! Bidirectional tag index.
//!
//! Tracks which cache keys are registered under which invalidation tags so a
//! tag purge can find every entry it has to drop.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::RwLock;

use super::keys::{CacheKey, Tag};
use super::lock::{read_guard, write_guard};

const SOURCE: &str = "cache::tags";

#[derive(Default)]
struct Maps {
    tag_to_keys: HashMap<Tag, HashSet<CacheKey>>,
    key_to_tags: HashMap<CacheKey, HashSet<Tag>>,
    // rendered key -> key, for media that report drops by name
    by_name: HashMap<String, CacheKey>,
}

impl Maps {
    fn detach(&mut self, key: &CacheKey) {
        if let Some(tags) = self.key_to_tags.remove(key) {
            self.by_name.remove(&key.to_string());
            for tag in tags {
                if let Some(keys) = self.tag_to_keys.get_mut(&tag) {
                    keys.remove(key);
                    if keys.is_empty() {
                        self.tag_to_keys.remove(&tag);
                    }
                }
            }
        }
    }
}

/// Tracks tag → keys and key → tags.
///
/// Both directions live behind one lock so readers never observe a key that
/// is present in one map and missing from the other.
#[derive(Default)]
pub struct TagIndex {
    maps: RwLock<Maps>,
}

impl TagIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `key` under `tags`, replacing any tags it had before.
    ///
    /// A key registered with no tags is simply forgotten.
    pub fn register(&self, key: &CacheKey, tags: &[Tag]) {
        let mut maps = write_guard(&self.maps, SOURCE, "register");
        maps.detach(key);
        if tags.is_empty() {
            return;
        }

        for tag in tags {
            maps.tag_to_keys
                .entry(tag.clone())
                .or_default()
                .insert(key.clone());
        }
        maps.key_to_tags
            .insert(key.clone(), tags.iter().cloned().collect());
        maps.by_name.insert(key.to_string(), key.clone());
    }

    /// Forget `key` under every tag.
    pub fn unregister(&self, key: &CacheKey) {
        write_guard(&self.maps, SOURCE, "unregister").detach(key);
    }

    pub fn unregister_many<'a>(&self, keys: impl IntoIterator<Item = &'a CacheKey>) {
        let mut maps = write_guard(&self.maps, SOURCE, "unregister_many");
        for key in keys {
            maps.detach(key);
        }
    }

    /// Forget keys the medium dropped on its own, given by their rendered names.
    ///
    /// Names that were never registered are ignored.
    pub fn unregister_names(&self, names: &[String]) {
        let mut maps = write_guard(&self.maps, SOURCE, "unregister_names");
        for name in names {
            if let Some(key) = maps.by_name.get(name).cloned() {
                maps.detach(&key);
            }
        }
    }

    /// Union of keys registered under any of `tags`, each key once.
    pub fn keys_for_tags<'a>(&self, tags: impl IntoIterator<Item = &'a Tag>) -> BTreeSet<CacheKey> {
        let maps = read_guard(&self.maps, SOURCE, "keys_for_tags");
        tags.into_iter()
            .filter_map(|tag| maps.tag_to_keys.get(tag))
            .flat_map(|keys| keys.iter().cloned())
            .collect()
    }

    /// Tags `key` is currently registered under.
    pub fn tags_for_key(&self, key: &CacheKey) -> HashSet<Tag> {
        read_guard(&self.maps, SOURCE, "tags_for_key")
            .key_to_tags
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    /// Drop the tag entries themselves once their keys are gone.
    pub fn remove_tags<'a>(&self, tags: impl IntoIterator<Item = &'a Tag>) {
        let mut maps = write_guard(&self.maps, SOURCE, "remove_tags");
        for tag in tags {
            if let Some(keys) = maps.tag_to_keys.remove(tag) {
                for key in keys {
                    if let Some(key_tags) = maps.key_to_tags.get_mut(&key) {
                        key_tags.remove(tag);
                        if key_tags.is_empty() {
                            maps.key_to_tags.remove(&key);
                            maps.by_name.remove(&key.to_string());
                        }
                    }
                }
            }
        }
    }

    pub fn is_registered(&self, key: &CacheKey) -> bool {
        read_guard(&self.maps, SOURCE, "is_registered")
            .key_to_tags
            .contains_key(key)
    }

    pub fn contains_tag(&self, tag: &Tag) -> bool {
        read_guard(&self.maps, SOURCE, "contains_tag")
            .tag_to_keys
            .contains_key(tag)
    }

    /// Number of tags with at least one key.
    pub fn tag_count(&self) -> usize {
        read_guard(&self.maps, SOURCE, "tag_count").tag_to_keys.len()
    }

    /// Number of keys with at least one tag.
    pub fn key_count(&self) -> usize {
        read_guard(&self.maps, SOURCE, "key_count").key_to_tags.len()
    }
}
