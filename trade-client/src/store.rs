//! Latest-wins keyed event store
//!
//! Generic map from a caller-derived key to the newest known entry for
//! that key. Feeds from a cache seed plus live network updates; ties are
//! broken deterministically so independent replicas converge. Malformed
//! or unkeyable input is dropped, never an error.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Where an entry was observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    /// Locally cached rows used to seed initial state
    Indexed,
    /// The live relay stream
    Network,
}

/// A decoded event held by the store
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedEventEntry<T> {
    pub id: String,
    pub kind: u32,
    pub author: String,
    pub published_at: Option<i64>,
    pub source: EventSource,
    pub data: T,
}

/// Default newer-than judgment: higher `published_at` wins; on a tie the
/// network-sourced entry beats the cached one; on a full tie the lexically
/// larger id wins.
pub fn default_is_newer<T>(a: &IndexedEventEntry<T>, b: &IndexedEventEntry<T>) -> bool {
    let at = a.published_at.unwrap_or(0);
    let bt = b.published_at.unwrap_or(0);
    if at != bt {
        return at > bt;
    }
    if a.source != b.source {
        return a.source == EventSource::Network;
    }
    a.id > b.id
}

type KeyOf<T> = Box<dyn Fn(&IndexedEventEntry<T>) -> Option<String> + Send + Sync>;
type IsNewer<T> = Box<dyn Fn(&IndexedEventEntry<T>, &IndexedEventEntry<T>) -> bool + Send + Sync>;

/// Keyed store retaining only the newest entry per key
pub struct IndexedEventStore<T> {
    entries: HashMap<String, IndexedEventEntry<T>>,
    key_of: KeyOf<T>,
    is_newer: IsNewer<T>,
}

impl<T: 'static> IndexedEventStore<T> {
    pub fn new(
        key_of: impl Fn(&IndexedEventEntry<T>) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            entries: HashMap::new(),
            key_of: Box::new(key_of),
            is_newer: Box::new(default_is_newer),
        }
    }

    /// Replace the default newer-than judgment
    pub fn with_is_newer(
        mut self,
        is_newer: impl Fn(&IndexedEventEntry<T>, &IndexedEventEntry<T>) -> bool
        + Send
        + Sync
        + 'static,
    ) -> Self {
        self.is_newer = Box::new(is_newer);
        self
    }

    /// Merge one entry in: insert when the key is new, replace when the
    /// entry is judged newer, drop otherwise. Unkeyable entries are
    /// silently dropped.
    pub fn add(&mut self, entry: IndexedEventEntry<T>) {
        let Some(key) = (self.key_of)(&entry) else {
            return;
        };
        match self.entries.get(&key) {
            Some(existing) if !(self.is_newer)(&entry, existing) => {}
            _ => {
                self.entries.insert(key, entry);
            }
        }
    }

    /// Atomically replace the contents, keeping only the newest entry
    /// per key among duplicates in the input
    pub fn init(&mut self, items: Vec<IndexedEventEntry<T>>) {
        let mut entries = HashMap::new();
        for item in items {
            let Some(key) = (self.key_of)(&item) else {
                continue;
            };
            match entries.get(&key) {
                Some(existing) if !(self.is_newer)(&item, existing) => {}
                _ => {
                    entries.insert(key, item);
                }
            }
        }
        self.entries = entries;
    }

    pub fn get(&self, key: &str) -> Option<&IndexedEventEntry<T>> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries sorted by `published_at` descending
    pub fn list(&self) -> Vec<&IndexedEventEntry<T>> {
        let mut list: Vec<_> = self.entries.values().collect();
        list.sort_by(|a, b| b.published_at.unwrap_or(0).cmp(&a.published_at.unwrap_or(0)));
        list
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, key: &str, published_at: i64, source: EventSource) -> IndexedEventEntry<String> {
        IndexedEventEntry {
            id: id.to_string(),
            kind: 30402,
            author: "pk-1".to_string(),
            published_at: Some(published_at),
            source,
            data: key.to_string(),
        }
    }

    fn make_store() -> IndexedEventStore<String> {
        IndexedEventStore::new(|e: &IndexedEventEntry<String>| (!e.data.is_empty()).then(|| e.data.clone()))
    }

    #[test]
    fn test_add_keeps_higher_timestamp() {
        let mut store = make_store();
        store.add(entry("a", "k", 200, EventSource::Network));
        store.add(entry("b", "k", 100, EventSource::Network));
        assert_eq!(store.get("k").unwrap().id, "a");

        store.add(entry("c", "k", 300, EventSource::Indexed));
        assert_eq!(store.get("k").unwrap().id, "c");
    }

    #[test]
    fn test_tie_prefers_network_source() {
        let mut store = make_store();
        store.add(entry("a", "k", 100, EventSource::Network));
        store.add(entry("b", "k", 100, EventSource::Indexed));
        assert_eq!(store.get("k").unwrap().id, "a");

        let mut store = store_seeded_indexed();
        store.add(entry("b", "k", 100, EventSource::Network));
        assert_eq!(store.get("k").unwrap().id, "b");
    }

    fn store_seeded_indexed() -> IndexedEventStore<String> {
        let mut s = make_store();
        s.add(entry("a", "k", 100, EventSource::Indexed));
        s
    }

    #[test]
    fn test_full_tie_prefers_larger_id() {
        let mut store = make_store();
        store.add(entry("a", "k", 100, EventSource::Network));
        store.add(entry("b", "k", 100, EventSource::Network));
        assert_eq!(store.get("k").unwrap().id, "b");

        // arrival order must not matter
        let mut store2 = make_store();
        store2.add(entry("b", "k", 100, EventSource::Network));
        store2.add(entry("a", "k", 100, EventSource::Network));
        assert_eq!(store2.get("k").unwrap().id, "b");
    }

    #[test]
    fn test_unkeyable_entries_dropped() {
        let mut store = make_store();
        store.add(entry("a", "", 100, EventSource::Network));
        assert!(store.is_empty());
    }

    #[test]
    fn test_init_dedupes_input() {
        let mut store = make_store();
        store.add(entry("old", "k", 999, EventSource::Network));
        store.init(vec![
            entry("a", "k", 100, EventSource::Indexed),
            entry("b", "k", 200, EventSource::Indexed),
            entry("c", "j", 50, EventSource::Indexed),
            entry("", "", 10, EventSource::Indexed),
        ]);
        // init replaces, it does not merge
        assert_eq!(store.len(), 2);
        assert_eq!(store.get("k").unwrap().id, "b");
        assert_eq!(store.get("j").unwrap().id, "c");
    }

    #[test]
    fn test_list_sorted_descending() {
        let mut store = make_store();
        store.add(entry("a", "k1", 100, EventSource::Network));
        store.add(entry("b", "k2", 300, EventSource::Network));
        store.add(entry("c", "k3", 200, EventSource::Network));
        let ids: Vec<_> = store.list().into_iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }
}
