//! Listing and profile directories
//!
//! Reference-data views built on the latest-wins store: seeded from the
//! local index cache, kept current from the live relay stream. Events
//! that fail to decode are ignored.

use shared::TradeEvent;
use shared::event::{KIND_LISTING, KIND_PROFILE};
use shared::models::{ListingData, ProfileData};

use crate::store::{EventSource, IndexedEventEntry, IndexedEventStore};

fn network_entry<T>(event: &TradeEvent, data: T) -> IndexedEventEntry<T> {
    IndexedEventEntry {
        id: event.id.clone(),
        kind: event.kind,
        author: event.author.clone(),
        published_at: event.published_at,
        source: EventSource::Network,
        data,
    }
}

/// Listings keyed by the payload's stable `d_tag`
pub struct ListingDirectory {
    store: IndexedEventStore<ListingData>,
}

impl ListingDirectory {
    pub fn new() -> Self {
        Self {
            store: IndexedEventStore::new(|e: &IndexedEventEntry<ListingData>| {
                (!e.data.d_tag.is_empty()).then(|| e.data.d_tag.clone())
            }),
        }
    }

    /// Reset the directory from cached rows; rows are cache-sourced no
    /// matter what the caller stamped
    pub fn init_from_indexed(&mut self, rows: Vec<IndexedEventEntry<ListingData>>) {
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.source = EventSource::Indexed;
                row
            })
            .collect();
        self.store.init(rows);
    }

    /// Merge a live listing event in
    pub fn on_event(&mut self, event: &TradeEvent) {
        if event.kind != KIND_LISTING {
            return;
        }
        let Ok(data) = event.parse_data::<ListingData>() else {
            return;
        };
        self.store.add(network_entry(event, data));
    }

    pub fn get(&self, d_tag: &str) -> Option<&IndexedEventEntry<ListingData>> {
        self.store.get(d_tag)
    }

    /// Listings sorted by `published_at` descending
    pub fn list(&self) -> Vec<&IndexedEventEntry<ListingData>> {
        self.store.list()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

impl Default for ListingDirectory {
    fn default() -> Self {
        Self::new()
    }
}

/// Profiles keyed by author
pub struct ProfileDirectory {
    store: IndexedEventStore<ProfileData>,
}

impl ProfileDirectory {
    pub fn new() -> Self {
        Self {
            store: IndexedEventStore::new(|e| (!e.author.is_empty()).then(|| e.author.clone())),
        }
    }

    pub fn init_from_indexed(&mut self, rows: Vec<IndexedEventEntry<ProfileData>>) {
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.source = EventSource::Indexed;
                row
            })
            .collect();
        self.store.init(rows);
    }

    pub fn on_event(&mut self, event: &TradeEvent) {
        if event.kind != KIND_PROFILE {
            return;
        }
        let Ok(data) = event.parse_data::<ProfileData>() else {
            return;
        };
        self.store.add(network_entry(event, data));
    }

    pub fn get(&self, author: &str) -> Option<&IndexedEventEntry<ProfileData>> {
        self.store.get(author)
    }

    pub fn list(&self) -> Vec<&IndexedEventEntry<ProfileData>> {
        self.store.list()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

impl Default for ProfileDirectory {
    fn default() -> Self {
        Self::new()
    }
}
