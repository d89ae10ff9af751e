//! Listing and order bundle state
//!
//! Per listing: the listing event plus two maps of order bundles, one for
//! confirmed orders keyed by their result event id and one for pending
//! orders keyed by the originating request id. Per order: capped
//! per-stage buckets of request, result and feedback events.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use shared::event::{KIND_FEEDBACK, is_request_kind, is_result_kind};
use shared::{TradeEvent, TradeStage};

/// Cap applied to every per-stage bucket and to each orphan list
pub const MAX_ITEMS_PER_BUCKET: usize = 50;

/// Bounded append-ordered event list: oldest discarded first once over
/// the cap, pushes deduplicated by event id.
#[derive(Debug, Clone, Default)]
pub struct CappedBucket {
    items: VecDeque<Arc<TradeEvent>>,
}

impl CappedBucket {
    /// Append unless an event with the same id is already present.
    /// Returns whether the event was added.
    pub fn push(&mut self, event: Arc<TradeEvent>) -> bool {
        if self.contains(&event.id) {
            return false;
        }
        self.items.push_back(event);
        if self.items.len() > MAX_ITEMS_PER_BUCKET {
            self.items.pop_front();
        }
        true
    }

    pub fn contains(&self, event_id: &str) -> bool {
        self.items.iter().any(|e| e.id == event_id)
    }

    pub fn last(&self) -> Option<&Arc<TradeEvent>> {
        self.items.back()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<TradeEvent>> {
        self.items.iter()
    }
}

/// Per-stage capped buckets
#[derive(Debug, Clone, Default)]
pub struct StageBuckets {
    buckets: HashMap<TradeStage, CappedBucket>,
}

impl StageBuckets {
    pub fn push(&mut self, stage: TradeStage, event: Arc<TradeEvent>) -> bool {
        self.buckets.entry(stage).or_default().push(event)
    }

    pub fn get(&self, stage: TradeStage) -> Option<&CappedBucket> {
        self.buckets.get(&stage)
    }

    /// Id of the newest event in the stage's bucket
    pub fn last_id(&self, stage: TradeStage) -> Option<&str> {
        self.get(stage)?.last().map(|e| e.id.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.values().all(|b| b.is_empty())
    }
}

/// One buyer's thread against a listing
///
/// `order_id` stays empty while the order is pending; the bundle gains it
/// when the order result arrives and the bundle moves to the confirmed map.
#[derive(Debug, Clone)]
pub struct OrderBundle {
    pub order_id: Option<String>,
    pub listing_id: String,
    pub requests: StageBuckets,
    pub results: StageBuckets,
    pub feedback: StageBuckets,
    pub started_at: i64,
    pub last_update_at: i64,
    pub loading: bool,
}

impl OrderBundle {
    pub fn new(listing_id: impl Into<String>, now_ms: i64) -> Self {
        Self {
            order_id: None,
            listing_id: listing_id.into(),
            requests: StageBuckets::default(),
            results: StageBuckets::default(),
            feedback: StageBuckets::default(),
            started_at: now_ms,
            last_update_at: now_ms,
            loading: false,
        }
    }

    /// Bucket the event by its kind class under `stage`. An order-stage
    /// request marks the bundle loading; any result clears it.
    pub fn attach(&mut self, event: &Arc<TradeEvent>, stage: Option<TradeStage>, now_ms: i64) {
        let Some(stage) = stage else {
            return;
        };

        if is_request_kind(event.kind) {
            self.requests.push(stage, event.clone());
            if event.kind == TradeStage::Order.request_kind() {
                self.loading = true;
            }
        } else if is_result_kind(event.kind) {
            self.results.push(stage, event.clone());
            self.loading = false;
        } else if event.kind == KIND_FEEDBACK {
            self.feedback.push(stage, event.clone());
        } else {
            return;
        }

        self.last_update_at = now_ms;
    }
}

/// The root negotiable item plus every order thread against it
#[derive(Debug, Clone, Default)]
pub struct ListingBundle {
    pub listing: Option<Arc<TradeEvent>>,
    pub orders: HashMap<String, OrderBundle>,
    pub pending_orders: HashMap<String, OrderBundle>,
}

impl ListingBundle {
    pub fn listing_id(&self) -> Option<&str> {
        self.listing.as_ref().map(|e| e.id.as_str())
    }
}
