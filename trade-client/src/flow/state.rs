//! Engine state and the per-event ingestion state machine
//!
//! One owned struct holds every index the engine maintains: the listing
//! map, the thread index routing event ids to their listing/order, the
//! orphan buffer for events whose parent is not yet known, the loading
//! id set and the waiter registry. All mutation happens on the single
//! ingest path, one event to completion at a time.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use tracing::{debug, trace, warn};

use shared::event::{KIND_FEEDBACK, KIND_LISTING, MARKER_LISTING, is_result_kind};
use shared::{TradeEvent, TradeStage};

use crate::bundle::{ListingBundle, MAX_ITEMS_PER_BUCKET, OrderBundle};
use crate::error::TradeFlowError;
use crate::flow::waiter::WaiterRegistry;

/// Routing entry: where an indexed event belongs. `stage` records the
/// event's own stage so a feedback event can be bucketed under the stage
/// of the request it references.
#[derive(Debug, Clone)]
struct ThreadRef {
    listing_id: String,
    order_id: Option<String>,
    stage: Option<TradeStage>,
}

/// All mutable engine state for one subscription lifetime
#[derive(Default)]
pub struct FlowState {
    listings: HashMap<String, ListingBundle>,
    events_to_thread: HashMap<String, ThreadRef>,
    orphans_by_ref: HashMap<String, VecDeque<Arc<TradeEvent>>>,
    loading_ids: HashSet<String>,
    pub waiters: WaiterRegistry,
    latest_update: Option<Arc<TradeEvent>>,
    load_complete: bool,
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl FlowState {
    /// Discard every index and reject every pending waiter. Returns how
    /// many waiters were rejected.
    pub fn clear_for_restart(&mut self) -> usize {
        self.listings.clear();
        self.events_to_thread.clear();
        self.orphans_by_ref.clear();
        self.loading_ids.clear();
        self.latest_update = None;
        self.load_complete = false;
        self.waiters.reject_all(TradeFlowError::ServiceDestroyed)
    }

    /// The relay has delivered every stored event; later results and
    /// feedback move the latest-update pointer.
    pub fn mark_load_complete(&mut self) {
        self.load_complete = true;
    }

    // ==================== Read surface ====================

    pub fn get_listing(&self, listing_id: &str) -> Option<&ListingBundle> {
        self.listings.get(listing_id)
    }

    /// Confirmed order bundle only; pending orders live under their
    /// request id in the listing bundle.
    pub fn get_order(&self, listing_id: &str, order_id: &str) -> Option<&OrderBundle> {
        self.listings.get(listing_id)?.orders.get(order_id)
    }

    pub fn listings(&self) -> &HashMap<String, ListingBundle> {
        &self.listings
    }

    pub fn is_loading(&self, event_id: &str) -> bool {
        self.loading_ids.contains(event_id)
    }

    pub fn mark_loading(&mut self, event_id: &str) {
        self.loading_ids.insert(event_id.to_string());
    }

    pub fn clear_loading(&mut self, event_id: &str) {
        self.loading_ids.remove(event_id);
    }

    pub fn latest_update(&self) -> Option<Arc<TradeEvent>> {
        self.latest_update.clone()
    }

    // ==================== Ingestion ====================

    /// Route one event, running to completion: orphans adopted along the
    /// way are drained through the same call before it returns.
    pub fn ingest(&mut self, event: TradeEvent) {
        let mut queue = VecDeque::new();
        queue.push_back(Arc::new(event));
        while let Some(event) = queue.pop_front() {
            self.ingest_one(event, &mut queue);
        }
    }

    fn ingest_one(&mut self, event: Arc<TradeEvent>, queue: &mut VecDeque<Arc<TradeEvent>>) {
        if event.id.is_empty() {
            debug!(kind = event.kind, "dropping event without id");
            return;
        }

        if event.kind == KIND_LISTING {
            self.ingest_listing(event, queue);
            return;
        }

        let ref_id = event.event_ref().map(str::to_string);

        if event.kind == TradeStage::Order.request_kind() {
            self.ingest_order_request(event, ref_id, queue);
            return;
        }

        if event.kind == TradeStage::Order.result_kind() {
            self.ingest_order_result(event, ref_id, queue);
            return;
        }

        self.ingest_thread_event(event, ref_id, queue);
    }

    /// Listing event: its own id is the listing id.
    fn ingest_listing(&mut self, event: Arc<TradeEvent>, queue: &mut VecDeque<Arc<TradeEvent>>) {
        let listing_id = event.id.clone();

        let bundle = self.listings.entry(listing_id.clone()).or_default();
        bundle.listing = Some(event.clone());
        // orders created before the listing was known carry a provisional id
        for order in bundle.orders.values_mut() {
            order.listing_id = listing_id.clone();
        }
        for order in bundle.pending_orders.values_mut() {
            order.listing_id = listing_id.clone();
        }

        self.index_event(&event, &listing_id, None);
        self.adopt_orphans(&listing_id, queue);
        trace!(%listing_id, "listing ingested");
    }

    /// Order request: opens a pending order keyed by the request id.
    fn ingest_order_request(
        &mut self,
        event: Arc<TradeEvent>,
        ref_id: Option<String>,
        queue: &mut VecDeque<Arc<TradeEvent>>,
    ) {
        let listing_id = event
            .marker_input(MARKER_LISTING)
            .map(str::to_string)
            .or_else(|| ref_id.as_deref().and_then(|r| self.listing_of(r)))
            .unwrap_or_else(|| event.id.clone());

        let now = now_ms();
        let listing = self.listings.entry(listing_id.clone()).or_default();
        let order = listing
            .pending_orders
            .entry(event.id.clone())
            .or_insert_with(|| OrderBundle::new(listing_id.as_str(), now));
        order.attach(&event, Some(TradeStage::Order), now);

        self.index_event(&event, &listing_id, None);
        let own_id = event.id.clone();
        self.adopt_orphans(&own_id, queue);
        trace!(%listing_id, request_id = %own_id, "order request ingested");
    }

    /// Order result: promotes the pending order to confirmed under the
    /// result's id and resolves waiters blocked on the request.
    fn ingest_order_result(
        &mut self,
        event: Arc<TradeEvent>,
        ref_id: Option<String>,
        queue: &mut VecDeque<Arc<TradeEvent>>,
    ) {
        let Some(request_id) = ref_id else {
            debug!(id = %event.id, "order result without request reference");
            return;
        };

        let Some(listing_id) = self.listing_of(&request_id) else {
            self.buffer_orphan(request_id, event);
            return;
        };

        let order_id = event.id.clone();
        let now = now_ms();
        let listing = self.listings.entry(listing_id.clone()).or_default();

        let order = match listing.pending_orders.remove(&request_id) {
            Some(mut pending) => {
                pending.order_id = Some(order_id.clone());
                match listing.orders.entry(order_id.clone()) {
                    Entry::Vacant(slot) => slot.insert(pending),
                    // duplicate result: the already-confirmed bundle wins
                    Entry::Occupied(slot) => slot.into_mut(),
                }
            }
            None => listing.orders.entry(order_id.clone()).or_insert_with(|| {
                let mut bundle = OrderBundle::new(listing_id.as_str(), now);
                bundle.order_id = Some(order_id.clone());
                bundle
            }),
        };
        order.attach(&event, Some(TradeStage::Order), now);

        self.index_event(&event, &listing_id, Some(&order_id));
        // the request's provisional thread gains the order id
        if let Some(thread) = self.events_to_thread.get_mut(&request_id) {
            thread.order_id = Some(order_id.clone());
        }

        self.resolve_waiters(&request_id, &event);
        self.adopt_orphans(&order_id, queue);
        trace!(%listing_id, %order_id, "order confirmed");
    }

    /// Any later stage or feedback event, routed via its reference.
    fn ingest_thread_event(
        &mut self,
        event: Arc<TradeEvent>,
        ref_id: Option<String>,
        queue: &mut VecDeque<Arc<TradeEvent>>,
    ) {
        let Some(ref_id) = ref_id else {
            debug!(id = %event.id, kind = event.kind, "stage event without reference");
            return;
        };

        let Some(listing_id) = self.listing_of(&ref_id) else {
            self.buffer_orphan(ref_id, event);
            return;
        };

        let ref_thread = self.events_to_thread.get(&ref_id).cloned();
        let order_id = ref_thread.as_ref().and_then(|t| t.order_id.clone());
        // feedback carries no stage of its own, bucket under the
        // referenced event's stage
        let stage = TradeStage::from_event_kind(event.kind)
            .or_else(|| ref_thread.as_ref().and_then(|t| t.stage));
        let now = now_ms();

        let Some(order_id) = order_id else {
            // the thread exists but its order is still pending
            let listing = self.listings.entry(listing_id.clone()).or_default();
            if let Some(order) = listing.pending_orders.get_mut(&ref_id) {
                order.attach(&event, stage, now);
                self.index_event(&event, &listing_id, None);
                let own_id = event.id.clone();
                self.adopt_orphans(&own_id, queue);
            } else {
                self.buffer_orphan(ref_id, event);
            }
            return;
        };

        let listing = self.listings.entry(listing_id.clone()).or_default();
        let order = listing
            .orders
            .entry(order_id.clone())
            .or_insert_with(|| {
                let mut bundle = OrderBundle::new(listing_id.as_str(), now);
                bundle.order_id = Some(order_id.clone());
                bundle
            });
        order.attach(&event, stage, now);

        self.index_event(&event, &listing_id, Some(&order_id));
        let own_id = event.id.clone();
        self.adopt_orphans(&own_id, queue);

        self.resolve_waiters(&ref_id, &event);

        if self.load_complete && (is_result_kind(event.kind) || event.kind == KIND_FEEDBACK) {
            self.latest_update = Some(event.clone());
        }
    }

    // ==================== Bookkeeping ====================

    fn listing_of(&self, ref_id: &str) -> Option<String> {
        self.events_to_thread.get(ref_id).map(|t| t.listing_id.clone())
    }

    fn index_event(&mut self, event: &Arc<TradeEvent>, listing_id: &str, order_id: Option<&str>) {
        self.events_to_thread.insert(
            event.id.clone(),
            ThreadRef {
                listing_id: listing_id.to_string(),
                order_id: order_id.map(str::to_string),
                stage: TradeStage::from_event_kind(event.kind),
            },
        );
    }

    fn buffer_orphan(&mut self, ref_id: String, event: Arc<TradeEvent>) {
        let list = self.orphans_by_ref.entry(ref_id.clone()).or_default();
        if list.iter().any(|e| e.id == event.id) {
            return;
        }
        trace!(%ref_id, id = %event.id, "buffering orphan");
        list.push_back(event);
        if list.len() > MAX_ITEMS_PER_BUCKET {
            list.pop_front();
            warn!(%ref_id, "orphan list over cap, dropped oldest");
        }
    }

    fn adopt_orphans(&mut self, parent_id: &str, queue: &mut VecDeque<Arc<TradeEvent>>) {
        if let Some(children) = self.orphans_by_ref.remove(parent_id) {
            debug!(parent_id, count = children.len(), "adopting orphans");
            queue.extend(children);
        }
    }

    /// Resolve qualifying waiters; once none remain for the request the
    /// id stops reading as loading.
    fn resolve_waiters(&mut self, request_id: &str, event: &TradeEvent) -> usize {
        let resolved = self.waiters.resolve(request_id, event);
        if resolved > 0 && !self.waiters.has_waiters(request_id) {
            self.loading_ids.remove(request_id);
        }
        resolved
    }

    // ==================== Publish-side helpers ====================

    /// Seed local state for a just-published order request so the
    /// pending order is visible before the deferred ingest runs. The
    /// later ingest of the same event is a deduplicated no-op.
    pub fn seed_order_request(&mut self, listing_id: &str, request: &TradeEvent) {
        let request = Arc::new(request.clone());
        let now = now_ms();

        let listing = self.listings.entry(listing_id.to_string()).or_default();
        let order = listing
            .pending_orders
            .entry(request.id.clone())
            .or_insert_with(|| OrderBundle::new(listing_id, now));
        order.attach(&request, Some(TradeStage::Order), now);

        self.index_event(&request, listing_id, None);
    }

    /// Flip the loading flag on the bundle a request routes to
    pub fn update_loading_by_request(&mut self, request_id: &str, loading: bool) {
        let Some(thread) = self.events_to_thread.get(request_id).cloned() else {
            return;
        };
        let Some(listing) = self.listings.get_mut(&thread.listing_id) else {
            return;
        };

        if let Some(order) = listing.pending_orders.get_mut(request_id) {
            order.loading = loading;
            return;
        }
        if let Some(order_id) = &thread.order_id {
            if let Some(order) = listing.orders.get_mut(order_id) {
                order.loading = loading;
            }
        }
    }

    /// Id of the result event the stage requires, per the prerequisite
    /// table; `None` means the prerequisite is missing.
    pub fn resolve_input_event_id(
        &self,
        stage: TradeStage,
        listing_id: &str,
        order_id: &str,
    ) -> Option<String> {
        let bundle = self.get_order(listing_id, order_id)?;
        match stage {
            TradeStage::Order => None,
            TradeStage::Accept | TradeStage::Cancel | TradeStage::Refund => {
                Some(order_id.to_string())
            }
            _ => {
                let prerequisite = stage.prerequisite()?;
                bundle.results.last_id(prerequisite).map(str::to_string)
            }
        }
    }
}
