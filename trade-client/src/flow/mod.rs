//! Trade flow correlation service
//!
//! The public surface callers use: publish a stage request and await its
//! correlated result, look up listing and order snapshots, and manage
//! the subscription lifecycle. Every inbound event is deferred through a
//! single-consumer ingest queue, so a publish returns before its own
//! optimistic copy is ingested and no two ingestions interleave.

mod state;
mod waiter;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use shared::models::trade::{
    AcceptRequest, ConveyanceRequest, FulfillmentRequest, InvoiceRequest, OrderRequestPayload,
    PaymentProofRequest, ReceiptRequest,
};
use shared::{EventDraft, SubscriptionFilter, TradeEvent, TradeStage};

use crate::bundle::{ListingBundle, OrderBundle};
use crate::config::TradeFlowConfig;
use crate::error::{RelayResult, TradeFlowError};
use crate::relay::{RelayClient, RelayMessage};
use crate::types::{
    AcceptOptions, ConveyanceOptions, FulfillmentOptions, InvoiceOptions, OrderRequestErr,
    OrderRequestOk, OrderRequestResult, PaymentOptions, ReceiptOptions, StageActionErr,
    StageActionOk, StageActionResult, StagePost,
};

use state::FlowState;

enum QueueMsg {
    Relay(RelayMessage),
    /// Ack once every item enqueued before it has been processed
    Flush(oneshot::Sender<()>),
}

struct QueueItem {
    epoch: u64,
    msg: QueueMsg,
}

/// State shared between the service handle and its worker task. The
/// epoch is only written under the state lock; an ingest item whose
/// epoch predates the current one belongs to a discarded subscription.
struct EngineShared {
    state: Mutex<FlowState>,
    epoch: AtomicU64,
}

/// Client-side correlation engine for trade negotiations
///
/// Owns the subscription to the relay, every index built from the event
/// stream, and the pending waiters. External readers only ever observe
/// cloned snapshots.
pub struct TradeFlowService {
    relay: Arc<dyn RelayClient>,
    shared: Arc<EngineShared>,
    ingest_tx: mpsc::UnboundedSender<QueueItem>,
    filter: Mutex<SubscriptionFilter>,
    default_timeout: Duration,
    pump: Mutex<Option<CancellationToken>>,
}

impl TradeFlowService {
    /// Create the engine and open the first subscription
    pub async fn connect(
        relay: Arc<dyn RelayClient>,
        config: TradeFlowConfig,
    ) -> RelayResult<Self> {
        let shared = Arc::new(EngineShared {
            state: Mutex::new(FlowState::default()),
            epoch: AtomicU64::new(0),
        });

        let (ingest_tx, ingest_rx) = mpsc::unbounded_channel();
        tokio::spawn(ingest_worker(shared.clone(), ingest_rx));

        let service = Self {
            relay,
            shared,
            ingest_tx,
            filter: Mutex::new(SubscriptionFilter {
                kinds: config.kinds,
                authors: config.authors,
            }),
            default_timeout: config.default_timeout,
            pump: Mutex::new(None),
        };
        service.restart_subscription().await?;
        Ok(service)
    }

    // ==================== Subscription lifecycle ====================

    /// Discard the live subscription and every index, reject pending
    /// waiters, and resubscribe with the current filter. Any event still
    /// in flight from the previous subscription is silently dropped.
    pub async fn restart_subscription(&self) -> RelayResult<()> {
        if let Some(token) = self.pump.lock().await.take() {
            token.cancel();
        }

        let epoch = {
            let mut state = self.shared.state.lock().await;
            let epoch = self.shared.epoch.fetch_add(1, Ordering::SeqCst) + 1;
            let rejected = state.clear_for_restart();
            if rejected > 0 {
                debug!(rejected, "rejected pending waiters on restart");
            }
            epoch
        };

        let filter = self.filter.lock().await.clone();
        let mut subscription = self.relay.subscribe(&filter).await?;
        debug!(kinds = filter.kinds.len(), "subscription opened");

        let token = subscription.stop_token();
        let pump_token = token.clone();
        let ingest_tx = self.ingest_tx.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = pump_token.cancelled() => break,
                    msg = subscription.recv() => {
                        let Some(msg) = msg else { break };
                        if ingest_tx.send(QueueItem { epoch, msg: QueueMsg::Relay(msg) }).is_err() {
                            break;
                        }
                    }
                }
            }
        });

        *self.pump.lock().await = Some(token);
        Ok(())
    }

    /// Restrict the subscription to the given authors; a hard reset
    pub async fn set_filter_authors(&self, authors: Option<Vec<String>>) -> RelayResult<()> {
        self.filter.lock().await.authors = authors;
        self.restart_subscription().await
    }

    /// Change the subscribed kinds; a hard reset
    pub async fn set_filter_kinds(&self, kinds: Vec<u32>) -> RelayResult<()> {
        self.filter.lock().await.kinds = kinds;
        self.restart_subscription().await
    }

    /// Tear the engine down: stop the subscription, discard every index
    /// and reject every pending waiter
    pub async fn destroy(&self) {
        if let Some(token) = self.pump.lock().await.take() {
            token.cancel();
        }
        let mut state = self.shared.state.lock().await;
        self.shared.epoch.fetch_add(1, Ordering::SeqCst);
        let rejected = state.clear_for_restart();
        debug!(rejected, "service destroyed");
    }

    // ==================== Event feed ====================

    /// Manually feed one event through the deferred ingest path
    pub fn on_event(&self, event: TradeEvent) {
        let epoch = self.shared.epoch.load(Ordering::SeqCst);
        let _ = self.ingest_tx.send(QueueItem {
            epoch,
            msg: QueueMsg::Relay(RelayMessage::Event(event)),
        });
    }

    /// Wait until every event enqueued before this call has been ingested
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        let epoch = self.shared.epoch.load(Ordering::SeqCst);
        if self
            .ingest_tx
            .send(QueueItem { epoch, msg: QueueMsg::Flush(tx) })
            .is_ok()
        {
            let _ = rx.await;
        }
    }

    // ==================== Read surface ====================

    pub async fn get_trade_listing_bundle(&self, listing_id: &str) -> Option<ListingBundle> {
        self.shared.state.lock().await.get_listing(listing_id).cloned()
    }

    /// Confirmed order bundle only
    pub async fn get_order_bundle(&self, listing_id: &str, order_id: &str) -> Option<OrderBundle> {
        self.shared.state.lock().await.get_order(listing_id, order_id).cloned()
    }

    /// Snapshot of the listings map
    pub async fn listings(&self) -> Vec<(String, ListingBundle)> {
        self.shared
            .state
            .lock()
            .await
            .listings()
            .iter()
            .map(|(id, bundle)| (id.clone(), bundle.clone()))
            .collect()
    }

    pub async fn listing_ids(&self) -> Vec<String> {
        self.shared.state.lock().await.listings().keys().cloned().collect()
    }

    /// `true` while a request published under `event_id` awaits its result
    pub async fn is_loading(&self, event_id: &str) -> bool {
        self.shared.state.lock().await.is_loading(event_id)
    }

    /// Newest post-backlog result or feedback event
    pub async fn get_latest_update(&self) -> Option<Arc<TradeEvent>> {
        self.shared.state.lock().await.latest_update()
    }

    // ==================== Publish / await ====================

    async fn publish_request(&self, draft: EventDraft) -> Result<TradeEvent, TradeFlowError> {
        match self.relay.publish(draft).await {
            Ok(Some(event)) => {
                trace!(id = %event.id, kind = event.kind, "request published");
                // local optimistic copy, deferred through the queue
                self.on_event(event.clone());
                Ok(event)
            }
            Ok(None) => Err(TradeFlowError::FailedToPublish),
            Err(err) => {
                warn!(%err, "publish failed");
                Err(TradeFlowError::FailedToPublish)
            }
        }
    }

    async fn await_response_for(
        &self,
        request_id: &str,
        timeout: Option<Duration>,
    ) -> Result<TradeEvent, TradeFlowError> {
        let since_ms = chrono::Utc::now().timestamp_millis();
        let (waiter_id, rx) = {
            let mut state = self.shared.state.lock().await;
            state.mark_loading(request_id);
            state.waiters.register(request_id, since_ms)
        };

        let deadline = timeout.unwrap_or(self.default_timeout);
        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(Ok(event))) => Ok(event),
            Ok(Ok(Err(err))) => Err(err),
            // registry dropped without an explicit rejection
            Ok(Err(_)) => Err(TradeFlowError::ServiceDestroyed),
            Err(_) => {
                let mut state = self.shared.state.lock().await;
                state.waiters.remove(request_id, waiter_id);
                if !state.waiters.has_waiters(request_id) {
                    state.clear_loading(request_id);
                }
                state.update_loading_by_request(request_id, false);
                Err(TradeFlowError::Timeout)
            }
        }
    }

    // ==================== Stage methods ====================

    /// Entry stage: publish an order request against `listing_id` and
    /// await the order result that confirms it
    pub async fn order_request(
        &self,
        listing_id: &str,
        payload: &OrderRequestPayload,
        timeout: Option<Duration>,
    ) -> OrderRequestResult {
        let draft = EventDraft::order_request(listing_id, payload);
        let request = match self.publish_request(draft).await {
            Ok(event) => event,
            Err(error) => return Err(OrderRequestErr { error, request: None }),
        };

        {
            // make the pending order visible before the deferred ingest runs
            let mut state = self.shared.state.lock().await;
            state.seed_order_request(listing_id, &request);
        }

        match self.await_response_for(&request.id, timeout).await {
            Ok(result) => {
                let order_id = result.id.clone();
                let bundle = self.get_order_bundle(listing_id, &order_id).await;
                Ok(OrderRequestOk { request, result, order_id, bundle })
            }
            Err(error) => Err(OrderRequestErr { error, request: Some(request) }),
        }
    }

    pub async fn accept_request(&self, opts: AcceptOptions) -> StageActionResult {
        let stage = TradeStage::Accept;
        let Some(_order_id) = self
            .resolve_input_event_id(stage, &opts.listing_id, &opts.order_id)
            .await
        else {
            return Err(missing_prerequisite(stage));
        };

        let data = AcceptRequest {
            order_result_event_id: opts.order_id.clone(),
            listing_event_id: opts.listing_id.clone(),
        };
        self.run_stage_request(
            stage,
            &opts.listing_id,
            &opts.order_id,
            EventDraft::accept_request(&data),
            opts.timeout,
        )
        .await
    }

    pub async fn conveyance_request(&self, opts: ConveyanceOptions) -> StageActionResult {
        let stage = TradeStage::Conveyance;
        let Some(accept_result_event_id) = self
            .resolve_input_event_id(stage, &opts.listing_id, &opts.order_id)
            .await
        else {
            return Err(missing_prerequisite(stage));
        };

        let data = ConveyanceRequest { accept_result_event_id, method: opts.method };
        self.run_stage_request(
            stage,
            &opts.listing_id,
            &opts.order_id,
            EventDraft::conveyance_request(&data),
            opts.timeout,
        )
        .await
    }

    pub async fn invoice_request(&self, opts: InvoiceOptions) -> StageActionResult {
        let stage = TradeStage::Invoice;
        let Some(accept_result_event_id) = self
            .resolve_input_event_id(stage, &opts.listing_id, &opts.order_id)
            .await
        else {
            return Err(missing_prerequisite(stage));
        };

        let data = InvoiceRequest { accept_result_event_id };
        self.run_stage_request(
            stage,
            &opts.listing_id,
            &opts.order_id,
            EventDraft::invoice_request(&data),
            opts.timeout,
        )
        .await
    }

    pub async fn payment_request(&self, opts: PaymentOptions) -> StageActionResult {
        let stage = TradeStage::Payment;
        let Some(invoice_result_event_id) = self
            .resolve_input_event_id(stage, &opts.listing_id, &opts.order_id)
            .await
        else {
            return Err(missing_prerequisite(stage));
        };

        let data = PaymentProofRequest { invoice_result_event_id, proof: opts.proof.clone() };
        self.run_stage_request(
            stage,
            &opts.listing_id,
            &opts.order_id,
            EventDraft::payment_request(&data),
            opts.timeout,
        )
        .await
    }

    pub async fn fulfillment_request(&self, opts: FulfillmentOptions) -> StageActionResult {
        let stage = TradeStage::Fulfillment;
        let Some(payment_result_event_id) = self
            .resolve_input_event_id(stage, &opts.listing_id, &opts.order_id)
            .await
        else {
            return Err(missing_prerequisite(stage));
        };

        let data = FulfillmentRequest { payment_result_event_id };
        self.run_stage_request(
            stage,
            &opts.listing_id,
            &opts.order_id,
            EventDraft::fulfillment_request(&data),
            opts.timeout,
        )
        .await
    }

    pub async fn receipt_request(&self, opts: ReceiptOptions) -> StageActionResult {
        let stage = TradeStage::Receipt;
        let Some(fulfillment_result_event_id) = self
            .resolve_input_event_id(stage, &opts.listing_id, &opts.order_id)
            .await
        else {
            return Err(missing_prerequisite(stage));
        };

        let data = ReceiptRequest { fulfillment_result_event_id, note: opts.note.clone() };
        self.run_stage_request(
            stage,
            &opts.listing_id,
            &opts.order_id,
            EventDraft::receipt_request(&data),
            opts.timeout,
        )
        .await
    }

    /// Dispatch a tagged stage input to the matching stage method.
    /// Cancel and Refund are defined but intentionally unimplemented.
    pub async fn post(&self, input: StagePost) -> StageActionResult {
        match input {
            StagePost::Accept(opts) => self.accept_request(opts).await,
            StagePost::Conveyance(opts) => self.conveyance_request(opts).await,
            StagePost::Invoice(opts) => self.invoice_request(opts).await,
            StagePost::Payment(opts) => self.payment_request(opts).await,
            StagePost::Fulfillment(opts) => self.fulfillment_request(opts).await,
            StagePost::Receipt(opts) => self.receipt_request(opts).await,
            StagePost::Cancel(_) => Err(StageActionErr {
                stage: TradeStage::Cancel,
                error: TradeFlowError::NotImplemented,
                request: None,
            }),
            StagePost::Refund(_) => Err(StageActionErr {
                stage: TradeStage::Refund,
                error: TradeFlowError::NotImplemented,
                request: None,
            }),
        }
    }

    // ==================== Internals ====================

    async fn resolve_input_event_id(
        &self,
        stage: TradeStage,
        listing_id: &str,
        order_id: &str,
    ) -> Option<String> {
        self.shared
            .state
            .lock()
            .await
            .resolve_input_event_id(stage, listing_id, order_id)
    }

    async fn run_stage_request(
        &self,
        stage: TradeStage,
        listing_id: &str,
        order_id: &str,
        draft: EventDraft,
        timeout: Option<Duration>,
    ) -> StageActionResult {
        let request = match self.publish_request(draft).await {
            Ok(event) => event,
            Err(error) => return Err(StageActionErr { stage, error, request: None }),
        };

        match self.await_response_for(&request.id, timeout).await {
            Ok(result) => {
                let bundle = self.get_order_bundle(listing_id, order_id).await;
                Ok(StageActionOk {
                    stage,
                    request,
                    result,
                    order_id: order_id.to_string(),
                    bundle,
                })
            }
            Err(error) => Err(StageActionErr { stage, error, request: Some(request) }),
        }
    }
}

fn missing_prerequisite(stage: TradeStage) -> StageActionErr {
    StageActionErr {
        stage,
        error: TradeFlowError::MissingPrerequisite,
        request: None,
    }
}

/// Single consumer of the ingest queue: one event runs to completion
/// before the next begins. The epoch is re-checked under the state lock
/// so an item raced against a restart can never land in fresh state.
async fn ingest_worker(shared: Arc<EngineShared>, mut rx: mpsc::UnboundedReceiver<QueueItem>) {
    while let Some(item) = rx.recv().await {
        match item.msg {
            QueueMsg::Flush(ack) => {
                let _ = ack.send(());
            }
            QueueMsg::Relay(msg) => {
                let mut state = shared.state.lock().await;
                if item.epoch != shared.epoch.load(Ordering::SeqCst) {
                    trace!("dropping event from a discarded subscription");
                    continue;
                }
                match msg {
                    RelayMessage::Event(event) => state.ingest(event),
                    RelayMessage::EndOfStoredEvents => state.mark_load_complete(),
                }
            }
        }
    }
}
