//! Relay client abstraction
//!
//! The engine consumes the relay network through this interface. Signing,
//! submission and transport are external concerns: `publish` hands a
//! draft to the relay side and gets back the signed event (or nothing,
//! when the relay could not produce one).

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use shared::{EventDraft, SubscriptionFilter, TradeEvent};

use crate::error::RelayResult;

/// A message delivered on a relay subscription
#[derive(Debug, Clone)]
pub enum RelayMessage {
    /// A stored or live event matching the filter
    Event(TradeEvent),
    /// All stored events have been delivered; live events follow
    EndOfStoredEvents,
}

/// An open subscription: an ordered stream of [`RelayMessage`]s plus a
/// stop handle. Dropping the subscription stops it.
#[derive(Debug)]
pub struct RelaySubscription {
    receiver: mpsc::UnboundedReceiver<RelayMessage>,
    closer: CancellationToken,
}

impl RelaySubscription {
    pub fn new(receiver: mpsc::UnboundedReceiver<RelayMessage>, closer: CancellationToken) -> Self {
        Self { receiver, closer }
    }

    /// Next message, `None` once the relay side closed the stream
    pub async fn recv(&mut self) -> Option<RelayMessage> {
        self.receiver.recv().await
    }

    /// Stop receiving; the relay side drops the subscription
    pub fn stop(&self) {
        self.closer.cancel();
    }

    /// Token cancelled when the subscription stops
    pub fn stop_token(&self) -> CancellationToken {
        self.closer.clone()
    }
}

impl Drop for RelaySubscription {
    fn drop(&mut self) {
        self.closer.cancel();
    }
}

/// Relay network client
#[async_trait]
pub trait RelayClient: Send + Sync {
    /// Open a subscription: stored events matching `filter`, then the
    /// end-of-stored-events boundary, then live events.
    async fn subscribe(&self, filter: &SubscriptionFilter) -> RelayResult<RelaySubscription>;

    /// Sign and submit a draft. `Ok(None)` means the relay could not
    /// produce an event.
    async fn publish(&self, draft: EventDraft) -> RelayResult<Option<TradeEvent>>;
}

struct SubscriptionEntry {
    filter: SubscriptionFilter,
    sender: mpsc::UnboundedSender<RelayMessage>,
    closer: CancellationToken,
}

/// In-process relay (same-process communication)
///
/// Keeps published and injected events as its stored backlog; a new
/// subscription replays the matching backlog, emits the boundary, then
/// streams live events. Used by tests and in-process setups.
pub struct InMemoryRelay {
    identity: String,
    backlog: Mutex<Vec<TradeEvent>>,
    subscriptions: Mutex<Vec<SubscriptionEntry>>,
    fail_publish: AtomicBool,
}

impl InMemoryRelay {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            backlog: Mutex::new(Vec::new()),
            subscriptions: Mutex::new(Vec::new()),
            fail_publish: AtomicBool::new(false),
        }
    }

    /// Create a relay whose backlog is pre-seeded with stored events
    pub fn with_backlog(identity: impl Into<String>, events: Vec<TradeEvent>) -> Self {
        let relay = Self::new(identity);
        *relay.backlog.try_lock().expect("fresh relay") = events;
        relay
    }

    /// Make `publish` yield `Ok(None)` until reset
    pub fn set_fail_publish(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    /// Snapshot of every stored event, in arrival order
    pub async fn events(&self) -> Vec<TradeEvent> {
        self.backlog.lock().await.clone()
    }

    /// Feed an externally authored event to the backlog and to every
    /// live subscription whose filter matches
    pub async fn inject(&self, event: TradeEvent) {
        self.backlog.lock().await.push(event.clone());
        self.fanout(&event).await;
    }

    async fn fanout(&self, event: &TradeEvent) {
        let mut subs = self.subscriptions.lock().await;
        subs.retain(|s| !s.closer.is_cancelled());
        for sub in subs.iter() {
            if sub.filter.matches(event.kind, &event.author) {
                let _ = sub.sender.send(RelayMessage::Event(event.clone()));
            }
        }
    }
}

#[async_trait]
impl RelayClient for InMemoryRelay {
    async fn subscribe(&self, filter: &SubscriptionFilter) -> RelayResult<RelaySubscription> {
        let (tx, rx) = mpsc::unbounded_channel();
        let closer = CancellationToken::new();

        for event in self.backlog.lock().await.iter() {
            if filter.matches(event.kind, &event.author) {
                let _ = tx.send(RelayMessage::Event(event.clone()));
            }
        }
        let _ = tx.send(RelayMessage::EndOfStoredEvents);

        self.subscriptions.lock().await.push(SubscriptionEntry {
            filter: filter.clone(),
            sender: tx,
            closer: closer.clone(),
        });

        Ok(RelaySubscription::new(rx, closer))
    }

    async fn publish(&self, draft: EventDraft) -> RelayResult<Option<TradeEvent>> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Ok(None);
        }

        let event = TradeEvent {
            id: Uuid::new_v4().to_string(),
            kind: draft.kind,
            author: self.identity.clone(),
            published_at: Some(chrono::Utc::now().timestamp_millis()),
            tags: draft.tags,
            data: draft.data,
        };

        self.backlog.lock().await.push(event.clone());
        self.fanout(&event).await;
        Ok(Some(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::event::{KIND_FEEDBACK, KIND_LISTING};

    fn listing_event(id: &str, author: &str) -> TradeEvent {
        TradeEvent {
            id: id.to_string(),
            kind: KIND_LISTING,
            author: author.to_string(),
            published_at: Some(1_700_000_000_000),
            tags: vec![],
            data: String::new(),
        }
    }

    #[tokio::test]
    async fn test_subscribe_replays_backlog_then_boundary() {
        let relay = InMemoryRelay::with_backlog(
            "relay-id",
            vec![listing_event("l1", "pk-1"), listing_event("l2", "pk-2")],
        );

        let mut sub = relay
            .subscribe(&SubscriptionFilter::new(vec![KIND_LISTING]))
            .await
            .unwrap();

        let Some(RelayMessage::Event(first)) = sub.recv().await else {
            panic!("expected stored event");
        };
        assert_eq!(first.id, "l1");
        let Some(RelayMessage::Event(second)) = sub.recv().await else {
            panic!("expected stored event");
        };
        assert_eq!(second.id, "l2");
        assert!(matches!(sub.recv().await, Some(RelayMessage::EndOfStoredEvents)));
    }

    #[tokio::test]
    async fn test_subscription_filter_applies_to_live_events() {
        let relay = InMemoryRelay::new("relay-id");
        let filter =
            SubscriptionFilter::new(vec![KIND_LISTING]).with_authors(vec!["pk-1".to_string()]);
        let mut sub = relay.subscribe(&filter).await.unwrap();
        assert!(matches!(sub.recv().await, Some(RelayMessage::EndOfStoredEvents)));

        relay.inject(listing_event("l1", "pk-2")).await; // wrong author
        relay
            .inject(TradeEvent { kind: KIND_FEEDBACK, ..listing_event("f1", "pk-1") })
            .await; // wrong kind
        relay.inject(listing_event("l2", "pk-1")).await;

        let Some(RelayMessage::Event(ev)) = sub.recv().await else {
            panic!("expected live event");
        };
        assert_eq!(ev.id, "l2");
    }

    #[tokio::test]
    async fn test_publish_stamps_and_stores() {
        let relay = InMemoryRelay::new("pk-self");
        let draft = EventDraft::new(KIND_LISTING, vec![], "{}".to_string());

        let event = relay.publish(draft).await.unwrap().expect("published");
        assert!(!event.id.is_empty());
        assert_eq!(event.author, "pk-self");
        assert!(event.published_at.is_some());
        assert_eq!(relay.events().await.len(), 1);
    }

    #[tokio::test]
    async fn test_fail_publish_toggle() {
        let relay = InMemoryRelay::new("pk-self");
        relay.set_fail_publish(true);
        let draft = EventDraft::new(KIND_LISTING, vec![], "{}".to_string());
        assert!(relay.publish(draft).await.unwrap().is_none());
        assert!(relay.events().await.is_empty());
    }
}
