//! Pending request/response waiters
//!
//! Each waiter is an in-process await for the result correlated to one
//! published request. A waiter resolves only on an event timestamped
//! strictly after its registration, so a republished stale result can
//! never satisfy a newer request.

use std::collections::HashMap;

use tokio::sync::oneshot;
use tracing::trace;

use shared::TradeEvent;

use crate::error::TradeFlowError;

pub type WaiterResult = Result<TradeEvent, TradeFlowError>;

#[derive(Debug)]
struct Waiter {
    id: u64,
    since_ms: i64,
    tx: oneshot::Sender<WaiterResult>,
}

/// Registry of pending awaits keyed by request event id
#[derive(Debug, Default)]
pub struct WaiterRegistry {
    by_request: HashMap<String, Vec<Waiter>>,
    next_id: u64,
}

impl WaiterRegistry {
    /// Register a waiter for `request_id`. Returns the waiter id (for
    /// timeout-side removal) and the receiving half.
    pub fn register(
        &mut self,
        request_id: &str,
        since_ms: i64,
    ) -> (u64, oneshot::Receiver<WaiterResult>) {
        let (tx, rx) = oneshot::channel();
        self.next_id += 1;
        let id = self.next_id;
        self.by_request
            .entry(request_id.to_string())
            .or_default()
            .push(Waiter { id, since_ms, tx });
        (id, rx)
    }

    /// Remove a waiter whose await gave up (timeout)
    pub fn remove(&mut self, request_id: &str, waiter_id: u64) {
        if let Some(list) = self.by_request.get_mut(request_id) {
            list.retain(|w| w.id != waiter_id);
            if list.is_empty() {
                self.by_request.remove(request_id);
            }
        }
    }

    /// Resolve every waiter on `request_id` registered strictly before
    /// the event's timestamp; the rest stay registered. Returns how many
    /// resolved.
    pub fn resolve(&mut self, request_id: &str, event: &TradeEvent) -> usize {
        let Some(list) = self.by_request.remove(request_id) else {
            return 0;
        };
        let created_ms = event.published_at.unwrap_or(0);

        let mut resolved = 0;
        let mut kept = Vec::new();
        for waiter in list {
            if created_ms > waiter.since_ms {
                let _ = waiter.tx.send(Ok(event.clone()));
                resolved += 1;
            } else {
                kept.push(waiter);
            }
        }

        if !kept.is_empty() {
            self.by_request.insert(request_id.to_string(), kept);
        }

        if resolved > 0 {
            trace!(request_id, resolved, "resolved waiters");
        }
        resolved
    }

    pub fn has_waiters(&self, request_id: &str) -> bool {
        self.by_request.contains_key(request_id)
    }

    /// Total number of pending waiters
    pub fn len(&self) -> usize {
        self.by_request.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_request.is_empty()
    }

    /// Reject every pending waiter (engine teardown). Returns how many
    /// were rejected.
    pub fn reject_all(&mut self, error: TradeFlowError) -> usize {
        let mut rejected = 0;
        for (_, list) in self.by_request.drain() {
            for waiter in list {
                let _ = waiter.tx.send(Err(error));
                rejected += 1;
            }
        }
        rejected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::TradeStage;

    fn result_event(id: &str, published_at: i64) -> TradeEvent {
        TradeEvent {
            id: id.to_string(),
            kind: TradeStage::Accept.result_kind(),
            author: "pk-1".to_string(),
            published_at: Some(published_at),
            tags: vec![],
            data: String::new(),
        }
    }

    #[tokio::test]
    async fn test_resolve_requires_strictly_newer_timestamp() {
        let mut registry = WaiterRegistry::default();
        let (_, mut rx) = registry.register("req-1", 1000);

        // same timestamp: not strictly after, stays pending
        assert_eq!(registry.resolve("req-1", &result_event("res-1", 1000)), 0);
        assert!(rx.try_recv().is_err());
        assert!(registry.has_waiters("req-1"));

        assert_eq!(registry.resolve("req-1", &result_event("res-2", 1001)), 1);
        assert_eq!(rx.try_recv().unwrap().unwrap().id, "res-2");
        assert!(!registry.has_waiters("req-1"));
    }

    #[tokio::test]
    async fn test_concurrent_waiters_resolve_independently() {
        let mut registry = WaiterRegistry::default();
        let (_, mut early) = registry.register("req-1", 1000);
        let (_, mut late) = registry.register("req-1", 5000);

        assert_eq!(registry.resolve("req-1", &result_event("res-1", 2000)), 1);
        assert_eq!(early.try_recv().unwrap().unwrap().id, "res-1");
        assert!(late.try_recv().is_err());
        assert!(registry.has_waiters("req-1"));
    }

    #[tokio::test]
    async fn test_remove_clears_empty_entries() {
        let mut registry = WaiterRegistry::default();
        let (id, _rx) = registry.register("req-1", 1000);
        registry.remove("req-1", id);
        assert!(!registry.has_waiters("req-1"));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_reject_all() {
        let mut registry = WaiterRegistry::default();
        let (_, mut rx1) = registry.register("req-1", 1000);
        let (_, mut rx2) = registry.register("req-2", 1000);

        assert_eq!(registry.reject_all(TradeFlowError::ServiceDestroyed), 2);
        assert_eq!(rx1.try_recv().unwrap().unwrap_err(), TradeFlowError::ServiceDestroyed);
        assert_eq!(rx2.try_recv().unwrap().unwrap_err(), TradeFlowError::ServiceDestroyed);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_missing_timestamp_never_qualifies() {
        let mut registry = WaiterRegistry::default();
        let (_, mut rx) = registry.register("req-1", 1000);
        let mut ev = result_event("res-1", 0);
        ev.published_at = None;
        assert_eq!(registry.resolve("req-1", &ev), 0);
        assert!(rx.try_recv().is_err());
    }
}
