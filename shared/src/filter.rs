//! Subscription filters

use serde::{Deserialize, Serialize};

use crate::event::{KIND_FEEDBACK, KIND_LISTING};
use crate::stage::TradeStage;

/// Relay subscription filter: which kinds, optionally restricted to authors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionFilter {
    pub kinds: Vec<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authors: Option<Vec<String>>,
}

impl SubscriptionFilter {
    pub fn new(kinds: Vec<u32>) -> Self {
        Self { kinds, authors: None }
    }

    /// Restrict the filter to the given authors
    pub fn with_authors(mut self, authors: Vec<String>) -> Self {
        self.authors = Some(authors);
        self
    }

    /// Every kind a trade thread can carry: the listing kind, all stage
    /// request and result kinds, and feedback.
    pub fn default_trade_kinds() -> Vec<u32> {
        let mut kinds = vec![KIND_LISTING];
        kinds.extend(TradeStage::ALL.iter().map(|s| s.request_kind()));
        kinds.extend(TradeStage::ALL.iter().map(|s| s.result_kind()));
        kinds.push(KIND_FEEDBACK);
        kinds
    }

    /// `true` when an event of this kind/author passes the filter
    pub fn matches(&self, kind: u32, author: &str) -> bool {
        if !self.kinds.contains(&kind) {
            return false;
        }
        match &self.authors {
            Some(authors) => authors.iter().any(|a| a == author),
            None => true,
        }
    }
}

impl Default for SubscriptionFilter {
    fn default() -> Self {
        Self::new(Self::default_trade_kinds())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_kinds_cover_all_stages() {
        let kinds = SubscriptionFilter::default_trade_kinds();
        assert!(kinds.contains(&KIND_LISTING));
        assert!(kinds.contains(&KIND_FEEDBACK));
        for stage in TradeStage::ALL {
            assert!(kinds.contains(&stage.request_kind()));
            assert!(kinds.contains(&stage.result_kind()));
        }
        assert_eq!(kinds.len(), 2 + 2 * TradeStage::ALL.len());
    }

    #[test]
    fn test_matches_kind_and_author() {
        let filter = SubscriptionFilter::new(vec![KIND_LISTING]).with_authors(vec!["pk-1".into()]);
        assert!(filter.matches(KIND_LISTING, "pk-1"));
        assert!(!filter.matches(KIND_LISTING, "pk-2"));
        assert!(!filter.matches(KIND_FEEDBACK, "pk-1"));
    }

    #[test]
    fn test_matches_any_author_when_unrestricted() {
        let filter = SubscriptionFilter::new(vec![KIND_FEEDBACK]);
        assert!(filter.matches(KIND_FEEDBACK, "anyone"));
    }
}
