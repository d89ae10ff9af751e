//! Trade flow configuration

use std::time::Duration;

use shared::SubscriptionFilter;

/// Configuration for [`crate::TradeFlowService`]
#[derive(Debug, Clone)]
pub struct TradeFlowConfig {
    /// Event kinds the subscription covers
    pub kinds: Vec<u32>,

    /// Restrict the subscription to these authors
    pub authors: Option<Vec<String>>,

    /// Deadline applied when a stage call passes no timeout
    pub default_timeout: Duration,
}

impl TradeFlowConfig {
    /// Create a configuration covering every trade kind, any author,
    /// with a 7 second default timeout
    pub fn new() -> Self {
        Self {
            kinds: SubscriptionFilter::default_trade_kinds(),
            authors: None,
            default_timeout: Duration::from_secs(7),
        }
    }

    /// Set the subscribed kinds
    pub fn with_kinds(mut self, kinds: Vec<u32>) -> Self {
        self.kinds = kinds;
        self
    }

    /// Restrict the subscription to the given authors
    pub fn with_authors(mut self, authors: Vec<String>) -> Self {
        self.authors = Some(authors);
        self
    }

    /// Set the default await deadline
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }
}

impl Default for TradeFlowConfig {
    fn default() -> Self {
        Self::new()
    }
}
