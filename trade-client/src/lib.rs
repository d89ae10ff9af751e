//! Trade Client - correlation engine for the relay event stream
//!
//! Reconstructs multi-party, multi-stage trade negotiations from an
//! unordered, duplicate-tolerant stream of signed events: groups events
//! into listings and orders, tracks each order through the negotiation
//! stages, and lets callers publish a stage request and await the
//! correlated result.

pub mod bundle;
pub mod config;
pub mod directory;
pub mod error;
pub mod flow;
pub mod relay;
pub mod store;
pub mod types;

pub use config::TradeFlowConfig;
pub use error::{RelayError, RelayResult, TradeFlowError, TradeFlowResult};
pub use flow::TradeFlowService;
pub use relay::{InMemoryRelay, RelayClient, RelayMessage, RelaySubscription};
pub use store::{EventSource, IndexedEventEntry, IndexedEventStore};

// Re-export shared types for convenience
pub use shared::{EventDraft, SubscriptionFilter, TradeEvent, TradeStage};
