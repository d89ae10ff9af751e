//! Shared types for the trade-flow client
//!
//! Domain event model, negotiation stages, subscription filters and
//! payload models shared between the correlation engine and its callers.

pub mod event;
pub mod filter;
pub mod models;
pub mod stage;

// Re-exports
pub use serde::{Deserialize, Serialize};

// Event model re-exports (for convenient access)
pub use event::{EventDraft, TradeEvent};
pub use filter::SubscriptionFilter;
pub use stage::TradeStage;
