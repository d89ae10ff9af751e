//! Negotiation stages
//!
//! A trade moves through a fixed ordered sequence of stages. Each stage
//! has a request kind and a result kind on the wire; the mapping between
//! kinds and stages is defined here.

use serde::{Deserialize, Serialize};
use std::fmt;

/// First stage request kind; the other stages follow in declaration order.
pub const REQUEST_KIND_BASE: u32 = 5900;
/// First stage result kind; offset from the request range.
pub const RESULT_KIND_BASE: u32 = 6900;

/// Trade negotiation stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeStage {
    Order,
    Accept,
    Conveyance,
    Invoice,
    Payment,
    Fulfillment,
    Receipt,
    Cancel,
    Refund,
}

impl TradeStage {
    /// Every stage, in negotiation order.
    pub const ALL: [TradeStage; 9] = [
        TradeStage::Order,
        TradeStage::Accept,
        TradeStage::Conveyance,
        TradeStage::Invoice,
        TradeStage::Payment,
        TradeStage::Fulfillment,
        TradeStage::Receipt,
        TradeStage::Cancel,
        TradeStage::Refund,
    ];

    fn index(self) -> u32 {
        match self {
            TradeStage::Order => 0,
            TradeStage::Accept => 1,
            TradeStage::Conveyance => 2,
            TradeStage::Invoice => 3,
            TradeStage::Payment => 4,
            TradeStage::Fulfillment => 5,
            TradeStage::Receipt => 6,
            TradeStage::Cancel => 7,
            TradeStage::Refund => 8,
        }
    }

    /// Event kind initiating this stage
    pub fn request_kind(self) -> u32 {
        REQUEST_KIND_BASE + self.index()
    }

    /// Event kind concluding this stage
    pub fn result_kind(self) -> u32 {
        RESULT_KIND_BASE + self.index()
    }

    /// Stage whose request kind is `kind`
    pub fn from_request_kind(kind: u32) -> Option<TradeStage> {
        kind.checked_sub(REQUEST_KIND_BASE)
            .and_then(|i| Self::ALL.get(i as usize).copied())
    }

    /// Stage whose result kind is `kind`
    pub fn from_result_kind(kind: u32) -> Option<TradeStage> {
        kind.checked_sub(RESULT_KIND_BASE)
            .and_then(|i| Self::ALL.get(i as usize).copied())
    }

    /// Stage a request or result kind belongs to; feedback kinds carry no
    /// stage of their own.
    pub fn from_event_kind(kind: u32) -> Option<TradeStage> {
        Self::from_request_kind(kind).or_else(|| Self::from_result_kind(kind))
    }

    /// Stage whose *result* event must exist before this stage can be
    /// requested. Order opens a thread; Accept, Cancel and Refund need
    /// only the order itself.
    pub fn prerequisite(self) -> Option<TradeStage> {
        match self {
            TradeStage::Order
            | TradeStage::Accept
            | TradeStage::Cancel
            | TradeStage::Refund => None,
            TradeStage::Conveyance | TradeStage::Invoice => Some(TradeStage::Accept),
            TradeStage::Payment => Some(TradeStage::Invoice),
            TradeStage::Fulfillment => Some(TradeStage::Payment),
            TradeStage::Receipt => Some(TradeStage::Fulfillment),
        }
    }
}

impl fmt::Display for TradeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeStage::Order => write!(f, "order"),
            TradeStage::Accept => write!(f, "accept"),
            TradeStage::Conveyance => write!(f, "conveyance"),
            TradeStage::Invoice => write!(f, "invoice"),
            TradeStage::Payment => write!(f, "payment"),
            TradeStage::Fulfillment => write!(f, "fulfillment"),
            TradeStage::Receipt => write!(f, "receipt"),
            TradeStage::Cancel => write!(f, "cancel"),
            TradeStage::Refund => write!(f, "refund"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping_roundtrip() {
        for stage in TradeStage::ALL {
            assert_eq!(TradeStage::from_request_kind(stage.request_kind()), Some(stage));
            assert_eq!(TradeStage::from_result_kind(stage.result_kind()), Some(stage));
            assert_eq!(TradeStage::from_event_kind(stage.request_kind()), Some(stage));
            assert_eq!(TradeStage::from_event_kind(stage.result_kind()), Some(stage));
        }
    }

    #[test]
    fn test_unknown_kinds() {
        assert_eq!(TradeStage::from_request_kind(REQUEST_KIND_BASE + 9), None);
        assert_eq!(TradeStage::from_event_kind(0), None);
        assert_eq!(TradeStage::from_event_kind(30402), None);
        assert_eq!(TradeStage::from_event_kind(7000), None);
    }

    #[test]
    fn test_prerequisite_table() {
        assert_eq!(TradeStage::Order.prerequisite(), None);
        assert_eq!(TradeStage::Accept.prerequisite(), None);
        assert_eq!(TradeStage::Cancel.prerequisite(), None);
        assert_eq!(TradeStage::Refund.prerequisite(), None);
        assert_eq!(TradeStage::Conveyance.prerequisite(), Some(TradeStage::Accept));
        assert_eq!(TradeStage::Invoice.prerequisite(), Some(TradeStage::Accept));
        assert_eq!(TradeStage::Payment.prerequisite(), Some(TradeStage::Invoice));
        assert_eq!(TradeStage::Fulfillment.prerequisite(), Some(TradeStage::Payment));
        assert_eq!(TradeStage::Receipt.prerequisite(), Some(TradeStage::Fulfillment));
    }
}
