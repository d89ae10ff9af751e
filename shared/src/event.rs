//! Trade event model
//!
//! Signed events as observed from the relay network, plus the unsigned
//! drafts the engine hands back for signing and submission. Events are
//! immutable once observed; the engine reads the first event-reference
//! tag to find a parent and otherwise treats the payload as opaque.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::models::trade::{
    AcceptRequest, ConveyanceRequest, FulfillmentRequest, InvoiceRequest, OrderRequestPayload,
    PaymentProofRequest, ReceiptRequest,
};
use crate::stage::TradeStage;

/// Profile metadata kind
pub const KIND_PROFILE: u32 = 0;
/// Trade listing kind
pub const KIND_LISTING: u32 = 30402;
/// Stage feedback kind (informational, carries no stage of its own)
pub const KIND_FEEDBACK: u32 = 7000;

/// Tag name whose first occurrence references the parent event
pub const TAG_EVENT_REF: &str = "e";
/// Tag name carrying marked job inputs
pub const TAG_INPUT: &str = "i";
/// Input tag marker identifying a listing reference
pub const MARKER_LISTING: &str = "listing";

/// `true` when `kind` initiates a stage
pub fn is_request_kind(kind: u32) -> bool {
    TradeStage::from_request_kind(kind).is_some()
}

/// `true` when `kind` concludes a stage
pub fn is_result_kind(kind: u32) -> bool {
    TradeStage::from_result_kind(kind).is_some()
}

/// A signed event delivered by the relay network
///
/// `published_at` is the origin timestamp in Unix milliseconds; it may be
/// absent on optimistic local copies that have not been through a signer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeEvent {
    pub id: String,
    pub kind: u32,
    pub author: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<i64>,
    #[serde(default)]
    pub tags: Vec<Vec<String>>,
    #[serde(default)]
    pub data: String,
}

impl TradeEvent {
    /// Parse the payload as the given type
    pub fn parse_data<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.data)
    }

    /// Referenced parent event id: the value of the first `e` tag
    pub fn event_ref(&self) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.len() >= 2 && t[0] == TAG_EVENT_REF)
            .map(|t| t[1].as_str())
    }

    /// Value of the first input tag whose trailing marker matches
    pub fn marker_input(&self, marker: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.len() >= 5 && t[0] == TAG_INPUT && t[4] == marker)
            .map(|t| t[1].as_str())
    }

    pub fn is_request(&self) -> bool {
        is_request_kind(self.kind)
    }

    pub fn is_result(&self) -> bool {
        is_result_kind(self.kind)
    }

    pub fn is_feedback(&self) -> bool {
        self.kind == KIND_FEEDBACK
    }
}

/// An unsigned event draft
///
/// Drafts are built locally and handed to the relay client, which signs
/// and submits them; the relay returns the resulting [`TradeEvent`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDraft {
    pub kind: u32,
    pub tags: Vec<Vec<String>>,
    pub data: String,
}

impl EventDraft {
    pub fn new(kind: u32, tags: Vec<Vec<String>>, data: String) -> Self {
        Self { kind, tags, data }
    }

    fn event_ref_tag(id: &str) -> Vec<String> {
        vec![TAG_EVENT_REF.to_string(), id.to_string()]
    }

    /// Create an order request draft referencing `listing_id`
    pub fn order_request(listing_id: &str, payload: &OrderRequestPayload) -> Self {
        Self::new(
            TradeStage::Order.request_kind(),
            vec![
                Self::event_ref_tag(listing_id),
                vec![
                    TAG_INPUT.to_string(),
                    listing_id.to_string(),
                    "event".to_string(),
                    String::new(),
                    MARKER_LISTING.to_string(),
                ],
            ],
            serde_json::to_string(payload).expect("Failed to serialize order request"),
        )
    }

    /// Create an accept request draft referencing the order result
    pub fn accept_request(data: &AcceptRequest) -> Self {
        Self::new(
            TradeStage::Accept.request_kind(),
            vec![Self::event_ref_tag(&data.order_result_event_id)],
            serde_json::to_string(data).expect("Failed to serialize accept request"),
        )
    }

    /// Create a conveyance request draft referencing the accept result
    pub fn conveyance_request(data: &ConveyanceRequest) -> Self {
        Self::new(
            TradeStage::Conveyance.request_kind(),
            vec![Self::event_ref_tag(&data.accept_result_event_id)],
            serde_json::to_string(data).expect("Failed to serialize conveyance request"),
        )
    }

    /// Create an invoice request draft referencing the accept result
    pub fn invoice_request(data: &InvoiceRequest) -> Self {
        Self::new(
            TradeStage::Invoice.request_kind(),
            vec![Self::event_ref_tag(&data.accept_result_event_id)],
            serde_json::to_string(data).expect("Failed to serialize invoice request"),
        )
    }

    /// Create a payment request draft referencing the invoice result
    pub fn payment_request(data: &PaymentProofRequest) -> Self {
        Self::new(
            TradeStage::Payment.request_kind(),
            vec![Self::event_ref_tag(&data.invoice_result_event_id)],
            serde_json::to_string(data).expect("Failed to serialize payment request"),
        )
    }

    /// Create a fulfillment request draft referencing the payment result
    pub fn fulfillment_request(data: &FulfillmentRequest) -> Self {
        Self::new(
            TradeStage::Fulfillment.request_kind(),
            vec![Self::event_ref_tag(&data.payment_result_event_id)],
            serde_json::to_string(data).expect("Failed to serialize fulfillment request"),
        )
    }

    /// Create a receipt request draft referencing the fulfillment result
    pub fn receipt_request(data: &ReceiptRequest) -> Self {
        Self::new(
            TradeStage::Receipt.request_kind(),
            vec![Self::event_ref_tag(&data.fulfillment_result_event_id)],
            serde_json::to_string(data).expect("Failed to serialize receipt request"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event_with_tags(tags: Vec<Vec<String>>) -> TradeEvent {
        TradeEvent {
            id: "ev-1".to_string(),
            kind: TradeStage::Accept.result_kind(),
            author: "pk-1".to_string(),
            published_at: Some(1_700_000_000_000),
            tags,
            data: String::new(),
        }
    }

    #[test]
    fn test_event_ref_reads_first_e_tag() {
        let ev = event_with_tags(vec![
            vec!["p".into(), "pk-2".into()],
            vec!["e".into(), "parent-1".into()],
            vec!["e".into(), "parent-2".into()],
        ]);
        assert_eq!(ev.event_ref(), Some("parent-1"));
    }

    #[test]
    fn test_event_ref_absent() {
        let ev = event_with_tags(vec![vec!["e".into()]]);
        assert_eq!(ev.event_ref(), None);
    }

    #[test]
    fn test_marker_input() {
        let ev = event_with_tags(vec![
            vec!["i".into(), "x".into(), "event".into(), "".into(), "other".into()],
            vec!["i".into(), "listing-1".into(), "event".into(), "".into(), "listing".into()],
        ]);
        assert_eq!(ev.marker_input(MARKER_LISTING), Some("listing-1"));
        assert_eq!(ev.marker_input("missing"), None);
    }

    #[test]
    fn test_order_request_draft_tags() {
        let draft = EventDraft::order_request(
            "listing-1",
            &OrderRequestPayload { quantity: 2, note: None },
        );
        assert_eq!(draft.kind, TradeStage::Order.request_kind());
        assert_eq!(draft.tags[0], vec!["e".to_string(), "listing-1".to_string()]);
        assert_eq!(draft.tags[1][4], MARKER_LISTING);
        assert_eq!(draft.tags[1][1], "listing-1");
    }

    #[test]
    fn test_stage_request_drafts_reference_prerequisite() {
        let draft = EventDraft::payment_request(&PaymentProofRequest {
            invoice_result_event_id: "inv-res-1".to_string(),
            proof: "preimage".to_string(),
        });
        assert_eq!(draft.kind, TradeStage::Payment.request_kind());
        assert_eq!(draft.tags[0], vec!["e".to_string(), "inv-res-1".to_string()]);

        let parsed: PaymentProofRequest = serde_json::from_str(&draft.data).unwrap();
        assert_eq!(parsed.proof, "preimage");
    }

    #[test]
    fn test_kind_predicates() {
        assert!(is_request_kind(TradeStage::Order.request_kind()));
        assert!(is_result_kind(TradeStage::Refund.result_kind()));
        assert!(!is_request_kind(KIND_LISTING));
        assert!(!is_result_kind(KIND_FEEDBACK));
    }
}
