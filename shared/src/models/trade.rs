//! Stage request payloads
//!
//! Each non-entry stage payload names the prerequisite result event it
//! was built against; the same id goes into the draft's reference tag.

use serde::{Deserialize, Serialize};

/// How the goods change hands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConveyanceMethod {
    Pickup,
    Courier,
    Freight,
}

/// Order stage: opens a thread against a listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequestPayload {
    pub quantity: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptRequest {
    pub order_result_event_id: String,
    pub listing_event_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConveyanceRequest {
    pub accept_result_event_id: String,
    pub method: ConveyanceMethod,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceRequest {
    pub accept_result_event_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentProofRequest {
    pub invoice_result_event_id: String,
    pub proof: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FulfillmentRequest {
    pub payment_result_event_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptRequest {
    pub fulfillment_result_event_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conveyance_method_snake_case() {
        let req = ConveyanceRequest {
            accept_result_event_id: "acc-1".to_string(),
            method: ConveyanceMethod::Courier,
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains(r#""method":"courier""#));

        let parsed: ConveyanceRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.method, ConveyanceMethod::Courier);
    }

    #[test]
    fn test_receipt_note_omitted_when_absent() {
        let req = ReceiptRequest {
            fulfillment_result_event_id: "ful-1".to_string(),
            note: None,
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(!json.contains("note"));
    }
}
