//! Public result and option types for the trade flow service

use std::time::Duration;

use shared::models::trade::ConveyanceMethod;
use shared::{TradeEvent, TradeStage};

use crate::bundle::OrderBundle;
use crate::error::TradeFlowError;

/// Successful order request: the published request, the correlated
/// result, and the confirmed order it produced
#[derive(Debug, Clone)]
pub struct OrderRequestOk {
    pub request: TradeEvent,
    pub result: TradeEvent,
    pub order_id: String,
    pub bundle: Option<OrderBundle>,
}

/// Failed order request; `request` is present when the failure happened
/// after publishing
#[derive(Debug, Clone)]
pub struct OrderRequestErr {
    pub error: TradeFlowError,
    pub request: Option<TradeEvent>,
}

pub type OrderRequestResult = Result<OrderRequestOk, OrderRequestErr>;

/// Successful stage action
#[derive(Debug, Clone)]
pub struct StageActionOk {
    pub stage: TradeStage,
    pub request: TradeEvent,
    pub result: TradeEvent,
    pub order_id: String,
    pub bundle: Option<OrderBundle>,
}

/// Failed stage action
#[derive(Debug, Clone)]
pub struct StageActionErr {
    pub stage: TradeStage,
    pub error: TradeFlowError,
    pub request: Option<TradeEvent>,
}

pub type StageActionResult = Result<StageActionOk, StageActionErr>;

#[derive(Debug, Clone)]
pub struct AcceptOptions {
    pub listing_id: String,
    pub order_id: String,
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct ConveyanceOptions {
    pub listing_id: String,
    pub order_id: String,
    pub method: ConveyanceMethod,
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct InvoiceOptions {
    pub listing_id: String,
    pub order_id: String,
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct PaymentOptions {
    pub listing_id: String,
    pub order_id: String,
    pub proof: String,
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct FulfillmentOptions {
    pub listing_id: String,
    pub order_id: String,
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct ReceiptOptions {
    pub listing_id: String,
    pub order_id: String,
    pub note: Option<String>,
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct CancelOptions {
    pub listing_id: String,
    pub order_id: String,
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct RefundOptions {
    pub listing_id: String,
    pub order_id: String,
    pub timeout: Option<Duration>,
}

/// Tagged stage dispatch input for [`crate::TradeFlowService::post`]
#[derive(Debug, Clone)]
pub enum StagePost {
    Accept(AcceptOptions),
    Conveyance(ConveyanceOptions),
    Invoice(InvoiceOptions),
    Payment(PaymentOptions),
    Fulfillment(FulfillmentOptions),
    Receipt(ReceiptOptions),
    Cancel(CancelOptions),
    Refund(RefundOptions),
}
