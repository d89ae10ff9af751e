//! Client error types

use thiserror::Error;

/// Relay boundary error
#[derive(Debug, Error)]
pub enum RelayError {
    /// Connection to the relay failed or dropped
    #[error("Connection error: {0}")]
    Connection(String),

    /// The subscription channel closed unexpectedly
    #[error("Subscription closed")]
    SubscriptionClosed,

    /// The relay refused the submitted event
    #[error("Publish rejected: {0}")]
    PublishRejected(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for relay operations
pub type RelayResult<T> = Result<T, RelayError>;

/// Trade flow error taxonomy
///
/// Every stage method surfaces one of these as a typed result value;
/// the engine never propagates an error past its public boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TradeFlowError {
    /// The relay could not produce or submit the event
    #[error("failed to publish")]
    FailedToPublish,

    /// No correlated result arrived within the deadline
    #[error("timeout")]
    Timeout,

    /// Required prior result absent; nothing was published
    #[error("missing prerequisite")]
    MissingPrerequisite,

    /// Stage intentionally unsupported
    #[error("not implemented")]
    NotImplemented,

    /// Engine torn down while the wait was outstanding
    #[error("service destroyed")]
    ServiceDestroyed,
}

/// Result type for trade flow operations
pub type TradeFlowResult<T> = Result<T, TradeFlowError>;
