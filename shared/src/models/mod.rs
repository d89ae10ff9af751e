//! Payload models
//!
//! Decoded payload shapes for the event kinds the client works with.
//! The correlation engine itself treats payloads as opaque; these types
//! exist for callers and for the stage request builders.

pub mod listing;
pub mod profile;
pub mod trade;

pub use listing::ListingData;
pub use profile::ProfileData;
