//! Shared primitive types used across the entire pipeline.

/// Dense customer identifier assigned by the customer ID map. Starts at 1.
pub type CustomerId = u64;

/// Dense offer identifier assigned by the offer ID map. Starts at 1.
pub type OfferId = u64;

/// 1-based position of an event in the transcript.
pub type EventId = u64;

/// Relative event time as recorded in the transcript (hours since start).
pub type Timestamp = i64;

/// The canonical run identifier.
pub type RunId = String;

/// Offer id carried by pure transaction events. Never assigned to a real offer.
pub const NO_OFFER: OfferId = 0;
