//! Offer response reconstruction and aggregation for customer clustering.
//!
//! Raw offer, profile and transcript records are cleaned, each customer's
//! interaction with each offer is replayed to decide whether a completion
//! was a genuine response, and the result is collapsed to one row per
//! customer ready for an external clustering step.

pub mod aggregate;
pub mod bucket;
pub mod clustering;
pub mod config;
pub mod error;
pub mod event;
pub mod features;
pub mod id_map;
pub mod input;
pub mod pipeline;
pub mod portfolio;
pub mod profile;
pub mod response;
pub mod store;
pub mod table;
pub mod types;
