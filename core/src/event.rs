//! Transcript events: the raw record shape and its normalized form.
//!
//! Raw events carry a free-form `value` attachment. Normalization pulls the
//! offer id, amount and reward out of it and replaces opaque ids by dense
//! ones. Nothing is dropped: every raw event yields exactly one `Event`.

use crate::{
    id_map::IdMap,
    table::Record,
    types::{CustomerId, EventId, OfferId, Timestamp, NO_OFFER},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Attachment keys that may hold the offer id. Both spellings occur in the source data.
pub const OFFER_ID_KEYS: [&str; 2] = ["offer_id", "offer id"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "offer received")]
    Received,
    #[serde(rename = "offer viewed")]
    Viewed,
    #[serde(rename = "offer completed")]
    Completed,
    #[serde(rename = "transaction")]
    Transaction,
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [
        EventKind::Received,
        EventKind::Viewed,
        EventKind::Completed,
        EventKind::Transaction,
    ];

    /// Label as written in the transcript.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Received    => "offer received",
            Self::Viewed      => "offer viewed",
            Self::Completed   => "offer completed",
            Self::Transaction => "transaction",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.label() == label)
    }
}

/// One line of `transcript.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEvent {
    pub person: String,
    pub event:  EventKind,
    #[serde(default)]
    pub value:  Map<String, Value>,
    pub time:   Timestamp,
}

/// A cleaned transcript row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_id:    EventId,
    pub kind:        EventKind,
    pub amount:      f64,
    pub reward:      f64,
    pub timestamp:   Timestamp,
    pub customer_id: CustomerId,
    pub offer_id:    OfferId,
}

impl Record for Event {
    const COLUMNS: &'static [&'static str] = &[
        "event_id", "event", "event_amount", "event_reward", "time", "customer_id", "offer_id",
    ];
}

/// Flattens raw events in transcript order.
///
/// The id maps are borrowed mutably: ids first seen in the transcript are
/// appended, which keeps the maps append-only and lets the later joins
/// report them as referential-integrity failures.
pub struct EventNormalizer<'a> {
    customers:     &'a mut IdMap<String>,
    offers:        &'a mut IdMap<String>,
    next_event_id: EventId,
}

impl<'a> EventNormalizer<'a> {
    pub fn new(customers: &'a mut IdMap<String>, offers: &'a mut IdMap<String>) -> Self {
        Self {
            customers,
            offers,
            next_event_id: 1,
        }
    }

    pub fn normalize(&mut self, raw: &RawEvent) -> Event {
        let event_id = self.next_event_id;
        self.next_event_id += 1;

        // The sentinel bypasses the offer map entirely.
        let offer_id = match extract_offer_key(&raw.value) {
            Some(key) => self.offers.assign(key),
            None      => NO_OFFER,
        };

        Event {
            event_id,
            kind:        raw.event,
            amount:      number_or_zero(&raw.value, "amount"),
            reward:      number_or_zero(&raw.value, "reward"),
            timestamp:   raw.time,
            customer_id: self.customers.assign(raw.person.clone()),
            offer_id,
        }
    }

    pub fn normalize_all(&mut self, raws: &[RawEvent]) -> Vec<Event> {
        let events: Vec<Event> = raws.iter().map(|r| self.normalize(r)).collect();
        let transactions = events.iter().filter(|e| e.offer_id == NO_OFFER).count();
        log::info!(
            "normalize: {} events ({} without offer id)",
            events.len(),
            transactions
        );
        events
    }
}

/// Offer id under either spelling, rendered as a string key.
pub fn extract_offer_key(value: &Map<String, Value>) -> Option<String> {
    OFFER_ID_KEYS
        .iter()
        .find_map(|k| value.get(*k))
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
}

fn number_or_zero(value: &Map<String, Value>, key: &str) -> f64 {
    value.get(key).and_then(Value::as_f64).unwrap_or(0.0)
}
