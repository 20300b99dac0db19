//! Response reconstruction: the heart of the pipeline.
//!
//! Decides, per (customer, offer) pair, whether completing the offer was a
//! response to it, and how much money and reward that response is worth.
//!
//! EXECUTION ORDER (two phases, never interleaved):
//!   1. Ledger pass: every event without an offer id adds its amount to the
//!      total for (customer, timestamp). The ledger is complete before
//!      phase 2 reads from it.
//!   2. Group pass: events with an offer id are grouped by (customer, offer),
//!      sorted by time (stable on ties) and replayed through an
//!      `EpisodeTracker`.
//!
//! RULES:
//!   - An episode is the run of events since the previous completion.
//!   - A completion is a valid response only if its episode holds exactly
//!     {received, viewed, completed}.
//!   - Every completion closes the current episode, valid or not.
//!   - A valid completion is credited with its own reward and with the
//!     ledger total at its exact (customer, timestamp), 0 if none.
//!
//! Informational offers never produce a completion event, so their groups
//! always come out invalid. Downstream code must exclude them rather than
//! read that as "no response".

use crate::{
    event::{Event, EventKind},
    table::Record,
    types::{CustomerId, OfferId, Timestamp, NO_OFFER},
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Set of distinct event kinds, one bit per kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct KindSet(u8);

impl KindSet {
    pub const EMPTY: KindSet = KindSet(0);

    /// The only episode shape that counts as a response.
    pub const VALID_EPISODE: KindSet = KindSet(
        Self::bit(EventKind::Received) | Self::bit(EventKind::Viewed) | Self::bit(EventKind::Completed),
    );

    const fn bit(kind: EventKind) -> u8 {
        match kind {
            EventKind::Received    => 1,
            EventKind::Viewed      => 1 << 1,
            EventKind::Completed   => 1 << 2,
            EventKind::Transaction => 1 << 3,
        }
    }

    pub fn of(kinds: &[EventKind]) -> Self {
        kinds.iter().fold(Self::EMPTY, |set, &k| set.with(k))
    }

    pub fn with(self, kind: EventKind) -> Self {
        KindSet(self.0 | Self::bit(kind))
    }

    pub fn insert(&mut self, kind: EventKind) {
        *self = self.with(kind);
    }

    pub fn contains(&self, kind: EventKind) -> bool {
        self.0 & Self::bit(kind) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn clear(&mut self) {
        self.0 = 0;
    }
}

/// Transaction totals keyed by (customer, timestamp).
/// Written only while it is built, read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct TransactionLedger {
    totals: HashMap<(CustomerId, Timestamp), f64>,
}

impl TransactionLedger {
    /// Phase 1: sum the amounts of every event that carries no offer id.
    pub fn from_events(events: &[Event]) -> Self {
        let mut totals: HashMap<(CustomerId, Timestamp), f64> = HashMap::new();
        for e in events.iter().filter(|e| e.offer_id == NO_OFFER) {
            *totals.entry((e.customer_id, e.timestamp)).or_insert(0.0) += e.amount;
        }
        Self { totals }
    }

    /// Total spent by `customer` at exactly `timestamp`, 0 when nothing was recorded.
    pub fn amount_at(&self, customer: CustomerId, timestamp: Timestamp) -> f64 {
        self.totals.get(&(customer, timestamp)).copied().unwrap_or(0.0)
    }

    /// Everything `customer` spent across the whole transcript.
    pub fn customer_total(&self, customer: CustomerId) -> f64 {
        self.totals
            .iter()
            .filter(|((c, _), _)| *c == customer)
            .map(|(_, amount)| amount)
            .sum()
    }

    pub fn len(&self) -> usize {
        self.totals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.totals.is_empty()
    }
}

/// Outcome of feeding one event to an `EpisodeTracker`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Step {
    /// The event joined the current episode.
    Continued,
    /// A completion closed a valid episode with this amount and reward.
    ValidResponse { amount: f64, reward: f64 },
    /// A completion closed an episode that was not a response.
    InvalidCompletion,
}

/// Per-group state machine.
///
/// The only state is the kind set of the episode in progress. Each event adds
/// its kind; a completion is checked against `KindSet::VALID_EPISODE` and
/// then resets the set.
#[derive(Debug, Clone)]
pub struct EpisodeTracker {
    customer_id: CustomerId,
    offer_id:    OfferId,
    episode:     KindSet,
    valid_count: u32,
    amount:      f64,
    reward:      f64,
}

impl EpisodeTracker {
    pub fn new(customer_id: CustomerId, offer_id: OfferId) -> Self {
        Self {
            customer_id,
            offer_id,
            episode:     KindSet::EMPTY,
            valid_count: 0,
            amount:      0.0,
            reward:      0.0,
        }
    }

    pub fn observe(&mut self, event: &Event, ledger: &TransactionLedger) -> Step {
        self.episode.insert(event.kind);
        if event.kind != EventKind::Completed {
            return Step::Continued;
        }

        let valid = self.episode == KindSet::VALID_EPISODE;
        self.episode.clear();
        if !valid {
            return Step::InvalidCompletion;
        }

        let amount = ledger.amount_at(self.customer_id, event.timestamp);
        self.valid_count += 1;
        self.amount += amount;
        self.reward += event.reward;
        Step::ValidResponse { amount, reward: event.reward }
    }

    /// Kinds seen since the last completion.
    pub fn current_episode(&self) -> KindSet {
        self.episode
    }

    pub fn finish(self) -> ResponseRecord {
        let is_valid_response = self.valid_count > 0;
        ResponseRecord {
            customer_id:       self.customer_id,
            offer_id:          self.offer_id,
            is_valid_response,
            valid_count:       self.valid_count,
            attributed_amount: if is_valid_response { self.amount } else { 0.0 },
            attributed_reward: if is_valid_response { self.reward } else { 0.0 },
        }
    }
}

/// One row per (customer, offer) pair that has at least one offer event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub customer_id:       CustomerId,
    pub offer_id:          OfferId,
    pub is_valid_response: bool,
    pub valid_count:       u32,
    pub attributed_amount: f64,
    pub attributed_reward: f64,
}

impl Record for ResponseRecord {
    const COLUMNS: &'static [&'static str] = &[
        "response", "customer_id", "offer_id", "resp_number", "resp_amount", "resp_reward",
    ];
}

/// Replay one group's events, given in any order.
pub fn evaluate_group(
    customer_id: CustomerId,
    offer_id: OfferId,
    events: &mut [&Event],
    ledger: &TransactionLedger,
) -> ResponseRecord {
    // Stable: ties keep transcript order.
    events.sort_by_key(|e| e.timestamp);

    let mut tracker = EpisodeTracker::new(customer_id, offer_id);
    for event in events.iter() {
        tracker.observe(event, ledger);
    }
    tracker.finish()
}

/// Reconstruct responses for the whole transcript.
/// Output is ordered by (customer_id, offer_id).
pub fn reconstruct(events: &[Event]) -> Vec<ResponseRecord> {
    let ledger = TransactionLedger::from_events(events);
    reconstruct_with_ledger(events, &ledger)
}

/// Phase 2 against an already complete ledger.
pub fn reconstruct_with_ledger(events: &[Event], ledger: &TransactionLedger) -> Vec<ResponseRecord> {
    let mut groups: BTreeMap<(CustomerId, OfferId), Vec<&Event>> = BTreeMap::new();
    for e in events.iter().filter(|e| e.offer_id != NO_OFFER) {
        groups.entry((e.customer_id, e.offer_id)).or_default().push(e);
    }

    let records: Vec<ResponseRecord> = groups
        .into_iter()
        .map(|((customer_id, offer_id), mut group)| {
            let record = evaluate_group(customer_id, offer_id, &mut group, ledger);
            if record.is_valid_response {
                log::debug!(
                    "response: customer={customer_id} offer={offer_id} valid x{} amount={:.2} reward={:.2}",
                    record.valid_count, record.attributed_amount, record.attributed_reward
                );
            }
            record
        })
        .collect();

    let valid = records.iter().filter(|r| r.is_valid_response).count();
    log::info!(
        "response: {} groups, {} valid, ledger keys={}",
        records.len(),
        valid,
        ledger.len()
    );
    records
}
