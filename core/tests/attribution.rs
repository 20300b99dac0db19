use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;
use response_core::event::{Event, EventKind};
use response_core::response::{reconstruct, TransactionLedger};
use response_core::types::NO_OFFER;
use std::collections::{HashMap, HashSet};

// ── Test helpers ────────────────────────────────────────────────────────────

/// Random transcript with at most one completion per (customer, timestamp),
/// so no transaction can be matched by two offers at once.
fn random_transcript(seed: u64, customers: u64, offers: u64, len: usize) -> Vec<Event> {
    let mut rng = Pcg64Mcg::seed_from_u64(seed);
    let mut completions: HashSet<(u64, i64)> = HashSet::new();
    let mut events = Vec::with_capacity(len);

    for i in 0..len {
        let customer_id = rng.gen_range(1..=customers);
        let timestamp = rng.gen_range(0..60i64);
        let roll = rng.gen_range(0..4u8);
        let kind = match roll {
            0 => EventKind::Received,
            1 => EventKind::Viewed,
            2 => EventKind::Completed,
            _ => EventKind::Transaction,
        };
        if kind == EventKind::Completed && !completions.insert((customer_id, timestamp)) {
            continue;
        }
        let (offer_id, amount, reward) = match kind {
            EventKind::Transaction => (NO_OFFER, rng.gen_range(0.5..50.0), 0.0),
            EventKind::Completed   => (rng.gen_range(1..=offers), 0.0, rng.gen_range(1..=10) as f64),
            _                      => (rng.gen_range(1..=offers), 0.0, 0.0),
        };
        events.push(Event {
            event_id: i as u64 + 1,
            kind,
            amount,
            reward,
            timestamp,
            customer_id,
            offer_id,
        });
    }
    events
}

// ── Tests ────────────────────────────────────────────────────────────────────

/// Attribution never credits a customer with more money than they spent.
#[test]
fn attributed_amount_bounded_by_spend() {
    for seed in 0..50 {
        let events = random_transcript(seed, 6, 4, 400);
        let ledger = TransactionLedger::from_events(&events);
        let records = reconstruct(&events);

        let mut credited: HashMap<u64, f64> = HashMap::new();
        for r in &records {
            *credited.entry(r.customer_id).or_insert(0.0) += r.attributed_amount;
        }
        for (customer, amount) in credited {
            let spent = ledger.customer_total(customer);
            assert!(
                amount <= spent + 1e-9,
                "seed {seed}: customer {customer} credited {amount} but spent {spent}"
            );
        }
    }
}

/// Record-level invariants over random transcripts: invalid records carry
/// nothing, valid counts never exceed completions, and replaying the same
/// transcript reproduces the same records.
#[test]
fn record_invariants_hold_on_random_transcripts() {
    for seed in 100..130 {
        let events = random_transcript(seed, 5, 3, 300);
        let records = reconstruct(&events);

        for r in &records {
            let completions = events
                .iter()
                .filter(|e| {
                    e.kind == EventKind::Completed
                        && e.customer_id == r.customer_id
                        && e.offer_id == r.offer_id
                })
                .count() as u32;
            assert!(r.valid_count <= completions, "seed {seed}: {r:?}");
            assert_eq!(r.is_valid_response, r.valid_count > 0, "seed {seed}: {r:?}");
            if !r.is_valid_response {
                assert_eq!(r.attributed_amount, 0.0, "seed {seed}: {r:?}");
                assert_eq!(r.attributed_reward, 0.0, "seed {seed}: {r:?}");
            }
        }

        assert_eq!(records, reconstruct(&events), "seed {seed}: replay differs");
    }
}

/// Two offers completed by the same customer at the same timestamp are both
/// credited with the whole ledger amount at that timestamp.
#[test]
fn shared_timestamp_credits_both_offers() {
    let mut events = Vec::new();
    let mut id = 0;
    let mut push = |kind, time, offer_id, amount, reward| {
        id += 1;
        events.push(Event {
            event_id: id,
            kind,
            amount,
            reward,
            timestamp: time,
            customer_id: 1,
            offer_id,
        });
    };
    for offer in [1, 2] {
        push(EventKind::Received, 0, offer, 0.0, 0.0);
        push(EventKind::Viewed, 1, offer, 0.0, 0.0);
        push(EventKind::Completed, 5, offer, 0.0, 2.0);
    }
    push(EventKind::Transaction, 5, NO_OFFER, 30.0, 0.0);

    let records = reconstruct(&events);
    let total: f64 = records.iter().map(|r| r.attributed_amount).sum();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.attributed_amount == 30.0));
    assert_eq!(total, 60.0, "the same transaction is counted once per offer");
}
