use response_core::aggregate::{aggregate_responses, merge_responses, AggregatedRow, CategoryStats};
use response_core::error::PipelineError;
use response_core::portfolio::{Offer, OfferCategory};
use response_core::profile::{Customer, Gender};
use response_core::response::ResponseRecord;
use response_core::table::{Record, Shape};

// ── Test helpers ────────────────────────────────────────────────────────────

fn offer(offer_id: u64, category: OfferCategory, difficulty: f64, duration: f64, reward: f64) -> Offer {
    Offer {
        offer_id,
        category,
        difficulty,
        duration,
        reward,
        channel_email:  true,
        channel_mobile: true,
        channel_social: false,
        channel_web:    true,
    }
}

fn customer(customer_id: u64) -> Customer {
    Customer {
        customer_id,
        gender:             Gender::Female,
        age:                45,
        age_band:           "(40, 50]".into(),
        income:             72_000.0,
        income_band:        "(70000, 80000]".into(),
        registration_year:  2017,
        registration_month: 5,
    }
}

fn response(customer_id: u64, offer_id: u64, valid_count: u32, amount: f64, reward: f64) -> ResponseRecord {
    ResponseRecord {
        customer_id,
        offer_id,
        is_valid_response: valid_count > 0,
        valid_count,
        attributed_amount: if valid_count > 0 { amount } else { 0.0 },
        attributed_reward: if valid_count > 0 { reward } else { 0.0 },
    }
}

fn catalog() -> Vec<Offer> {
    vec![
        offer(1, OfferCategory::Bogo, 10.0, 7.0, 10.0),
        offer(2, OfferCategory::Bogo, 5.0, 5.0, 5.0),
        offer(3, OfferCategory::Discount, 20.0, 10.0, 5.0),
        offer(4, OfferCategory::Informational, 0.0, 3.0, 0.0),
    ]
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

// ── Tests ────────────────────────────────────────────────────────────────────

/// Per category the response flag is summed and the rest averaged.
#[test]
fn category_stats_sum_and_mean() {
    let responses = vec![
        response(1, 1, 2, 30.0, 20.0),
        response(1, 2, 0, 0.0, 0.0),
        response(1, 3, 1, 15.0, 5.0),
    ];
    let rows = aggregate_responses(&responses, &catalog(), &[customer(1)]).unwrap();
    assert_eq!(rows.len(), 1);

    let bogo = &rows[0].bogo;
    assert_eq!(bogo.response_sum, 1);
    assert!(close(bogo.valid_count_mean, 1.0));
    assert!(close(bogo.amount_mean, 15.0));
    assert!(close(bogo.reward_mean, 10.0));
    assert!(close(bogo.difficulty_mean, 7.5));
    assert!(close(bogo.duration_mean, 6.0));
    assert!(close(bogo.offer_reward_mean, 7.5));

    let discount = &rows[0].discount;
    assert_eq!(discount.response_sum, 1);
    assert!(close(discount.amount_mean, 15.0));
    assert!(close(discount.difficulty_mean, 20.0));
}

/// A customer who only saw BOGO offers has all discount columns at zero.
#[test]
fn missing_category_is_all_zero() {
    let responses = vec![response(1, 1, 1, 12.0, 10.0)];
    let rows = aggregate_responses(&responses, &catalog(), &[customer(1)]).unwrap();
    assert_eq!(rows[0].discount, CategoryStats::default());
    assert_eq!(rows[0].bogo.response_sum, 1);
}

/// Informational offers are dropped before aggregation; a customer who only
/// received informational offers has no row at all.
#[test]
fn informational_offers_are_excluded() {
    let responses = vec![
        response(1, 4, 0, 0.0, 0.0),
        response(2, 4, 0, 0.0, 0.0),
        response(2, 3, 1, 9.0, 5.0),
    ];
    let rows = aggregate_responses(&responses, &catalog(), &[customer(1), customer(2)]).unwrap();
    let ids: Vec<u64> = rows.iter().map(|r| r.customer_id).collect();
    assert_eq!(ids, vec![2]);
    assert!(close(rows[0].discount.duration_mean, 10.0), "informational duration not mixed in");
}

/// Rows carry the full profile and come out in customer-id order.
#[test]
fn rows_ordered_with_profile_attached() {
    let responses = vec![
        response(3, 1, 1, 1.0, 1.0),
        response(1, 3, 0, 0.0, 0.0),
        response(2, 2, 0, 0.0, 0.0),
    ];
    let customers = vec![customer(2), customer(3), customer(1)];
    let rows = aggregate_responses(&responses, &catalog(), &customers).unwrap();

    let ids: Vec<u64> = rows.iter().map(|r| r.customer_id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert_eq!(rows[0].profile, customer(1));
    assert_eq!(Shape::of(&rows), Shape { rows: 3, cols: 22 });
    assert_eq!(AggregatedRow::COLUMNS.len(), 22);
}

#[test]
fn response_for_unknown_offer_is_a_join_error() {
    let responses = vec![response(1, 99, 0, 0.0, 0.0)];
    let err = merge_responses(&responses, &catalog(), &[customer(1)]).unwrap_err();
    assert!(
        matches!(err, PipelineError::JoinCardinality { join: "response->offer", .. }),
        "got {err}"
    );
}

#[test]
fn response_for_unknown_customer_is_a_join_error() {
    let responses = vec![response(42, 1, 0, 0.0, 0.0)];
    let err = merge_responses(&responses, &catalog(), &[customer(1)]).unwrap_err();
    assert!(
        matches!(err, PipelineError::JoinCardinality { join: "response->customer", .. }),
        "got {err}"
    );
}

/// A duplicated key on the "one" side would duplicate responses; it fails.
#[test]
fn duplicate_dimension_key_is_a_join_error() {
    let mut offers = catalog();
    offers.push(offer(2, OfferCategory::Discount, 1.0, 1.0, 1.0));
    let responses = vec![response(1, 1, 0, 0.0, 0.0)];
    assert!(matches!(
        merge_responses(&responses, &offers, &[customer(1)]),
        Err(PipelineError::JoinCardinality { .. })
    ));

    let customers = vec![customer(1), customer(1)];
    assert!(matches!(
        aggregate_responses(&responses, &catalog(), &customers),
        Err(PipelineError::JoinCardinality { .. })
    ));
}

#[test]
fn no_responses_no_rows() {
    let rows = aggregate_responses(&[], &catalog(), &[customer(1)]).unwrap();
    assert!(rows.is_empty());
}
