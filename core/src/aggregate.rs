//! Joins response records with the offer and customer tables and collapses
//! them to one row per customer.
//!
//! Joins are validated: a dimension table with a duplicated key, or a
//! response pointing at a key the table does not have, is a hard error.
//! Nothing is silently duplicated or dropped.

use crate::{
    error::{PipelineError, PipelineResult},
    portfolio::{Offer, OfferCategory},
    profile::Customer,
    response::ResponseRecord,
    table::Record,
    types::{CustomerId, OfferId},
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// A response with its offer and customer rows attached.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedResponse {
    pub response: ResponseRecord,
    pub offer:    Offer,
    pub customer: Customer,
}

/// Per-category signals for one customer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryStats {
    /// Number of offers of this category with a valid response.
    pub response_sum:      u32,
    pub valid_count_mean:  f64,
    pub amount_mean:       f64,
    pub reward_mean:       f64,
    pub difficulty_mean:   f64,
    pub duration_mean:     f64,
    pub offer_reward_mean: f64,
}

impl CategoryStats {
    pub const FIELDS: [&'static str; 7] = [
        "response_sum", "resp_number_mean", "resp_amount_mean", "resp_reward_mean",
        "difficulty_mean", "duration_mean", "reward_mean",
    ];

    pub fn values(&self) -> [f64; 7] {
        [
            self.response_sum as f64,
            self.valid_count_mean,
            self.amount_mean,
            self.reward_mean,
            self.difficulty_mean,
            self.duration_mean,
            self.offer_reward_mean,
        ]
    }
}

/// One row per customer with at least one BOGO or discount response record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedRow {
    pub customer_id: CustomerId,
    pub bogo:        CategoryStats,
    pub discount:    CategoryStats,
    pub profile:     Customer,
}

impl Record for AggregatedRow {
    const COLUMNS: &'static [&'static str] = &[
        "customer_id",
        "response_sum_bogo", "resp_number_mean_bogo", "resp_amount_mean_bogo",
        "resp_reward_mean_bogo", "difficulty_mean_bogo", "duration_mean_bogo",
        "reward_mean_bogo",
        "response_sum_discount", "resp_number_mean_discount", "resp_amount_mean_discount",
        "resp_reward_mean_discount", "difficulty_mean_discount", "duration_mean_discount",
        "reward_mean_discount",
        "gender", "age", "age_band", "income", "income_band", "reg_year", "reg_month",
    ];
}

fn unique_index<'a, K, T>(
    join: &'static str,
    rows: &'a [T],
    key: impl Fn(&T) -> K,
) -> PipelineResult<HashMap<K, &'a T>>
where
    K: std::hash::Hash + Eq + std::fmt::Display,
{
    let mut index = HashMap::with_capacity(rows.len());
    for row in rows {
        let k = key(row);
        if index.contains_key(&k) {
            return Err(PipelineError::JoinCardinality {
                join,
                detail: format!("key {k} appears more than once on the 'one' side"),
            });
        }
        index.insert(k, row);
    }
    Ok(index)
}

/// Many-to-one join of responses onto offers, then onto customers.
pub fn merge_responses(
    responses: &[ResponseRecord],
    offers: &[Offer],
    customers: &[Customer],
) -> PipelineResult<Vec<MergedResponse>> {
    let offer_index: HashMap<OfferId, &Offer> =
        unique_index("response->offer", offers, |o| o.offer_id)?;
    let customer_index: HashMap<CustomerId, &Customer> =
        unique_index("response->customer", customers, |c| c.customer_id)?;

    responses
        .iter()
        .map(|r| {
            let offer = offer_index.get(&r.offer_id).ok_or_else(|| PipelineError::JoinCardinality {
                join:   "response->offer",
                detail: format!("offer {} is not in the portfolio", r.offer_id),
            })?;
            let customer = customer_index.get(&r.customer_id).ok_or_else(|| {
                PipelineError::JoinCardinality {
                    join:   "response->customer",
                    detail: format!("customer {} is not in the profile table", r.customer_id),
                }
            })?;
            Ok(MergedResponse {
                response: r.clone(),
                offer:    (*offer).clone(),
                customer: (*customer).clone(),
            })
        })
        .collect()
}

#[derive(Default)]
struct Accumulator {
    n:            u32,
    responses:    u32,
    valid_count:  f64,
    amount:       f64,
    reward:       f64,
    difficulty:   f64,
    duration:     f64,
    offer_reward: f64,
}

impl Accumulator {
    fn add(&mut self, m: &MergedResponse) {
        self.n += 1;
        self.responses += m.response.is_valid_response as u32;
        self.valid_count += m.response.valid_count as f64;
        self.amount += m.response.attributed_amount;
        self.reward += m.response.attributed_reward;
        self.difficulty += m.offer.difficulty;
        self.duration += m.offer.duration;
        self.offer_reward += m.offer.reward;
    }

    fn stats(&self) -> CategoryStats {
        let n = self.n.max(1) as f64;
        CategoryStats {
            response_sum:      self.responses,
            valid_count_mean:  self.valid_count / n,
            amount_mean:       self.amount / n,
            reward_mean:       self.reward / n,
            difficulty_mean:   self.difficulty / n,
            duration_mean:     self.duration / n,
            offer_reward_mean: self.offer_reward / n,
        }
    }
}

/// Collapse merged responses to one row per customer.
///
/// Informational offers are excluded. Per (customer, category) the response
/// flag is summed and every other signal averaged; BOGO and discount are then
/// pivoted side by side (a missing category is all zeros) and the customer's
/// profile is attached one-to-one. Rows are ordered by customer id.
pub fn aggregate(merged: &[MergedResponse], customers: &[Customer]) -> PipelineResult<Vec<AggregatedRow>> {
    let mut groups: BTreeMap<(CustomerId, OfferCategory), Accumulator> = BTreeMap::new();
    let mut excluded = 0usize;
    for m in merged {
        if !m.offer.category.is_measurable() {
            excluded += 1;
            continue;
        }
        groups
            .entry((m.response.customer_id, m.offer.category))
            .or_default()
            .add(m);
    }

    let mut pivot: BTreeMap<CustomerId, (CategoryStats, CategoryStats)> = BTreeMap::new();
    for ((customer_id, category), acc) in &groups {
        let slot = pivot.entry(*customer_id).or_default();
        match category {
            OfferCategory::Bogo          => slot.0 = acc.stats(),
            OfferCategory::Discount      => slot.1 = acc.stats(),
            OfferCategory::Informational => {}
        }
    }

    let profiles = unique_index("aggregate->customer", customers, |c| c.customer_id)?;
    let rows = pivot
        .into_iter()
        .map(|(customer_id, (bogo, discount))| {
            let profile = profiles.get(&customer_id).ok_or_else(|| PipelineError::JoinCardinality {
                join:   "aggregate->customer",
                detail: format!("customer {customer_id} is not in the profile table"),
            })?;
            Ok(AggregatedRow {
                customer_id,
                bogo,
                discount,
                profile: (*profile).clone(),
            })
        })
        .collect::<PipelineResult<Vec<_>>>()?;

    log::info!(
        "aggregate: {} customers from {} responses ({} informational excluded)",
        rows.len(),
        merged.len(),
        excluded
    );
    Ok(rows)
}

/// Merge then aggregate.
pub fn aggregate_responses(
    responses: &[ResponseRecord],
    offers: &[Offer],
    customers: &[Customer],
) -> PipelineResult<Vec<AggregatedRow>> {
    let merged = merge_responses(responses, offers, customers)?;
    aggregate(&merged, customers)
}
