//! Customer profiles: raw rows, missing-value policy and banding.

use crate::{
    bucket::BucketTable,
    config::{BucketingConfig, CleaningConfig},
    error::{PipelineError, PipelineResult},
    id_map::IdMap,
    table::Record,
    types::CustomerId,
};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Gender {
    #[serde(rename = "M")]
    Male,
    #[serde(rename = "F")]
    Female,
    #[serde(rename = "O")]
    Other,
    #[serde(rename = "U")]
    Unknown,
}

impl Gender {
    pub const ALL: [Gender; 4] = [Gender::Female, Gender::Male, Gender::Other, Gender::Unknown];

    pub fn code(&self) -> &'static str {
        match self {
            Self::Male    => "M",
            Self::Female  => "F",
            Self::Other   => "O",
            Self::Unknown => "U",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|g| g.code() == code)
    }
}

/// One line of `profile.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawCustomer {
    pub id:               String,
    #[serde(default)]
    pub gender:           Option<String>,
    pub age:              u32,
    #[serde(default)]
    pub income:           Option<f64>,
    /// Registration date as `YYYYMMDD`.
    pub became_member_on: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub customer_id:        CustomerId,
    pub gender:             Gender,
    pub age:                u32,
    pub age_band:           String,
    pub income:             f64,
    pub income_band:        String,
    pub registration_year:  i32,
    pub registration_month: u32,
}

impl Record for Customer {
    const COLUMNS: &'static [&'static str] = &[
        "customer_id", "gender", "age", "age_band", "income", "income_band",
        "reg_year", "reg_month",
    ];
}

/// Clean the profile table.
///
/// Missing values are age == sentinel, absent gender and absent income.
/// Depending on `cleaning.drop_missing_rows` those rows are dropped, or
/// gender becomes `U` and age/income are filled from the next row that has
/// a value (trailing gaps from the previous one).
pub fn clean_customers(
    raws: &[RawCustomer],
    customer_ids: &mut IdMap<String>,
    cleaning: &CleaningConfig,
    bucketing: &BucketingConfig,
) -> PipelineResult<Vec<Customer>> {
    let mut ages: Vec<Option<f64>> = Vec::with_capacity(raws.len());
    let mut incomes: Vec<Option<f64>> = Vec::with_capacity(raws.len());
    let mut kept: Vec<(usize, &RawCustomer)> = Vec::with_capacity(raws.len());

    for (idx, raw) in raws.iter().enumerate() {
        // Ids are assigned before any filtering so dense ids match file order.
        customer_ids.assign(raw.id.clone());

        let age = (raw.age != cleaning.missing_age_sentinel).then_some(raw.age as f64);
        let missing = age.is_none() || raw.gender.is_none() || raw.income.is_none();
        if cleaning.drop_missing_rows && missing {
            continue;
        }
        ages.push(age);
        incomes.push(raw.income);
        kept.push((idx, raw));
    }

    if cleaning.drop_missing_rows {
        log::info!("profile: dropped {} rows with missing values", raws.len() - kept.len());
    } else {
        let filled_age = fill_missing(&mut ages);
        let filled_income = fill_missing(&mut incomes);
        if filled_age + filled_income > 0 {
            log::warn!("profile: filled {filled_age} missing ages and {filled_income} missing incomes");
        }
    }

    kept.iter()
        .zip(ages.iter().zip(incomes.iter()))
        .map(|(&(idx, raw), (&age, &income))| {
            let (registration_year, registration_month) =
                parse_registration(raw.became_member_on).ok_or_else(|| {
                    PipelineError::InvalidRecord {
                        table:  "profile",
                        line:   idx + 1,
                        reason: format!("bad became_member_on {}", raw.became_member_on),
                    }
                })?;
            let age = age.unwrap_or(0.0);
            let income = income.unwrap_or(0.0);
            Ok(Customer {
                customer_id: customer_ids.assign(raw.id.clone()),
                gender: parse_gender(raw.gender.as_deref()),
                age: age as u32,
                age_band: band(&bucketing.age, age),
                income,
                income_band: band(&bucketing.income, income),
                registration_year,
                registration_month,
            })
        })
        .collect()
}

fn band(table: &BucketTable, value: f64) -> String {
    table.bucket(value).to_string()
}

fn parse_gender(raw: Option<&str>) -> Gender {
    match raw {
        None => Gender::Unknown,
        Some(code) => Gender::from_code(code).unwrap_or_else(|| {
            log::warn!("profile: unknown gender code '{code}', using U");
            Gender::Unknown
        }),
    }
}

/// `YYYYMMDD` to (year, month).
pub fn parse_registration(yyyymmdd: u32) -> Option<(i32, u32)> {
    NaiveDate::parse_from_str(&yyyymmdd.to_string(), "%Y%m%d")
        .ok()
        .map(|d| (d.year(), d.month()))
}

/// Backward fill, then forward fill what is left at the tail. A column with
/// no values at all is left as is. Returns how many slots were filled.
pub fn fill_missing(values: &mut [Option<f64>]) -> usize {
    let missing = values.iter().filter(|v| v.is_none()).count();

    let mut next = None;
    for slot in values.iter_mut().rev() {
        if slot.is_some() {
            next = *slot;
        } else {
            *slot = next;
        }
    }
    let mut prev = None;
    for slot in values.iter_mut() {
        if slot.is_some() {
            prev = *slot;
        } else {
            *slot = prev;
        }
    }

    missing - values.iter().filter(|v| v.is_none()).count()
}
