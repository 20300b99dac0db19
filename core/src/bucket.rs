//! Bucketing of continuous values into closed-interval band labels.
//!
//! A table is an ascending list of inclusive upper bounds, each with a label,
//! plus a catch-all label for anything above the last bound. A value equal
//! to a bound belongs to that bound's bucket (`<=`), never the next one.

use crate::error::{PipelineError, PipelineResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketBound {
    pub upper: f64,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BucketTableFile")]
pub struct BucketTable {
    bounds:         Vec<BucketBound>,
    overflow_label: String,
}

#[derive(Debug, Clone, Deserialize)]
struct BucketTableFile {
    bounds:         Vec<BucketBound>,
    overflow_label: String,
}

impl TryFrom<BucketTableFile> for BucketTable {
    type Error = PipelineError;

    fn try_from(file: BucketTableFile) -> PipelineResult<Self> {
        BucketTable::new(file.bounds, file.overflow_label)
    }
}

impl BucketTable {
    /// Rejects tables whose bounds are not strictly ascending.
    pub fn new(bounds: Vec<BucketBound>, overflow_label: impl Into<String>) -> PipelineResult<Self> {
        for pair in bounds.windows(2) {
            if !(pair[0].upper < pair[1].upper) {
                return Err(PipelineError::Config(format!(
                    "bucket bounds must be strictly ascending: {} then {}",
                    pair[0].upper, pair[1].upper
                )));
            }
        }
        Ok(Self {
            bounds,
            overflow_label: overflow_label.into(),
        })
    }

    /// Evenly spaced `(lo, hi]` buckets: `(floor, first]`, `(first, first+step]`, ...
    /// up to and including `last`, then `"over {last}"`.
    pub fn evenly_spaced(floor: u64, first: u64, step: u64, last: u64) -> PipelineResult<Self> {
        if step == 0 || first > last || first <= floor {
            return Err(PipelineError::Config(format!(
                "cannot space buckets with floor={floor} first={first} step={step} last={last}"
            )));
        }
        Ok(Self::spaced(floor, first, step, last))
    }

    /// Age bands: (0, 20], (20, 30], ..., (90, 100], over 100.
    pub fn age_bands() -> Self {
        Self::spaced(0, 20, 10, 100)
    }

    /// Income bands: (0, 30000], (30000, 40000], ..., (100000, 110000], over 110000.
    pub fn income_bands() -> Self {
        Self::spaced(0, 30_000, 10_000, 110_000)
    }

    // Callers guarantee step > 0 and floor < first <= last.
    fn spaced(floor: u64, first: u64, step: u64, last: u64) -> Self {
        let mut bounds = Vec::new();
        let mut lower = floor;
        let mut upper = first;
        while upper <= last {
            bounds.push(BucketBound {
                upper: upper as f64,
                label: format!("({lower}, {upper}]"),
            });
            lower = upper;
            upper += step;
        }
        Self {
            bounds,
            overflow_label: format!("over {lower}"),
        }
    }

    /// Label of the first bucket whose upper bound is >= `value`.
    pub fn bucket(&self, value: f64) -> &str {
        self.bounds
            .iter()
            .find(|b| value <= b.upper)
            .map(|b| b.label.as_str())
            .unwrap_or(&self.overflow_label)
    }

    pub fn bounds(&self) -> &[BucketBound] {
        &self.bounds
    }

    pub fn overflow_label(&self) -> &str {
        &self.overflow_label
    }
}
