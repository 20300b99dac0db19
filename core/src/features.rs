//! Numeric feature matrix handed to the external clustering step.

use crate::{
    aggregate::{AggregatedRow, CategoryStats},
    config::Scaling,
    error::{PipelineError, PipelineResult},
    profile::Gender,
    types::CustomerId,
};
use ndarray::{Array2, Axis};

#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    /// Customer of each matrix row.
    pub customer_ids: Vec<CustomerId>,
    pub columns:      Vec<String>,
    pub values:       Array2<f64>,
}

impl FeatureMatrix {
    pub fn nrows(&self) -> usize {
        self.values.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.values.ncols()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

/// Column names in matrix order.
///
/// Band labels, the customer id and the registration year are left out; the
/// year rarely recurs in new data. Gender is one-hot over every code so the
/// width never depends on which codes happen to occur.
pub fn feature_columns() -> Vec<String> {
    let mut columns = Vec::new();
    for suffix in ["bogo", "discount"] {
        for field in CategoryStats::FIELDS {
            columns.push(format!("{field}_{suffix}"));
        }
    }
    columns.extend(["age", "income", "reg_month"].map(String::from));
    columns.extend(Gender::ALL.iter().map(|g| format!("gender_{}", g.code())));
    columns
}

fn feature_row(row: &AggregatedRow) -> Vec<f64> {
    let mut out = Vec::with_capacity(21);
    out.extend(row.bogo.values());
    out.extend(row.discount.values());
    out.push(row.profile.age as f64);
    out.push(row.profile.income);
    out.push(row.profile.registration_month as f64);
    out.extend(Gender::ALL.iter().map(|g| (*g == row.profile.gender) as u8 as f64));
    out
}

pub fn build_feature_matrix(rows: &[AggregatedRow], scaling: Scaling) -> PipelineResult<FeatureMatrix> {
    let columns = feature_columns();
    let data: Vec<f64> = rows.iter().flat_map(feature_row).collect();
    let mut values = Array2::from_shape_vec((rows.len(), columns.len()), data)
        .map_err(|e| PipelineError::Other(anyhow::anyhow!("feature matrix shape: {e}")))?;

    if scaling == Scaling::MinMax {
        min_max_scale(&mut values);
    }

    log::info!(
        "features: {}x{} matrix ({:?} scaling)",
        values.nrows(),
        values.ncols(),
        scaling
    );
    Ok(FeatureMatrix {
        customer_ids: rows.iter().map(|r| r.customer_id).collect(),
        columns,
        values,
    })
}

/// Rescale each column to [0, 1]. Constant columns become 0.
pub fn min_max_scale(values: &mut Array2<f64>) {
    for mut column in values.axis_iter_mut(Axis(1)) {
        let min = column.iter().copied().fold(f64::INFINITY, f64::min);
        let max = column.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let range = max - min;
        column.mapv_inplace(|v| if range > 0.0 { (v - min) / range } else { 0.0 });
    }
}
