//! Boundary to the external clustering algorithm.
//!
//! The pipeline does not pick an algorithm. Anything implementing
//! `Clusterer` can label the feature matrix; the pipeline only checks the
//! label count, attaches labels to the aggregated rows and scores them.

use crate::{
    aggregate::AggregatedRow,
    error::{PipelineError, PipelineResult},
    features::FeatureMatrix,
};
use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An unsupervised model that assigns one integer label per matrix row.
pub trait Clusterer {
    fn name(&self) -> &str;

    fn fit_predict(&mut self, matrix: &FeatureMatrix) -> PipelineResult<Vec<usize>>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledRow {
    pub cluster: usize,
    pub row:     AggregatedRow,
}

pub fn label_rows(rows: &[AggregatedRow], labels: &[usize]) -> PipelineResult<Vec<LabeledRow>> {
    if rows.len() != labels.len() {
        return Err(PipelineError::LabelCount {
            labels: labels.len(),
            rows:   rows.len(),
        });
    }
    Ok(rows
        .iter()
        .zip(labels)
        .map(|(row, &cluster)| LabeledRow {
            cluster,
            row: row.clone(),
        })
        .collect())
}

/// Rows per label. Labels come from outside and may be sparse.
pub fn cluster_sizes(labels: &[usize]) -> BTreeMap<usize, usize> {
    let mut sizes = BTreeMap::new();
    for &label in labels {
        *sizes.entry(label).or_insert(0) += 1;
    }
    sizes
}

fn manhattan(a: &ArrayView1<f64>, b: &ArrayView1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).sum()
}

/// Mean silhouette coefficient under the Manhattan metric.
///
/// 0.0 when there are fewer than two rows or fewer than two distinct labels.
/// A point alone in its cluster scores 0.
pub fn silhouette_score(matrix: &FeatureMatrix, labels: &[usize]) -> PipelineResult<f64> {
    let n = matrix.nrows();
    if labels.len() != n {
        return Err(PipelineError::LabelCount { labels: labels.len(), rows: n });
    }
    let counts = cluster_sizes(labels);
    if n < 2 || counts.len() < 2 {
        return Ok(0.0);
    }

    // Dense cluster index per row, in label order.
    let index: BTreeMap<usize, usize> = counts.keys().enumerate().map(|(i, &l)| (l, i)).collect();
    let clusters: Vec<usize> = labels.iter().map(|l| index[l]).collect();
    let sizes: Vec<usize> = counts.into_values().collect();

    let mut total = 0.0;
    for i in 0..n {
        let point = matrix.values.row(i);
        let mut sums = vec![0.0; sizes.len()];
        for j in 0..n {
            if i != j {
                sums[clusters[j]] += manhattan(&point, &matrix.values.row(j));
            }
        }

        let own = clusters[i];
        if sizes[own] < 2 {
            continue;
        }
        let a = sums[own] / (sizes[own] - 1) as f64;
        let b = sums
            .iter()
            .zip(&sizes)
            .enumerate()
            .filter(|(cluster, _)| *cluster != own)
            .map(|(_, (sum, &size))| sum / size as f64)
            .fold(f64::INFINITY, f64::min);

        let s = if a.max(b) > 0.0 { (b - a) / a.max(b) } else { 0.0 };
        total += s;
    }
    Ok(total / n as f64)
}
