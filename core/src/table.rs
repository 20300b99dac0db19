//! Flat-table contracts shared by every stage.
//!
//! Each persisted row type declares its column list. Stage boundaries
//! compare the produced (rows, columns) against the configured golden
//! shape and fail hard on any difference.

use crate::error::{PipelineError, PipelineResult};
use serde::{Deserialize, Serialize};

/// A row type of one of the pipeline's flat tables.
pub trait Record {
    const COLUMNS: &'static [&'static str];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shape {
    pub rows: usize,
    pub cols: usize,
}

impl Shape {
    pub fn of<R: Record>(rows: &[R]) -> Self {
        Self {
            rows: rows.len(),
            cols: R::COLUMNS.len(),
        }
    }
}

/// Stage-boundary guard. `None` means no golden shape is configured.
pub fn check_shape<R: Record>(
    stage: &'static str,
    rows: &[R],
    expected: Option<Shape>,
) -> PipelineResult<()> {
    let actual = Shape::of(rows);
    log::info!("stage={stage} shape: {}x{}", actual.rows, actual.cols);
    match expected {
        Some(exp) if exp != actual => Err(PipelineError::ShapeMismatch {
            stage,
            expected_rows: exp.rows,
            expected_cols: exp.cols,
            actual_rows:   actual.rows,
            actual_cols:   actual.cols,
        }),
        _ => Ok(()),
    }
}
