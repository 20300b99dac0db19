//! Line-delimited JSON readers for the three raw inputs.

use crate::{
    config::InputFiles,
    error::{PipelineError, PipelineResult},
    event::RawEvent,
    portfolio::RawOffer,
    profile::RawCustomer,
};
use serde::de::DeserializeOwned;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

/// The raw tables as read from disk, in file order.
#[derive(Debug, Clone, Default)]
pub struct RawInputs {
    pub offers:    Vec<RawOffer>,
    pub customers: Vec<RawCustomer>,
    pub events:    Vec<RawEvent>,
}

impl RawInputs {
    pub fn load(data_dir: &Path, files: &InputFiles) -> PipelineResult<Self> {
        let inputs = Self {
            offers:    read_json_lines(&data_dir.join(&files.portfolio), "portfolio")?,
            customers: read_json_lines(&data_dir.join(&files.profile), "profile")?,
            events:    read_json_lines(&data_dir.join(&files.transcript), "transcript")?,
        };
        log::info!(
            "input: {} offers, {} customers, {} events from {}",
            inputs.offers.len(),
            inputs.customers.len(),
            inputs.events.len(),
            data_dir.display()
        );
        Ok(inputs)
    }
}

pub fn read_json_lines<T: DeserializeOwned>(path: &Path, table: &'static str) -> PipelineResult<Vec<T>> {
    parse_json_lines(File::open(path)?, table)
}

/// One record per non-blank line. A bad line fails with its 1-based line number.
pub fn parse_json_lines<T: DeserializeOwned, R: Read>(reader: R, table: &'static str) -> PipelineResult<Vec<T>> {
    let mut out = Vec::new();
    for (idx, line) in BufReader::new(reader).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line).map_err(|e| PipelineError::InvalidRecord {
            table,
            line:   idx + 1,
            reason: e.to_string(),
        })?;
        out.push(record);
    }
    Ok(out)
}
