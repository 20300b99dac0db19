//! pipeline-runner: headless batch runner for the offer response pipeline.
//!
//! Usage:
//!   pipeline-runner --data-dir ./data --db run.db --stage all
//!   pipeline-runner --db run.db --run-id run-1 --stage combine
//!   pipeline-runner --db run.db --run-id run-1 --stage features --features-out features.json

use anyhow::{bail, Result};
use response_core::{
    config::PipelineConfig,
    features::FeatureMatrix,
    input::RawInputs,
    pipeline::Pipeline,
    store::{PipelineStore, RUN_TABLES},
};
use std::env;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Clean,
    Combine,
    Features,
    All,
}

impl Stage {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "clean"    => Some(Self::Clean),
            "combine"  => Some(Self::Combine),
            "features" => Some(Self::Features),
            "all"      => Some(Self::All),
            _          => None,
        }
    }
}

/// Matrix export consumed by the external clustering job.
#[derive(serde::Serialize)]
struct FeatureExport<'a> {
    run_id:       &'a str,
    columns:      &'a [String],
    customer_ids: &'a [u64],
    rows:         Vec<Vec<f64>>,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let data_dir = flag_value(&args, "--data-dir").unwrap_or("./data");
    let db = flag_value(&args, "--db").unwrap_or("pipeline.db");
    let stage_arg = flag_value(&args, "--stage").unwrap_or("all");
    let features_out = flag_value(&args, "--features-out");
    let Some(stage) = Stage::parse(stage_arg) else {
        bail!("unknown stage '{stage_arg}' (expected clean|combine|features|all)");
    };

    let store = PipelineStore::open(db)?;
    store.migrate()?;

    let run_id = match flag_value(&args, "--run-id") {
        Some(id) => id.to_string(),
        None => format!("run-{}", uuid::Uuid::new_v4()),
    };
    if !store.run_exists(&run_id)? {
        if !matches!(stage, Stage::Clean | Stage::All) {
            bail!("run '{run_id}' not found in {db}; run the clean stage first");
        }
        store.insert_run(&run_id, env!("CARGO_PKG_VERSION"))?;
    }

    let config = PipelineConfig::load(data_dir)?;

    println!("Offer response pipeline: pipeline-runner");
    println!("  run_id:    {run_id}");
    println!("  stage:     {stage_arg}");
    println!("  db:        {db}");
    println!("  data_dir:  {data_dir}");
    println!();

    let pipeline = Pipeline::new(run_id.clone(), config, store);
    log::info!("runner: stage={stage:?} run_id={run_id}");

    if matches!(stage, Stage::Clean | Stage::All) {
        let raw = RawInputs::load(Path::new(data_dir), &pipeline.config.inputs)?;
        let cleaned = pipeline.clean(&raw)?;
        println!(
            "clean:    {} offers, {} customers, {} events",
            cleaned.offers.len(),
            cleaned.customers.len(),
            cleaned.events.len()
        );
    }

    if matches!(stage, Stage::Combine | Stage::All) {
        let rows = pipeline.combine()?;
        let responders = rows
            .iter()
            .filter(|r| r.bogo.response_sum + r.discount.response_sum > 0)
            .count();
        println!("combine:  {} customers, {} with a valid response", rows.len(), responders);
    }

    if matches!(stage, Stage::Features | Stage::All) {
        let (_, matrix) = pipeline.features()?;
        println!("features: {}x{} matrix", matrix.nrows(), matrix.ncols());
        if let Some(path) = features_out {
            write_features(&run_id, &matrix, path)?;
            println!("features written to {path}");
        }
    }

    print_summary(&pipeline)?;
    Ok(())
}

fn write_features(run_id: &str, matrix: &FeatureMatrix, path: &str) -> Result<()> {
    let export = FeatureExport {
        run_id,
        columns:      &matrix.columns,
        customer_ids: &matrix.customer_ids,
        rows:         matrix.values.outer_iter().map(|r| r.to_vec()).collect(),
    };
    let file = std::fs::File::create(path)?;
    serde_json::to_writer(std::io::BufWriter::new(file), &export)?;
    Ok(())
}

fn print_summary(pipeline: &Pipeline) -> Result<()> {
    let run_id = &pipeline.run_id;
    println!();
    println!("=== RUN SUMMARY ===");
    println!("  run_id:        {run_id}");
    for table in RUN_TABLES {
        let n = pipeline.store.row_count(run_id, table)?;
        println!("  {table:<16} {n}");
    }
    Ok(())
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}
