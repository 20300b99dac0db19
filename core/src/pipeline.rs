//! The pipeline driver.
//!
//! STAGE ORDER (fixed):
//!   1. clean    raw inputs -> cleaned offers, customers, events (persisted)
//!   2. combine  cleaned tables -> responses -> per-customer aggregate (persisted)
//!   3. features aggregate -> numeric matrix
//!   4. label    matrix -> external clusterer -> labeled aggregate (persisted)
//!
//! RULES:
//!   - Stages talk to each other only through the store.
//!   - A stage writes once, after every check has passed, in a single
//!     transaction that replaces the run's rows. Failed stages leave the
//!     store as it was and can simply be run again.
//!   - Every stage checks the shape of what it writes and of what it reads
//!     against the configured golden shapes.

use crate::{
    aggregate::{aggregate_responses, AggregatedRow},
    clustering::{cluster_sizes, label_rows, silhouette_score, Clusterer},
    config::PipelineConfig,
    error::PipelineResult,
    event::{Event, EventNormalizer},
    features::{build_feature_matrix, FeatureMatrix},
    id_map::IdMap,
    input::RawInputs,
    portfolio::{clean_offers, Offer},
    profile::{clean_customers, Customer},
    response::reconstruct,
    store::PipelineStore,
    table::check_shape,
    types::RunId,
};
use std::collections::BTreeMap;

/// Output of the clean stage, with the id maps it built.
#[derive(Debug, Clone)]
pub struct CleanedTables {
    pub offers:       Vec<Offer>,
    pub customers:    Vec<Customer>,
    pub events:       Vec<Event>,
    pub offer_ids:    IdMap<String>,
    pub customer_ids: IdMap<String>,
}

#[derive(Debug, Clone)]
pub struct ClusteringReport {
    pub clusterer:     String,
    pub rows:          usize,
    pub cluster_sizes: BTreeMap<usize, usize>,
    pub silhouette:    f64,
}

pub struct Pipeline {
    pub run_id: RunId,
    pub config: PipelineConfig,
    pub store:  PipelineStore,
}

impl Pipeline {
    pub fn new(run_id: RunId, config: PipelineConfig, store: PipelineStore) -> Self {
        Self { run_id, config, store }
    }

    /// In-memory store, migrated, run registered, test config.
    pub fn build_test(run_id: RunId) -> PipelineResult<Self> {
        let store = PipelineStore::in_memory()?;
        store.migrate()?;
        store.insert_run(&run_id, "0.1.0-test")?;
        Ok(Self::new(run_id, PipelineConfig::default_test(), store))
    }

    // ── Stage 1 ────────────────────────────────────────────────

    pub fn clean(&self, raw: &RawInputs) -> PipelineResult<CleanedTables> {
        let shapes = &self.config.expected_shapes;

        let mut offer_ids = IdMap::build(raw.offers.iter().map(|o| o.id.clone()));
        let offers = clean_offers(&raw.offers, &mut offer_ids);
        check_shape("clean.offers", &offers, shapes.offers)?;

        let mut customer_ids = IdMap::build(raw.customers.iter().map(|c| c.id.clone()));
        let customers = clean_customers(
            &raw.customers,
            &mut customer_ids,
            &self.config.cleaning,
            &self.config.bucketing,
        )?;
        check_shape("clean.customers", &customers, shapes.customers)?;

        let events = EventNormalizer::new(&mut customer_ids, &mut offer_ids).normalize_all(&raw.events);
        check_shape("clean.events", &events, shapes.events)?;

        self.store.save_cleaned(&self.run_id, &offers, &customers, &events)?;
        log::info!(
            "run={} clean: {} offers, {} customers, {} events stored",
            self.run_id,
            offers.len(),
            customers.len(),
            events.len()
        );

        Ok(CleanedTables {
            offers,
            customers,
            events,
            offer_ids,
            customer_ids,
        })
    }

    // ── Stage 2 ────────────────────────────────────────────────

    pub fn combine(&self) -> PipelineResult<Vec<AggregatedRow>> {
        let shapes = &self.config.expected_shapes;

        let offers = self.store.load_offers(&self.run_id)?;
        check_shape("combine.offers", &offers, shapes.offers)?;
        let customers = self.store.load_customers(&self.run_id)?;
        check_shape("combine.customers", &customers, shapes.customers)?;
        let events = self.store.load_events(&self.run_id)?;
        check_shape("combine.events", &events, shapes.events)?;

        let responses = reconstruct(&events);
        let rows = aggregate_responses(&responses, &offers, &customers)?;
        check_shape("combine.aggregated", &rows, shapes.aggregated)?;

        self.store.save_combined(&self.run_id, &responses, &rows)?;
        log::info!("run={} combine: {} aggregated rows stored", self.run_id, rows.len());
        Ok(rows)
    }

    // ── Stage 3 ────────────────────────────────────────────────

    pub fn features(&self) -> PipelineResult<(Vec<AggregatedRow>, FeatureMatrix)> {
        let rows = self.store.load_aggregated(&self.run_id)?;
        check_shape("features.aggregated", &rows, self.config.expected_shapes.aggregated)?;
        let matrix = build_feature_matrix(&rows, self.config.features.scaling)?;
        Ok((rows, matrix))
    }

    // ── Stage 4 ────────────────────────────────────────────────

    pub fn label(&self, clusterer: &mut dyn Clusterer) -> PipelineResult<ClusteringReport> {
        let (rows, matrix) = self.features()?;
        let labels = clusterer.fit_predict(&matrix)?;
        let labeled = label_rows(&rows, &labels)?;
        let silhouette = silhouette_score(&matrix, &labels)?;
        self.store.save_labels(&self.run_id, &labeled)?;

        let report = ClusteringReport {
            clusterer: clusterer.name().to_string(),
            rows: labeled.len(),
            cluster_sizes: cluster_sizes(&labels),
            silhouette,
        };
        log::info!(
            "run={} label: {} rows by '{}', sizes={:?}, silhouette={:.3}",
            self.run_id,
            report.rows,
            report.clusterer,
            report.cluster_sizes,
            report.silhouette
        );
        Ok(report)
    }
}
