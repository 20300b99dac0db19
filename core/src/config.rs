use crate::{bucket::BucketTable, table::Shape};
use serde::{Deserialize, Serialize};

/// File names of the three line-delimited JSON inputs, relative to the data dir.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputFiles {
    pub portfolio:  String,
    pub profile:    String,
    pub transcript: String,
}

impl Default for InputFiles {
    fn default() -> Self {
        Self {
            portfolio:  "portfolio.json".into(),
            profile:    "profile.json".into(),
            transcript: "transcript.json".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketingConfig {
    pub age:    BucketTable,
    pub income: BucketTable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleaningConfig {
    /// Age value the source uses for "unknown".
    pub missing_age_sentinel: u32,
    /// Drop customers with any missing attribute instead of filling them.
    pub drop_missing_rows: bool,
}

/// Golden shapes checked at each stage boundary. Absent entries are not checked.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExpectedShapes {
    #[serde(default)]
    pub offers:     Option<Shape>,
    #[serde(default)]
    pub customers:  Option<Shape>,
    #[serde(default)]
    pub events:     Option<Shape>,
    #[serde(default)]
    pub aggregated: Option<Shape>,
}

impl ExpectedShapes {
    /// Shapes produced by the full reference dataset.
    pub fn reference() -> Self {
        Self {
            offers:     Some(Shape { rows: 10, cols: 9 }),
            customers:  Some(Shape { rows: 17_000, cols: 8 }),
            events:     Some(Shape { rows: 306_534, cols: 7 }),
            aggregated: Some(Shape { rows: 16_928, cols: 22 }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scaling {
    None,
    MinMax,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureConfig {
    pub scaling: Scaling,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub inputs:          InputFiles,
    pub bucketing:       BucketingConfig,
    pub cleaning:        CleaningConfig,
    #[serde(default)]
    pub expected_shapes: ExpectedShapes,
    pub features:        FeatureConfig,
}

impl PipelineConfig {
    /// Load from the data/ directory.
    /// In tests, use PipelineConfig::default_test().
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let path = format!("{data_dir}/pipeline_config.json");
        let content = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: PipelineConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        Ok(config)
    }

    /// Config with hardcoded defaults for use in unit tests.
    /// No golden shapes are enforced.
    pub fn default_test() -> Self {
        Self {
            inputs: InputFiles::default(),
            bucketing: BucketingConfig {
                age:    BucketTable::age_bands(),
                income: BucketTable::income_bands(),
            },
            cleaning: CleaningConfig {
                missing_age_sentinel: 118,
                drop_missing_rows:    false,
            },
            expected_shapes: ExpectedShapes::default(),
            features: FeatureConfig {
                scaling: Scaling::MinMax,
            },
        }
    }
}
