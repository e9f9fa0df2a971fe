// ⚙️ Pipeline Configuration - Settings as Data
// One parameterized pipeline, loaded from JSON or built from presets

use anyhow::{Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::PipelineError;

// ============================================================================
// DATASET SCHEMA
// ============================================================================

/// Column names the loader expects to find in the header (exact match)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetSchema {
    pub year_column: String,
    pub entity_column: String,
    pub measure_column: String,
}

impl Default for DatasetSchema {
    fn default() -> Self {
        DatasetSchema {
            year_column: "year".to_string(),
            entity_column: "parent_entity".to_string(),
            measure_column: "total_emissions_MtCO2e".to_string(),
        }
    }
}

// ============================================================================
// ANALYSIS OPTIONS
// ============================================================================

/// Which records the quantile thresholds are computed from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThresholdBasis {
    /// Only records that survive the `min_year` filter
    Filtered,
    /// Every loaded record, regardless of year
    FullDataset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NormalizationScope {
    /// Each category column uses its own min/max
    Independent,
    /// One min/max across every column
    Joint,
}

/// What a zero-variance column becomes after normalization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstantSeriesPolicy {
    Zero,
    Midpoint,
    PassThrough,
}

impl ConstantSeriesPolicy {
    pub fn name(&self) -> &str {
        match self {
            ConstantSeriesPolicy::Zero => "zero",
            ConstantSeriesPolicy::Midpoint => "midpoint",
            ConstantSeriesPolicy::PassThrough => "pass-through",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizationConfig {
    pub scope: NormalizationScope,
    pub constant_policy: ConstantSeriesPolicy,
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        NormalizationConfig {
            scope: NormalizationScope::Independent,
            constant_policy: ConstantSeriesPolicy::Zero,
        }
    }
}

/// ARIMA order (p, d, q)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelOrder {
    pub p: usize,
    pub d: usize,
    pub q: usize,
}

impl ModelOrder {
    pub const MAX_P: usize = 10;
    pub const MAX_D: usize = 2;
    pub const MAX_Q: usize = 10;

    pub fn new(p: usize, d: usize, q: usize) -> Self {
        ModelOrder { p, d, q }
    }

    /// Shortest history the estimator accepts for this order
    pub fn min_observations(&self) -> usize {
        self.d + self.p.max(self.q).max(1) + 1
    }
}

impl Default for ModelOrder {
    fn default() -> Self {
        ModelOrder::new(5, 2, 1)
    }
}

impl std::fmt::Display for ModelOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ARIMA({},{},{})", self.p, self.d, self.q)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    /// Number of future periods; 0 disables forecasting
    pub horizon: usize,
    pub order: ModelOrder,
}

impl ForecastConfig {
    /// Longest forecast the pipeline accepts, in periods
    pub const MAX_HORIZON: usize = 200;
}

impl Default for ForecastConfig {
    fn default() -> Self {
        ForecastConfig {
            horizon: 13,
            order: ModelOrder::default(),
        }
    }
}

// ============================================================================
// CHART OPTIONS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartConfig {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub width: u32,
    pub height: u32,
    /// Draw a point marker on every observed value
    pub show_markers: bool,
}

impl Default for ChartConfig {
    fn default() -> Self {
        ChartConfig {
            title: "Carbon Emissions: Observed vs. Forecasted Trends".to_string(),
            x_label: "Year".to_string(),
            y_label: "Emission Intensity (Normalized 0-1 Scale)".to_string(),
            width: 1400,
            height: 800,
            show_markers: false,
        }
    }
}

// ============================================================================
// PIPELINE CONFIG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub dataset_path: PathBuf,
    pub output_path: PathBuf,
    pub schema: DatasetSchema,
    pub quantile_cuts: Vec<f64>,
    pub bin_labels: Vec<String>,
    pub min_year: Option<i32>,
    pub threshold_basis: ThresholdBasis,
    pub drop_duplicates: bool,
    pub normalization: NormalizationConfig,
    pub forecast: ForecastConfig,
    pub chart: ChartConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig::forecast()
    }
}

impl PipelineConfig {
    /// Forecasting run: 1940 onwards, ARIMA(5,2,1), 13 periods ahead
    pub fn forecast() -> Self {
        PipelineConfig {
            dataset_path: PathBuf::from("emissions_high_granularity.csv"),
            output_path: PathBuf::from("Matplot_Linechart.png"),
            schema: DatasetSchema::default(),
            quantile_cuts: vec![0.0, 0.33, 0.66, 1.0],
            bin_labels: vec!["Low".to_string(), "Medium".to_string(), "High".to_string()],
            min_year: Some(1940),
            threshold_basis: ThresholdBasis::Filtered,
            drop_duplicates: true,
            normalization: NormalizationConfig::default(),
            forecast: ForecastConfig::default(),
            chart: ChartConfig::default(),
        }
    }

    /// Historical trend only: whole dataset, no forecast, markers on
    pub fn historical() -> Self {
        PipelineConfig {
            min_year: None,
            threshold_basis: ThresholdBasis::FullDataset,
            forecast: ForecastConfig {
                horizon: 0,
                ..ForecastConfig::default()
            },
            chart: ChartConfig {
                title: "Normalized Emissions Trends by Company Size".to_string(),
                y_label: "Normalized Emissions (0-1 Scale)".to_string(),
                width: 1800,
                height: 900,
                show_markers: true,
                ..ChartConfig::default()
            },
            ..PipelineConfig::forecast()
        }
    }

    /// Load a config from a JSON file; absent fields fall back to the forecast preset
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: PipelineConfig =
            serde_json::from_str(&content).context("Failed to parse config JSON")?;

        Ok(config)
    }

    pub fn bin_count(&self) -> usize {
        self.quantile_cuts.len().saturating_sub(1)
    }

    /// Reject settings that would make a stage meaningless
    pub fn validate(&self) -> Result<(), PipelineError> {
        let cuts = &self.quantile_cuts;

        if cuts.len() < 2 {
            return Err(PipelineError::Config(format!(
                "quantile_cuts needs at least 2 entries, got {}",
                cuts.len()
            )));
        }
        if cuts.iter().any(|q| !q.is_finite() || *q < 0.0 || *q > 1.0) {
            return Err(PipelineError::Config(
                "quantile_cuts must lie in [0, 1]".to_string(),
            ));
        }
        if cuts.windows(2).any(|w| w[1] < w[0]) {
            return Err(PipelineError::Config(
                "quantile_cuts must be non-decreasing".to_string(),
            ));
        }
        if cuts[0] != 0.0 || cuts[cuts.len() - 1] != 1.0 {
            return Err(PipelineError::Config(
                "quantile_cuts must start at 0 and end at 1".to_string(),
            ));
        }
        if self.bin_labels.len() != self.bin_count() {
            return Err(PipelineError::Config(format!(
                "{} bin labels given for {} bins",
                self.bin_labels.len(),
                self.bin_count()
            )));
        }

        let order = self.forecast.order;
        if order.p > ModelOrder::MAX_P || order.q > ModelOrder::MAX_Q {
            return Err(PipelineError::Config(format!(
                "{} exceeds the supported AR/MA order of {}",
                order,
                ModelOrder::MAX_P
            )));
        }
        if order.d > ModelOrder::MAX_D {
            return Err(PipelineError::Config(format!(
                "{} exceeds the supported differencing order of {}",
                order,
                ModelOrder::MAX_D
            )));
        }

        if self.forecast.horizon > ForecastConfig::MAX_HORIZON {
            return Err(PipelineError::Config(format!(
                "forecast horizon {} exceeds the maximum of {}",
                self.forecast.horizon,
                ForecastConfig::MAX_HORIZON
            )));
        }

        if self.chart.width == 0 || self.chart.height == 0 {
            return Err(PipelineError::Config("chart size must be non-zero".to_string()));
        }

        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_forecast_preset_defaults() {
        let config = PipelineConfig::forecast();

        assert_eq!(config.forecast.horizon, 13);
        assert_eq!(config.forecast.order, ModelOrder::new(5, 2, 1));
        assert_eq!(config.min_year, Some(1940));
        assert_eq!(config.bin_count(), 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_historical_preset_disables_forecast() {
        let config = PipelineConfig::historical();

        assert_eq!(config.forecast.horizon, 0);
        assert_eq!(config.min_year, None);
        assert_eq!(config.threshold_basis, ThresholdBasis::FullDataset);
        assert!(config.chart.show_markers);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_label_count_must_match_bins() {
        let mut config = PipelineConfig::forecast();
        config.quantile_cuts = vec![0.0, 0.5, 1.0];

        assert!(matches!(config.validate(), Err(PipelineError::Config(_))));

        config.bin_labels = vec!["Low".to_string(), "High".to_string()];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_cuts_and_order() {
        let mut config = PipelineConfig::forecast();
        config.quantile_cuts = vec![0.0, 0.66, 0.33, 1.0];
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::forecast();
        config.quantile_cuts = vec![0.1, 0.5, 0.9, 1.0];
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::forecast();
        config.forecast.order = ModelOrder::new(5, 3, 1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_horizon_is_bounded() {
        let mut config = PipelineConfig::forecast();
        config.forecast.horizon = ForecastConfig::MAX_HORIZON;
        assert!(config.validate().is_ok());

        config.forecast.horizon = ForecastConfig::MAX_HORIZON + 1;
        assert!(matches!(config.validate(), Err(PipelineError::Config(_))));

        config.forecast.horizon = usize::MAX;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_min_observations() {
        assert_eq!(ModelOrder::new(5, 2, 1).min_observations(), 8);
        assert_eq!(ModelOrder::new(0, 0, 0).min_observations(), 2);
        assert_eq!(ModelOrder::new(1, 1, 3).min_observations(), 5);
    }

    #[test]
    fn test_from_file_partial_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "dataset_path": "data/e.csv", "min_year": 1990, "forecast": {{ "horizon": 5, "order": {{ "p": 2, "d": 1, "q": 0 }} }} }}"#
        )
        .unwrap();

        let config = PipelineConfig::from_file(file.path()).unwrap();

        assert_eq!(config.dataset_path, PathBuf::from("data/e.csv"));
        assert_eq!(config.min_year, Some(1990));
        assert_eq!(config.forecast.horizon, 5);
        assert_eq!(config.forecast.order, ModelOrder::new(2, 1, 0));
        // untouched fields keep the preset values
        assert_eq!(config.bin_labels.len(), 3);
        assert_eq!(config.schema, DatasetSchema::default());
    }
}
