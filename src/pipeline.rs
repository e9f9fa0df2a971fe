// 🚀 Pipeline - Load → categorize → aggregate → normalize → forecast → render
// One parameterized run covers both the historical and the forecasting chart

use tracing::info;

use crate::aggregator::AggregatedSeries;
use crate::categorizer::{categorize, CategorizationSummary, CategoryThresholds};
use crate::config::{PipelineConfig, ThresholdBasis};
use crate::data_quality::DatasetReport;
use crate::deduplication::DeduplicationEngine;
use crate::error::{CategoryDiagnostic, PipelineError, Result};
use crate::forecast::{ForecastOutcome, Forecaster};
use crate::loader::{load_dataset, Dataset, EmissionRecord};
use crate::normalizer::{normalize, NormalizedSeries};
use crate::render::{render_chart, ChartSpec};

/// Everything one analysis produced, before rendering
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Profile of the loaded records (before dedup and filtering)
    pub quality: DatasetReport,
    pub duplicates_removed: usize,
    /// Records that survived dedup and the year filter
    pub analyzed_records: usize,
    pub thresholds: CategoryThresholds,
    pub categorization: CategorizationSummary,
    pub aggregated: AggregatedSeries,
    pub normalized: NormalizedSeries,
    pub forecasts: ForecastOutcome,
}

impl PipelineOutput {
    /// Every category-scoped diagnostic, in stage order
    pub fn diagnostics(&self) -> Vec<&CategoryDiagnostic> {
        self.categorization
            .degenerate
            .iter()
            .chain(self.normalized.diagnostics.iter())
            .chain(self.forecasts.failures.iter())
            .collect()
    }

    pub fn failures(&self) -> &[CategoryDiagnostic] {
        &self.forecasts.failures
    }
}

pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Pipeline { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every stage except rendering on an in-memory dataset
    pub fn analyze(&self, dataset: Dataset) -> Result<PipelineOutput> {
        let config = &self.config;
        let source = dataset.source.clone();

        let quality = DatasetReport::from_dataset(&dataset);
        quality.log();

        let (records, duplicates_removed) = if config.drop_duplicates {
            let outcome = DeduplicationEngine::new().deduplicate(dataset.records);
            let removed = outcome.removed();
            (outcome.records, removed)
        } else {
            (dataset.records, 0)
        };
        if duplicates_removed > 0 {
            info!(removed = duplicates_removed, "dropped duplicate rows");
        }

        let filtered: Vec<EmissionRecord> = match config.min_year {
            Some(min_year) => records
                .iter()
                .filter(|r| r.year() >= min_year)
                .cloned()
                .collect(),
            None => records.clone(),
        };
        info!(
            records = filtered.len(),
            min_year = ?config.min_year,
            "records in analysis window"
        );

        let basis = match config.threshold_basis {
            ThresholdBasis::Filtered => &filtered,
            ThresholdBasis::FullDataset => &records,
        };
        let thresholds =
            CategoryThresholds::from_records(basis, &config.quantile_cuts, &config.bin_labels)
                .ok_or_else(|| {
                    PipelineError::data_shape(&source, "no numeric emission values to bin")
                })?;
        info!(edges = ?thresholds.edges, "category thresholds");

        let categorization = categorize(&filtered, &thresholds);
        if categorization.records.is_empty() {
            return Err(PipelineError::data_shape(
                &source,
                "no records fall into any category",
            ));
        }

        let aggregated =
            AggregatedSeries::from_records(&categorization.records, &thresholds.categories());
        let normalized = normalize(&aggregated, &config.normalization);
        let forecasts = Forecaster::new(&config.forecast).forecast_all(&normalized);

        Ok(PipelineOutput {
            quality,
            duplicates_removed,
            analyzed_records: filtered.len(),
            thresholds,
            categorization: categorization.summary,
            aggregated,
            normalized,
            forecasts,
        })
    }

    pub fn chart_spec(&self, output: &PipelineOutput) -> ChartSpec {
        ChartSpec::from_analysis(&output.normalized, &output.forecasts, &self.config.chart)
    }

    /// Load the configured dataset, analyze it and write the chart
    pub fn run(&self) -> Result<PipelineOutput> {
        let dataset = load_dataset(&self.config.dataset_path, &self.config.schema)?;
        let output = self.analyze(dataset)?;

        render_chart(&self.chart_spec(&output), &self.config.output_path)?;

        info!(
            forecasts = output.forecasts.forecasts.len(),
            failures = output.forecasts.failures.len(),
            output = %self.config.output_path.display(),
            "pipeline finished"
        );
        Ok(output)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ForecastConfig;
    use chrono::NaiveDate;

    fn date(year: i32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, 1, 1).unwrap()
    }

    fn rec(year: i32, entity: &str, emissions: f64) -> EmissionRecord {
        EmissionRecord::new(year, entity, Some(emissions))
    }

    fn no_forecast() -> PipelineConfig {
        PipelineConfig {
            min_year: None,
            forecast: ForecastConfig {
                horizon: 0,
                ..ForecastConfig::default()
            },
            ..PipelineConfig::forecast()
        }
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = PipelineConfig {
            bin_labels: vec!["Only".to_string()],
            ..PipelineConfig::forecast()
        };
        assert!(matches!(Pipeline::new(config), Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_single_bin_sums_per_period() {
        let config = PipelineConfig {
            quantile_cuts: vec![0.0, 1.0],
            bin_labels: vec!["All".to_string()],
            ..no_forecast()
        };
        let pipeline = Pipeline::new(config).unwrap();
        let dataset = Dataset::from_records(vec![
            rec(2000, "A", 10.0),
            rec(2000, "B", 20.0),
            rec(2001, "A", 5.0),
        ]);

        let output = pipeline.analyze(dataset).unwrap();

        assert_eq!(output.aggregated.periods, vec![date(2000), date(2001)]);
        assert_eq!(output.aggregated.value(date(2000), "All"), Some(30.0));
        assert_eq!(output.aggregated.value(date(2001), "All"), Some(5.0));
        assert_eq!(
            output.normalized.column("All").unwrap().column.values,
            vec![Some(1.0), Some(0.0)]
        );
        assert!(output.forecasts.forecasts.is_empty());
    }

    #[test]
    fn test_two_bins_keep_period_totals() {
        let config = PipelineConfig {
            quantile_cuts: vec![0.0, 0.5, 1.0],
            bin_labels: vec!["Low".to_string(), "High".to_string()],
            ..no_forecast()
        };
        let pipeline = Pipeline::new(config).unwrap();
        let dataset = Dataset::from_records(vec![
            rec(2000, "A", 10.0),
            rec(2000, "B", 20.0),
            rec(2001, "A", 5.0),
        ]);

        let output = pipeline.analyze(dataset).unwrap();

        assert_eq!(output.thresholds.edges, vec![5.0, 10.0, 20.0]);
        assert_eq!(output.aggregated.value(date(2000), "Low"), Some(10.0));
        assert_eq!(output.aggregated.value(date(2000), "High"), Some(20.0));
        assert_eq!(output.aggregated.value(date(2001), "High"), None);
        assert_eq!(output.aggregated.period_total(date(2000)), Some(30.0));
        assert_eq!(output.aggregated.period_total(date(2001)), Some(5.0));
    }

    #[test]
    fn test_duplicates_dropped_before_binning() {
        let pipeline = Pipeline::new(no_forecast()).unwrap();
        let dataset = Dataset::from_records(vec![
            rec(2000, "A", 1.0),
            rec(2000, "A", 1.0),
            rec(2000, "B", 2.0),
            rec(2001, "C", 3.0),
        ]);

        let output = pipeline.analyze(dataset).unwrap();

        assert_eq!(output.quality.duplicate_rows, 1);
        assert_eq!(output.duplicates_removed, 1);
        assert_eq!(output.analyzed_records, 3);
        assert!((output.aggregated.total() - 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_year_filter_and_threshold_basis() {
        let records = vec![
            rec(1930, "Old", 1000.0),
            rec(1950, "A", 1.0),
            rec(1951, "A", 2.0),
            rec(1952, "A", 3.0),
        ];
        let filtered = PipelineConfig {
            min_year: Some(1940),
            ..no_forecast()
        };
        let full = PipelineConfig {
            threshold_basis: ThresholdBasis::FullDataset,
            ..filtered.clone()
        };

        let a = Pipeline::new(filtered)
            .unwrap()
            .analyze(Dataset::from_records(records.clone()))
            .unwrap();
        let b = Pipeline::new(full)
            .unwrap()
            .analyze(Dataset::from_records(records))
            .unwrap();

        assert_eq!(a.analyzed_records, 3);
        assert_eq!(a.thresholds.edges[3], 3.0);
        assert_eq!(b.thresholds.edges[3], 1000.0);
        assert!(!a.aggregated.periods.contains(&date(1930)));
    }

    #[test]
    fn test_analysis_is_deterministic() {
        let pipeline = Pipeline::new(PipelineConfig {
            min_year: None,
            ..PipelineConfig::forecast()
        })
        .unwrap();
        let records: Vec<EmissionRecord> = (0..30)
            .map(|i| rec(1990 + i / 3, &format!("E{}", i % 3), ((i * 7) % 11) as f64 + 1.0))
            .collect();

        let first = pipeline.analyze(Dataset::from_records(records.clone())).unwrap();
        let second = pipeline.analyze(Dataset::from_records(records)).unwrap();

        assert_eq!(first.normalized, second.normalized);
        assert_eq!(first.forecasts.forecasts, second.forecasts.forecasts);
        assert_eq!(first.diagnostics().len(), second.diagnostics().len());
    }

    #[test]
    fn test_no_numeric_values_is_data_shape_error() {
        let pipeline = Pipeline::new(no_forecast()).unwrap();
        let dataset = Dataset::from_records(vec![EmissionRecord::new(2000, "A", None)]);

        assert!(matches!(
            pipeline.analyze(dataset),
            Err(PipelineError::DataShape { .. })
        ));
    }
}
