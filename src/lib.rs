// Emissions Forecast - Core Library
// Categorize emitters, aggregate per bin, normalize, forecast and chart

pub mod error;
pub mod config;
pub mod loader;
pub mod deduplication;
pub mod data_quality;
pub mod categorizer;
pub mod aggregator;
pub mod normalizer;
pub mod forecast;
pub mod render;
pub mod pipeline;

// Re-export commonly used types
pub use error::{CategoryDiagnostic, PipelineError};
pub use config::{
    ChartConfig, ConstantSeriesPolicy, DatasetSchema, ForecastConfig, ModelOrder,
    NormalizationConfig, NormalizationScope, PipelineConfig, ThresholdBasis,
};
pub use loader::{load_dataset, read_dataset, Dataset, EmissionRecord};
pub use deduplication::{DeduplicationEngine, DeduplicationOutcome, DuplicateMatch};
pub use data_quality::{DatasetReport, MeasureStats, QualityIssue, Severity};
pub use categorizer::{
    categorize, Categorization, CategorizationSummary, CategorizedRecord, Category,
    CategoryThresholds,
};
pub use aggregator::{AggregatedSeries, CategoryColumn};
pub use normalizer::{normalize, MinMaxScale, NormalizedColumn, NormalizedSeries};
pub use forecast::{
    ArimaModel, CategoryForecast, ForecastError, ForecastOutcome, ForecastSeries, Forecaster,
    ModelSummary, StitchedSeries,
};
pub use render::{render_chart, ChartSpec, RenderContext};
pub use pipeline::{Pipeline, PipelineOutput};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
