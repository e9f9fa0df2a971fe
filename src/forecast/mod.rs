// 🔮 Forecaster - One ARIMA model per category
// Categories are fitted independently; a failure only skips its own category

pub mod arima;

pub use arima::{difference, ArimaModel, ForecastError, ModelSummary};

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::categorizer::Category;
use crate::config::{ForecastConfig, ModelOrder};
use crate::error::CategoryDiagnostic;
use crate::loader::year_start;
use crate::normalizer::{NormalizedColumn, NormalizedSeries};

// ============================================================================
// OUTPUT TYPES
// ============================================================================

/// Predictions for the periods strictly after a category's last observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastSeries {
    pub category: Category,
    pub periods: Vec<NaiveDate>,
    /// In the category's normalized [0, 1] space
    pub normalized: Vec<f64>,
    /// Mapped back to MtCO2e through the category's min-max scale
    pub raw: Vec<f64>,
}

impl ForecastSeries {
    pub fn len(&self) -> usize {
        self.periods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }
}

/// Observed line plus forecast line that meet at exactly one point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StitchedSeries {
    pub category: Category,
    pub observed: Vec<(NaiveDate, f64)>,
    /// Last observed point; the forecast line starts here
    pub anchor: (NaiveDate, f64),
    /// Exactly `horizon` points, never including the anchor
    pub forecast: Vec<(NaiveDate, f64)>,
}

impl StitchedSeries {
    /// Anchor followed by the forecast, ready to draw as one connected line
    pub fn forecast_line(&self) -> Vec<(NaiveDate, f64)> {
        std::iter::once(self.anchor)
            .chain(self.forecast.iter().copied())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryForecast {
    pub model: ModelSummary,
    pub forecast: ForecastSeries,
    pub stitched: StitchedSeries,
}

#[derive(Debug, Clone, Default)]
pub struct ForecastOutcome {
    /// Successful forecasts in rank order
    pub forecasts: Vec<CategoryForecast>,
    /// One `ModelConvergence` diagnostic per skipped category
    pub failures: Vec<CategoryDiagnostic>,
}

impl ForecastOutcome {
    pub fn get(&self, label: &str) -> Option<&CategoryForecast> {
        self.forecasts
            .iter()
            .find(|f| f.forecast.category.label == label)
    }
}

// ============================================================================
// STITCHING
// ============================================================================

/// `horizon` January-1st periods following `last`
pub fn future_periods(last: NaiveDate, horizon: usize) -> Result<Vec<NaiveDate>, ForecastError> {
    let horizon = i32::try_from(horizon).map_err(|_| ForecastError::PeriodOutOfRange)?;
    (1..=horizon)
        .map(|k| {
            last.year()
                .checked_add(k)
                .and_then(year_start)
                .ok_or(ForecastError::PeriodOutOfRange)
        })
        .collect()
}

/// Join the forecast onto the observed series. The last observed value is
/// prepended as the anchor and then dropped from the stored forecast, so the
/// forecast keeps exactly `values.len()` points.
pub fn stitch(
    category: &Category,
    observed: Vec<(NaiveDate, f64)>,
    periods: &[NaiveDate],
    values: &[f64],
) -> Option<StitchedSeries> {
    let anchor = *observed.last()?;

    let continuous: Vec<(NaiveDate, f64)> = std::iter::once(anchor)
        .chain(periods.iter().copied().zip(values.iter().copied()))
        .collect();
    let forecast = continuous[1..].to_vec();

    Some(StitchedSeries {
        category: category.clone(),
        observed,
        anchor,
        forecast,
    })
}

// ============================================================================
// FORECASTER
// ============================================================================

pub struct Forecaster {
    order: ModelOrder,
    horizon: usize,
}

impl Forecaster {
    pub fn new(config: &ForecastConfig) -> Self {
        Forecaster {
            order: config.order,
            horizon: config.horizon,
        }
    }

    pub fn horizon(&self) -> usize {
        self.horizon
    }

    /// Fit, predict and stitch one category
    pub fn forecast_category(
        &self,
        column: &NormalizedColumn,
        periods: &[NaiveDate],
    ) -> Result<CategoryForecast, ForecastError> {
        let category = &column.column.category;
        // missing cells are dropped, never interpolated
        let observed: Vec<(NaiveDate, f64)> = column.column.observed(periods).collect();
        let history: Vec<f64> = observed.iter().map(|(_, v)| *v).collect();

        let model = ArimaModel::fit(&history, self.order)?;
        let normalized = model.predict(self.horizon)?;

        let (last_period, _) = *observed.last().ok_or(ForecastError::InsufficientData {
            required: self.order.min_observations(),
            actual: 0,
        })?;
        let future = future_periods(last_period, self.horizon)?;

        let raw: Vec<f64> = match column.scale {
            Some(scale) => normalized.iter().map(|v| scale.invert(*v)).collect(),
            None => normalized.clone(),
        };

        let stitched = stitch(category, observed, &future, &normalized).ok_or(
            ForecastError::InsufficientData {
                required: self.order.min_observations(),
                actual: 0,
            },
        )?;

        debug!(category = %category, "{}", model.summary().report());

        Ok(CategoryForecast {
            model: model.summary(),
            forecast: ForecastSeries {
                category: category.clone(),
                periods: future,
                normalized,
                raw,
            },
            stitched,
        })
    }

    /// Forecast every column in rank order, collecting per-category failures
    pub fn forecast_all(&self, series: &NormalizedSeries) -> ForecastOutcome {
        let mut outcome = ForecastOutcome::default();
        if self.horizon == 0 {
            return outcome;
        }

        for column in &series.columns {
            let label = &column.column.category.label;
            info!(category = %label, order = %self.order, "training forecast model");

            match self.forecast_category(column, &series.periods) {
                Ok(result) => {
                    info!(
                        category = %label,
                        first = ?result.forecast.normalized.first(),
                        last = ?result.forecast.normalized.last(),
                        "forecast ready"
                    );
                    outcome.forecasts.push(result);
                }
                Err(source) => {
                    let diag = CategoryDiagnostic::ModelConvergence {
                        label: label.clone(),
                        source,
                    };
                    warn!("{}", diag);
                    outcome.failures.push(diag);
                }
            }
        }

        outcome
    }
}

// ============================================================================
// TESTS
// ============================================================================
