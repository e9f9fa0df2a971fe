// 📏 Normalizer - Min-max scaling of category columns
// Absent cells never take part in the min/max and stay absent

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::aggregator::{AggregatedSeries, CategoryColumn};
use crate::config::{ConstantSeriesPolicy, NormalizationConfig, NormalizationScope};
use crate::error::CategoryDiagnostic;

// ============================================================================
// SCALE
// ============================================================================

/// The transform applied to one column, kept so forecasts can be mapped back
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScale {
    pub min: f64,
    pub max: f64,
    pub policy: ConstantSeriesPolicy,
}

impl MinMaxScale {
    pub fn fit(values: impl IntoIterator<Item = f64>, policy: ConstantSeriesPolicy) -> Option<Self> {
        let (min, max) = values.into_iter().fold(None, |acc: Option<(f64, f64)>, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })?;
        Some(MinMaxScale { min, max, policy })
    }

    pub fn is_degenerate(&self) -> bool {
        self.max == self.min
    }

    pub fn apply(&self, value: f64) -> f64 {
        if self.is_degenerate() {
            return match self.policy {
                ConstantSeriesPolicy::Zero => 0.0,
                ConstantSeriesPolicy::Midpoint => 0.5,
                ConstantSeriesPolicy::PassThrough => value,
            };
        }
        (value - self.min) / (self.max - self.min)
    }

    /// Back to measure units. A collapsed scale maps everything to its constant.
    pub fn invert(&self, value: f64) -> f64 {
        if self.is_degenerate() {
            return match self.policy {
                ConstantSeriesPolicy::PassThrough => value,
                _ => self.min,
            };
        }
        self.min + value * (self.max - self.min)
    }
}

// ============================================================================
// NORMALIZED SERIES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedColumn {
    pub column: CategoryColumn,
    /// `None` only for a column without any present cell
    pub scale: Option<MinMaxScale>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedSeries {
    pub periods: Vec<NaiveDate>,
    pub columns: Vec<NormalizedColumn>,
    #[serde(skip)]
    pub diagnostics: Vec<CategoryDiagnostic>,
}

impl NormalizedSeries {
    pub fn column(&self, label: &str) -> Option<&NormalizedColumn> {
        self.columns.iter().find(|c| c.column.category.label == label)
    }

    /// Present (period, value) pairs of one column, in period order
    pub fn observed(&self, label: &str) -> Vec<(NaiveDate, f64)> {
        self.column(label)
            .map(|c| c.column.observed(&self.periods).collect())
            .unwrap_or_default()
    }
}

/// Rescale `series` into [0, 1] following `config`
pub fn normalize(series: &AggregatedSeries, config: &NormalizationConfig) -> NormalizedSeries {
    let policy = config.constant_policy;

    let joint = match config.scope {
        NormalizationScope::Joint => MinMaxScale::fit(
            series.columns.iter().flat_map(|c| c.values.iter().flatten().copied()),
            policy,
        ),
        NormalizationScope::Independent => None,
    };

    let mut diagnostics = Vec::new();
    let mut columns = Vec::with_capacity(series.columns.len());

    for column in &series.columns {
        let scale = match config.scope {
            NormalizationScope::Joint => joint,
            NormalizationScope::Independent => {
                MinMaxScale::fit(column.values.iter().flatten().copied(), policy)
            }
        };

        if let Some(s) = scale.filter(|s| s.is_degenerate()) {
            let diag = CategoryDiagnostic::NormalizationDegenerate {
                label: column.category.label.clone(),
                value: s.min,
                policy: policy.name().to_string(),
            };
            warn!("{}", diag);
            diagnostics.push(diag);
        }

        let values = column
            .values
            .iter()
            .map(|cell| match (cell, scale) {
                (Some(v), Some(s)) => Some(s.apply(*v)),
                _ => None,
            })
            .collect();

        columns.push(NormalizedColumn {
            column: CategoryColumn {
                category: column.category.clone(),
                values,
            },
            scale,
        });
    }

    NormalizedSeries {
        periods: series.periods.clone(),
        columns,
        diagnostics,
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categorizer::Category;

    fn date(year: i32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, 1, 1).unwrap()
    }

    fn series(columns: Vec<(&str, Vec<Option<f64>>)>) -> AggregatedSeries {
        let len = columns.first().map(|(_, v)| v.len()).unwrap_or(0);
        AggregatedSeries {
            periods: (0..len as i32).map(|i| date(2000 + i)).collect(),
            columns: columns
                .into_iter()
                .enumerate()
                .map(|(rank, (label, values))| CategoryColumn {
                    category: Category::new(rank, label),
                    values,
                })
                .collect(),
        }
    }

    fn values(norm: &NormalizedSeries, label: &str) -> Vec<Option<f64>> {
        norm.column(label).unwrap().column.values.clone()
    }

    #[test]
    fn test_min_maps_to_zero_max_to_one() {
        let agg = series(vec![("Low", vec![Some(3.0), Some(7.0), Some(5.0), Some(11.0)])]);

        let norm = normalize(&agg, &NormalizationConfig::default());

        assert_eq!(values(&norm, "Low"), vec![Some(0.0), Some(0.5), Some(0.25), Some(1.0)]);
        assert!(norm.diagnostics.is_empty());
    }

    #[test]
    fn test_columns_are_scaled_independently() {
        let agg = series(vec![
            ("Low", vec![Some(1.0), Some(2.0)]),
            ("High", vec![Some(1000.0), Some(3000.0)]),
        ]);

        let norm = normalize(&agg, &NormalizationConfig::default());

        assert_eq!(values(&norm, "Low"), vec![Some(0.0), Some(1.0)]);
        assert_eq!(values(&norm, "High"), vec![Some(0.0), Some(1.0)]);
    }

    #[test]
    fn test_joint_scope_shares_one_scale() {
        let agg = series(vec![
            ("Low", vec![Some(0.0), Some(10.0)]),
            ("High", vec![Some(50.0), Some(100.0)]),
        ]);
        let config = NormalizationConfig {
            scope: NormalizationScope::Joint,
            ..NormalizationConfig::default()
        };

        let norm = normalize(&agg, &config);

        assert_eq!(values(&norm, "Low"), vec![Some(0.0), Some(0.1)]);
        assert_eq!(values(&norm, "High"), vec![Some(0.5), Some(1.0)]);
    }

    #[test]
    fn test_absent_cells_ignored_in_min_max() {
        let agg = series(vec![("Medium", vec![None, Some(4.0), None, Some(8.0)])]);

        let norm = normalize(&agg, &NormalizationConfig::default());

        assert_eq!(values(&norm, "Medium"), vec![None, Some(0.0), None, Some(1.0)]);
    }

    #[test]
    fn test_constant_series_uses_policy() {
        let agg = series(vec![("Low", vec![Some(5.0), Some(5.0), Some(5.0), Some(5.0)])]);

        let zero = normalize(&agg, &NormalizationConfig::default());
        assert_eq!(values(&zero, "Low"), vec![Some(0.0); 4]);
        assert_eq!(zero.diagnostics.len(), 1);
        assert_eq!(zero.diagnostics[0].label(), "Low");

        let mid = normalize(
            &agg,
            &NormalizationConfig {
                constant_policy: ConstantSeriesPolicy::Midpoint,
                ..NormalizationConfig::default()
            },
        );
        assert_eq!(values(&mid, "Low"), vec![Some(0.5); 4]);

        let raw = normalize(
            &agg,
            &NormalizationConfig {
                constant_policy: ConstantSeriesPolicy::PassThrough,
                ..NormalizationConfig::default()
            },
        );
        assert_eq!(values(&raw, "Low"), vec![Some(5.0); 4]);
    }

    #[test]
    fn test_empty_column_has_no_scale() {
        let agg = series(vec![("Low", vec![Some(1.0), Some(2.0)]), ("High", vec![None, None])]);

        let norm = normalize(&agg, &NormalizationConfig::default());

        assert!(norm.column("High").unwrap().scale.is_none());
        assert_eq!(values(&norm, "High"), vec![None, None]);
    }

    #[test]
    fn test_invert_round_trip() {
        let scale = MinMaxScale::fit(vec![2.0, 6.0, 10.0], ConstantSeriesPolicy::Zero).unwrap();

        assert_eq!(scale.apply(6.0), 0.5);
        assert_eq!(scale.invert(0.5), 6.0);
        assert_eq!(scale.invert(1.25), 12.0);

        let flat = MinMaxScale::fit(vec![4.0, 4.0], ConstantSeriesPolicy::Zero).unwrap();
        assert_eq!(flat.invert(0.0), 4.0);
    }
}
