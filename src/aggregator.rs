// 📊 Aggregator - (period, category) → summed emissions
// Pivoted to one column per bin; absent cells stay absent

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::categorizer::{CategorizedRecord, Category};

/// One bin's values aligned with `AggregatedSeries::periods`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryColumn {
    pub category: Category,
    pub values: Vec<Option<f64>>,
}

impl CategoryColumn {
    /// Present cells only, as (period, value), in period order
    pub fn observed<'a>(&'a self, periods: &'a [NaiveDate]) -> impl Iterator<Item = (NaiveDate, f64)> + 'a {
        periods
            .iter()
            .zip(self.values.iter())
            .filter_map(|(period, value)| value.map(|v| (*period, v)))
    }

    pub fn present_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedSeries {
    /// Union of observed periods, ascending
    pub periods: Vec<NaiveDate>,
    /// One column per bin, in rank order
    pub columns: Vec<CategoryColumn>,
}

impl AggregatedSeries {
    /// Sum the measure per (period, category). `categories` fixes the column
    /// set so an empty bin still gets an (all-absent) column.
    pub fn from_records(records: &[CategorizedRecord], categories: &[Category]) -> Self {
        let mut sums: BTreeMap<(NaiveDate, usize), f64> = BTreeMap::new();
        let mut periods: BTreeSet<NaiveDate> = BTreeSet::new();

        for record in records {
            periods.insert(record.period);
            *sums.entry((record.period, record.category.rank)).or_insert(0.0) += record.emissions;
        }

        let periods: Vec<NaiveDate> = periods.into_iter().collect();

        let columns = categories
            .iter()
            .map(|category| CategoryColumn {
                category: category.clone(),
                values: periods
                    .iter()
                    .map(|period| sums.get(&(*period, category.rank)).copied())
                    .collect(),
            })
            .collect();

        AggregatedSeries { periods, columns }
    }

    pub fn column(&self, label: &str) -> Option<&CategoryColumn> {
        self.columns.iter().find(|c| c.category.label == label)
    }

    /// Cell lookup; `None` for an unknown period or label as well as an absent cell
    pub fn value(&self, period: NaiveDate, label: &str) -> Option<f64> {
        let idx = self.periods.binary_search(&period).ok()?;
        self.column(label)?.values[idx]
    }

    /// Sum over every present cell
    pub fn total(&self) -> f64 {
        self.columns
            .iter()
            .flat_map(|c| c.values.iter().flatten())
            .sum()
    }

    pub fn period_total(&self, period: NaiveDate) -> Option<f64> {
        let idx = self.periods.binary_search(&period).ok()?;
        Some(self.columns.iter().filter_map(|c| c.values[idx]).sum())
    }

    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn date(year: i32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, 1, 1).unwrap()
    }

    fn record(year: i32, emissions: f64, category: &Category) -> CategorizedRecord {
        CategorizedRecord {
            period: date(year),
            entity: "E".to_string(),
            emissions,
            category: category.clone(),
        }
    }

    fn bins() -> Vec<Category> {
        vec![
            Category::new(0, "Low"),
            Category::new(1, "Medium"),
            Category::new(2, "High"),
        ]
    }

    #[test]
    fn test_groups_and_pivots() {
        let cats = bins();
        let records = vec![
            record(2001, 5.0, &cats[0]),
            record(2000, 10.0, &cats[0]),
            record(2000, 20.0, &cats[2]),
            record(2000, 2.5, &cats[0]),
        ];

        let agg = AggregatedSeries::from_records(&records, &cats);

        assert_eq!(agg.periods, vec![date(2000), date(2001)]);
        assert_eq!(agg.value(date(2000), "Low"), Some(12.5));
        assert_eq!(agg.value(date(2000), "High"), Some(20.0));
        assert_eq!(agg.value(date(2001), "Low"), Some(5.0));
        assert_eq!(agg.period_total(date(2000)), Some(32.5));
        assert_eq!(agg.period_total(date(2001)), Some(5.0));
    }

    #[test]
    fn test_missing_cells_are_absent_not_zero() {
        let cats = bins();
        let records = vec![record(2000, 1.0, &cats[0]), record(2001, 1.0, &cats[2])];

        let agg = AggregatedSeries::from_records(&records, &cats);

        assert_eq!(agg.column("High").unwrap().values, vec![None, Some(1.0)]);
        // empty bin still has a column
        assert_eq!(agg.column("Medium").unwrap().values, vec![None, None]);
        assert_eq!(agg.column("Medium").unwrap().present_count(), 0);
    }

    #[test]
    fn test_observed_skips_absent_cells() {
        let cats = bins();
        let records = vec![
            record(2000, 1.0, &cats[1]),
            record(2001, 3.0, &cats[0]),
            record(2002, 2.0, &cats[1]),
        ];

        let agg = AggregatedSeries::from_records(&records, &cats);
        let observed: Vec<(NaiveDate, f64)> =
            agg.column("Medium").unwrap().observed(&agg.periods).collect();

        assert_eq!(observed, vec![(date(2000), 1.0), (date(2002), 2.0)]);
    }

    proptest! {
        #[test]
        fn prop_aggregation_preserves_sum(
            rows in prop::collection::vec((1990i32..2000, 0usize..3, 0.0f64..1000.0), 0..100)
        ) {
            let cats = bins();
            let records: Vec<CategorizedRecord> = rows
                .iter()
                .map(|(year, rank, v)| record(*year, *v, &cats[*rank]))
                .collect();
            let raw_total: f64 = records.iter().map(|r| r.emissions).sum();

            let agg = AggregatedSeries::from_records(&records, &cats);

            prop_assert!((agg.total() - raw_total).abs() <= 1e-9 * raw_total.max(1.0));
            prop_assert!(agg.periods.windows(2).all(|w| w[0] < w[1]));
        }
    }
}
