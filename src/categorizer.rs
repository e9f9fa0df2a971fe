// 🏷️ Categorizer - Quantile binning of emitters
// Lowest bin is closed on both ends, every other bin is (left, right]

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::CategoryDiagnostic;
use crate::loader::EmissionRecord;

// ============================================================================
// CATEGORY
// ============================================================================

/// An ordered bin. Ordering follows `rank`, so Low < Medium < High.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Category {
    pub rank: usize,
    pub label: String,
}

impl Category {
    pub fn new(rank: usize, label: &str) -> Self {
        Category {
            rank,
            label: label.to_string(),
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label)
    }
}

// ============================================================================
// QUANTILES
// ============================================================================

/// Linear interpolation between order statistics (pandas' default).
/// `sorted` must be ascending; `None` when it is empty.
pub fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    let n = sorted.len();
    if n <= 1 {
        return sorted.first().copied();
    }
    let h = (n - 1) as f64 * q.clamp(0.0, 1.0);
    let lo = h.floor() as usize;
    let hi = (lo + 1).min(n - 1);
    Some(sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo]))
}

// ============================================================================
// THRESHOLDS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryThresholds {
    /// Cut points the edges were computed at, e.g. [0, 0.33, 0.66, 1.0]
    pub cuts: Vec<f64>,
    /// Bin edges in measure units; `edges.len() == labels.len() + 1`
    pub edges: Vec<f64>,
    pub labels: Vec<String>,
}

impl CategoryThresholds {
    /// Quantile edges of the finite values in `values`. `None` when there are none.
    pub fn from_values<I>(values: I, cuts: &[f64], labels: &[String]) -> Option<Self>
    where
        I: IntoIterator<Item = f64>,
    {
        let mut sorted: Vec<f64> = values.into_iter().filter(|v| v.is_finite()).collect();
        if sorted.is_empty() || cuts.len() != labels.len() + 1 {
            return None;
        }
        sorted.sort_by(|a, b| a.total_cmp(b));

        let mut edges = cuts
            .iter()
            .map(|&q| quantile(&sorted, q))
            .collect::<Option<Vec<f64>>>()?;
        // interpolation rounding must not break monotonicity
        for i in 1..edges.len() {
            if edges[i] < edges[i - 1] {
                edges[i] = edges[i - 1];
            }
        }

        Some(CategoryThresholds {
            cuts: cuts.to_vec(),
            edges,
            labels: labels.to_vec(),
        })
    }

    pub fn from_records(records: &[EmissionRecord], cuts: &[f64], labels: &[String]) -> Option<Self> {
        Self::from_values(records.iter().filter_map(|r| r.emissions), cuts, labels)
    }

    pub fn categories(&self) -> Vec<Category> {
        self.labels
            .iter()
            .enumerate()
            .map(|(rank, label)| Category::new(rank, label))
            .collect()
    }

    pub fn category(&self, rank: usize) -> Option<Category> {
        self.labels.get(rank).map(|label| Category::new(rank, label))
    }

    /// Bin for `value`, or `None` when it lies outside the edges or is not finite
    pub fn assign(&self, value: f64) -> Option<Category> {
        let first = *self.edges.first()?;
        let last = *self.edges.last()?;

        if !value.is_finite() || value < first || value > last {
            return None;
        }
        if value == first {
            return self.category(0);
        }

        // first bin whose right edge reaches the value; zero-width bins never win
        (0..self.labels.len())
            .find(|&i| value <= self.edges[i + 1])
            .and_then(|rank| self.category(rank))
    }

    /// Bins whose edges collapsed onto each other. The lowest bin is closed
    /// on both ends, so even at zero width it still holds the minimum.
    pub fn degenerate_bins(&self) -> Vec<CategoryDiagnostic> {
        self.labels
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(i, _)| self.edges[*i] == self.edges[i + 1])
            .map(|(i, label)| CategoryDiagnostic::DegenerateBin {
                label: label.clone(),
                edge: self.edges[i],
            })
            .collect()
    }
}

// ============================================================================
// CATEGORIZATION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorizedRecord {
    pub period: NaiveDate,
    pub entity: String,
    pub emissions: f64,
    pub category: Category,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorizationSummary {
    /// Members per bin, in rank order (empty bins included)
    pub counts: Vec<(Category, usize)>,
    /// Records with a missing measure or one outside the edges
    pub unassigned: usize,
    #[serde(skip)]
    pub degenerate: Vec<CategoryDiagnostic>,
}

#[derive(Debug, Clone)]
pub struct Categorization {
    pub records: Vec<CategorizedRecord>,
    pub summary: CategorizationSummary,
}

/// Label every record. Never fails: zero-width bins simply stay empty.
pub fn categorize(records: &[EmissionRecord], thresholds: &CategoryThresholds) -> Categorization {
    let mut counts = vec![0usize; thresholds.labels.len()];
    let mut unassigned = 0;
    let mut categorized = Vec::with_capacity(records.len());

    for record in records {
        let assigned = record
            .emissions
            .and_then(|v| thresholds.assign(v).map(|c| (v, c)));

        match assigned {
            Some((emissions, category)) => {
                counts[category.rank] += 1;
                categorized.push(CategorizedRecord {
                    period: record.period,
                    entity: record.entity.clone(),
                    emissions,
                    category,
                });
            }
            None => unassigned += 1,
        }
    }

    let degenerate = thresholds.degenerate_bins();
    for diag in &degenerate {
        warn!("{}", diag);
    }

    let counts: Vec<(Category, usize)> = thresholds.categories().into_iter().zip(counts).collect();
    for (category, count) in &counts {
        info!(category = %category, records = count, "bin membership");
    }
    if unassigned > 0 {
        info!(unassigned, "records left without a bin");
    }

    Categorization {
        records: categorized,
        summary: CategorizationSummary {
            counts,
            unassigned,
            degenerate,
        },
    }
}

// ============================================================================
// TESTS
// ============================================================================
