// ✅ Data Quality Report - Profile a loaded emissions dataset
// Row counts, missing cells, duplicates, summary statistics, fingerprint
//
// Never rejects a dataset: every finding becomes a QualityIssue

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::categorizer::quantile;
use crate::deduplication::DeduplicationEngine;
use crate::loader::{Dataset, EmissionRecord};

/// How many distinct entities are listed in the report
const ENTITY_SAMPLE: usize = 10;

// ============================================================================
// ISSUES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Critical, // Nothing usable downstream
    Warning,  // Rows that will be skipped or look wrong
    Info,     // Worth knowing, harmless
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityIssue {
    pub severity: Severity,
    pub field: String,
    pub issue: String,
    pub recommendation: String,
}

impl QualityIssue {
    fn new(severity: Severity, field: &str, issue: String, recommendation: &str) -> Self {
        QualityIssue {
            severity,
            field: field.to_string(),
            issue,
            recommendation: recommendation.to_string(),
        }
    }
}

// ============================================================================
// SUMMARY STATISTICS
// ============================================================================

/// Describe-style statistics of the measure (present values only)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasureStats {
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation; `None` below two values
    pub std: Option<f64>,
    pub min: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub max: f64,
}

impl MeasureStats {
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let n = sorted.len() as f64;
        let mean = sorted.iter().sum::<f64>() / n;
        let std = (sorted.len() > 1).then(|| {
            let ss: f64 = sorted.iter().map(|v| (v - mean).powi(2)).sum();
            (ss / (n - 1.0)).sqrt()
        });

        Some(MeasureStats {
            count: sorted.len(),
            mean,
            std,
            min: sorted[0],
            p25: quantile(&sorted, 0.25)?,
            p50: quantile(&sorted, 0.5)?,
            p75: quantile(&sorted, 0.75)?,
            max: sorted[sorted.len() - 1],
        })
    }
}

// ============================================================================
// DATASET REPORT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetReport {
    pub rows: usize,
    pub missing_measures: usize,
    /// Measure cells that held text other than a number (subset of missing)
    pub malformed_measures: usize,
    pub empty_entities: usize,
    pub duplicate_rows: usize,
    pub unique_entities: usize,
    /// First distinct entities in file order
    pub entity_sample: Vec<String>,
    pub year_span: Option<(i32, i32)>,
    pub stats: Option<MeasureStats>,
    /// SHA-256 over the records, hex encoded
    pub fingerprint: String,
    pub issues: Vec<QualityIssue>,
}

impl DatasetReport {
    pub fn build(records: &[EmissionRecord]) -> Self {
        let missing_measures = records.iter().filter(|r| r.emissions.is_none()).count();
        let empty_entities = records.iter().filter(|r| r.entity.is_empty()).count();
        let duplicate_rows = DeduplicationEngine::new().find_duplicates(records).len();

        let mut seen = HashSet::new();
        let mut entity_sample = Vec::new();
        for record in records {
            if seen.insert(record.entity.as_str()) && entity_sample.len() < ENTITY_SAMPLE {
                entity_sample.push(record.entity.clone());
            }
        }

        let year_span = records
            .iter()
            .map(|r| r.year())
            .fold(None, |span: Option<(i32, i32)>, y| match span {
                None => Some((y, y)),
                Some((lo, hi)) => Some((lo.min(y), hi.max(y))),
            });

        let values: Vec<f64> = records.iter().filter_map(|r| r.emissions).collect();
        let negatives = values.iter().filter(|v| **v < 0.0).count();

        let mut issues = Vec::new();
        if records.is_empty() {
            issues.push(QualityIssue::new(
                Severity::Critical,
                "dataset",
                "Dataset has no rows".to_string(),
                "Check the input path and delimiter",
            ));
        } else if values.is_empty() {
            issues.push(QualityIssue::new(
                Severity::Critical,
                "emissions",
                "No numeric emission values".to_string(),
                "Check the measure column name in the schema",
            ));
        }
        if missing_measures > 0 {
            issues.push(QualityIssue::new(
                Severity::Warning,
                "emissions",
                format!("{} rows have no emission value", missing_measures),
                "These rows are left out of every bin",
            ));
        }
        if negatives > 0 {
            issues.push(QualityIssue::new(
                Severity::Warning,
                "emissions",
                format!("{} negative emission values", negatives),
                "Verify the source; negative values fall into the lowest bin",
            ));
        }
        if empty_entities > 0 {
            issues.push(QualityIssue::new(
                Severity::Info,
                "parent_entity",
                format!("{} rows have an empty entity", empty_entities),
                "Rows are kept as-is",
            ));
        }
        if duplicate_rows > 0 {
            issues.push(QualityIssue::new(
                Severity::Info,
                "dataset",
                format!("{} exact duplicate rows", duplicate_rows),
                "Enable drop_duplicates to remove them",
            ));
        }

        DatasetReport {
            rows: records.len(),
            missing_measures,
            malformed_measures: 0,
            empty_entities,
            duplicate_rows,
            unique_entities: seen.len(),
            entity_sample,
            year_span,
            stats: MeasureStats::from_values(&values),
            fingerprint: fingerprint(records),
            issues,
        }
    }

    /// Like `build`, plus the unparseable measure cells the loader saw
    pub fn from_dataset(dataset: &Dataset) -> Self {
        let mut report = Self::build(&dataset.records);
        let malformed = dataset.malformed_measures.len();
        if malformed > 0 {
            let preview: Vec<String> = dataset
                .malformed_measures
                .iter()
                .take(5)
                .map(|line| line.to_string())
                .collect();
            report.malformed_measures = malformed;
            report.issues.push(QualityIssue::new(
                Severity::Warning,
                "emissions",
                format!(
                    "{} measure cells are not numbers (lines {})",
                    malformed,
                    preview.join(", ")
                ),
                "Treated as missing; fix the source values",
            ));
        }
        report
    }

    pub fn summary(&self) -> String {
        let span = self
            .year_span
            .map(|(lo, hi)| format!("{}-{}", lo, hi))
            .unwrap_or_else(|| "none".to_string());
        format!(
            "{} rows, {} entities, years {} | {} missing, {} duplicates, {} issues",
            self.rows,
            self.unique_entities,
            span,
            self.missing_measures,
            self.duplicate_rows,
            self.issues.len()
        )
    }

    pub fn has_critical_issues(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::Critical)
    }

    /// Emit the summary and every issue through tracing
    pub fn log(&self) {
        info!(fingerprint = %self.fingerprint, "{}", self.summary());
        for issue in &self.issues {
            match issue.severity {
                Severity::Info => info!(field = %issue.field, "{}", issue.issue),
                _ => warn!(field = %issue.field, "{}", issue.issue),
            }
        }
    }
}

/// Order-sensitive digest of (year, entity, measure) for every record
pub fn fingerprint(records: &[EmissionRecord]) -> String {
    let mut hasher = Sha256::new();
    for record in records {
        let measure = record
            .emissions
            .map(|v| v.to_string())
            .unwrap_or_default();
        hasher.update(format!("{}\x1f{}\x1f{}\n", record.year(), record.entity, measure));
    }
    format!("{:x}", hasher.finalize())
}

// ============================================================================
// TESTS
// ============================================================================
