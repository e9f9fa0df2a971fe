// 📂 Data Loader - CSV → EmissionRecord
// Header is checked against the schema before any row is parsed

use chrono::{Datelike, NaiveDate};
use csv::{ReaderBuilder, StringRecord};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::DatasetSchema;
use crate::error::{PipelineError, Result};

// ============================================================================
// CORE TYPES
// ============================================================================

/// One row of the dataset: who emitted how much in which year
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmissionRecord {
    /// January 1st of the reported year
    pub period: NaiveDate,
    pub entity: String,
    /// MtCO2e; `None` when the cell is empty or not a number
    pub emissions: Option<f64>,
    /// 1-based line in the source file (header is line 1)
    pub line_number: usize,
}

impl EmissionRecord {
    /// `None` when `year` has no January 1st in the calendar range
    pub fn from_year(year: i32, entity: &str, emissions: Option<f64>) -> Option<Self> {
        Some(EmissionRecord {
            period: year_start(year)?,
            entity: entity.to_string(),
            emissions,
            line_number: 0,
        })
    }

    #[cfg(test)]
    pub(crate) fn new(year: i32, entity: &str, emissions: Option<f64>) -> Self {
        Self::from_year(year, entity, emissions).unwrap()
    }

    pub fn year(&self) -> i32 {
        self.period.year()
    }
}

/// Everything read from one file
#[derive(Debug, Clone)]
pub struct Dataset {
    pub source: PathBuf,
    pub records: Vec<EmissionRecord>,
    /// Lines whose measure cell held something other than a number
    pub malformed_measures: Vec<usize>,
}

impl Dataset {
    pub fn from_records(records: Vec<EmissionRecord>) -> Self {
        Dataset {
            source: PathBuf::from("<memory>"),
            records,
            malformed_measures: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// ============================================================================
// LOADING
// ============================================================================

/// Open `path` and load every record described by `schema`
pub fn load_dataset(path: &Path, schema: &DatasetSchema) -> Result<Dataset> {
    let file = File::open(path).map_err(|source| PipelineError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let dataset = read_dataset(file, path, schema)?;

    info!(
        path = %path.display(),
        records = dataset.len(),
        malformed = dataset.malformed_measures.len(),
        "loaded dataset"
    );

    Ok(dataset)
}

/// Parse records from any reader; `source` is only used in diagnostics
pub fn read_dataset<R: Read>(reader: R, source: &Path, schema: &DatasetSchema) -> Result<Dataset> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader
        .headers()
        .map_err(|e| csv_error(source, e))?
        .clone();
    let columns = ColumnIndex::resolve(&headers, schema, source)?;

    let mut records = Vec::new();
    let mut malformed_measures = Vec::new();

    for (idx, result) in reader.records().enumerate() {
        let line_number = idx + 2;
        let row = result.map_err(|e| csv_error(source, e))?;

        let raw_year = row.get(columns.year).unwrap_or("");
        let period = parse_year(raw_year).ok_or_else(|| {
            PipelineError::data_shape(
                source,
                format!(
                    "line {}: '{}' value '{}' is not a four-digit year",
                    line_number, schema.year_column, raw_year
                ),
            )
        })?;

        let entity = row.get(columns.entity).unwrap_or("").to_string();

        let raw_measure = row.get(columns.measure).unwrap_or("");
        let emissions = if raw_measure.is_empty() {
            None
        } else {
            match raw_measure.parse::<f64>() {
                Ok(v) if v.is_finite() => Some(v),
                _ => {
                    debug!(line = line_number, value = raw_measure, "unparseable measure");
                    malformed_measures.push(line_number);
                    None
                }
            }
        };

        records.push(EmissionRecord {
            period,
            entity,
            emissions,
            line_number,
        });
    }

    Ok(Dataset {
        source: source.to_path_buf(),
        records,
        malformed_measures,
    })
}

/// "1987" → 1987-01-01. Anything outside 1000..=9999 is rejected.
pub fn parse_year(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.len() != 4 || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let year: i32 = trimmed.parse().ok()?;
    if year < 1000 {
        return None;
    }
    year_start(year)
}

pub fn year_start(year: i32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, 1, 1)
}

// ============================================================================
// HEADER RESOLUTION
// ============================================================================

struct ColumnIndex {
    year: usize,
    entity: usize,
    measure: usize,
}

impl ColumnIndex {
    fn resolve(headers: &StringRecord, schema: &DatasetSchema, source: &Path) -> Result<Self> {
        let find = |name: &str| headers.iter().position(|h| h == name);

        let year = find(&schema.year_column);
        let entity = find(&schema.entity_column);
        let measure = find(&schema.measure_column);

        match (year, entity, measure) {
            (Some(year), Some(entity), Some(measure)) => Ok(ColumnIndex {
                year,
                entity,
                measure,
            }),
            _ => {
                let missing: Vec<&str> = [
                    (year, schema.year_column.as_str()),
                    (entity, schema.entity_column.as_str()),
                    (measure, schema.measure_column.as_str()),
                ]
                .iter()
                .filter(|(idx, _)| idx.is_none())
                .map(|(_, name)| *name)
                .collect();

                Err(PipelineError::data_shape(
                    source,
                    format!("missing column(s): {}", missing.join(", ")),
                ))
            }
        }
    }
}

fn csv_error(source: &Path, err: csv::Error) -> PipelineError {
    PipelineError::Csv {
        path: source.to_path_buf(),
        source: err,
    }
}

// ============================================================================
// TESTS
// ============================================================================
