// ⚠️ Error Taxonomy
// Dataset-scoped failures abort the run; category-scoped ones are collected as diagnostics

use std::path::PathBuf;
use thiserror::Error;

use crate::forecast::ForecastError;

// ============================================================================
// FATAL ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Expected column missing or a year that does not parse
    #[error("data shape error in {path}: {detail}")]
    DataShape { path: PathBuf, detail: String },

    #[error("failed to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed delimited input in {path}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to render chart to {path}: {reason}")]
    Render { path: PathBuf, reason: String },
}

impl PipelineError {
    pub fn data_shape(path: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
        PipelineError::DataShape {
            path: path.into(),
            detail: detail.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

// ============================================================================
// CATEGORY-SCOPED DIAGNOSTICS
// ============================================================================

/// Non-fatal problems tied to one bin. Processing of every other bin continues.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CategoryDiagnostic {
    #[error("bin '{label}' has zero width ({edge}); it receives no records")]
    DegenerateBin { label: String, edge: f64 },

    #[error("series '{label}' is constant ({value}); applied {policy} fallback")]
    NormalizationDegenerate {
        label: String,
        value: f64,
        policy: String,
    },

    #[error("forecast for '{label}' skipped: {source}")]
    ModelConvergence {
        label: String,
        #[source]
        source: ForecastError,
    },
}

impl CategoryDiagnostic {
    pub fn label(&self) -> &str {
        match self {
            CategoryDiagnostic::DegenerateBin { label, .. } => label,
            CategoryDiagnostic::NormalizationDegenerate { label, .. } => label,
            CategoryDiagnostic::ModelConvergence { label, .. } => label,
        }
    }
}
