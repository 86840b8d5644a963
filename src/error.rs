//! # Error Types
//!
//! Typed errors for every stage of the pipeline. Only global precondition
//! violations surface here; degenerate per-cell statistics are reported as
//! NaN inside the [`StatisticGrid`](crate::array::StatisticGrid) instead.

use thiserror::Error;

/// Errors raised by the grid aligner and the correlation mapper.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GridError {
    #[error("zoom factor for axis {axis} is not a finite positive number ({source_len} -> {target_len})")]
    InvalidZoom {
        axis: usize,
        source_len: usize,
        target_len: usize,
    },

    #[error("dimensionality mismatch: source has {source_axes} axes, target has {target_axes}")]
    DimensionMismatch {
        source_axes: usize,
        target_axes: usize,
    },

    #[error("shape mismatch: {context} expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        context: &'static str,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("arrays are not co-registered: {0}")]
    NotCoRegistered(String),

    #[error("time axis mismatch: {left} steps vs {right} steps")]
    TimeMismatch { left: usize, right: usize },

    #[error("interpolation order {0} is not supported (expected 0-5)")]
    UnsupportedOrder(usize),
}

/// Result type for grid operations
pub type GridResult<T> = Result<T, GridError>;

/// Errors raised while loading a dataset from a NetCDF file.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("NetCDF error: {0}")]
    NetCdf(#[from] netcdf::Error),

    #[error("Variable '{0}' not found")]
    VariableNotFound(String),

    #[error("Coordinate variable '{0}' not found")]
    CoordinateNotFound(String),

    #[error("Variable '{variable}' must have dimensions ({expected}), found ({found})")]
    UnexpectedLayout {
        variable: String,
        expected: String,
        found: String,
    },

    #[error("Selection on '{0}' matched no coordinates")]
    EmptySelection(String),

    #[error("Unknown dimension in bounds: {0}")]
    UnknownDimension(String),

    #[error(transparent)]
    Grid(#[from] GridError),
}

/// Result type for dataset loading
pub type SourceResult<T> = Result<T, SourceError>;

/// Errors raised while loading or validating a job configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for configuration handling
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while turning results into tables or files.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Polars error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Grid(#[from] GridError),
}

/// Result type for export operations
pub type ExportResult<T> = Result<T, ExportError>;

/// Any failure of a complete correlation job.
#[derive(Error, Debug)]
pub enum JobError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to load {role} dataset: {source}")]
    Source {
        role: &'static str,
        #[source]
        source: SourceError,
    },

    #[error(transparent)]
    Grid(#[from] GridError),

    #[error("failed to write {path}: {source}")]
    Export {
        path: String,
        #[source]
        source: ExportError,
    },
}

/// Result type for whole-job execution
pub type JobResult<T> = Result<T, JobError>;
