//! # gridcorr
//!
//! A Rust library for pairing two gridded environmental datasets cell by
//! cell and mapping their per-pixel correlation.
//!
//! ## Features
//!
//! - **Grid alignment**: B-spline resampling (order 0-5) of a coarse
//!   `(time, lat, lon)` array onto a finer reference grid, with an explicit
//!   fill → interpolate → remask policy for missing data
//! - **Correlation mapping**: Pearson and Spearman coefficients with
//!   two-sided p-values for every cell, computed in parallel
//! - **Zonal summaries**: per-region count/mean/min/max of each statistic
//! - **NetCDF input, Parquet output**: CF fill values and packing are decoded
//!   on load; results are written as long-format tables
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gridcorr::{run_job, input::JobConfig};
//!
//! let config = JobConfig::from_file("job.yaml").expect("Failed to load config");
//! let summary = run_job(&config).expect("Correlation job failed");
//! println!("{} of {} cells defined", summary.defined_cells, summary.cells);
//! ```
//!
//! ## Configuration Example
//!
//! ```json
//! {
//!   "source": { "path": "smap.nc", "variable": "soil_moisture" },
//!   "reference": { "path": "ndvi.nc", "variable": "ndvi" },
//!   "bounds": [
//!     {
//!       "kind": "range",
//!       "params": { "dimension_name": "lat", "min_value": 35.0, "max_value": 45.0 }
//!     }
//!   ],
//!   "resample": { "order": 3, "clamp": "non_negative" },
//!   "output": { "statistics": "correlation.parquet" }
//! }
//! ```

pub mod align;
pub mod array;
pub mod bounds;
pub mod cli;
pub mod correlate;
pub mod error;
pub mod export;
pub mod input;
pub mod source;
pub mod spline;
pub mod zonal;

#[cfg(test)]
mod test_utils;

use crate::align::GridAligner;
use crate::correlate::CorrelationMapper;
use crate::error::{ExportError, JobError, JobResult};
use crate::export::{array_to_dataframe, statistics_to_dataframe, write_parquet};
use crate::input::JobConfig;
use crate::source::DatasetSource;
use crate::zonal::{RegionGrid, zonal_statistics};
use log::info;
use polars::prelude::DataFrame;
use serde::Serialize;
use std::path::Path;
use std::time::Instant;

/// Pipeline stages reported while a job runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Loading,
    Aligning,
    Correlating,
    Writing,
}

impl Stage {
    pub fn describe(&self) -> &'static str {
        match self {
            Stage::Loading => "Loading datasets",
            Stage::Aligning => "Resampling source onto reference grid",
            Stage::Correlating => "Computing per-cell correlations",
            Stage::Writing => "Writing results",
        }
    }
}

/// What a finished job produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSummary {
    /// `(time, lat, lon)` shape of the aligned arrays
    pub shape: (usize, usize, usize),
    pub cells: usize,
    /// Cells with a defined Pearson coefficient
    pub defined_cells: usize,
    /// Missing `(time, cell)` samples after co-registration
    pub missing_samples: usize,
    pub regions: Option<usize>,
    pub outputs: Vec<String>,
    pub elapsed_seconds: f64,
}

fn write_output(df: &mut DataFrame, path: &str) -> JobResult<()> {
    write_parquet(df, Path::new(path)).map_err(|source| export_error(path, source))
}

fn export_error(path: &str, source: ExportError) -> JobError {
    JobError::Export {
        path: path.to_string(),
        source,
    }
}

/// Runs a correlation job end to end.
///
/// See [`run_job_with_progress`].
pub fn run_job(config: &JobConfig) -> JobResult<JobSummary> {
    run_job_with_progress(config, |_| {})
}

/// Runs a correlation job end to end, calling `on_stage` as each stage
/// starts:
///
/// 1. Validates the configuration
/// 2. Loads source and reference within the configured bounds
/// 3. Resamples the source onto the reference grid and applies the joint
///    missing mask to both
/// 4. Maps per-cell Pearson and Spearman statistics
/// 5. Writes the statistics, plus the resampled array and the zonal
///    summary when configured
///
/// # Errors
///
/// Fails on an invalid configuration, unreadable datasets, grids or time
/// axes that cannot be paired, or unwritable outputs. Degenerate cells are
/// not errors; they come out as nulls in the statistics table.
pub fn run_job_with_progress<F>(config: &JobConfig, on_stage: F) -> JobResult<JobSummary>
where
    F: Fn(Stage),
{
    let started = Instant::now();
    config.validate()?;
    let bounds = config.bounds();

    on_stage(Stage::Loading);
    let stage_start = Instant::now();
    let source = config
        .source
        .to_source()
        .fetch(&bounds)
        .map_err(|source| JobError::Source {
            role: "source",
            source,
        })?;
    let reference = config
        .reference
        .to_source()
        .fetch(&bounds)
        .map_err(|source| JobError::Source {
            role: "reference",
            source,
        })?;
    info!(
        "Loaded source '{}' {:?} and reference '{}' {:?} in {:.2?}",
        source.name(),
        source.shape(),
        reference.name(),
        reference.shape(),
        stage_start.elapsed()
    );

    on_stage(Stage::Aligning);
    let stage_start = Instant::now();
    let pair = GridAligner::new(config.resample)?.co_register(&source, &reference)?;
    info!(
        "Aligned onto {:?} grid in {:.2?} ({} missing samples)",
        pair.reference.grid().shape(),
        stage_start.elapsed(),
        pair.reference.missing_count()
    );

    on_stage(Stage::Correlating);
    let stage_start = Instant::now();
    let stats = CorrelationMapper::new().map(&pair.resampled, &pair.reference)?;
    info!("Correlation map computed in {:.2?}", stage_start.elapsed());

    on_stage(Stage::Writing);
    let stage_start = Instant::now();
    let mut outputs = Vec::new();

    let statistics_path = &config.output.statistics;
    let mut table =
        statistics_to_dataframe(&stats).map_err(|e| export_error(statistics_path, e))?;
    write_output(&mut table, statistics_path)?;
    outputs.push(statistics_path.clone());

    if let Some(path) = &config.output.resampled {
        let mut table = array_to_dataframe(&pair.resampled).map_err(|e| export_error(path, e))?;
        write_output(&mut table, path)?;
        outputs.push(path.clone());
    }

    let mut regions = None;
    if let (Some(dataset), Some(path)) = (&config.regions, &config.output.regions) {
        let (grid, labels) = dataset
            .to_source()
            .fetch_field(&bounds)
            .map_err(|source| JobError::Source {
                role: "regions",
                source,
            })?;
        let region_grid = RegionGrid::from_field(grid, &labels)?;
        let mut table =
            zonal_statistics(&stats, &region_grid).map_err(|e| export_error(path, e))?;
        regions = Some(table.height());
        write_output(&mut table, path)?;
        outputs.push(path.clone());
    }
    info!(
        "Wrote {} output file(s) in {:.2?}",
        outputs.len(),
        stage_start.elapsed()
    );

    let (n_times, n_lat, n_lon) = pair.reference.shape();
    let defined_cells = stats.pearson_r().iter().filter(|r| !r.is_nan()).count();
    Ok(JobSummary {
        shape: (n_times, n_lat, n_lon),
        cells: n_lat * n_lon,
        defined_cells,
        missing_samples: pair.reference.missing_count(),
        regions,
        outputs,
        elapsed_seconds: started.elapsed().as_secs_f64(),
    })
}
