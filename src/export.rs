//! # Tabular Export
//!
//! Flattens grids into long-format polars DataFrames and writes them as
//! Parquet.
//!
//! - [`statistics_to_dataframe`]: one row per cell with its coordinates, the
//!   four statistics and the number of observations
//! - [`array_to_dataframe`]: one row per `(time, lat, lon)` sample
//!
//! Undefined values (NaN) are written as nulls. When the time axis carries
//! CF-style units (`"days since 2015-04-01"`), a `timestamp` column with the
//! decoded ISO 8601 time is added next to the raw `time` value.

use crate::array::{SpatiotemporalArray, StatisticField, StatisticGrid};
use crate::error::ExportResult;
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use log::debug;
use polars::prelude::*;
use std::fs::File;
use std::path::Path;

/// A decoded CF time axis: `<unit> since <reference>`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeAxis {
    unit_seconds: f64,
    epoch: NaiveDateTime,
}

const DATETIME_FORMATS: [&str; 5] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
];

fn parse_reference(text: &str) -> Option<NaiveDateTime> {
    let text = text
        .trim()
        .trim_end_matches(" UTC")
        .trim_end_matches('Z')
        .trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

impl TimeAxis {
    /// Parses units such as `"hours since 2000-01-01 00:00:00"`. Returns
    /// `None` for anything that is not a recognizable CF time unit.
    pub fn parse(units: &str) -> Option<Self> {
        let (unit, reference) = units.split_once(" since ")?;
        let unit_seconds = match unit.trim().to_lowercase().as_str() {
            "seconds" | "second" | "secs" | "sec" | "s" => 1.0,
            "minutes" | "minute" | "mins" | "min" => 60.0,
            "hours" | "hour" | "hrs" | "hr" | "h" => 3600.0,
            "days" | "day" | "d" => 86400.0,
            _ => return None,
        };
        Some(TimeAxis {
            unit_seconds,
            epoch: parse_reference(reference)?,
        })
    }

    pub fn epoch(&self) -> NaiveDateTime {
        self.epoch
    }

    /// Timestamp of a raw time value, to millisecond precision.
    pub fn decode(&self, value: f64) -> Option<NaiveDateTime> {
        if !value.is_finite() {
            return None;
        }
        let millis = (value * self.unit_seconds * 1000.0).round();
        if millis.abs() > i64::MAX as f64 {
            return None;
        }
        self.epoch
            .checked_add_signed(TimeDelta::try_milliseconds(millis as i64)?)
    }
}

fn nan_to_null(v: f64) -> Option<f64> {
    if v.is_nan() { None } else { Some(v) }
}

/// Decoded ISO 8601 timestamps, or `None` when the units are unknown.
pub fn decode_time(units: Option<&str>, values: &[f64]) -> Option<Vec<Option<String>>> {
    let axis = TimeAxis::parse(units?)?;
    Some(
        values
            .iter()
            .map(|&v| {
                axis.decode(v)
                    .map(|t| t.format("%Y-%m-%dT%H:%M:%S").to_string())
            })
            .collect(),
    )
}

/// Per-cell statistics as a long table.
///
/// Columns: `lat`, `lon`, `pearson_r`, `pearson_p`, `spearman_r`,
/// `spearman_p`, `observations`. Rows are ordered by latitude index, then
/// longitude index.
pub fn statistics_to_dataframe(stats: &StatisticGrid) -> ExportResult<DataFrame> {
    let grid = stats.grid();
    let (n_lat, n_lon) = grid.shape();
    let n_cells = grid.n_cells();

    let mut lat = Vec::with_capacity(n_cells);
    let mut lon = Vec::with_capacity(n_cells);
    for i in 0..n_lat {
        for j in 0..n_lon {
            lat.push(grid.latitude()[i]);
            lon.push(grid.longitude()[j]);
        }
    }

    let mut columns: Vec<Column> = vec![
        Series::new("lat".into(), lat).into(),
        Series::new("lon".into(), lon).into(),
    ];
    for field in StatisticField::ALL {
        let values: Vec<Option<f64>> = stats.field(field).iter().map(|&v| nan_to_null(v)).collect();
        columns.push(Series::new(field.name().into(), values).into());
    }
    let observations: Vec<u64> = stats.observations().iter().map(|&n| n as u64).collect();
    columns.push(Series::new("observations".into(), observations).into());

    Ok(DataFrame::new(columns)?)
}

/// A spatiotemporal array as a long table.
///
/// Columns: `time`, optionally `timestamp`, `lat`, `lon` and one value column
/// named after the variable. Rows are ordered by time, latitude, longitude.
pub fn array_to_dataframe(array: &SpatiotemporalArray) -> ExportResult<DataFrame> {
    let (n_times, n_lat, n_lon) = array.shape();
    let n_rows = n_times * n_lat * n_lon;
    let grid = array.grid();
    let timestamps = decode_time(array.time_units(), array.time());
    if timestamps.is_none() && array.time_units().is_some() {
        debug!(
            "Time units {:?} of '{}' not decodable, exporting raw values only",
            array.time_units(),
            array.name()
        );
    }

    let mut time = Vec::with_capacity(n_rows);
    let mut stamp = Vec::with_capacity(if timestamps.is_some() { n_rows } else { 0 });
    let mut lat = Vec::with_capacity(n_rows);
    let mut lon = Vec::with_capacity(n_rows);
    for t in 0..n_times {
        for i in 0..n_lat {
            for j in 0..n_lon {
                time.push(array.time()[t]);
                if let Some(decoded) = &timestamps {
                    stamp.push(decoded[t].clone());
                }
                lat.push(grid.latitude()[i]);
                lon.push(grid.longitude()[j]);
            }
        }
    }
    let values: Vec<Option<f64>> = array.values().iter().map(|&v| nan_to_null(v)).collect();

    let mut columns: Vec<Column> = vec![Series::new("time".into(), time).into()];
    if timestamps.is_some() {
        columns.push(Series::new("timestamp".into(), stamp).into());
    }
    columns.push(Series::new("lat".into(), lat).into());
    columns.push(Series::new("lon".into(), lon).into());
    columns.push(Series::new(array.name().into(), values).into());

    Ok(DataFrame::new(columns)?)
}

/// Writes `df` to a Parquet file at `output_path`.
pub fn write_parquet(df: &mut DataFrame, output_path: &Path) -> ExportResult<()> {
    debug!("Writing DataFrame to parquet file: {}", output_path.display());
    debug!("DataFrame shape: {:?}", df.shape());
    debug!("DataFrame schema:\n{:?}", df.schema());

    let file = File::create(output_path)?;
    ParquetWriter::new(file).finish(df)?;

    debug!("Successfully wrote parquet file: {}", output_path.display());
    Ok(())
}
