//! # Zonal Statistics
//!
//! Summarizes a [`StatisticGrid`] by region. Regions come in as an integer
//! label grid co-registered with the statistics, rasterized beforehand by
//! whatever produced the boundaries. Negative or NaN labels mark cells that
//! belong to no region.
//!
//! The summary is a polars DataFrame with one row per region, sorted by
//! label:
//!
//! | column            | meaning                                    |
//! |-------------------|--------------------------------------------|
//! | `region`          | region label                               |
//! | `cells`           | grid cells carrying the label              |
//! | `<stat>_count`    | cells where the statistic is defined       |
//! | `<stat>_mean`     | mean over defined cells                    |
//! | `<stat>_min/_max` | extremes over defined cells                |
//!
//! where `<stat>` is each of `pearson_r`, `pearson_p`, `spearman_r` and
//! `spearman_p`. Undefined (NaN) statistics are treated as nulls, so a region
//! with no defined cells gets a zero count and null aggregates.

use crate::array::{CoordinateGrid, StatisticField, StatisticGrid};
use crate::error::{ExportResult, GridError, GridResult};
use log::debug;
use ndarray::Array2;
use polars::prelude::*;

/// Integer region labels on a coordinate grid.
#[derive(Debug, Clone)]
pub struct RegionGrid {
    grid: CoordinateGrid,
    labels: Array2<Option<i64>>,
}

impl RegionGrid {
    /// Builds a label grid from a floating-point field as read from a
    /// dataset. Finite non-negative values are rounded to the nearest label.
    pub fn from_field(grid: CoordinateGrid, field: &Array2<f64>) -> GridResult<Self> {
        let (n_lat, n_lon) = grid.shape();
        if field.dim() != (n_lat, n_lon) {
            return Err(GridError::ShapeMismatch {
                context: "region labels",
                expected: vec![n_lat, n_lon],
                found: field.shape().to_vec(),
            });
        }
        let labels = field.mapv(|v| {
            if v.is_finite() && v >= 0.0 {
                Some(v.round() as i64)
            } else {
                None
            }
        });
        Ok(RegionGrid { grid, labels })
    }

    pub fn grid(&self) -> &CoordinateGrid {
        &self.grid
    }

    pub fn label(&self, lat: usize, lon: usize) -> Option<i64> {
        self.labels[[lat, lon]]
    }

    /// Number of cells assigned to some region
    pub fn labeled_cells(&self) -> usize {
        self.labels.iter().filter(|l| l.is_some()).count()
    }
}

fn nan_to_null(v: f64) -> Option<f64> {
    if v.is_nan() { None } else { Some(v) }
}

/// Long table of labeled cells: `region` plus one column per statistic.
fn labeled_cells(stats: &StatisticGrid, regions: &RegionGrid) -> PolarsResult<DataFrame> {
    let mut region = Vec::with_capacity(regions.labeled_cells());
    let mut values: Vec<Vec<Option<f64>>> = vec![Vec::new(); StatisticField::ALL.len()];

    for ((i, j), label) in regions.labels.indexed_iter() {
        let Some(label) = label else { continue };
        region.push(*label);
        for (column, field) in values.iter_mut().zip(StatisticField::ALL) {
            column.push(nan_to_null(stats.field(field)[[i, j]]));
        }
    }

    let mut columns: Vec<Column> = vec![Series::new("region".into(), region).into()];
    for (column, field) in values.into_iter().zip(StatisticField::ALL) {
        columns.push(Series::new(field.name().into(), column).into());
    }
    DataFrame::new(columns)
}

/// Per-region count, mean, min and max of every statistic.
pub fn zonal_statistics(stats: &StatisticGrid, regions: &RegionGrid) -> ExportResult<DataFrame> {
    stats.grid().ensure_coregistered(regions.grid())?;

    let cells = labeled_cells(stats, regions)?;
    debug!(
        "Aggregating {} labeled cells of {} by region",
        cells.height(),
        stats.grid().n_cells()
    );

    let mut agg_exprs = vec![len().cast(DataType::UInt64).alias("cells")];
    for field in StatisticField::ALL {
        let name = field.name();
        agg_exprs.push(
            col(name)
                .count()
                .cast(DataType::UInt64)
                .alias(format!("{name}_count")),
        );
        agg_exprs.push(col(name).mean().alias(format!("{name}_mean")));
        agg_exprs.push(col(name).min().alias(format!("{name}_min")));
        agg_exprs.push(col(name).max().alias(format!("{name}_max")));
    }

    let summary = cells
        .lazy()
        .group_by([col("region")])
        .agg(agg_exprs)
        .sort(["region"], SortMultipleOptions::default())
        .collect()?;

    debug!("Zonal summary: {} regions", summary.height());
    Ok(summary)
}
