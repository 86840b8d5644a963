//! # Labeled Arrays
//!
//! In-memory data model shared by the aligner, the correlation mapper and the
//! exporters.
//!
//! - [`CoordinateGrid`]: the (latitude, longitude) sample locations of a field
//! - [`SpatiotemporalArray`]: a `(time, latitude, longitude)` field with NaN as
//!   the missing-value sentinel
//! - [`StatisticGrid`]: four per-cell correlation statistics on a grid
//!
//! Arrays are immutable once built; every transformation returns a new array.

use crate::correlate::CellStatistics;
use crate::error::{GridError, GridResult};
use crate::export::TimeAxis;
use ndarray::{Array2, Array3, ArrayView1, ArrayView2, Axis, Zip, s};

/// Absolute tolerance used when comparing coordinate values.
pub const COORDINATE_TOLERANCE: f64 = 1e-9;

fn coordinates_match(a: &[f64], b: &[f64]) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .zip(b)
            .all(|(x, y)| x == y || (x - y).abs() <= COORDINATE_TOLERANCE)
}

/// Latitude/longitude coordinate sequences of a spatial field.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinateGrid {
    latitude: Vec<f64>,
    longitude: Vec<f64>,
}

impl CoordinateGrid {
    pub fn new(latitude: Vec<f64>, longitude: Vec<f64>) -> Self {
        CoordinateGrid {
            latitude,
            longitude,
        }
    }

    pub fn latitude(&self) -> &[f64] {
        &self.latitude
    }

    pub fn longitude(&self) -> &[f64] {
        &self.longitude
    }

    /// `(latitude_len, longitude_len)`
    pub fn shape(&self) -> (usize, usize) {
        (self.latitude.len(), self.longitude.len())
    }

    pub fn n_cells(&self) -> usize {
        self.latitude.len() * self.longitude.len()
    }

    /// Two grids are co-registered when both coordinate sequences agree
    /// element-wise within [`COORDINATE_TOLERANCE`].
    pub fn is_coregistered(&self, other: &CoordinateGrid) -> bool {
        coordinates_match(&self.latitude, &other.latitude)
            && coordinates_match(&self.longitude, &other.longitude)
    }

    pub fn ensure_coregistered(&self, other: &CoordinateGrid) -> GridResult<()> {
        if self.is_coregistered(other) {
            Ok(())
        } else {
            Err(GridError::NotCoRegistered(format!(
                "grid {:?} differs from grid {:?}",
                self.shape(),
                other.shape()
            )))
        }
    }
}

/// A `(time, latitude, longitude)` field. Missing values are NaN.
#[derive(Debug, Clone)]
pub struct SpatiotemporalArray {
    name: String,
    time: Vec<f64>,
    time_units: Option<String>,
    grid: CoordinateGrid,
    values: Array3<f64>,
}

impl SpatiotemporalArray {
    /// Builds an array, checking that `values` is shaped
    /// `(time.len(), latitude.len(), longitude.len())`.
    pub fn new(
        name: &str,
        time: Vec<f64>,
        grid: CoordinateGrid,
        values: Array3<f64>,
    ) -> GridResult<Self> {
        let (n_lat, n_lon) = grid.shape();
        let expected = vec![time.len(), n_lat, n_lon];
        if values.shape() != expected.as_slice() {
            return Err(GridError::ShapeMismatch {
                context: "spatiotemporal values",
                expected,
                found: values.shape().to_vec(),
            });
        }
        Ok(SpatiotemporalArray {
            name: name.to_string(),
            time,
            time_units: None,
            grid,
            values,
        })
    }

    /// Attaches CF-style time units (e.g. `"days since 2015-03-31"`).
    pub fn with_time_units(mut self, units: Option<String>) -> Self {
        self.time_units = units;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn time(&self) -> &[f64] {
        &self.time
    }

    pub fn time_units(&self) -> Option<&str> {
        self.time_units.as_deref()
    }

    pub fn grid(&self) -> &CoordinateGrid {
        &self.grid
    }

    pub fn values(&self) -> &Array3<f64> {
        &self.values
    }

    pub fn n_times(&self) -> usize {
        self.time.len()
    }

    /// `(time, latitude, longitude)` lengths
    pub fn shape(&self) -> (usize, usize, usize) {
        let (n_lat, n_lon) = self.grid.shape();
        (self.time.len(), n_lat, n_lon)
    }

    /// The spatial slice at time index `t`.
    pub fn slice(&self, t: usize) -> ArrayView2<'_, f64> {
        self.values.index_axis(Axis(0), t)
    }

    /// The time series at one cell.
    pub fn series(&self, lat: usize, lon: usize) -> ArrayView1<'_, f64> {
        self.values.slice(s![.., lat, lon])
    }

    /// `true` where the value is missing (NaN or infinite).
    pub fn missing_mask(&self) -> Array3<bool> {
        self.values.mapv(|v| !v.is_finite())
    }

    pub fn missing_count(&self) -> usize {
        self.values.iter().filter(|v| !v.is_finite()).count()
    }

    /// Copy of this array with every cell flagged in `mask` set missing.
    pub fn masked(&self, mask: &Array3<bool>) -> GridResult<Self> {
        if mask.shape() != self.values.shape() {
            return Err(GridError::ShapeMismatch {
                context: "missing mask",
                expected: self.values.shape().to_vec(),
                found: mask.shape().to_vec(),
            });
        }
        let mut values = self.values.clone();
        Zip::from(&mut values).and(mask).par_for_each(|v, &missing| {
            if missing {
                *v = f64::NAN;
            }
        });
        Ok(SpatiotemporalArray {
            values,
            ..self.clone()
        })
    }

    /// Checks that both arrays have the same time steps.
    ///
    /// When both time axes carry CF units the decoded instants are compared,
    /// so `days since` and `hours since` the same epoch can pair up. Without
    /// decodable units on either side the raw values must match. An axis with
    /// decodable units never matches one without.
    pub fn ensure_same_time(&self, other: &SpatiotemporalArray) -> GridResult<()> {
        if self.time.len() != other.time.len() {
            return Err(GridError::TimeMismatch {
                left: self.time.len(),
                right: other.time.len(),
            });
        }
        let axes = (
            self.time_units().and_then(TimeAxis::parse),
            other.time_units().and_then(TimeAxis::parse),
        );
        let matched = match axes {
            (Some(left), Some(right)) => self.time.iter().zip(&other.time).all(|(&l, &r)| {
                matches!((left.decode(l), right.decode(r)), (Some(l), Some(r)) if l == r)
            }),
            (None, None) => coordinates_match(&self.time, &other.time),
            _ => {
                return Err(GridError::NotCoRegistered(format!(
                    "time units {:?} and {:?} are not comparable",
                    self.time_units(),
                    other.time_units()
                )));
            }
        };
        if !matched {
            return Err(GridError::NotCoRegistered(
                "time coordinates differ".to_string(),
            ));
        }
        Ok(())
    }
}

/// The four statistics stored per cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatisticField {
    PearsonR,
    PearsonP,
    SpearmanR,
    SpearmanP,
}

impl StatisticField {
    pub const ALL: [StatisticField; 4] = [
        StatisticField::PearsonR,
        StatisticField::PearsonP,
        StatisticField::SpearmanR,
        StatisticField::SpearmanP,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            StatisticField::PearsonR => "pearson_r",
            StatisticField::PearsonP => "pearson_p",
            StatisticField::SpearmanR => "spearman_r",
            StatisticField::SpearmanP => "spearman_p",
        }
    }
}

/// Per-cell Pearson and Spearman statistics on a coordinate grid.
///
/// Cells whose statistics could not be computed hold NaN. `observations`
/// counts the paired, non-missing time steps that went into each cell; a
/// zero there marks a cell that is missing in the inputs.
#[derive(Debug, Clone)]
pub struct StatisticGrid {
    grid: CoordinateGrid,
    pearson_r: Array2<f64>,
    pearson_p: Array2<f64>,
    spearman_r: Array2<f64>,
    spearman_p: Array2<f64>,
    observations: Array2<usize>,
}

impl StatisticGrid {
    /// Assembles a grid from cell results laid out row-major over
    /// `(lat_index, lon_index)`.
    pub fn from_cells(grid: CoordinateGrid, cells: &[CellStatistics]) -> GridResult<Self> {
        let shape = grid.shape();
        if cells.len() != grid.n_cells() {
            return Err(GridError::ShapeMismatch {
                context: "statistic cells",
                expected: vec![shape.0, shape.1],
                found: vec![cells.len()],
            });
        }
        let field = |get: fn(&CellStatistics) -> f64| {
            Array2::from_shape_fn(shape, |(i, j)| get(&cells[i * shape.1 + j]))
        };
        Ok(StatisticGrid {
            pearson_r: field(|c| c.pearson_r),
            pearson_p: field(|c| c.pearson_p),
            spearman_r: field(|c| c.spearman_r),
            spearman_p: field(|c| c.spearman_p),
            observations: Array2::from_shape_fn(shape, |(i, j)| {
                cells[i * shape.1 + j].observations
            }),
            grid,
        })
    }

    pub fn grid(&self) -> &CoordinateGrid {
        &self.grid
    }

    pub fn field(&self, field: StatisticField) -> &Array2<f64> {
        match field {
            StatisticField::PearsonR => &self.pearson_r,
            StatisticField::PearsonP => &self.pearson_p,
            StatisticField::SpearmanR => &self.spearman_r,
            StatisticField::SpearmanP => &self.spearman_p,
        }
    }

    pub fn pearson_r(&self) -> &Array2<f64> {
        &self.pearson_r
    }

    pub fn pearson_p(&self) -> &Array2<f64> {
        &self.pearson_p
    }

    pub fn spearman_r(&self) -> &Array2<f64> {
        &self.spearman_r
    }

    pub fn spearman_p(&self) -> &Array2<f64> {
        &self.spearman_p
    }

    pub fn observations(&self) -> &Array2<usize> {
        &self.observations
    }

    pub fn is_missing(&self, lat: usize, lon: usize) -> bool {
        self.observations[[lat, lon]] == 0
    }
}
