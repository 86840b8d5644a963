//! # Pointwise Correlation Mapper
//!
//! Computes, independently for every spatial cell, the Pearson and Spearman
//! correlation (with two-sided p-values) between the time series of two
//! co-registered arrays.
//!
//! Cell computations never fail. A pair with a missing value at either side
//! is dropped; a series that ends up constant or shorter than two pairs
//! produces NaN statistics for that cell only. Only grid or time-axis
//! mismatches between the two inputs are reported as errors.
//!
//! Cells are laid out row-major over `(lat_index, lon_index)` in a buffer
//! allocated up front and filled in parallel.

use crate::array::{SpatiotemporalArray, StatisticGrid};
use crate::error::GridResult;
use log::{debug, info};
use rayon::prelude::*;
use statrs::distribution::{ContinuousCDF, StudentsT};

/// A correlation coefficient and its two-sided p-value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correlation {
    pub r: f64,
    pub p_value: f64,
}

/// All statistics computed for one cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellStatistics {
    pub pearson_r: f64,
    pub pearson_p: f64,
    pub spearman_r: f64,
    pub spearman_p: f64,
    /// Number of paired, non-missing time steps used
    pub observations: usize,
}

impl CellStatistics {
    pub fn undefined(observations: usize) -> Self {
        CellStatistics {
            pearson_r: f64::NAN,
            pearson_p: f64::NAN,
            spearman_r: f64::NAN,
            spearman_p: f64::NAN,
            observations,
        }
    }
}

/// A series with every value equal to the first carries no variance, even
/// when rounding in the mean leaves a tiny non-zero sum of squares.
fn is_constant(values: &[f64]) -> bool {
    values.iter().all(|v| *v == values[0])
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Two-sided p-value of `r` under the null of no correlation, from Student's
/// t with `n - 2` degrees of freedom.
fn two_sided_p_value(r: f64, n: usize) -> f64 {
    if n == 2 {
        return 1.0;
    }
    if r.abs() >= 1.0 {
        return 0.0;
    }
    let df = (n - 2) as f64;
    let t = r * (df / (1.0 - r * r)).sqrt();
    match StudentsT::new(0.0, 1.0, df) {
        Ok(dist) => (2.0 * dist.sf(t.abs())).min(1.0),
        Err(_) => f64::NAN,
    }
}

/// Pearson product-moment correlation.
///
/// Returns `None` when the series differ in length, hold fewer than two
/// values, or either has zero variance.
pub fn pearson(x: &[f64], y: &[f64]) -> Option<Correlation> {
    let n = x.len();
    if n != y.len() || n < 2 || is_constant(x) || is_constant(y) {
        return None;
    }
    let (mx, my) = (mean(x), mean(y));
    let (mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0);
    for (&a, &b) in x.iter().zip(y) {
        let (dx, dy) = (a - mx, b - my);
        sxx += dx * dx;
        syy += dy * dy;
        sxy += dx * dy;
    }
    if !(sxx > 0.0 && syy > 0.0) {
        return None;
    }
    let r = (sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0);
    if !r.is_finite() {
        return None;
    }
    Some(Correlation {
        r,
        p_value: two_sided_p_value(r, n),
    })
}

/// 1-based ranks, ties sharing the average of the ranks they span.
pub fn rank_average(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; n];
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        let avg_rank = (i + j + 2) as f64 / 2.0;
        for &k in &order[i..=j] {
            ranks[k] = avg_rank;
        }
        i = j + 1;
    }
    ranks
}

/// Spearman rank correlation: Pearson applied to the average ranks.
pub fn spearman(x: &[f64], y: &[f64]) -> Option<Correlation> {
    if x.len() != y.len() {
        return None;
    }
    pearson(&rank_average(x), &rank_average(y))
}

/// Statistics for one pair of series. Pairs with a non-finite value on
/// either side are excluded.
pub fn cell_statistics(x: &[f64], y: &[f64]) -> CellStatistics {
    let (xs, ys): (Vec<f64>, Vec<f64>) = x
        .iter()
        .zip(y)
        .filter(|(a, b)| a.is_finite() && b.is_finite())
        .map(|(&a, &b)| (a, b))
        .unzip();

    let mut stats = CellStatistics::undefined(xs.len());
    if let Some(c) = pearson(&xs, &ys) {
        stats.pearson_r = c.r;
        stats.pearson_p = c.p_value;
    }
    if let Some(c) = spearman(&xs, &ys) {
        stats.spearman_r = c.r;
        stats.spearman_p = c.p_value;
    }
    stats
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CorrelationMapper;

impl CorrelationMapper {
    pub fn new() -> Self {
        CorrelationMapper
    }

    /// Maps per-cell correlations between `a` and `b`.
    ///
    /// Both arrays must be co-registered and share the same time axis.
    pub fn map(
        &self,
        a: &SpatiotemporalArray,
        b: &SpatiotemporalArray,
    ) -> GridResult<StatisticGrid> {
        a.grid().ensure_coregistered(b.grid())?;
        a.ensure_same_time(b)?;

        let (n_times, n_lat, n_lon) = a.shape();
        debug!(
            "Correlating '{}' with '{}' over {} cells x {} steps",
            a.name(),
            b.name(),
            n_lat * n_lon,
            n_times
        );

        let mut cells = vec![CellStatistics::undefined(0); n_lat * n_lon];
        cells.par_iter_mut().enumerate().for_each(|(idx, cell)| {
            let (i, j) = (idx / n_lon, idx % n_lon);
            let x = a.series(i, j).to_vec();
            let y = b.series(i, j).to_vec();
            *cell = cell_statistics(&x, &y);
        });

        let defined = cells.iter().filter(|c| !c.pearson_r.is_nan()).count();
        let empty = cells.iter().filter(|c| c.observations == 0).count();
        info!(
            "Correlation map: {} of {} cells defined, {} without observations",
            defined,
            cells.len(),
            empty
        );

        StatisticGrid::from_cells(a.grid().clone(), &cells)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::{CoordinateGrid, StatisticField};
    use crate::error::GridError;
    use ndarray::Array3;

    const EPS: f64 = 1e-10;

    fn one_cell(name: &str, series: &[f64]) -> SpatiotemporalArray {
        let values = Array3::from_shape_vec((series.len(), 1, 1), series.to_vec()).unwrap();
        SpatiotemporalArray::new(
            name,
            (0..series.len()).map(|t| t as f64).collect(),
            CoordinateGrid::new(vec![45.0], vec![7.5]),
            values,
        )
        .unwrap()
    }

    #[test]
    fn test_perfect_linear_relation() {
        let a: Vec<f64> = vec![0.3, 1.7, 2.2, 5.0, 4.1, 9.9];
        let b: Vec<f64> = a.iter().map(|v| 2.0 * v + 1.0).collect();
        let stats = cell_statistics(&a, &b);
        assert!((stats.pearson_r - 1.0).abs() < EPS);
        assert!((stats.spearman_r - 1.0).abs() < EPS);
        assert!(stats.pearson_p < 1e-6);
        assert_eq!(stats.observations, 6);
    }

    #[test]
    fn test_reversed_series() {
        let grid = CorrelationMapper::new()
            .map(
                &one_cell("a", &[1.0, 2.0, 3.0, 4.0, 5.0]),
                &one_cell("b", &[5.0, 4.0, 3.0, 2.0, 1.0]),
            )
            .unwrap();
        assert!((grid.pearson_r()[[0, 0]] + 1.0).abs() < EPS);
        assert!((grid.spearman_r()[[0, 0]] + 1.0).abs() < EPS);
        assert!(grid.pearson_p()[[0, 0]] < 1e-6);
        assert!(grid.spearman_p()[[0, 0]] < 1e-6);
    }

    #[test]
    fn test_constant_series_is_undefined() {
        let stats = cell_statistics(&[3.0, 3.0, 3.0, 3.0], &[1.0, 2.0, 3.0, 4.0]);
        assert!(stats.pearson_r.is_nan());
        assert!(stats.pearson_p.is_nan());
        assert!(stats.spearman_r.is_nan());
        assert!(stats.spearman_p.is_nan());
        assert_eq!(stats.observations, 4);
    }

    #[test]
    fn test_inexact_constant_is_undefined() {
        // 0.1 has no exact binary mean, so the sum of squares is not zero
        for value in [0.1, 0.7, 1.1, 2.2, 5.9] {
            for n in [3, 6, 7] {
                let x = vec![value; n];
                let y: Vec<f64> = (0..n).map(|k| (k * k) as f64).collect();
                let stats = cell_statistics(&x, &y);
                assert!(stats.pearson_r.is_nan(), "{value} x {n}");
                assert!(stats.pearson_p.is_nan(), "{value} x {n}");
                assert!(stats.spearman_r.is_nan(), "{value} x {n}");
                assert!(pearson(&y, &x).is_none());
            }
        }
    }

    #[test]
    fn test_missing_pairs_are_dropped() {
        let x = [1.0, f64::NAN, 2.0, 3.0, 4.0];
        let y = [2.0, 100.0, 4.0, f64::NAN, 8.0];
        let stats = cell_statistics(&x, &y);
        assert_eq!(stats.observations, 3);
        assert!((stats.pearson_r - 1.0).abs() < EPS);

        let empty = cell_statistics(&[f64::NAN, f64::NAN], &[1.0, 2.0]);
        assert_eq!(empty.observations, 0);
        assert!(empty.pearson_r.is_nan());
    }

    #[test]
    fn test_two_observations() {
        let stats = cell_statistics(&[1.0, 2.0], &[3.0, 1.0]);
        assert!((stats.pearson_r + 1.0).abs() < EPS);
        assert_eq!(stats.pearson_p, 1.0);
    }

    #[test]
    fn test_known_p_value() {
        // r = 0.8 with n = 5: t = 0.8 * sqrt(3 / 0.36) = 2.3094, p ~= 0.1041
        let x = [1.0, 2.0, 3.0, 4.0, 5.0];
        let y = [1.0, 3.0, 2.0, 5.0, 4.0];
        let c = pearson(&x, &y).unwrap();
        assert!((c.r - 0.8).abs() < EPS);
        assert!((c.p_value - 0.1041).abs() < 1e-3);
    }

    #[test]
    fn test_rank_average_ties() {
        assert_eq!(rank_average(&[10.0, 20.0, 20.0, 5.0]), vec![2.0, 3.5, 3.5, 1.0]);
        assert_eq!(rank_average(&[]), Vec::<f64>::new());
    }

    #[test]
    fn test_spearman_monotonic_nonlinear() {
        let x = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let y: Vec<f64> = x.iter().map(|v: &f64| v.powi(3)).collect();
        let s = spearman(&x, &y).unwrap();
        let p = pearson(&x, &y).unwrap();
        assert!((s.r - 1.0).abs() < EPS);
        assert!(p.r < 1.0);
    }

    #[test]
    fn test_bad_cell_does_not_abort_grid() {
        let grid = CoordinateGrid::new(vec![1.0, 0.0], vec![0.0, 1.0]);
        let mut a = Array3::<f64>::zeros((4, 2, 2));
        let mut b = Array3::<f64>::zeros((4, 2, 2));
        for t in 0..4 {
            for i in 0..2 {
                for j in 0..2 {
                    a[[t, i, j]] = t as f64 + (i * 2 + j) as f64;
                    b[[t, i, j]] = 3.0 * t as f64;
                }
            }
            // Constant series in one cell, fully missing in another
            a[[t, 0, 1]] = 7.0;
            b[[t, 1, 0]] = f64::NAN;
        }
        let a = SpatiotemporalArray::new("a", vec![0.0, 1.0, 2.0, 3.0], grid.clone(), a).unwrap();
        let b = SpatiotemporalArray::new("b", vec![0.0, 1.0, 2.0, 3.0], grid, b).unwrap();

        let stats = CorrelationMapper::new().map(&a, &b).unwrap();
        assert!((stats.pearson_r()[[0, 0]] - 1.0).abs() < EPS);
        assert!((stats.pearson_r()[[1, 1]] - 1.0).abs() < EPS);
        assert!(stats.field(StatisticField::PearsonR)[[0, 1]].is_nan());
        assert!(stats.field(StatisticField::SpearmanP)[[0, 1]].is_nan());
        assert!(stats.is_missing(1, 0));
        assert!(!stats.is_missing(0, 1));
        assert_eq!(stats.grid(), a.grid());
    }

    #[test]
    fn test_mismatched_inputs_fail() {
        let a = one_cell("a", &[1.0, 2.0, 3.0]);
        let b = one_cell("b", &[1.0, 2.0]);
        assert!(matches!(
            CorrelationMapper::new().map(&a, &b),
            Err(GridError::TimeMismatch { .. })
        ));

        let shifted = SpatiotemporalArray::new(
            "c",
            vec![0.0, 1.0, 2.0],
            CoordinateGrid::new(vec![46.0], vec![7.5]),
            Array3::zeros((3, 1, 1)),
        )
        .unwrap();
        assert!(matches!(
            CorrelationMapper::new().map(&a, &shifted),
            Err(GridError::NotCoRegistered(_))
        ));
    }
}
