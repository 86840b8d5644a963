//! # B-spline Zoom
//!
//! Separable B-spline resampling of regular arrays, orders 0 through 5.
//!
//! Sample `i` of an output axis of length `n_out` is taken at input position
//! `i * (n_in - 1) / (n_out - 1)`, so the first and last samples of both axes
//! coincide. Splines of order 2 and above are prefiltered into interpolating
//! coefficients under mirror-symmetric boundary conditions; orders 0 and 1
//! work directly on the samples. Order 0 picks `floor(x + 0.5)`.
//!
//! Because the tensor-product spline factorizes, zooming one axis at a time
//! gives the same result as evaluating the full N-d spline.

use crate::error::{GridError, GridResult};
use ndarray::{Array2, ArrayD, ArrayView2, ArrayViewD, Axis, IxDyn};

/// Highest supported spline order.
pub const MAX_ORDER: usize = 5;

/// Poles of the recursive prefilter for each spline order.
fn filter_poles(order: usize) -> &'static [f64] {
    match order {
        2 => &[-0.171_572_875_253_809_7],
        3 => &[-0.267_949_192_431_122_8],
        4 => &[-0.361_341_225_900_211_8, -0.013_725_429_297_341_663],
        5 => &[-0.430_575_347_099_978_25, -0.043_096_288_203_263_28],
        _ => &[],
    }
}

pub fn check_order(order: usize) -> GridResult<()> {
    if order > MAX_ORDER {
        return Err(GridError::UnsupportedOrder(order));
    }
    Ok(())
}

/// Ratio `target_len / source_len`; must be finite and strictly positive.
pub fn zoom_factor(axis: usize, source_len: usize, target_len: usize) -> GridResult<f64> {
    let factor = target_len as f64 / source_len as f64;
    if !factor.is_finite() || factor <= 0.0 {
        return Err(GridError::InvalidZoom {
            axis,
            source_len,
            target_len,
        });
    }
    Ok(factor)
}

/// Per-axis zoom factors for a 2-D resample.
pub fn zoom_factors(source: (usize, usize), target: (usize, usize)) -> GridResult<(f64, f64)> {
    Ok((
        zoom_factor(0, source.0, target.0)?,
        zoom_factor(1, source.1, target.1)?,
    ))
}

/// Folds an out-of-range index back into `0..len` by whole-sample mirroring.
fn mirror_index(k: i64, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let period = 2 * (len as i64 - 1);
    let k = k.rem_euclid(period);
    if k >= len as i64 {
        (period - k) as usize
    } else {
        k as usize
    }
}

fn causal_initial(line: &[f64], z: f64) -> f64 {
    let n = line.len();
    let iz = 1.0 / z;
    let mut zn = z;
    let mut z2n = z.powi(n as i32 - 1);
    let mut sum = line[0] + z2n * line[n - 1];
    z2n *= z2n * iz;
    for &c in &line[1..n - 1] {
        sum += (zn + z2n) * c;
        zn *= z;
        z2n *= iz;
    }
    sum / (1.0 - zn * zn)
}

fn anticausal_initial(line: &[f64], z: f64) -> f64 {
    let n = line.len();
    (z / (z * z - 1.0)) * (z * line[n - 2] + line[n - 1])
}

/// Converts samples into B-spline coefficients in place.
fn prefilter(line: &mut [f64], order: usize) {
    let n = line.len();
    let poles = filter_poles(order);
    if n < 2 || poles.is_empty() {
        return;
    }

    let gain: f64 = poles.iter().map(|&z| (1.0 - z) * (1.0 - 1.0 / z)).product();
    line.iter_mut().for_each(|c| *c *= gain);

    for &z in poles {
        line[0] = causal_initial(line, z);
        for k in 1..n {
            line[k] += z * line[k - 1];
        }
        line[n - 1] = anticausal_initial(line, z);
        for k in (0..n - 1).rev() {
            line[k] = z * (line[k + 1] - line[k]);
        }
    }
}

fn binomial(n: usize, k: usize) -> f64 {
    (0..k).fold(1.0, |acc, i| acc * (n - i) as f64 / (i + 1) as f64)
}

/// Centered B-spline basis of degree `order` (>= 1) evaluated at `t`.
fn bspline_basis(order: usize, t: f64) -> f64 {
    let half = (order + 1) as f64 / 2.0;
    if t.abs() >= half {
        return 0.0;
    }
    let factorial: f64 = (1..=order).map(|k| k as f64).product();
    let mut sum = 0.0;
    for j in 0..=order + 1 {
        let u = t + half - j as f64;
        if u > 0.0 {
            let sign = if j % 2 == 0 { 1.0 } else { -1.0 };
            sum += sign * binomial(order + 1, j) * u.powi(order as i32);
        }
    }
    sum / factorial
}

/// Evaluates the spline defined by `coeffs` at fractional position `x`.
fn evaluate(coeffs: &[f64], x: f64, order: usize) -> f64 {
    let n = coeffs.len();
    if order == 0 {
        return coeffs[mirror_index((x + 0.5).floor() as i64, n)];
    }
    let start = if order % 2 == 1 {
        x.floor() as i64 - (order / 2) as i64
    } else {
        (x + 0.5).floor() as i64 - (order / 2) as i64
    };
    (0..=order as i64)
        .map(|j| {
            let k = start + j;
            bspline_basis(order, x - k as f64) * coeffs[mirror_index(k, n)]
        })
        .sum()
}

/// Resamples one line of samples to `out_len` points.
pub fn zoom_line(samples: &[f64], out_len: usize, order: usize) -> Vec<f64> {
    let mut coeffs = samples.to_vec();
    prefilter(&mut coeffs, order);
    let step = if out_len > 1 {
        (samples.len() - 1) as f64 / (out_len - 1) as f64
    } else {
        0.0
    };
    (0..out_len)
        .map(|i| evaluate(&coeffs, i as f64 * step, order))
        .collect()
}

/// Zooms an N-d array to `target_shape` with a B-spline of `order`.
///
/// Fails when the axis counts differ, when any zoom factor is not finite
/// and positive, or when `order` exceeds [`MAX_ORDER`].
pub fn zoom(input: ArrayViewD<'_, f64>, target_shape: &[usize], order: usize) -> GridResult<ArrayD<f64>> {
    check_order(order)?;
    if input.ndim() != target_shape.len() {
        return Err(GridError::DimensionMismatch {
            source_axes: input.ndim(),
            target_axes: target_shape.len(),
        });
    }
    for (axis, (&n_in, &n_out)) in input.shape().iter().zip(target_shape).enumerate() {
        zoom_factor(axis, n_in, n_out)?;
    }

    let mut current = input.to_owned();
    for (axis, &n_out) in target_shape.iter().enumerate() {
        // Sample positions are exactly the input indices
        if current.len_of(Axis(axis)) == n_out {
            continue;
        }
        let mut shape = current.shape().to_vec();
        shape[axis] = n_out;
        let mut next = ArrayD::<f64>::zeros(IxDyn(&shape));
        for (src, mut dst) in current
            .lanes(Axis(axis))
            .into_iter()
            .zip(next.lanes_mut(Axis(axis)))
        {
            let line = zoom_line(&src.to_vec(), n_out, order);
            dst.iter_mut().zip(line).for_each(|(d, v)| *d = v);
        }
        current = next;
    }
    Ok(current)
}

/// 2-D convenience wrapper around [`zoom`].
pub fn zoom_2d(input: ArrayView2<'_, f64>, target: (usize, usize), order: usize) -> GridResult<Array2<f64>> {
    let out = zoom(input.into_dyn(), &[target.0, target.1], order)?;
    out.into_dimensionality()
        .map_err(|_| GridError::DimensionMismatch {
            source_axes: 2,
            target_axes: 2,
        })
}

/// Nearest-neighbour zoom of a boolean mask.
pub fn zoom_mask(mask: ArrayView2<'_, bool>, target: (usize, usize)) -> GridResult<Array2<bool>> {
    let as_float = mask.mapv(|m| if m { 1.0 } else { 0.0 });
    Ok(zoom_2d(as_float.view(), target, 0)?.mapv(|v| v > 0.5))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_basis_partition_of_unity() {
        for order in 1..=MAX_ORDER {
            for &x in &[0.0f64, 0.25, 0.5, 0.9] {
                let start = x.floor() as i64 - order as i64;
                let total: f64 = (start..start + 2 * order as i64 + 2)
                    .map(|k| bspline_basis(order, x - k as f64))
                    .sum();
                assert!((total - 1.0).abs() < 1e-10, "order {order} at {x}: {total}");
            }
        }
    }

    #[test]
    fn test_cubic_basis_knots() {
        assert!((bspline_basis(3, 0.0) - 2.0 / 3.0).abs() < 1e-12);
        assert!((bspline_basis(3, 1.0) - 1.0 / 6.0).abs() < 1e-12);
        assert_eq!(bspline_basis(3, 2.0), 0.0);
    }

    #[test]
    fn test_mirror_index() {
        assert_eq!(mirror_index(-1, 4), 1);
        assert_eq!(mirror_index(4, 4), 2);
        assert_eq!(mirror_index(6, 4), 0);
        assert_eq!(mirror_index(3, 1), 0);
    }

    #[test]
    fn test_linear_zoom_line() {
        let out = zoom_line(&[0.0, 3.0], 4, 1);
        let expected = [0.0, 1.0, 2.0, 3.0];
        for (a, b) in out.iter().zip(expected) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn test_nearest_zoom_line() {
        assert_eq!(zoom_line(&[5.0, 7.0], 4, 0), vec![5.0, 5.0, 7.0, 7.0]);
        assert_eq!(zoom_line(&[1.0, 2.0, 3.0], 1, 0), vec![1.0]);
    }

    #[test]
    fn test_spline_interpolates_samples() {
        // Prefiltered splines pass through the original samples
        let samples = [1.0, 4.0, -2.0, 0.5, 3.0, 3.0, 8.0];
        for order in 2..=MAX_ORDER {
            let mut coeffs = samples.to_vec();
            prefilter(&mut coeffs, order);
            for (k, &s) in samples.iter().enumerate() {
                let v = evaluate(&coeffs, k as f64, order);
                assert!((v - s).abs() < 1e-9, "order {order} sample {k}: {v} vs {s}");
            }
        }
    }

    #[test]
    fn test_cubic_zoom_keeps_original_samples() {
        let samples: Vec<f64> = (0..6).map(|k| 2.0 * k as f64 + 1.0).collect();
        let out = zoom_line(&samples, 11, 3);
        assert_eq!(out.len(), 11);
        for (k, s) in samples.iter().enumerate() {
            assert!((out[2 * k] - s).abs() < 1e-9, "{k}: {} vs {s}", out[2 * k]);
        }
        // Interior midpoint of a ramp stays on the ramp
        assert!((out[5] - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_zoom_2d_identity() {
        let input = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        for order in 0..=MAX_ORDER {
            let out = zoom_2d(input.view(), (2, 3), order).unwrap();
            assert_eq!(out, input);
        }
    }

    #[test]
    fn test_zoom_2d_nearest_blocks() {
        let input = array![[1.0, 2.0], [3.0, 4.0]];
        let out = zoom_2d(input.view(), (4, 4), 0).unwrap();
        let expected = array![
            [1.0, 1.0, 2.0, 2.0],
            [1.0, 1.0, 2.0, 2.0],
            [3.0, 3.0, 4.0, 4.0],
            [3.0, 3.0, 4.0, 4.0]
        ];
        assert_eq!(out, expected);
    }

    #[test]
    fn test_zoom_rejects_empty_and_mismatched() {
        let input = array![[1.0, 2.0], [3.0, 4.0]];
        assert!(matches!(
            zoom_2d(input.view(), (0, 4), 1),
            Err(GridError::InvalidZoom { axis: 0, .. })
        ));
        assert!(matches!(
            zoom(input.view().into_dyn(), &[4], 1),
            Err(GridError::DimensionMismatch {
                source_axes: 2,
                target_axes: 1
            })
        ));
        assert_eq!(
            zoom_2d(input.view(), (4, 4), 6),
            Err(GridError::UnsupportedOrder(6))
        );
        assert!(zoom_factors((0, 2), (4, 4)).is_err());
    }

    #[test]
    fn test_zoom_mask_nearest() {
        let mask = array![[true, false], [false, false]];
        let out = zoom_mask(mask.view(), (4, 4)).unwrap();
        assert_eq!(out.iter().filter(|&&m| m).count(), 4);
        assert!(out[[0, 0]] && out[[1, 1]]);
        assert!(!out[[2, 2]]);
    }
}
