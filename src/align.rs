//! # Grid Aligner
//!
//! Resamples a spatiotemporal array onto another coordinate grid, one time
//! step at a time, so that it can be paired cell-by-cell with a reference
//! array.
//!
//! Missing values are handled as an explicit three-step policy per step:
//!
//! 1. **fill**: missing (NaN or infinite) source cells become `0.0`
//! 2. **interpolate**: the filled slice is zoomed with the configured spline
//!    order, then clamped according to the variable's [`ClampPolicy`]
//! 3. **remask**: a nearest-neighbour zoom of the source mask, OR-ed with
//!    the reference mask at the same step, decides which output cells are
//!    missing
//!
//! Time steps are independent and are processed in parallel.

use crate::array::{CoordinateGrid, SpatiotemporalArray};
use crate::error::{GridError, GridResult};
use crate::spline::{check_order, zoom_2d, zoom_factors, zoom_mask};
use log::debug;
use ndarray::{Array2, Array3, ArrayView2, Axis, Zip};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// What to do with negative interpolated values.
///
/// Spline overshoot can push a non-negative quantity such as soil moisture
/// below zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClampPolicy {
    /// Keep interpolated values as they are
    #[default]
    None,
    /// Replace negative values with zero
    NonNegative,
}

impl ClampPolicy {
    pub fn apply(&self, value: f64) -> f64 {
        match self {
            ClampPolicy::None => value,
            ClampPolicy::NonNegative if value < 0.0 => 0.0,
            ClampPolicy::NonNegative => value,
        }
    }
}

/// Interpolation settings for one variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResampleOptions {
    /// Spline order, 0 (nearest) to 5; 1 is linear, 3 cubic
    #[serde(default = "default_order")]
    pub order: usize,
    /// Negative-value policy for the resampled variable
    #[serde(default)]
    pub clamp: ClampPolicy,
}

fn default_order() -> usize {
    3
}

impl Default for ResampleOptions {
    fn default() -> Self {
        ResampleOptions {
            order: default_order(),
            clamp: ClampPolicy::None,
        }
    }
}

/// A resampled array and its reference, sharing grid, time axis and the
/// exact same set of missing cells.
#[derive(Debug, Clone)]
pub struct AlignedPair {
    pub resampled: SpatiotemporalArray,
    pub reference: SpatiotemporalArray,
}

#[derive(Debug, Clone, Copy)]
pub struct GridAligner {
    options: ResampleOptions,
}

impl GridAligner {
    pub fn new(options: ResampleOptions) -> GridResult<Self> {
        check_order(options.order)?;
        Ok(GridAligner { options })
    }

    pub fn options(&self) -> &ResampleOptions {
        &self.options
    }

    /// Resamples `source` onto `target`. Only the source's own gaps are
    /// propagated.
    pub fn resample(
        &self,
        source: &SpatiotemporalArray,
        target: &CoordinateGrid,
    ) -> GridResult<SpatiotemporalArray> {
        self.resample_onto(source, target, None)
    }

    /// Resamples `source` onto the grid of `reference`, additionally marking
    /// missing every cell that is missing in `reference` at the same step.
    pub fn align_to(
        &self,
        source: &SpatiotemporalArray,
        reference: &SpatiotemporalArray,
    ) -> GridResult<SpatiotemporalArray> {
        if source.n_times() != reference.n_times() {
            return Err(GridError::TimeMismatch {
                left: source.n_times(),
                right: reference.n_times(),
            });
        }
        self.resample_onto(source, reference.grid(), Some(reference))
    }

    /// Aligns `source` to `reference` and applies the joint missing mask to
    /// a copy of `reference` as well.
    pub fn co_register(
        &self,
        source: &SpatiotemporalArray,
        reference: &SpatiotemporalArray,
    ) -> GridResult<AlignedPair> {
        let resampled = self.align_to(source, reference)?;
        let joint_mask = resampled.missing_mask();
        let reference = reference.masked(&joint_mask)?;
        debug!(
            "Co-registered '{}' onto '{}': {} joint missing cells",
            resampled.name(),
            reference.name(),
            reference.missing_count()
        );
        Ok(AlignedPair {
            resampled,
            reference,
        })
    }

    fn resample_onto(
        &self,
        source: &SpatiotemporalArray,
        target: &CoordinateGrid,
        reference: Option<&SpatiotemporalArray>,
    ) -> GridResult<SpatiotemporalArray> {
        let source_shape = source.grid().shape();
        let target_shape = target.shape();
        let (lat_zoom, lon_zoom) = zoom_factors(source_shape, target_shape)?;
        debug!(
            "Resampling '{}' {:?} -> {:?} (zoom {:.3} x {:.3}, order {}, clamp {:?})",
            source.name(),
            source_shape,
            target_shape,
            lat_zoom,
            lon_zoom,
            self.options.order,
            self.options.clamp
        );

        let steps = (0..source.n_times())
            .into_par_iter()
            .map(|t| self.resample_step(source.slice(t), target_shape, reference.map(|r| r.slice(t))))
            .collect::<GridResult<Vec<Array2<f64>>>>()?;

        let mut values = Array3::<f64>::zeros((source.n_times(), target_shape.0, target_shape.1));
        for (t, step) in steps.into_iter().enumerate() {
            values.index_axis_mut(Axis(0), t).assign(&step);
        }

        Ok(
            SpatiotemporalArray::new(source.name(), source.time().to_vec(), target.clone(), values)?
                .with_time_units(source.time_units().map(str::to_string)),
        )
    }

    fn resample_step(
        &self,
        slice: ArrayView2<'_, f64>,
        target: (usize, usize),
        reference: Option<ArrayView2<'_, f64>>,
    ) -> GridResult<Array2<f64>> {
        // fill
        let source_mask = slice.mapv(|v| !v.is_finite());
        let filled = slice.mapv(|v| if v.is_finite() { v } else { 0.0 });

        // interpolate
        let mut values = zoom_2d(filled.view(), target, self.options.order)?;
        let clamp = self.options.clamp;
        values.mapv_inplace(|v| clamp.apply(v));

        // remask
        let mut mask = zoom_mask(source_mask.view(), target)?;
        if let Some(reference) = reference {
            Zip::from(&mut mask)
                .and(&reference)
                .for_each(|m, &r| *m |= !r.is_finite());
        }
        Zip::from(&mut values).and(&mask).for_each(|v, &m| {
            if m {
                *v = f64::NAN;
            }
        });
        Ok(values)
    }
}
