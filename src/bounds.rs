//! # Coordinate Bounds
//!
//! Index selection on named coordinate axes, used to subset a dataset to the
//! latitude/longitude/time window of interest before it is loaded.
//!
//! Filters on the same dimension intersect. Ranges are inclusive at both ends.

use crate::array::COORDINATE_TOLERANCE;
use crate::error::{SourceError, SourceResult};
use std::collections::BTreeSet;

/// Selects indices along one named coordinate axis.
pub trait CoordinateFilter: Send + Sync {
    /// Name of the coordinate this filter applies to
    fn dimension(&self) -> &str;

    /// Indices of `coordinates` that pass the filter, in ascending order
    fn select(&self, coordinates: &[f64]) -> Vec<usize>;

    fn describe(&self) -> String;
}

/// Keeps coordinates within `[min_value, max_value]`.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeFilter {
    pub dimension_name: String,
    pub min_value: f64,
    pub max_value: f64,
}

impl RangeFilter {
    pub fn new(dimension_name: &str, min_value: f64, max_value: f64) -> Self {
        RangeFilter {
            dimension_name: dimension_name.to_string(),
            min_value,
            max_value,
        }
    }
}

impl CoordinateFilter for RangeFilter {
    fn dimension(&self) -> &str {
        &self.dimension_name
    }

    fn select(&self, coordinates: &[f64]) -> Vec<usize> {
        coordinates
            .iter()
            .enumerate()
            .filter(|(_, val)| **val >= self.min_value && **val <= self.max_value)
            .map(|(idx, _)| idx)
            .collect()
    }

    fn describe(&self) -> String {
        format!(
            "range {} in [{}, {}]",
            self.dimension_name, self.min_value, self.max_value
        )
    }
}

/// Keeps coordinates equal to one of `values`.
#[derive(Debug, Clone, PartialEq)]
pub struct ListFilter {
    pub dimension_name: String,
    pub values: Vec<f64>,
}

impl ListFilter {
    pub fn new(dimension_name: &str, values: Vec<f64>) -> Self {
        ListFilter {
            dimension_name: dimension_name.to_string(),
            values,
        }
    }
}

impl CoordinateFilter for ListFilter {
    fn dimension(&self) -> &str {
        &self.dimension_name
    }

    fn select(&self, coordinates: &[f64]) -> Vec<usize> {
        coordinates
            .iter()
            .enumerate()
            .filter(|(_, val)| {
                self.values
                    .iter()
                    .any(|v| (*v - **val).abs() <= COORDINATE_TOLERANCE)
            })
            .map(|(idx, _)| idx)
            .collect()
    }

    fn describe(&self) -> String {
        format!("list {} in {:?}", self.dimension_name, self.values)
    }
}

/// A set of coordinate filters over one dataset.
#[derive(Default)]
pub struct CoordinateBounds {
    filters: Vec<Box<dyn CoordinateFilter>>,
}

impl CoordinateBounds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(mut self, filter: Box<dyn CoordinateFilter>) -> Self {
        self.filters.push(filter);
        self
    }

    /// Inclusive range on a dimension.
    pub fn range(self, dimension: &str, min_value: f64, max_value: f64) -> Self {
        self.with_filter(Box::new(RangeFilter::new(dimension, min_value, max_value)))
    }

    pub fn push(&mut self, filter: Box<dyn CoordinateFilter>) {
        self.filters.push(filter);
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn filters(&self) -> &[Box<dyn CoordinateFilter>] {
        &self.filters
    }

    /// Dimensions constrained by at least one filter.
    pub fn dimensions(&self) -> BTreeSet<&str> {
        self.filters.iter().map(|f| f.dimension()).collect()
    }

    /// Fails if a filter targets a dimension outside `known`.
    pub fn check_dimensions(&self, known: &[&str]) -> SourceResult<()> {
        match self.dimensions().into_iter().find(|d| !known.contains(d)) {
            Some(unknown) => Err(SourceError::UnknownDimension(unknown.to_string())),
            None => Ok(()),
        }
    }

    /// Indices of `coordinates` passing every filter on `dimension`. With no
    /// filter on `dimension` every index is kept. An empty result is an error.
    pub fn resolve(&self, dimension: &str, coordinates: &[f64]) -> SourceResult<Vec<usize>> {
        let mut selected: BTreeSet<usize> = (0..coordinates.len()).collect();
        for filter in self.filters.iter().filter(|f| f.dimension() == dimension) {
            let passing: BTreeSet<usize> = filter.select(coordinates).into_iter().collect();
            selected = selected.intersection(&passing).copied().collect();
        }
        if selected.is_empty() {
            return Err(SourceError::EmptySelection(dimension.to_string()));
        }
        Ok(selected.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_filter_inclusive() {
        let f = RangeFilter::new("lat", 30.0, 40.0);
        assert_eq!(f.select(&[45.0, 40.0, 35.0, 30.0, 25.0]), vec![1, 2, 3]);
        assert_eq!(f.dimension(), "lat");
    }

    #[test]
    fn test_list_filter() {
        let f = ListFilter::new("time", vec![1.0, 3.0]);
        assert_eq!(f.select(&[0.0, 1.0, 2.0, 3.0]), vec![1, 3]);
        assert!(f.select(&[0.5, 2.5]).is_empty());
    }

    #[test]
    fn test_bounds_intersect_per_dimension() {
        let bounds = CoordinateBounds::new()
            .range("lon", -10.0, 10.0)
            .range("lon", 0.0, 20.0)
            .range("lat", 50.0, 60.0);
        let lon = [-15.0, -5.0, 0.0, 5.0, 15.0];
        assert_eq!(bounds.resolve("lon", &lon).unwrap(), vec![2, 3]);
        // Unconstrained dimension keeps everything
        assert_eq!(bounds.resolve("time", &[0.0, 1.0]).unwrap(), vec![0, 1]);
        assert!(matches!(
            bounds.resolve("lat", &[0.0, 10.0]),
            Err(SourceError::EmptySelection(d)) if d == "lat"
        ));
    }

    #[test]
    fn test_check_dimensions() {
        let bounds = CoordinateBounds::new().range("depth", 0.0, 5.0);
        assert!(matches!(
            bounds.check_dimensions(&["time", "lat", "lon"]),
            Err(SourceError::UnknownDimension(d)) if d == "depth"
        ));
        assert!(CoordinateBounds::new().check_dimensions(&["time"]).is_ok());
    }
}
