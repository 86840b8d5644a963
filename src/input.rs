//! # Job Configuration
//!
//! Parsing and validation of gridcorr job files. A job names two gridded
//! datasets, the window to read from both, how to resample the source onto
//! the reference grid and where to write the results.
//!
//! ## Configuration Structure
//!
//! - **source**: the dataset that gets resampled (usually the coarser one)
//! - **reference**: the dataset whose grid the source is resampled onto
//! - **bounds**: coordinate filters applied to both datasets
//! - **resample**: spline order and negative-value policy
//! - **output**: Parquet destinations for the results
//! - **regions**: optional region-label grid for zonal summaries
//!
//! Files ending in `.yaml`/`.yml` are read as YAML, anything else as JSON.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use gridcorr::input::JobConfig;
//!
//! let config = JobConfig::from_file("job.yaml")?;
//! config.validate()?;
//!
//! let json = r#"
//! {
//!   "source": { "path": "smap.nc", "variable": "soil_moisture" },
//!   "reference": { "path": "ndvi.nc", "variable": "ndvi" },
//!   "output": { "statistics": "correlation.parquet" }
//! }"#;
//! let config = JobConfig::from_json(json)?;
//! assert_eq!(config.resample.order, 3);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crate::align::{ClampPolicy, ResampleOptions};
use crate::bounds::{CoordinateBounds, CoordinateFilter, ListFilter, RangeFilter};
use crate::error::{ConfigError, ConfigResult};
use crate::source::{DimensionNames, NetCdfSource};
use crate::spline::MAX_ORDER;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Complete description of one correlation job.
///
/// # Examples
///
/// ```rust
/// use gridcorr::input::{DatasetConfig, FilterConfig, JobConfig, OutputConfig, RangeParams};
///
/// let config = JobConfig {
///     source: DatasetConfig::new("smap.nc", "soil_moisture"),
///     reference: DatasetConfig::new("ndvi.nc", "ndvi"),
///     bounds: vec![FilterConfig::Range {
///         params: RangeParams {
///             dimension_name: "lat".to_string(),
///             min_value: 35.0,
///             max_value: 45.0,
///         },
///     }],
///     resample: Default::default(),
///     output: OutputConfig::new("correlation.parquet"),
///     regions: None,
///     log_level: None,
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    /// Dataset resampled onto the reference grid
    pub source: DatasetConfig,
    /// Dataset defining the target grid and time axis
    pub reference: DatasetConfig,
    /// Coordinate filters applied to both datasets
    #[serde(default)]
    pub bounds: Vec<FilterConfig>,
    /// Interpolation settings for the source variable
    #[serde(default)]
    pub resample: ResampleOptions,
    /// Where results are written
    pub output: OutputConfig,
    /// Region-label grid on the reference grid, for zonal summaries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regions: Option<DatasetConfig>,
    /// Default log level (error, warn, info, debug, trace)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

/// A variable inside a local NetCDF file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Path to the NetCDF file
    pub path: String,
    /// Name of the variable to read
    pub variable: String,
    /// Names of the time/latitude/longitude coordinates
    #[serde(default)]
    pub dimensions: DimensionNames,
}

impl DatasetConfig {
    pub fn new(path: &str, variable: &str) -> Self {
        DatasetConfig {
            path: path.to_string(),
            variable: variable.to_string(),
            dimensions: DimensionNames::default(),
        }
    }

    pub fn to_source(&self) -> NetCdfSource {
        NetCdfSource::new(&self.path, &self.variable).with_dimensions(self.dimensions.clone())
    }

    fn dimension_names(&self) -> [&str; 3] {
        [
            self.dimensions.time.as_str(),
            self.dimensions.latitude.as_str(),
            self.dimensions.longitude.as_str(),
        ]
    }
}

/// Output destinations. Only `statistics` is required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Parquet file for the per-cell correlation statistics
    pub statistics: String,
    /// Parquet file for the resampled source values
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resampled: Option<String>,
    /// Parquet file for the per-region summary
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regions: Option<String>,
}

impl OutputConfig {
    pub fn new(statistics: &str) -> Self {
        OutputConfig {
            statistics: statistics.to_string(),
            resampled: None,
            regions: None,
        }
    }
}

/// Supported coordinate filters.
///
/// # Examples
///
/// ```rust
/// use gridcorr::input::{FilterConfig, ListParams};
///
/// let filter = FilterConfig::List {
///     params: ListParams {
///         dimension_name: "time".to_string(),
///         values: vec![0.0, 1.0],
///     },
/// };
/// assert_eq!(filter.kind(), "list");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum FilterConfig {
    /// Inclusive range on a coordinate
    #[serde(rename = "range")]
    Range { params: RangeParams },
    /// Discrete coordinate values
    #[serde(rename = "list")]
    List { params: ListParams },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeParams {
    /// Name of the coordinate to filter
    pub dimension_name: String,
    /// Minimum value (inclusive)
    pub min_value: f64,
    /// Maximum value (inclusive)
    pub max_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListParams {
    /// Name of the coordinate to filter
    pub dimension_name: String,
    /// Coordinate values to keep
    pub values: Vec<f64>,
}

impl JobConfig {
    /// Loads a job from a JSON or YAML file, picked by extension.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml(&content),
            _ => Self::from_json(&content),
        }
    }

    pub fn from_json(json_str: &str) -> ConfigResult<Self> {
        Ok(serde_json::from_str(json_str)?)
    }

    pub fn from_yaml(yaml_str: &str) -> ConfigResult<Self> {
        Ok(serde_yaml::from_str(yaml_str)?)
    }

    pub fn to_json(&self) -> ConfigResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_yaml(&self) -> ConfigResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Checks the job for mistakes that would otherwise surface only after
    /// the datasets are loaded.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if:
    /// - a path or variable name is empty
    /// - the spline order is above 5
    /// - a range has `min_value > max_value` or a list is empty
    /// - a bound names a coordinate missing from the source or reference
    /// - a regions output is requested without a regions dataset, or the
    ///   other way round
    pub fn validate(&self) -> ConfigResult<()> {
        let mut datasets = vec![("source", &self.source), ("reference", &self.reference)];
        if let Some(regions) = &self.regions {
            datasets.push(("regions", regions));
        }
        for (role, dataset) in &datasets {
            if dataset.path.trim().is_empty() {
                return Err(invalid(format!("{role} path is empty")));
            }
            if dataset.variable.trim().is_empty() {
                return Err(invalid(format!("{role} variable is empty")));
            }
        }

        if self.output.statistics.trim().is_empty() {
            return Err(invalid("output statistics path is empty".to_string()));
        }
        if self.resample.order > MAX_ORDER {
            return Err(invalid(format!(
                "resample order {} is out of range 0-{}",
                self.resample.order, MAX_ORDER
            )));
        }

        for filter in &self.bounds {
            filter.validate()?;
            let dimension = filter.dimension_name();
            for (role, dataset) in [("source", &self.source), ("reference", &self.reference)] {
                if !dataset.dimension_names().contains(&dimension) {
                    return Err(invalid(format!(
                        "bound on '{dimension}' does not match a {role} coordinate"
                    )));
                }
            }
        }

        match (&self.regions, &self.output.regions) {
            (Some(_), None) => Err(invalid(
                "regions dataset given without output.regions".to_string(),
            )),
            (None, Some(_)) => Err(invalid(
                "output.regions requires a regions dataset".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Coordinate bounds built from every configured filter.
    pub fn bounds(&self) -> CoordinateBounds {
        self.bounds
            .iter()
            .fold(CoordinateBounds::new(), |bounds, f| bounds.with_filter(f.to_filter()))
    }

    /// Example job used by `gridcorr template`.
    pub fn example() -> Self {
        JobConfig {
            source: DatasetConfig::new("smap_soil_moisture.nc", "soil_moisture"),
            reference: DatasetConfig::new("modis_ndvi.nc", "ndvi"),
            bounds: vec![
                FilterConfig::Range {
                    params: RangeParams {
                        dimension_name: "lat".to_string(),
                        min_value: 35.0,
                        max_value: 45.0,
                    },
                },
                FilterConfig::Range {
                    params: RangeParams {
                        dimension_name: "lon".to_string(),
                        min_value: -105.0,
                        max_value: -95.0,
                    },
                },
            ],
            resample: ResampleOptions {
                order: 3,
                clamp: ClampPolicy::NonNegative,
            },
            output: OutputConfig {
                statistics: "correlation.parquet".to_string(),
                resampled: Some("soil_moisture_resampled.parquet".to_string()),
                regions: None,
            },
            regions: None,
            log_level: Some("info".to_string()),
        }
    }
}

fn invalid(message: String) -> ConfigError {
    ConfigError::Invalid(message)
}

impl FilterConfig {
    /// Converts the configuration into a concrete filter.
    pub fn to_filter(&self) -> Box<dyn CoordinateFilter> {
        match self {
            FilterConfig::Range { params } => Box::new(RangeFilter::new(
                &params.dimension_name,
                params.min_value,
                params.max_value,
            )),
            FilterConfig::List { params } => Box::new(ListFilter::new(
                &params.dimension_name,
                params.values.clone(),
            )),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            FilterConfig::Range { .. } => "range",
            FilterConfig::List { .. } => "list",
        }
    }

    pub fn dimension_name(&self) -> &str {
        match self {
            FilterConfig::Range { params } => &params.dimension_name,
            FilterConfig::List { params } => &params.dimension_name,
        }
    }

    fn validate(&self) -> ConfigResult<()> {
        match self {
            FilterConfig::Range { params } if params.min_value > params.max_value => {
                Err(invalid(format!(
                    "range on '{}' has min {} above max {}",
                    params.dimension_name, params.min_value, params.max_value
                )))
            }
            FilterConfig::List { params } if params.values.is_empty() => Err(invalid(format!(
                "list on '{}' has no values",
                params.dimension_name
            ))),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
    {
        "source": { "path": "coarse.nc", "variable": "sm" },
        "reference": { "path": "fine.nc", "variable": "ndvi" },
        "output": { "statistics": "stats.parquet" }
    }"#;

    #[test]
    fn test_minimal_json_defaults() {
        let config = JobConfig::from_json(MINIMAL).unwrap();
        assert_eq!(config.source.dimensions, DimensionNames::default());
        assert!(config.bounds.is_empty());
        assert_eq!(config.resample, ResampleOptions::default());
        assert_eq!(config.output.resampled, None);
        assert!(config.regions.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_with_filters_and_dimensions() {
        let yaml = r#"
source:
  path: coarse.nc
  variable: sm
  dimensions:
    latitude: latitude
    longitude: longitude
reference:
  path: fine.nc
  variable: ndvi
  dimensions:
    latitude: latitude
    longitude: longitude
bounds:
  - kind: range
    params:
      dimension_name: latitude
      min_value: 30.0
      max_value: 40.0
  - kind: list
    params:
      dimension_name: time
      values: [0.0, 1.0]
resample:
  order: 1
  clamp: non_negative
output:
  statistics: stats.parquet
"#;
        let config = JobConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.source.dimensions.latitude, "latitude");
        assert_eq!(config.source.dimensions.time, "time");
        assert_eq!(config.bounds.len(), 2);
        assert_eq!(config.bounds[1].kind(), "list");
        assert_eq!(config.resample.order, 1);
        assert_eq!(config.resample.clamp, ClampPolicy::NonNegative);
        assert!(config.validate().is_ok());
        assert_eq!(config.bounds().filters().len(), 2);
    }

    #[test]
    fn test_from_file_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let example = JobConfig::example();

        let json_path = dir.path().join("job.json");
        fs::write(&json_path, example.to_json().unwrap()).unwrap();
        assert_eq!(JobConfig::from_file(&json_path).unwrap(), example);

        let yaml_path = dir.path().join("job.yml");
        fs::write(&yaml_path, example.to_yaml().unwrap()).unwrap();
        assert_eq!(JobConfig::from_file(&yaml_path).unwrap(), example);

        assert!(matches!(
            JobConfig::from_file(dir.path().join("missing.json")),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn test_unknown_filter_kind_rejected() {
        let json = r#"{ "kind": "2d_point", "params": {} }"#;
        assert!(serde_json::from_str::<FilterConfig>(json).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_jobs() {
        let base = JobConfig::from_json(MINIMAL).unwrap();

        let mut config = base.clone();
        config.resample.order = 6;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = base.clone();
        config.source.variable = String::new();
        assert!(config.validate().is_err());

        let mut config = base.clone();
        config.bounds.push(FilterConfig::Range {
            params: RangeParams {
                dimension_name: "lat".to_string(),
                min_value: 10.0,
                max_value: 5.0,
            },
        });
        assert!(config.validate().is_err());

        let mut config = base.clone();
        config.bounds.push(FilterConfig::List {
            params: ListParams {
                dimension_name: "depth".to_string(),
                values: vec![1.0],
            },
        });
        assert!(config.validate().is_err());

        let mut config = base.clone();
        config.output.regions = Some("zones.parquet".to_string());
        assert!(config.validate().is_err());
        config.regions = Some(DatasetConfig::new("zones.nc", "zone"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_filter_config_to_filter() {
        let filter = FilterConfig::Range {
            params: RangeParams {
                dimension_name: "lon".to_string(),
                min_value: 0.0,
                max_value: 1.0,
            },
        }
        .to_filter();
        assert_eq!(filter.dimension(), "lon");
        assert_eq!(filter.select(&[-1.0, 0.0, 0.5, 2.0]), vec![1, 2]);
    }
}
