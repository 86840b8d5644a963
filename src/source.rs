//! # Dataset Sources
//!
//! Loading of gridded variables into [`SpatiotemporalArray`]s. The whole
//! selection is read into memory before anything is computed, so the
//! per-cell work never waits on I/O.
//!
//! [`NetCdfSource`] reads a local NetCDF variable laid out as
//! `(time, latitude, longitude)`. CF packing is undone on load:
//! `_FillValue`/`missing_value` become NaN, then `scale_factor` and
//! `add_offset` are applied.

use crate::array::{CoordinateGrid, SpatiotemporalArray};
use crate::bounds::CoordinateBounds;
use crate::error::{GridError, SourceError, SourceResult};
use log::debug;
use ndarray::{Array2, Array3};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Something that can materialize a subset of a gridded variable.
pub trait DatasetSource {
    /// Returns the variable restricted to `bounds`, with NaN for missing values.
    fn fetch(&self, bounds: &CoordinateBounds) -> SourceResult<SpatiotemporalArray>;
}

/// Names of the coordinate variables in a dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionNames {
    #[serde(default = "default_time")]
    pub time: String,
    #[serde(default = "default_latitude")]
    pub latitude: String,
    #[serde(default = "default_longitude")]
    pub longitude: String,
}

fn default_time() -> String {
    "time".to_string()
}

fn default_latitude() -> String {
    "lat".to_string()
}

fn default_longitude() -> String {
    "lon".to_string()
}

impl Default for DimensionNames {
    fn default() -> Self {
        DimensionNames {
            time: default_time(),
            latitude: default_latitude(),
            longitude: default_longitude(),
        }
    }
}

/// CF packing attributes of a variable.
#[derive(Debug, Clone, Copy, PartialEq)]
struct CfEncoding {
    fill_value: Option<f64>,
    missing_value: Option<f64>,
    scale_factor: f64,
    add_offset: f64,
}

impl CfEncoding {
    fn from_variable(var: &netcdf::Variable) -> Self {
        CfEncoding {
            fill_value: numeric_attribute(var, "_FillValue"),
            missing_value: numeric_attribute(var, "missing_value"),
            scale_factor: numeric_attribute(var, "scale_factor").unwrap_or(1.0),
            add_offset: numeric_attribute(var, "add_offset").unwrap_or(0.0),
        }
    }

    fn decode(&self, raw: f64) -> f64 {
        let is_sentinel = |s: Option<f64>| s.is_some_and(|s| s == raw);
        if !raw.is_finite() || is_sentinel(self.fill_value) || is_sentinel(self.missing_value) {
            return f64::NAN;
        }
        raw * self.scale_factor + self.add_offset
    }
}

/// First value of a numeric attribute, whatever its storage type.
fn numeric_attribute(var: &netcdf::Variable, name: &str) -> Option<f64> {
    use netcdf::AttributeValue;
    let value = match var.attribute(name)?.value().ok()? {
        AttributeValue::Uchar(v) => v as f64,
        AttributeValue::Schar(v) => v as f64,
        AttributeValue::Ushort(v) => v as f64,
        AttributeValue::Short(v) => v as f64,
        AttributeValue::Uint(v) => v as f64,
        AttributeValue::Int(v) => v as f64,
        AttributeValue::Ulonglong(v) => v as f64,
        AttributeValue::Longlong(v) => v as f64,
        AttributeValue::Float(v) => v as f64,
        AttributeValue::Double(v) => v,
        AttributeValue::Uchars(v) => *v.first()? as f64,
        AttributeValue::Schars(v) => *v.first()? as f64,
        AttributeValue::Ushorts(v) => *v.first()? as f64,
        AttributeValue::Shorts(v) => *v.first()? as f64,
        AttributeValue::Uints(v) => *v.first()? as f64,
        AttributeValue::Ints(v) => *v.first()? as f64,
        AttributeValue::Ulonglongs(v) => *v.first()? as f64,
        AttributeValue::Longlongs(v) => *v.first()? as f64,
        AttributeValue::Floats(v) => *v.first()? as f64,
        AttributeValue::Doubles(v) => *v.first()?,
        _ => return None,
    };
    Some(value)
}

fn string_attribute(var: &netcdf::Variable, name: &str) -> Option<String> {
    match var.attribute(name)?.value().ok()? {
        netcdf::AttributeValue::Str(s) => Some(s),
        _ => None,
    }
}

fn read_coordinate(file: &netcdf::File, name: &str) -> SourceResult<Vec<f64>> {
    let var = file
        .variable(name)
        .ok_or_else(|| SourceError::CoordinateNotFound(name.to_string()))?;
    Ok(var.get_values::<f64, _>(..)?)
}

fn pick(values: &[f64], indices: &[usize]) -> Vec<f64> {
    indices.iter().map(|&i| values[i]).collect()
}

/// A variable in a local NetCDF file.
#[derive(Debug, Clone)]
pub struct NetCdfSource {
    path: PathBuf,
    variable: String,
    dimensions: DimensionNames,
}

impl NetCdfSource {
    pub fn new<P: AsRef<Path>>(path: P, variable: &str) -> Self {
        NetCdfSource {
            path: path.as_ref().to_path_buf(),
            variable: variable.to_string(),
            dimensions: DimensionNames::default(),
        }
    }

    pub fn with_dimensions(mut self, dimensions: DimensionNames) -> Self {
        self.dimensions = dimensions;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn variable(&self) -> &str {
        &self.variable
    }

    fn open(&self) -> SourceResult<netcdf::File> {
        debug!("Opening NetCDF file: {}", self.path.display());
        Ok(netcdf::open(&self.path)?)
    }

    fn check_layout(&self, var: &netcdf::Variable, expected: &[&str]) -> SourceResult<()> {
        let found: Vec<String> = var.dimensions().iter().map(|d| d.name().to_string()).collect();
        if found.len() != expected.len() || found.iter().zip(expected).any(|(f, e)| f.as_str() != *e) {
            return Err(SourceError::UnexpectedLayout {
                variable: self.variable.clone(),
                expected: expected.join(", "),
                found: found.join(", "),
            });
        }
        Ok(())
    }

    /// Reads a 2-D `(latitude, longitude)` variable, such as a rasterized
    /// region-label grid. Time bounds are ignored.
    pub fn fetch_field(&self, bounds: &CoordinateBounds) -> SourceResult<(CoordinateGrid, Array2<f64>)> {
        let names = &self.dimensions;
        let file = self.open()?;
        let var = file
            .variable(&self.variable)
            .ok_or_else(|| SourceError::VariableNotFound(self.variable.clone()))?;
        self.check_layout(&var, &[names.latitude.as_str(), names.longitude.as_str()])?;

        let lat = read_coordinate(&file, &names.latitude)?;
        let lon = read_coordinate(&file, &names.longitude)?;
        let raw = var.get_values::<f64, _>(..)?;
        let full = Array2::from_shape_vec((lat.len(), lon.len()), raw).map_err(|_| {
            GridError::ShapeMismatch {
                context: "field values",
                expected: vec![lat.len(), lon.len()],
                found: var.dimensions().iter().map(|d| d.len()).collect(),
            }
        })?;
        let encoding = CfEncoding::from_variable(&var);

        let lat_idx = bounds.resolve(&names.latitude, &lat)?;
        let lon_idx = bounds.resolve(&names.longitude, &lon)?;
        let field = Array2::from_shape_fn((lat_idx.len(), lon_idx.len()), |(i, j)| {
            encoding.decode(full[[lat_idx[i], lon_idx[j]]])
        });
        let grid = CoordinateGrid::new(pick(&lat, &lat_idx), pick(&lon, &lon_idx));
        Ok((grid, field))
    }
}

impl DatasetSource for NetCdfSource {
    fn fetch(&self, bounds: &CoordinateBounds) -> SourceResult<SpatiotemporalArray> {
        let names = &self.dimensions;
        let expected = [
            names.time.as_str(),
            names.latitude.as_str(),
            names.longitude.as_str(),
        ];
        bounds.check_dimensions(&expected)?;

        let file = self.open()?;
        let var = file
            .variable(&self.variable)
            .ok_or_else(|| SourceError::VariableNotFound(self.variable.clone()))?;
        self.check_layout(&var, &expected)?;

        let time = read_coordinate(&file, &names.time)?;
        let lat = read_coordinate(&file, &names.latitude)?;
        let lon = read_coordinate(&file, &names.longitude)?;
        let time_units = file
            .variable(&names.time)
            .and_then(|v| string_attribute(&v, "units"));

        let raw = var.get_values::<f64, _>(..)?;
        let full = Array3::from_shape_vec((time.len(), lat.len(), lon.len()), raw).map_err(|_| {
            GridError::ShapeMismatch {
                context: "variable values",
                expected: vec![time.len(), lat.len(), lon.len()],
                found: var.dimensions().iter().map(|d| d.len()).collect(),
            }
        })?;
        let encoding = CfEncoding::from_variable(&var);

        let time_idx = bounds.resolve(&names.time, &time)?;
        let lat_idx = bounds.resolve(&names.latitude, &lat)?;
        let lon_idx = bounds.resolve(&names.longitude, &lon)?;
        debug!(
            "Selected {} x {} x {} of {} x {} x {} from '{}'",
            time_idx.len(),
            lat_idx.len(),
            lon_idx.len(),
            time.len(),
            lat.len(),
            lon.len(),
            self.variable
        );

        let values = Array3::from_shape_fn((time_idx.len(), lat_idx.len(), lon_idx.len()), |(t, i, j)| {
            encoding.decode(full[[time_idx[t], lat_idx[i], lon_idx[j]]])
        });
        let grid = CoordinateGrid::new(pick(&lat, &lat_idx), pick(&lon, &lon_idx));
        let array = SpatiotemporalArray::new(&self.variable, pick(&time, &time_idx), grid, values)?
            .with_time_units(time_units);
        Ok(array)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{DatasetFixture, write_dataset};
    use tempfile::tempdir;

    fn fixture() -> DatasetFixture {
        DatasetFixture {
            variable: "soil_moisture".to_string(),
            time: vec![0.0, 1.0, 2.0],
            lat: vec![41.0, 40.0, 39.0],
            lon: vec![-101.0, -100.0],
            values: (0..18).map(|v| v as f64).collect(),
            fill_value: Some(-9999.0),
            time_units: Some("days since 2015-04-01".to_string()),
        }
    }

    #[test]
    fn test_fetch_full_variable() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("sm.nc");
        write_dataset(&path, &fixture())?;

        let array = NetCdfSource::new(&path, "soil_moisture").fetch(&CoordinateBounds::new())?;
        assert_eq!(array.shape(), (3, 3, 2));
        assert_eq!(array.values()[[2, 1, 1]], 15.0);
        assert_eq!(array.time_units(), Some("days since 2015-04-01"));
        assert_eq!(array.grid().latitude(), &[41.0, 40.0, 39.0]);
        Ok(())
    }

    #[test]
    fn test_fetch_with_bounds_and_fill() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("sm.nc");
        let mut data = fixture();
        data.values[7] = -9999.0; // (1, 0, 1)
        write_dataset(&path, &data)?;

        let bounds = CoordinateBounds::new()
            .range("lat", 39.5, 41.0)
            .range("time", 1.0, 2.0);
        let array = NetCdfSource::new(&path, "soil_moisture").fetch(&bounds)?;
        assert_eq!(array.shape(), (2, 2, 2));
        assert_eq!(array.time(), &[1.0, 2.0]);
        assert!(array.values()[[0, 0, 1]].is_nan());
        assert_eq!(array.values()[[1, 1, 0]], 14.0);
        Ok(())
    }

    #[test]
    fn test_fetch_errors() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("sm.nc");
        write_dataset(&path, &fixture())?;

        let missing = NetCdfSource::new(&path, "temperature").fetch(&CoordinateBounds::new());
        assert!(matches!(missing, Err(SourceError::VariableNotFound(_))));

        let empty = NetCdfSource::new(&path, "soil_moisture")
            .fetch(&CoordinateBounds::new().range("lon", 0.0, 10.0));
        assert!(matches!(empty, Err(SourceError::EmptySelection(_))));

        let renamed = NetCdfSource::new(&path, "soil_moisture").with_dimensions(DimensionNames {
            latitude: "latitude".to_string(),
            ..DimensionNames::default()
        });
        assert!(matches!(
            renamed.fetch(&CoordinateBounds::new()),
            Err(SourceError::UnexpectedLayout { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_unsigned_packed_variable() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("packed.nc");
        {
            let mut file = netcdf::create(&path)?;
            file.add_dimension("time", 2)?;
            file.add_dimension("lat", 1)?;
            file.add_dimension("lon", 2)?;
            file.add_variable::<f64>("time", &["time"])?
                .put_values(&[0.0f64, 1.0], ..)?;
            file.add_variable::<f64>("lat", &["lat"])?
                .put_values(&[45.0f64], ..)?;
            file.add_variable::<f64>("lon", &["lon"])?
                .put_values(&[7.0f64, 8.0], ..)?;
            let mut var = file.add_variable::<u16>("ndvi", &["time", "lat", "lon"])?;
            var.set_fill_value(65535u16)?;
            var.put_attribute("scale_factor", 0.0001f32)?;
            var.put_attribute("missing_value", 65534u16)?;
            var.put_values(&[5000u16, 65535, 65534, 10000], ..)?;
        }

        let array = NetCdfSource::new(&path, "ndvi").fetch(&CoordinateBounds::new())?;
        assert!((array.values()[[0, 0, 0]] - 0.5).abs() < 1e-6);
        assert!(array.values()[[0, 0, 1]].is_nan());
        assert!(array.values()[[1, 0, 0]].is_nan());
        assert!((array.values()[[1, 0, 1]] - 1.0).abs() < 1e-6);
        assert_eq!(array.missing_count(), 2);
        Ok(())
    }

    #[test]
    fn test_cf_decoding() {
        let encoding = CfEncoding {
            fill_value: Some(-1.0),
            missing_value: Some(-2.0),
            scale_factor: 0.5,
            add_offset: 10.0,
        };
        assert!(encoding.decode(-1.0).is_nan());
        assert!(encoding.decode(-2.0).is_nan());
        assert!(encoding.decode(f64::INFINITY).is_nan());
        assert_eq!(encoding.decode(4.0), 12.0);
    }
}
