//! NetCDF fixtures written on the fly for tests.

use std::path::Path;

/// A (time, lat, lon) variable plus its coordinates, in row-major order.
#[derive(Debug, Clone)]
pub struct DatasetFixture {
    pub variable: String,
    pub time: Vec<f64>,
    pub lat: Vec<f64>,
    pub lon: Vec<f64>,
    pub values: Vec<f64>,
    pub fill_value: Option<f64>,
    pub time_units: Option<String>,
}

impl DatasetFixture {
    /// Builds a fixture whose values come from `f(t, lat, lon)`.
    pub fn from_fn(
        variable: &str,
        time: Vec<f64>,
        lat: Vec<f64>,
        lon: Vec<f64>,
        f: impl Fn(usize, usize, usize) -> f64,
    ) -> Self {
        let mut values = Vec::with_capacity(time.len() * lat.len() * lon.len());
        for t in 0..time.len() {
            for i in 0..lat.len() {
                for j in 0..lon.len() {
                    values.push(f(t, i, j));
                }
            }
        }
        DatasetFixture {
            variable: variable.to_string(),
            time,
            lat,
            lon,
            values,
            fill_value: None,
            time_units: None,
        }
    }
}

fn write_coordinates(
    file: &mut netcdf::FileMut,
    lat: &[f64],
    lon: &[f64],
) -> Result<(), netcdf::Error> {
    file.add_dimension("lat", lat.len())?;
    file.add_dimension("lon", lon.len())?;
    {
        let mut lat_var = file.add_variable::<f64>("lat", &["lat"])?;
        lat_var.put_attribute("units", "degrees_north")?;
        lat_var.put_values(lat, ..)?;
    }
    {
        let mut lon_var = file.add_variable::<f64>("lon", &["lon"])?;
        lon_var.put_attribute("units", "degrees_east")?;
        lon_var.put_values(lon, ..)?;
    }
    Ok(())
}

/// Writes `fixture` as a CF-style NetCDF file with `time`, `lat` and `lon`
/// coordinate variables.
pub fn write_dataset(path: &Path, fixture: &DatasetFixture) -> Result<(), netcdf::Error> {
    let mut file = netcdf::create(path)?;
    file.add_dimension("time", fixture.time.len())?;
    write_coordinates(&mut file, &fixture.lat, &fixture.lon)?;
    {
        let mut time_var = file.add_variable::<f64>("time", &["time"])?;
        if let Some(units) = &fixture.time_units {
            time_var.put_attribute("units", units.as_str())?;
        }
        time_var.put_values(&fixture.time, ..)?;
    }
    {
        let mut var = file.add_variable::<f64>(&fixture.variable, &["time", "lat", "lon"])?;
        if let Some(fill) = fixture.fill_value {
            var.set_fill_value(fill)?;
        }
        var.put_values(&fixture.values, ..)?;
    }
    Ok(())
}

/// Writes a 2-D (lat, lon) field, e.g. a region label grid.
pub fn write_field(
    path: &Path,
    variable: &str,
    lat: &[f64],
    lon: &[f64],
    values: &[f64],
) -> Result<(), netcdf::Error> {
    let mut file = netcdf::create(path)?;
    write_coordinates(&mut file, lat, lon)?;
    let mut var = file.add_variable::<f64>(variable, &["lat", "lon"])?;
    var.put_values(values, ..)?;
    Ok(())
}
