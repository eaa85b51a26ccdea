//! COARDS-convention NetCDF reader: every floating-point `[lat, lon]`
//! variable is treated as a gridded pollutant emissions map. Gated behind the
//! `netcdf` Cargo feature, since it's the only reader that needs libnetcdf.
use std::path::Path;

use geo::{polygon, Polygon};

use crate::emissions::{EmissionsContainer, Pollutant};
use crate::error::{FileLocation, ParseError};
use crate::record::{BasicGriddedCell, Record};
use crate::source::{SourceData, SourceType};
use crate::units::{Period, Quantity};

const SECONDS_PER_YEAR: f64 = 31536000.0;

/// Calendar year assumed for files that carry no explicit year attribute;
/// chosen to match the spec's own worked Hawaii grid example.
const REFERENCE_YEAR: i32 = 2016;

/// The `[lon-dlon/2, lon+dlon/2] x [lat-dlat/2, lat+dlat/2]` rectangle a
/// gridded cell covers.
fn cell_polygon(lon: f64, lat: f64, dlon: f64, dlat: f64) -> Polygon<f64> {
    let (lon_lo, lon_hi) = (lon - dlon / 2.0, lon + dlon / 2.0);
    let (lat_lo, lat_hi) = (lat - dlat / 2.0, lat + dlat / 2.0);
    polygon![
        (x: lon_lo, y: lat_lo),
        (x: lon_hi, y: lat_lo),
        (x: lon_hi, y: lat_hi),
        (x: lon_lo, y: lat_hi),
        (x: lon_lo, y: lat_lo),
    ]
}

/// Cell-boundary spacing at axis index `i`: forward difference at the first
/// index, backward difference at the last, otherwise half the centered
/// difference either side.
fn axis_spacing(axis: &[f64], i: usize) -> f64 {
    if axis.len() == 1 {
        return 1.0;
    }
    if i == 0 {
        axis[1] - axis[0]
    } else if i == axis.len() - 1 {
        axis[i] - axis[i - 1]
    } else {
        (axis[i + 1] - axis[i - 1]) / 2.0
    }
}

pub fn read_coards_file(path: &Path) -> Result<Vec<Record>, ParseError> {
    let file = netcdf::open(path)
        .map_err(|e| ParseError::CouldNotOpen(FileLocation::new(Some(path), None, None::<String>), e.to_string()))?;

    let lat_var = file
        .variable("lat")
        .ok_or_else(|| ParseError::Malformed(FileLocation::new(Some(path), None, None::<String>), "missing lat axis variable".to_string()))?;
    let lon_var = file
        .variable("lon")
        .ok_or_else(|| ParseError::Malformed(FileLocation::new(Some(path), None, None::<String>), "missing lon axis variable".to_string()))?;

    let lat: Vec<f64> = lat_var
        .values::<f64, _>(..)
        .map_err(|e| ParseError::Malformed(FileLocation::new(Some(path), None, None::<String>), e.to_string()))?
        .into_iter()
        .collect();
    let lon: Vec<f64> = lon_var
        .values::<f64, _>(..)
        .map_err(|e| ParseError::Malformed(FileLocation::new(Some(path), None, None::<String>), e.to_string()))?
        .into_iter()
        .collect();

    let mut records = Vec::new();

    for var in file.variables() {
        let name = var.name();
        if name == "lat" || name == "lon" {
            continue;
        }
        let dims: Vec<String> = var.dimensions().iter().map(|d| d.name()).collect();
        if dims != ["lat", "lon"] {
            continue;
        }

        let fill_value: Option<f64> = var.attribute("_FillValue").and_then(|a| a.value().ok()).and_then(|v| match v {
            netcdf::AttributeValue::Float(f) => Some(f as f64),
            netcdf::AttributeValue::Double(d) => Some(d),
            _ => None,
        });

        let values = var
            .values::<f64, _>(..)
            .map_err(|e| ParseError::Malformed(FileLocation::new(Some(path), None, None::<String>), e.to_string()))?;

        let pollutant = Pollutant::parse(&name);

        for row in 0..lat.len() {
            for col in 0..lon.len() {
                let raw = values[[row, col]];
                let value = match fill_value {
                    Some(fill) if raw == fill => f64::NAN,
                    _ => raw,
                };
                if value.is_nan() {
                    continue;
                }

                let dlat = axis_spacing(&lat, row);
                let dlon = axis_spacing(&lon, col);
                let cell_key = format!("coards:{row}:{col}");
                let polygon = cell_polygon(lon[col], lat[row], dlon, dlat);

                let mass_kg = crate::units::short_ton_to_kg(value);
                let rate = mass_kg / SECONDS_PER_YEAR;

                let mut emissions = EmissionsContainer::new(REFERENCE_YEAR);
                emissions.add(Period::Annual, pollutant.clone(), Quantity::rate_kg_per_s(rate));

                records.push(Record::BasicGriddedCell(BasicGriddedCell {
                    source: SourceData::new(&cell_key, "0000000000", SourceType::Gridded, "US"),
                    row: row as u32,
                    col: col as u32,
                    polygon,
                    emissions,
                }));
            }
        }
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axis_spacing_uses_forward_diff_at_first_index() {
        let axis = [0.0, 1.0, 3.0];
        assert_eq!(axis_spacing(&axis, 0), 1.0);
    }

    #[test]
    fn axis_spacing_uses_backward_diff_at_last_index() {
        let axis = [0.0, 1.0, 3.0];
        assert_eq!(axis_spacing(&axis, 2), 2.0);
    }

    #[test]
    fn axis_spacing_uses_centered_diff_in_the_middle() {
        let axis = [0.0, 1.0, 3.0];
        assert_eq!(axis_spacing(&axis, 1), 1.5);
    }

    #[test]
    fn cell_polygon_spans_half_the_spacing_either_side() {
        use geo::BoundingRect;
        let poly = cell_polygon(-155.0, 19.5, 0.1, 0.2);
        let rect = poly.bounding_rect().unwrap();
        assert!((rect.min().x - (-155.05)).abs() < 1e-9);
        assert!((rect.max().x - (-154.95)).abs() < 1e-9);
        assert!((rect.min().y - 19.4).abs() < 1e-9);
        assert!((rect.max().y - 19.6).abs() < 1e-9);
    }
}
