//! Reprojects a source polygon into a grid's spatial reference before
//! overlay, via `proj4rs`. Surrogate specs, grids, and OSM extracts are each
//! free to declare their own spatial reference; the builder only ever needs
//! to reconcile the source polygon against the grid it's being allocated
//! onto.
use geo::{Coord, LineString, Polygon};
use proj4rs::{transform::transform, Proj};

use crate::error::SurrogateError;

/// Reproject `polygon` from `from_sr` to `to_sr`. A no-op when the two
/// spatial references compare equal as strings.
pub fn reproject_polygon(polygon: &Polygon<f64>, from_sr: &str, to_sr: &str) -> Result<Polygon<f64>, SurrogateError> {
    if from_sr == to_sr {
        return Ok(polygon.clone());
    }
    let from = parse_spatial_reference(from_sr)?;
    let to = parse_spatial_reference(to_sr)?;

    let exterior = reproject_ring(polygon.exterior(), &from, &to)?;
    let interiors = polygon.interiors().iter().map(|ring| reproject_ring(ring, &from, &to)).collect::<Result<Vec<_>, _>>()?;
    Ok(Polygon::new(exterior, interiors))
}

fn reproject_ring(ring: &LineString<f64>, from: &Proj, to: &Proj) -> Result<LineString<f64>, SurrogateError> {
    let coords = ring
        .coords()
        .map(|c| {
            let mut point = (c.x.to_radians(), c.y.to_radians(), 0.0);
            transform(from, to, &mut point)
                .map_err(|e| SurrogateError::Malformed(crate::error::FileLocation::default(), format!("reprojection failed: {e}")))?;
            Ok(Coord { x: point.0.to_degrees(), y: point.1.to_degrees() })
        })
        .collect::<Result<Vec<_>, SurrogateError>>()?;
    Ok(coords.into())
}

/// Parse a spatial reference string. `"EPSG:<code>"` resolves through
/// proj4rs's built-in EPSG table; anything else is treated as a raw PROJ.4
/// definition string.
fn parse_spatial_reference(sr: &str) -> Result<Proj, SurrogateError> {
    let malformed = |e: proj4rs::errors::Error| SurrogateError::Malformed(crate::error::FileLocation::default(), format!("unrecognized spatial reference '{sr}': {e}"));

    if let Some(code) = sr.strip_prefix("EPSG:").and_then(|c| c.parse::<u16>().ok()) {
        Proj::from_epsg_code(code).map_err(malformed)
    } else {
        Proj::from_proj_string(sr).map_err(malformed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::coord;

    fn square(x0: f64, y0: f64, side: f64) -> Polygon<f64> {
        Polygon::new(vec![coord! { x: x0, y: y0 }, coord! { x: x0 + side, y: y0 }, coord! { x: x0 + side, y: y0 + side }, coord! { x: x0, y: y0 + side }, coord! { x: x0, y: y0 }].into(), vec![])
    }

    #[test]
    fn identical_spatial_references_are_a_no_op() {
        let polygon = square(-84.5, 33.5, 1.0);
        let result = reproject_polygon(&polygon, "EPSG:4326", "EPSG:4326").unwrap();
        assert_eq!(result, polygon);
    }

    #[test]
    fn reprojecting_to_a_projected_crs_moves_coordinates() {
        let polygon = square(-84.5, 33.5, 1.0);
        let result = reproject_polygon(&polygon, "EPSG:4326", "EPSG:3857").unwrap();
        assert_ne!(result.exterior().0[0].x, polygon.exterior().0[0].x);
    }
}
