//! The surrogate builder: weighted overlay of weight features against an
//! input polygon and a grid, with merge/backup composition. This is the
//! hardest subsystem in the crate (see module-level budget notes in the
//! project root).
use std::sync::Mutex;

use geo::{Area, BooleanOps, BoundingRect, EuclideanLength, Geometry, LineString, MultiPolygon, Point, Polygon, Rect};
use rayon::prelude::*;

use crate::error::SurrogateError;
use crate::grid::GridDefinition;
use crate::surrogate::cache::{CachedCell, GriddedSrgData, SurrogateCache};
use crate::surrogate::reproject::reproject_polygon;
use crate::surrogate::spec::SurrogateSpec;

/// The geometry kind of a weight feature, mirroring the spec's "dominant
/// geometry type" classification: SMOKE surrogates may mix kinds per
/// feature, OSM surrogates are uniform per extract.
#[derive(Debug, Clone)]
pub enum FeatureGeometry {
    Polygon(Polygon<f64>),
    Line(LineString<f64>),
    Point(Point<f64>),
}

/// A single acquired weight feature: its geometry and pre-computed density
/// (weight per unit area/length, or raw weight for points).
#[derive(Debug, Clone)]
pub struct WeightFeature {
    pub geometry: FeatureGeometry,
    pub density: f64,
}

impl WeightFeature {
    fn bounds(&self) -> Option<Rect<f64>> {
        match &self.geometry {
            FeatureGeometry::Polygon(p) => p.bounding_rect(),
            FeatureGeometry::Line(l) => l.bounding_rect(),
            FeatureGeometry::Point(pt) => Some(Rect::new(pt.0, pt.0)),
        }
    }
}

/// The source geometry a surrogate is being built against.
#[derive(Debug, Clone)]
pub struct SourceLocation {
    pub geometry: Polygon<f64>,
    pub spatial_reference: String,
    pub name: String,
}

/// Intersect `feature` against `polygon`, returning the intersection's
/// "size" (area for polygons, length for lines, 1.0 per contained point) or
/// `None` if the intersection is empty.
fn intersect_with_polygon(feature: &FeatureGeometry, polygon: &Polygon<f64>) -> Option<f64> {
    match feature {
        FeatureGeometry::Polygon(p) => {
            let mp_a = MultiPolygon(vec![p.clone()]);
            let mp_b = MultiPolygon(vec![polygon.clone()]);
            let inter = mp_a.intersection(&mp_b);
            let area = inter.unsigned_area();
            if area > 0.0 {
                Some(area)
            } else {
                None
            }
        }
        FeatureGeometry::Line(l) => {
            // Exact line-in-polygon clipping needs a dedicated clip routine;
            // approximate it by crediting a line's full length whenever any
            // vertex falls inside the polygon.
            use geo::Contains;
            let touches = l.points().any(|p| polygon.contains(&p));
            if touches && l.euclidean_length() > 0.0 {
                Some(l.euclidean_length())
            } else {
                None
            }
        }
        FeatureGeometry::Point(pt) => {
            use geo::Contains;
            if polygon.contains(pt) {
                Some(1.0)
            } else {
                None
            }
        }
    }
}

/// Intersect `feature` against a single grid cell polygon, same "size"
/// convention as [`intersect_with_polygon`].
fn intersect_with_cell(feature: &FeatureGeometry, cell: &Polygon<f64>) -> Option<f64> {
    intersect_with_polygon(feature, cell)
}

/// Build a [`GriddedSrgData`] by overlaying `features` against `source` and
/// `grid`. This is step 2-6 of the algorithm described in the surrogate
/// builder design: feature acquisition happens before this call (it is
/// format-specific, see `spec.rs`/callers), this function performs the
/// geometry-only overlay.
pub fn overlay(source: &SourceLocation, grid: &GridDefinition, features: &[WeightFeature]) -> Result<GriddedSrgData, SurrogateError> {
    let source_bounds = source
        .geometry
        .bounding_rect()
        .ok_or_else(|| SurrogateError::Malformed(crate::error::FileLocation::default(), "source polygon has no bounding rect".into()))?;

    // Step 3: cell pre-filter, computed once and shared read-only across the
    // stripe-parallel feature intersection below.
    let candidate_cells = grid.cells_overlapping(source_bounds);

    // Step 4: feature-vs-source intersection, stripe-parallel (index i, i+N,
    // i+2N, ...), results appended under a mutex.
    let total_weight = Mutex::new(0.0f64);
    let mut dropped_zero_area = 0usize;

    let contributions: Vec<(usize, f64)> = (0..features.len())
        .into_par_iter()
        .filter_map(|i| {
            let feature = &features[i];
            if feature.bounds().is_none() {
                return None;
            }
            let size = intersect_with_polygon(&feature.geometry, &source.geometry)?;
            let contribution = feature.density * size;
            if contribution.is_finite() && contribution != 0.0 {
                let mut guard = total_weight.lock().expect("surrogate accumulator poisoned");
                *guard += contribution;
                Some((i, contribution))
            } else {
                None
            }
        })
        .collect();
    if contributions.is_empty() {
        log::debug!("surrogate build for '{}': no weight feature intersected the source polygon", source.name);
    }

    let total_input_weight = *total_weight.lock().expect("surrogate accumulator poisoned");

    // Step 5: coverage — is the source polygon entirely inside the grid?
    let grid_extent = grid.extent();
    let covered_by_grid = grid_extent.map(|e| rect_contains(&e, &source_bounds)).unwrap_or(false);

    if total_input_weight <= 0.0 {
        return Ok(GriddedSrgData { cells: vec![], total_input_weight: 0.0, covered_by_grid });
    }

    // Step 6: cell-vs-feature intersection, stripe-parallel, mutex-accumulated.
    let cell_weights: Mutex<Vec<CachedCell>> = Mutex::new(Vec::new());
    let zero_area_count = Mutex::new(0usize);

    candidate_cells.into_par_iter().for_each(|cell| {
        let mut weight = 0.0;
        for feature in features {
            let Some(size) = intersect_with_cell(&feature.geometry, &cell.polygon) else {
                continue;
            };
            if size <= 0.0 {
                let mut z = zero_area_count.lock().expect("zero-area counter poisoned");
                *z += 1;
                continue;
            }
            weight += feature.density * size / total_input_weight;
        }
        if weight > 0.0 {
            cell_weights.lock().expect("surrogate cell accumulator poisoned").push(CachedCell { row: cell.row, col: cell.col, weight });
        }
    });

    dropped_zero_area += *zero_area_count.lock().expect("zero-area counter poisoned");
    if dropped_zero_area > 0 {
        log::debug!("surrogate build for '{}': dropped {dropped_zero_area} zero-size intersections after simplification", source.name);
    }

    Ok(GriddedSrgData { cells: cell_weights.into_inner().expect("surrogate cell accumulator poisoned"), total_input_weight, covered_by_grid })
}

/// Reproject `source`'s geometry into `grid`'s spatial reference if they
/// differ, leaving it untouched otherwise.
fn reproject_source(source: &SourceLocation, grid: &GridDefinition) -> Result<SourceLocation, SurrogateError> {
    if source.spatial_reference == grid.spatial_reference {
        return Ok(source.clone());
    }
    let geometry = reproject_polygon(&source.geometry, &source.spatial_reference, &grid.spatial_reference)?;
    Ok(SourceLocation { geometry, spatial_reference: grid.spatial_reference.clone(), name: source.name.clone() })
}

fn rect_contains(outer: &Rect<f64>, inner: &Rect<f64>) -> bool {
    inner.min().x >= outer.min().x && inner.max().x <= outer.max().x && inner.min().y >= outer.min().y && inner.max().y <= outer.max().y
}

/// Recursively resolve `spec` into a [`GriddedSrgData`], honoring merge
/// composition. `depth` is the current merge recursion depth; exceeding
/// `cache.max_merge_depth()` fails [`SurrogateError::RecursionLimit`].
///
/// Merge builds never consult `cache` for the sub-surrogates they reference —
/// only the top-level call may use the cache — avoiding the lock-inversion
/// deadlock described in the concurrency design.
pub fn build_with_merge<F>(
    spec: &SurrogateSpec,
    grid: &GridDefinition,
    source: &SourceLocation,
    depth: usize,
    cache: &SurrogateCache,
    resolve_spec: &F,
    acquire_features: &dyn Fn(&SurrogateSpec, &SourceLocation) -> Result<Vec<WeightFeature>, SurrogateError>,
) -> Result<GriddedSrgData, SurrogateError>
where
    F: Fn(&str) -> Option<SurrogateSpec>,
{
    if depth > cache.max_merge_depth() {
        return Err(SurrogateError::RecursionLimit(cache.max_merge_depth()));
    }

    let source = &reproject_source(source, grid)?;

    if spec.is_merge_only() {
        let mut merged_cells: std::collections::HashMap<(u32, u32), f64> = std::collections::HashMap::new();
        let mut total_weight = 0.0;
        let mut any_covered = true;
        for (name, factor) in spec.merge_names().iter().zip(
            spec.merge_multipliers()
                .iter()
                .copied()
                .chain(std::iter::repeat(1.0)),
        ) {
            let Some(sub_spec) = resolve_spec(name) else {
                return Err(SurrogateError::UnknownCode(name.clone()));
            };
            let sub = build_with_merge(&sub_spec, grid, source, depth + 1, cache, resolve_spec, acquire_features)?;
            any_covered &= sub.covered_by_grid;
            total_weight += sub.total_input_weight * factor;
            for cell in &sub.cells {
                *merged_cells.entry((cell.row, cell.col)).or_insert(0.0) += cell.weight * factor;
            }
        }
        let cells = merged_cells.into_iter().map(|((row, col), weight)| CachedCell { row, col, weight }).collect();
        return Ok(GriddedSrgData { cells, total_input_weight: total_weight, covered_by_grid: any_covered });
    }

    let features = acquire_features(spec, source)?;
    overlay(source, grid, &features)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::coord;

    fn square(x0: f64, y0: f64, side: f64) -> Polygon<f64> {
        Polygon::new(
            vec![
                coord! { x: x0, y: y0 },
                coord! { x: x0 + side, y: y0 },
                coord! { x: x0 + side, y: y0 + side },
                coord! { x: x0, y: y0 + side },
                coord! { x: x0, y: y0 },
            ]
            .into(),
            vec![],
        )
    }

    #[test]
    fn overlay_covered_source_sums_close_to_one() {
        let grid = GridDefinition::regular("test", 4, 4, 1.0, 1.0, (0.0, 0.0), "EPSG:4326");
        let source = SourceLocation { geometry: square(0.0, 0.0, 4.0), spatial_reference: "EPSG:4326".into(), name: "county".into() };
        let features = vec![WeightFeature { geometry: FeatureGeometry::Polygon(square(0.0, 0.0, 4.0)), density: 1.0 }];
        let result = overlay(&source, &grid, &features).unwrap();
        assert!(result.covered_by_grid);
        let sum: f64 = result.cells.iter().map(|c| c.weight).sum();
        assert!((sum - 1.0).abs() < 1e-6, "sum was {sum}");
    }

    #[test]
    fn overlay_partial_source_is_not_covered_and_sums_less_than_one() {
        let grid = GridDefinition::regular("test", 4, 4, 1.0, 1.0, (0.0, 0.0), "EPSG:4326");
        let source = SourceLocation { geometry: square(-2.0, -2.0, 4.0), spatial_reference: "EPSG:4326".into(), name: "county".into() };
        let features = vec![WeightFeature { geometry: FeatureGeometry::Polygon(square(-2.0, -2.0, 4.0)), density: 1.0 }];
        let result = overlay(&source, &grid, &features).unwrap();
        assert!(!result.covered_by_grid);
        let sum: f64 = result.cells.iter().map(|c| c.weight).sum();
        assert!(sum > 0.0 && sum <= 1.0 + 1e-9);
    }
}
