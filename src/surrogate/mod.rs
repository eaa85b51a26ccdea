//! Spatial surrogates: apportioning an area source's emissions onto a grid
//! via a weighted overlay of shapefile or OpenStreetMap features.
pub mod builder;
pub mod cache;
#[cfg(feature = "osm")]
pub mod osm;
pub mod reproject;
pub mod spec;

use crate::error::SurrogateError;
use crate::grid::GridDefinition;
use builder::{build_with_merge, SourceLocation, WeightFeature};
use cache::{GriddedSrgData, SurrogateCache};
use spec::SurrogateSpec;

/// Resolve a surrogate for `source` against `grid`, trying `spec` and then
/// each of its backups in order until one produces cells; returns `None`
/// (never an error) if the source legitimately has no surrogate among `spec`
/// and its backups.
///
/// `resolve_spec`/`acquire_features` are injected so callers can supply
/// shapefile- or OSM-backed feature acquisition without this module owning
/// those codec dependencies directly.
pub fn surrogate<F>(
    spec: &SurrogateSpec,
    grid: &GridDefinition,
    source: &SourceLocation,
    cache: &SurrogateCache,
    resolve_spec: &F,
    acquire_features: &dyn Fn(&SurrogateSpec, &SourceLocation) -> Result<Vec<WeightFeature>, SurrogateError>,
) -> Result<Option<GriddedSrgData>, SurrogateError>
where
    F: Fn(&str) -> Option<SurrogateSpec>,
{
    let key = SurrogateCache::key(spec.region(), spec.code(), &grid.name, &source.name);

    let result = cache
        .get_or_build(&key, || {
            let built = build_with_merge(spec, grid, source, 0, cache, resolve_spec, acquire_features)?;
            if built.cells.is_empty() {
                Ok(None)
            } else {
                Ok(Some(cache::GriddedSrgData {
                    cells: built.cells,
                    total_input_weight: built.total_input_weight,
                    covered_by_grid: built.covered_by_grid,
                }))
            }
        })
        .map_err(SurrogateError::Cache)?;

    if let Some(data) = result {
        return Ok(Some(data));
    }

    for backup_name in spec.backup_names() {
        let Some(backup_spec) = resolve_spec(backup_name) else {
            continue;
        };
        if let Some(data) = surrogate(&backup_spec, grid, source, cache, resolve_spec, acquire_features)? {
            return Ok(Some(data));
        }
    }

    Ok(None)
}
