//! The spatial allocator: turns a record's emissions into a gridded,
//! per-pollutant sparse field using the surrogate machinery.
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use geo::Point;

use crate::emissions::Pollutant;
use crate::error::SurrogateError;
use crate::grid::GridDefinition;
use crate::record::{Record, RecordOps};
use crate::surrogate::builder::{SourceLocation, WeightFeature};
use crate::surrogate::cache::{CachedCell, SurrogateCache};
use crate::surrogate::spec::SurrogateSpec;
use crate::units::Quantity;

/// A sparse `(row, col) -> weight` gridded distribution, normalized to sum to
/// 1 when `covered` is true.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SparseGrid {
    pub cells: Vec<CachedCell>,
    pub covered: bool,
    pub in_grid: bool,
}

impl SparseGrid {
    pub fn weight_sum(&self) -> f64 {
        self.cells.iter().map(|c| c.weight).sum()
    }

    /// Split 1.0 evenly across every `(row, col)` pair — used for point
    /// sources landing on a cell boundary, and for the degenerate
    /// single-cell case.
    pub fn even_split(cells: Vec<(u32, u32)>) -> SparseGrid {
        let n = cells.len().max(1) as f64;
        SparseGrid {
            cells: cells.into_iter().map(|(row, col)| CachedCell { row, col, weight: 1.0 / n }).collect(),
            covered: true,
            in_grid: true,
        }
    }
}

/// Resolve the chain of surrogate specs (primary + backups) for a record's
/// SCC/country/FIPS, by whatever lookup the caller's grid reference
/// implements. Injected as a closure so this module stays agnostic of the
/// surrogate-spec file format in use.
pub type SpecResolver<'a> = dyn Fn(&str, &str, &str) -> Option<SurrogateSpec> + 'a;

/// Compute a record's gridded weight distribution.
///
/// For an area record, this resolves and builds the record's surrogate
/// against `grid`. For a point record, the point is located directly: if it
/// falls on a shared cell boundary, weight is split evenly across every
/// containing cell.
pub struct SpatialAllocator<'a> {
    pub grid: &'a GridDefinition,
    pub cache: &'a SurrogateCache,
    pub resolve_spec_for_record: &'a SpecResolver<'a>,
    pub resolve_spec_by_name: &'a dyn Fn(&str) -> Option<SurrogateSpec>,
    pub acquire_features: &'a dyn Fn(&SurrogateSpec, &SourceLocation) -> Result<Vec<WeightFeature>, SurrogateError>,
}

impl<'a> SpatialAllocator<'a> {
    /// Allocate an area record's surrogate onto the grid.
    pub fn allocate_area(&self, record: &Record, polygon: geo::Polygon<f64>, spatial_reference: &str) -> Result<Option<SparseGrid>, SurrogateError> {
        let Some(spec) = (self.resolve_spec_for_record)(record.fips(), record.scc(), record.country()) else {
            return Ok(None);
        };
        let source = SourceLocation { geometry: polygon, spatial_reference: spatial_reference.to_string(), name: record.key() };
        let resolved = crate::surrogate::surrogate(
            &spec,
            self.grid,
            &source,
            self.cache,
            self.resolve_spec_by_name,
            self.acquire_features,
        )?;
        Ok(resolved.map(|data| SparseGrid { cells: data.normalized_cells(), covered: data.covered_by_grid, in_grid: !data.cells.is_empty() }))
    }

    /// Allocate a point directly onto the grid, splitting evenly across any
    /// cells the point shares a boundary with.
    pub fn allocate_point(&self, point: Point<f64>) -> SparseGrid {
        let (rows, cols, inside) = self.grid.get_index(point.0);
        if !inside {
            return SparseGrid { cells: vec![], covered: false, in_grid: false };
        }
        SparseGrid::even_split(rows.into_iter().zip(cols).collect())
    }
}

/// Multiply a record's period totals through a [`SparseGrid`] to produce a
/// per-pollutant, per-cell emissions field for the `[begin, end)` window.
pub fn gridded_emissions(
    record: &Record,
    begin: DateTime<Utc>,
    end: DateTime<Utc>,
    distribution: &SparseGrid,
) -> HashMap<Pollutant, Vec<(u32, u32, Quantity)>> {
    let mut out: HashMap<Pollutant, Vec<(u32, u32, Quantity)>> = HashMap::new();
    for (pollutant, mass) in record.period_totals(begin, end) {
        let cells: Vec<(u32, u32, Quantity)> =
            distribution.cells.iter().map(|c| (c.row, c.col, Quantity::new(mass.value * c.weight, mass.dims))).collect();
        out.insert(pollutant, cells);
    }
    out
}

/// Wraps a record with a dense, per-cell adjustment factor array applied
/// element-wise to its gridded surrogate before emissions are scaled. This is
/// the single collapsed abstraction replacing the source's separate
/// "spatial-adjust record" and "gridded-adjusted record" types.
pub struct AdjustedRecord<'a> {
    pub record: &'a Record,
    /// `adjustment[row][col]`, same shape as the target grid.
    pub adjustment: ndarray::Array2<f64>,
}

impl<'a> AdjustedRecord<'a> {
    pub fn new(record: &'a Record, adjustment: ndarray::Array2<f64>) -> Self {
        Self { record, adjustment }
    }

    /// Apply the dense adjustment factors to `distribution`'s cell weights
    /// before the caller calls [`gridded_emissions`].
    pub fn adjust(&self, distribution: &SparseGrid) -> SparseGrid {
        let cells = distribution
            .cells
            .iter()
            .map(|c| {
                let factor = self.adjustment.get((c.row as usize, c.col as usize)).copied().unwrap_or(1.0);
                CachedCell { row: c.row, col: c.col, weight: c.weight * factor }
            })
            .collect();
        SparseGrid { cells, covered: distribution.covered, in_grid: distribution.in_grid }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn even_split_sums_to_one() {
        let split = SparseGrid::even_split(vec![(0, 0), (0, 1), (1, 0)]);
        let sum: f64 = split.cells.iter().map(|c| c.weight).sum();
        assert!((sum - 1.0).abs() < 1e-12);
    }

    #[test]
    fn adjusted_record_scales_each_cell() {
        let record = sample_record();
        let mut adj = ndarray::Array2::<f64>::ones((2, 2));
        adj[(0, 0)] = 2.0;
        let wrapped = AdjustedRecord::new(&record, adj);
        let base = SparseGrid::even_split(vec![(0, 0), (0, 1)]);
        let adjusted = wrapped.adjust(&base);
        assert_eq!(adjusted.cells[0].weight, base.cells[0].weight * 2.0);
        assert_eq!(adjusted.cells[1].weight, base.cells[1].weight);
    }

    fn sample_record() -> Record {
        use crate::emissions::EmissionsContainer;
        use crate::record::PolygonWithoutEcon;
        use crate::source::{SourceData, SourceType};
        Record::PolygonWithoutEcon(PolygonWithoutEcon {
            source: SourceData::new("37183", "10100602", SourceType::Area, "US"),
            emissions: EmissionsContainer::new(2016),
        })
    }
}
