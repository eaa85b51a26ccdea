//! Grid definitions and the R-tree index used to find which cell(s) a point
//! or polygon falls in.
use geo::{coord, BoundingRect, Coord, Polygon, Rect};
use rstar::{RTree, RTreeObject, AABB};

/// One cell of a [`GridDefinition`]: its polygon in the grid's spatial
/// reference, its row/column, and a scratch weight used while a surrogate is
/// being accumulated onto it.
#[derive(Debug, Clone)]
pub struct GridCell {
    pub polygon: Polygon<f64>,
    pub row: u32,
    pub col: u32,
    pub weight: f64,
}

impl GridCell {
    /// A copy of this cell with a different weight, as used when a new
    /// surrogate build starts accumulating onto the same grid geometry.
    pub fn with_weight(&self, weight: f64) -> GridCell {
        GridCell { polygon: self.polygon.clone(), row: self.row, col: self.col, weight }
    }

    fn bounds(&self) -> Rect<f64> {
        self.polygon.bounding_rect().expect("a grid cell polygon always has a bounding rect")
    }
}

struct IndexedCell {
    envelope: AABB<[f64; 2]>,
    cell_index: usize,
}

impl RTreeObject for IndexedCell {
    type Envelope = AABB<[f64; 2]>;
    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

fn rect_envelope(rect: Rect<f64>) -> AABB<[f64; 2]> {
    AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y])
}

fn rectangle_cell(x0: f64, y0: f64, dx: f64, dy: f64, row: u32, col: u32) -> GridCell {
    let x1 = x0 + dx;
    let y1 = y0 + dy;
    let polygon = Polygon::new(
        vec![
            coord! { x: x0, y: y0 },
            coord! { x: x1, y: y0 },
            coord! { x: x1, y: y1 },
            coord! { x: x0, y: y1 },
            coord! { x: x0, y: y0 },
        ]
        .into(),
        vec![],
    );
    GridCell { polygon, row, col, weight: 0.0 }
}

/// A regular or irregular grid: the set of cells a record's geometry gets
/// allocated onto, plus an R-tree for fast containment/overlap queries.
pub struct GridDefinition {
    pub name: String,
    pub nx: u32,
    pub ny: u32,
    pub dx: f64,
    pub dy: f64,
    pub origin: (f64, f64),
    pub spatial_reference: String,
    pub irregular: bool,
    cells: Vec<GridCell>,
    index: RTree<IndexedCell>,
}

impl GridDefinition {
    /// Build a regular grid of `nx` x `ny` rectangular cells of size `(dx,
    /// dy)` anchored at `origin` in `spatial_reference`.
    pub fn regular(
        name: impl Into<String>,
        nx: u32,
        ny: u32,
        dx: f64,
        dy: f64,
        origin: (f64, f64),
        spatial_reference: impl Into<String>,
    ) -> GridDefinition {
        let mut cells = Vec::with_capacity((nx * ny) as usize);
        for row in 0..ny {
            for col in 0..nx {
                let x0 = origin.0 + col as f64 * dx;
                let y0 = origin.1 + row as f64 * dy;
                cells.push(rectangle_cell(x0, y0, dx, dy, row, col));
            }
        }
        let index = build_index(&cells);
        GridDefinition {
            name: name.into(),
            nx,
            ny,
            dx,
            dy,
            origin,
            spatial_reference: spatial_reference.into(),
            irregular: false,
            cells,
            index,
        }
    }

    /// Build an irregular grid from caller-supplied polygons, already
    /// transformed into `spatial_reference`. Row is always 0; column is the
    /// polygon's position in `polygons`.
    pub fn irregular(name: impl Into<String>, polygons: Vec<Polygon<f64>>, spatial_reference: impl Into<String>) -> GridDefinition {
        let cells: Vec<GridCell> = polygons
            .into_iter()
            .enumerate()
            .map(|(i, polygon)| GridCell { polygon, row: 0, col: i as u32, weight: 0.0 })
            .collect();
        let nx = cells.len() as u32;
        let index = build_index(&cells);
        GridDefinition {
            name: name.into(),
            nx,
            ny: 1,
            dx: f64::NAN,
            dy: f64::NAN,
            origin: (f64::NAN, f64::NAN),
            spatial_reference: spatial_reference.into(),
            irregular: true,
            cells,
            index,
        }
    }

    pub fn cells(&self) -> &[GridCell] {
        &self.cells
    }

    /// Every cell whose bounding envelope intersects `bounds`. Used as the
    /// surrogate builder's cell pre-filter.
    pub fn cells_overlapping(&self, bounds: Rect<f64>) -> Vec<&GridCell> {
        self.index
            .locate_in_envelope_intersecting(&rect_envelope(bounds))
            .map(|ic| &self.cells[ic.cell_index])
            .collect()
    }

    /// Every cell whose bounds contain `point`. A point lying exactly on a
    /// shared edge between cells is reported as inside every one of them, per
    /// the spec's tie-break rule.
    pub fn get_index(&self, point: Coord<f64>) -> (Vec<u32>, Vec<u32>, bool) {
        let query = AABB::from_point([point.x, point.y]);
        let mut rows = vec![];
        let mut cols = vec![];
        for ic in self.index.locate_in_envelope_intersecting(&query) {
            let cell = &self.cells[ic.cell_index];
            let b = cell.bounds();
            if point.x >= b.min().x && point.x <= b.max().x && point.y >= b.min().y && point.y <= b.max().y {
                rows.push(cell.row);
                cols.push(cell.col);
            }
        }
        let inside = !rows.is_empty();
        (rows, cols, inside)
    }

    /// The grid's overall extent as the bounding rectangle of every cell.
    pub fn extent(&self) -> Option<Rect<f64>> {
        self.cells.iter().map(|c| c.bounds()).reduce(|a, b| {
            let min_x = a.min().x.min(b.min().x);
            let min_y = a.min().y.min(b.min().y);
            let max_x = a.max().x.max(b.max().x);
            let max_y = a.max().y.max(b.max().y);
            Rect::new(coord! { x: min_x, y: min_y }, coord! { x: max_x, y: max_y })
        })
    }
}

fn build_index(cells: &[GridCell]) -> RTree<IndexedCell> {
    let entries: Vec<IndexedCell> = cells
        .iter()
        .enumerate()
        .map(|(i, c)| IndexedCell { envelope: rect_envelope(c.bounds()), cell_index: i })
        .collect();
    RTree::bulk_load(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_index_finds_containing_cell() {
        let grid = GridDefinition::regular("test", 4, 4, 1.0, 1.0, (0.0, 0.0), "EPSG:4326");
        let (rows, cols, inside) = grid.get_index(coord! { x: 1.5, y: 1.5 });
        assert!(inside);
        assert_eq!(rows, vec![1]);
        assert_eq!(cols, vec![1]);
    }

    #[test]
    fn get_index_shared_edge_reports_every_touching_cell() {
        let grid = GridDefinition::regular("test", 4, 4, 1.0, 1.0, (0.0, 0.0), "EPSG:4326");
        let (rows, _cols, inside) = grid.get_index(coord! { x: 1.0, y: 1.5 });
        assert!(inside);
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn get_index_outside_grid_reports_not_inside() {
        let grid = GridDefinition::regular("test", 4, 4, 1.0, 1.0, (0.0, 0.0), "EPSG:4326");
        let (_rows, _cols, inside) = grid.get_index(coord! { x: 100.0, y: 100.0 });
        assert!(!inside);
    }

    #[test]
    fn regular_grid_has_nx_times_ny_cells() {
        let grid = GridDefinition::regular("test", 3, 5, 2.0, 2.0, (0.0, 0.0), "EPSG:4326");
        assert_eq!(grid.cells().len(), 15);
    }
}
