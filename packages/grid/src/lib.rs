#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Grid generation over a geographic bounding box.
//!
//! The box is divided into rectangular cells whose ground size is close to
//! a target resolution in kilometres. Latitude degrees are treated as a
//! fixed 111.0 km and longitude degrees as `111.320 * cos(mid_latitude)`
//! km, so cells are approximately equal-area near the box's middle
//! latitude. Cells touching the eastern or northern edge are clipped to the
//! box.
//!
//! Cells are produced in row-major order: row 0 is the southernmost row and
//! columns run west to east. Uniform striding over that order (see
//! [`Grid::sampled`]) therefore spreads samples across the whole box.

use geo::{Coord, Point, Rect};
use landwatch_geography_models::BoundingBox;

/// Kilometres per degree of latitude.
pub const KM_PER_DEGREE_LAT: f64 = 111.0;

/// Kilometres per degree of longitude at the equator.
pub const KM_PER_DEGREE_LON_EQUATOR: f64 = 111.320;

/// Relative slack applied before rounding a span up to whole cells.
pub const SPAN_TOLERANCE: f64 = 1e-9;

/// Upper bound on the number of cells a single grid may contain.
pub const MAX_CELLS: usize = 10_000_000;

/// Errors raised while building a grid.
#[derive(Debug, thiserror::Error)]
pub enum GridError {
    /// The requested cell size is not a positive finite number.
    #[error("invalid cell size {cell_km} km: must be finite and greater than zero")]
    InvalidCellSize {
        /// The rejected cell size.
        cell_km: f64,
    },

    /// The box cannot be divided at the requested resolution.
    #[error("grid of {rows} rows x {cols} cols exceeds the limit of {} cells", MAX_CELLS)]
    TooManyCells {
        /// Row count the resolution would require.
        rows: usize,
        /// Column count the resolution would require.
        cols: usize,
    },
}

/// A single grid cell and its centroid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridCell {
    /// Zero-based row index, counted from the south.
    pub row: usize,
    /// Zero-based column index, counted from the west.
    pub col: usize,
    /// Cell extent in degrees (x = longitude, y = latitude).
    pub rect: Rect<f64>,
    /// Centre of [`Self::rect`].
    pub centroid: Point<f64>,
}

/// A rectangular tiling of a bounding box.
#[derive(Debug, Clone)]
pub struct Grid {
    bbox: BoundingBox,
    cell_km: f64,
    cell_lat: f64,
    cell_lon: f64,
    rows: usize,
    cols: usize,
    cells: Vec<GridCell>,
}

impl Grid {
    #[must_use]
    pub const fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }

    /// Target cell size in kilometres.
    #[must_use]
    pub const fn cell_km(&self) -> f64 {
        self.cell_km
    }

    /// Cell size in degrees as `(latitude, longitude)`.
    #[must_use]
    pub const fn cell_degrees(&self) -> (f64, f64) {
        (self.cell_lat, self.cell_lon)
    }

    /// Grid dimensions as `(rows, cols)`.
    #[must_use]
    pub const fn dims(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    #[must_use]
    pub fn cells(&self) -> &[GridCell] {
        &self.cells
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Every k-th cell in row-major order, starting with the first, where
    /// `k = sample_step(self.len(), target)`.
    pub fn sampled(&self, target: usize) -> impl Iterator<Item = &GridCell> {
        self.cells.iter().step_by(sample_step(self.cells.len(), target))
    }
}

/// Stride that reduces `count` items to at most `target` samples.
///
/// Returns `max(1, ceil(count / target))`. A `target` of zero disables
/// sampling and yields a stride of 1.
#[must_use]
pub const fn sample_step(count: usize, target: usize) -> usize {
    if target == 0 {
        return 1;
    }
    let step = count.div_ceil(target);
    if step == 0 { 1 } else { step }
}

/// Divides `bbox` into cells of roughly `cell_km` x `cell_km`.
///
/// # Errors
///
/// * [`GridError::InvalidCellSize`] if `cell_km` is not finite or not
///   strictly positive
/// * [`GridError::TooManyCells`] if the resolution would produce more than
///   [`MAX_CELLS`] cells
pub fn build_grid(bbox: &BoundingBox, cell_km: f64) -> Result<Grid, GridError> {
    if !cell_km.is_finite() || cell_km <= 0.0 {
        return Err(GridError::InvalidCellSize { cell_km });
    }

    let km_per_lon = KM_PER_DEGREE_LON_EQUATOR * bbox.mid_latitude().to_radians().cos();
    let cell_lat = cell_km / KM_PER_DEGREE_LAT;
    // At the poles a longitude degree shrinks to nothing; one column then
    // spans the whole width.
    let cell_lon = if km_per_lon > f64::EPSILON {
        cell_km / km_per_lon
    } else {
        bbox.width()
    };

    let rows = span_count(bbox.height(), cell_lat);
    let cols = span_count(bbox.width(), cell_lon);

    if rows.saturating_mul(cols) > MAX_CELLS {
        return Err(GridError::TooManyCells { rows, cols });
    }

    let mut cells = Vec::with_capacity(rows * cols);
    for row in 0..rows {
        #[allow(clippy::cast_precision_loss)]
        let y1 = (row as f64).mul_add(cell_lat, bbox.south());
        let y2 = (y1 + cell_lat).min(bbox.north());

        for col in 0..cols {
            #[allow(clippy::cast_precision_loss)]
            let x1 = (col as f64).mul_add(cell_lon, bbox.west());
            let x2 = (x1 + cell_lon).min(bbox.east());

            let rect = Rect::new(Coord { x: x1, y: y1 }, Coord { x: x2, y: y2 });
            cells.push(GridCell {
                row,
                col,
                rect,
                centroid: Point::from(rect.center()),
            });
        }
    }

    log::debug!(
        "Built {rows}x{cols} grid ({} cells) over {bbox} at {cell_km} km",
        cells.len()
    );

    Ok(Grid {
        bbox: *bbox,
        cell_km,
        cell_lat,
        cell_lon,
        rows,
        cols,
        cells,
    })
}

/// `max(1, ceil(span / step))`, saturating for absurd ratios.
///
/// A ratio within [`SPAN_TOLERANCE`] (relative) above a whole number is
/// taken as that number, so rounding noise in `span / step` never adds a
/// zero-height row or zero-width column on the far edge.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn span_count(span: f64, step: f64) -> usize {
    let ratio = span / step;
    let n = ratio.mul_add(-SPAN_TOLERANCE, ratio).ceil();
    if n.is_finite() && n >= 1.0 {
        if n >= usize::MAX as f64 {
            usize::MAX
        } else {
            n as usize
        }
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manitoba() -> BoundingBox {
        BoundingBox::new(-102.0, 49.0, -95.0, 55.0).unwrap()
    }

    #[test]
    fn scenario_dimensions_at_five_km() {
        let grid = build_grid(&manitoba(), 5.0).unwrap();
        assert_eq!(grid.dims(), (134, 96));
        assert_eq!(grid.len(), 12_864);

        let (dlat, dlon) = grid.cell_degrees();
        assert!((dlat - 0.045_045_045_045_045_04).abs() < 1e-12);
        assert!((dlon - 0.072_954_960_720_568_81).abs() < 1e-9);
    }

    #[test]
    fn cells_cover_box_without_exceeding_it() {
        let bbox = manitoba();
        let grid = build_grid(&bbox, 25.0).unwrap();

        let mut area = 0.0;
        for cell in grid.cells() {
            let min = cell.rect.min();
            let max = cell.rect.max();
            assert!(min.x >= bbox.west() && max.x <= bbox.east());
            assert!(min.y >= bbox.south() && max.y <= bbox.north());
            assert!(max.x > min.x && max.y > min.y);
            area += cell.rect.width() * cell.rect.height();
        }

        let expected = bbox.width() * bbox.height();
        assert!((area - expected).abs() < 1e-9, "area {area} != {expected}");

        let max_x = grid
            .cells()
            .iter()
            .map(|c| c.rect.max().x)
            .fold(f64::MIN, f64::max);
        let max_y = grid
            .cells()
            .iter()
            .map(|c| c.rect.max().y)
            .fold(f64::MIN, f64::max);
        assert!((max_x - bbox.east()).abs() < f64::EPSILON);
        assert!((max_y - bbox.north()).abs() < f64::EPSILON);
    }

    #[test]
    fn cell_count_matches_ceil_formula() {
        let bbox = BoundingBox::new(-80.0, 43.0, -79.0, 44.0).unwrap();
        let grid = build_grid(&bbox, 7.5).unwrap();
        let (dlat, dlon) = grid.cell_degrees();
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let expected = ((bbox.width() / dlon).ceil() as usize) * ((bbox.height() / dlat).ceil() as usize);
        assert_eq!(grid.len(), expected);
    }

    #[test]
    fn exact_multiple_span_adds_no_empty_row() {
        assert_eq!(span_count(6.0, 0.3 / KM_PER_DEGREE_LAT), 2220);
        assert_eq!(span_count(6.0, 0.3 / KM_PER_DEGREE_LAT * 1.001), 2218);

        let bbox = BoundingBox::new(-102.0, 49.0, -101.99, 55.0).unwrap();
        let grid = build_grid(&bbox, 0.3).unwrap();
        assert_eq!(grid.dims().0, 2220);
        assert!(grid.cells().iter().all(|c| c.rect.height() > 1e-6));
        let last = grid.cells().last().unwrap();
        assert!((last.rect.max().y - 55.0).abs() < 1e-9);
    }

    #[test]
    fn cells_are_row_major_from_south_west() {
        let grid = build_grid(&manitoba(), 50.0).unwrap();
        let (_, cols) = grid.dims();
        let cells = grid.cells();

        assert_eq!((cells[0].row, cells[0].col), (0, 0));
        assert!((cells[0].rect.min().x - -102.0).abs() < f64::EPSILON);
        assert!((cells[0].rect.min().y - 49.0).abs() < f64::EPSILON);
        assert_eq!((cells[1].row, cells[1].col), (0, 1));
        assert_eq!((cells[cols].row, cells[cols].col), (1, 0));
        assert!(cells[cols].centroid.y() > cells[0].centroid.y());
    }

    #[test]
    fn edge_cells_are_clipped() {
        let grid = build_grid(&manitoba(), 50.0).unwrap();
        let (dlat, dlon) = grid.cell_degrees();
        let last = grid.cells().last().unwrap();
        assert!(last.rect.width() <= dlon + 1e-12);
        assert!(last.rect.height() <= dlat + 1e-12);
        assert!((last.rect.max().x - -95.0).abs() < f64::EPSILON);
        assert!((last.rect.max().y - 55.0).abs() < f64::EPSILON);
    }

    #[test]
    fn centroid_is_cell_centre() {
        let grid = build_grid(&manitoba(), 30.0).unwrap();
        for cell in grid.cells() {
            let c = cell.rect.center();
            assert!((cell.centroid.x() - c.x).abs() < 1e-12);
            assert!((cell.centroid.y() - c.y).abs() < 1e-12);
        }
    }

    #[test]
    fn box_smaller_than_cell_yields_single_cell() {
        let bbox = BoundingBox::new(-100.0, 50.0, -99.99, 50.01).unwrap();
        let grid = build_grid(&bbox, 5.0).unwrap();
        assert_eq!(grid.dims(), (1, 1));
        let cell = grid.cells()[0];
        assert!((cell.rect.min().x - -100.0).abs() < f64::EPSILON);
        assert!((cell.rect.max().x - -99.99).abs() < f64::EPSILON);
        assert!((cell.rect.max().y - 50.01).abs() < f64::EPSILON);
    }

    #[test]
    fn rejects_invalid_cell_size() {
        let bbox = manitoba();
        assert!(matches!(
            build_grid(&bbox, 0.0),
            Err(GridError::InvalidCellSize { .. })
        ));
        assert!(matches!(
            build_grid(&bbox, -5.0),
            Err(GridError::InvalidCellSize { .. })
        ));
        assert!(matches!(
            build_grid(&bbox, f64::NAN),
            Err(GridError::InvalidCellSize { .. })
        ));
        assert!(matches!(
            build_grid(&bbox, f64::INFINITY),
            Err(GridError::InvalidCellSize { .. })
        ));
    }

    #[test]
    fn rejects_resolution_that_explodes_cell_count() {
        assert!(matches!(
            build_grid(&manitoba(), 0.001),
            Err(GridError::TooManyCells { .. })
        ));
    }

    #[test]
    fn sample_step_policy() {
        assert_eq!(sample_step(12_864, 300), 43);
        assert_eq!(sample_step(300, 300), 1);
        assert_eq!(sample_step(301, 300), 2);
        assert_eq!(sample_step(10, 300), 1);
        assert_eq!(sample_step(0, 300), 1);
        assert_eq!(sample_step(10, 0), 1);
    }

    #[test]
    fn scenario_sampling_yields_three_hundred_points() {
        let grid = build_grid(&manitoba(), 5.0).unwrap();
        let sampled: Vec<_> = grid.sampled(300).collect();
        assert_eq!(sampled.len(), 300);
        assert_eq!(sampled[0], &grid.cells()[0]);
        assert_eq!(sampled[1], &grid.cells()[43]);
    }
}
