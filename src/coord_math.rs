//! Pure, stateless coordinate math over [`BoundingBox`]es and tile grids.
//!
//! Grounded on `pka_tile_grid`'s `tms.rs` (`xy`, `xy_tile`, `xy_bounds`,
//! `tiles`) and `transform/basic.rs` (`lonlat_to_merc`): the same
//! closed-form spherical Web Mercator projection is used here, generalized
//! from a configurable tile-matrix-set CRS to the two fixed CRSes this
//! engine needs.
//!
//! ## Edge policy
//! A tile is included in a grid if its half-open `[min, max)` extent
//! overlaps the query box; an edge falling exactly on a tile boundary
//! belongs to the lower tile. This is implemented by flooring minimum
//! indices and `ceil - 1`-ing maximum indices.

use crate::crs::Crs;
use crate::error::{RetileError, Result};
use crate::model::{BoundingBox, TileGrid, MAX_MERCATOR_LATITUDE};
use std::f64::consts::PI;

/// Earth radius (meters) used by the spherical Web Mercator projection.
const EARTH_RADIUS: f64 = 6_378_137.0;

/// Half the circumference of the spherical Web Mercator world, in meters —
/// the coordinate of the right/top edge of the full-world bbox.
const MERCATOR_ORIGIN: f64 = EARTH_RADIUS * PI;

/// Projects a bounding box from WGS84 into spherical web-mercator.
pub fn to_web_mercator(bbox: &BoundingBox) -> Result<BoundingBox> {
    require_crs(bbox, Crs::Wgs84)?;
    let (min_x, min_y) = lonlat_to_merc(bbox.min_x, bbox.min_y);
    let (max_x, max_y) = lonlat_to_merc(bbox.max_x, bbox.max_y);
    Ok(BoundingBox::new(min_x, min_y, max_x, max_y, Crs::WebMercator))
}

/// Inverse of [`to_web_mercator`].
pub fn to_wgs84(bbox: &BoundingBox) -> Result<BoundingBox> {
    require_crs(bbox, Crs::WebMercator)?;
    let (min_x, min_y) = merc_to_lonlat(bbox.min_x, bbox.min_y);
    let (max_x, max_y) = merc_to_lonlat(bbox.max_x, bbox.max_y);
    Ok(BoundingBox::new_wgs84(min_x, min_y, max_x, max_y))
}

/// Returns the Spherical Mercator (x, y) in meters for a WGS84 (lon, lat).
fn lonlat_to_merc(lon: f64, lat: f64) -> (f64, f64) {
    let lat = lat.clamp(-MAX_MERCATOR_LATITUDE, MAX_MERCATOR_LATITUDE);
    let x = EARTH_RADIUS * lon.to_radians();
    let y = EARTH_RADIUS * ((PI * 0.25) + (0.5 * lat.to_radians())).tan().ln();
    (x, y)
}

/// Inverse of [`lonlat_to_merc`].
fn merc_to_lonlat(x: f64, y: f64) -> (f64, f64) {
    let lon = (x / EARTH_RADIUS).to_degrees();
    let lat = (2.0 * (y / EARTH_RADIUS).exp().atan() - PI / 2.0).to_degrees();
    (lon, lat)
}

fn require_crs(bbox: &BoundingBox, expected: Crs) -> Result<()> {
    if bbox.crs == expected {
        Ok(())
    } else {
        Err(RetileError::CoordMath(format!(
            "expected bbox in {:?}, got {:?}",
            expected, bbox.crs
        )))
    }
}

/// Number of tiles along one side of the global grid at `zoom`.
#[must_use]
pub fn tiles_per_side(zoom: u8) -> u32 {
    1u32 << zoom
}

/// Floor the minimum edge, `ceil - 1` the maximum edge, of a coordinate
/// range measured in tile-size units, then clamp to `[0, max_index]`.
fn edge_indices(coord_min: f64, coord_max: f64, tile_size: f64, max_index: u32) -> (u32, u32) {
    let i_min = (coord_min / tile_size).floor();
    let i_max = (coord_max / tile_size).ceil() - 1.0;
    let clamp = |v: f64| -> u32 {
        if v <= 0.0 {
            0
        } else if v >= f64::from(max_index) {
            max_index
        } else {
            v as u32
        }
    };
    let i_min = clamp(i_min);
    let i_max = clamp(i_max.max(i_min as f64));
    (i_min, i_max)
}

/// The inclusive range of *global* web-mercator tiles intersecting `bbox`
/// at `zoom`.
pub fn tile_grid(bbox: &BoundingBox, zoom: u8) -> Result<TileGrid> {
    require_crs(bbox, Crs::WebMercator)?;
    let max_index = tiles_per_side(zoom) - 1;
    let tile_size = 2.0 * MERCATOR_ORIGIN / f64::from(tiles_per_side(zoom));

    let (x_min, x_max) = edge_indices(bbox.min_x + MERCATOR_ORIGIN, bbox.max_x + MERCATOR_ORIGIN, tile_size, max_index);
    // Row 0 is the northernmost tile: normalize so that larger `v` is further south.
    let (y_min, y_max) = edge_indices(
        MERCATOR_ORIGIN - bbox.max_y,
        MERCATOR_ORIGIN - bbox.min_y,
        tile_size,
        max_index,
    );

    Ok(TileGrid::new(x_min, y_min, x_max, y_max))
}

/// The analogous routine for a fitted grid: `outer_bbox` is divided into
/// `matrix_width x matrix_height` equal cells, and this returns the
/// inclusive cell-range covering `request_bbox`.
pub fn tile_grid_in_box(
    outer_bbox: &BoundingBox,
    matrix_width: u32,
    matrix_height: u32,
    request_bbox: &BoundingBox,
) -> Result<TileGrid> {
    let cell_width = outer_bbox.width() / f64::from(matrix_width);
    let cell_height = outer_bbox.height() / f64::from(matrix_height);

    let (x_min, x_max) = edge_indices(
        request_bbox.min_x - outer_bbox.min_x,
        request_bbox.max_x - outer_bbox.min_x,
        cell_width,
        matrix_width - 1,
    );
    let (y_min, y_max) = edge_indices(
        outer_bbox.max_y - request_bbox.max_y,
        outer_bbox.max_y - request_bbox.min_y,
        cell_height,
        matrix_height - 1,
    );

    Ok(TileGrid::new(x_min, y_min, x_max, y_max))
}

/// The exact web-mercator extent of a *global* tile grid.
pub fn web_mercator_bbox_of_tile(grid: &TileGrid, zoom: u8) -> BoundingBox {
    let tile_size = 2.0 * MERCATOR_ORIGIN / f64::from(tiles_per_side(zoom));
    let min_x = -MERCATOR_ORIGIN + f64::from(grid.min_x) * tile_size;
    let max_x = -MERCATOR_ORIGIN + f64::from(grid.max_x + 1) * tile_size;
    let max_y = MERCATOR_ORIGIN - f64::from(grid.min_y) * tile_size;
    let min_y = MERCATOR_ORIGIN - f64::from(grid.max_y + 1) * tile_size;
    BoundingBox::new(min_x, min_y, max_x, max_y, Crs::WebMercator)
}

/// The extent of a single `(col, row)` cell of a fitted grid.
pub fn web_mercator_bbox_of_fitted(
    outer_bbox: &BoundingBox,
    matrix_width: u32,
    matrix_height: u32,
    col: u32,
    row: u32,
) -> BoundingBox {
    let cell_width = outer_bbox.width() / f64::from(matrix_width);
    let cell_height = outer_bbox.height() / f64::from(matrix_height);
    let min_x = outer_bbox.min_x + f64::from(col) * cell_width;
    let max_x = min_x + cell_width;
    let max_y = outer_bbox.max_y - f64::from(row) * cell_height;
    let min_y = max_y - cell_height;
    BoundingBox::new(min_x, min_y, max_x, max_y, outer_bbox.crs)
}

/// The row index of the cell of a `matrix_height`-tall fitted grid
/// containing `y`. `y` is in the same units/CRS as `outer_bbox`.
#[must_use]
pub fn tile_row_of(outer_bbox: &BoundingBox, matrix_height: u32, y: f64) -> u32 {
    let cell_height = outer_bbox.height() / f64::from(matrix_height);
    let v = (outer_bbox.max_y - y) / cell_height;
    v.floor().clamp(0.0, f64::from(matrix_height - 1)) as u32
}

/// The column index of the cell of a `matrix_width`-wide fitted grid
/// containing `x`.
#[must_use]
pub fn tile_column_of(outer_bbox: &BoundingBox, matrix_width: u32, x: f64) -> u32 {
    let cell_width = outer_bbox.width() / f64::from(matrix_width);
    let v = (x - outer_bbox.min_x) / cell_width;
    v.floor().clamp(0.0, f64::from(matrix_width - 1)) as u32
}

/// Component-wise min/max of two boxes in a shared CRS.
pub fn union(a: &BoundingBox, b: &BoundingBox) -> Result<BoundingBox> {
    require_crs(b, a.crs)?;
    Ok(BoundingBox::new(
        a.min_x.min(b.min_x),
        a.min_y.min(b.min_y),
        a.max_x.max(b.max_x),
        a.max_y.max(b.max_y),
        a.crs,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, 0, 0)]
    #[case(1, 0, 0)]
    #[case(1, 1, 1)]
    #[case(5, 3, 17)]
    #[case(10, 512, 1000)]
    #[case(22, 1_000_000, 2_000_000)]
    fn grid_box_round_trip(#[case] zoom: u8, #[case] x: u32, #[case] y: u32) {
        let grid = TileGrid::new(x, y, x, y);
        let bbox = web_mercator_bbox_of_tile(&grid, zoom);
        let round_tripped = tile_grid(&bbox, zoom).unwrap();
        assert_eq!(round_tripped, grid, "zoom={zoom} x={x} y={y}");
    }

    #[test]
    fn tiles_per_side_is_power_of_two() {
        assert_eq!(tiles_per_side(0), 1);
        assert_eq!(tiles_per_side(1), 2);
        assert_eq!(tiles_per_side(10), 1024);
    }

    #[test]
    fn full_world_at_zoom_zero_is_single_tile() {
        let bbox = to_web_mercator(&BoundingBox::full_world_wgs84()).unwrap();
        let grid = tile_grid(&bbox, 0).unwrap();
        assert_eq!(grid, TileGrid::new(0, 0, 0, 0));
    }

    #[test]
    fn full_world_at_zoom_one_is_four_tiles() {
        let bbox = to_web_mercator(&BoundingBox::full_world_wgs84()).unwrap();
        let grid = tile_grid(&bbox, 1).unwrap();
        assert_eq!(grid, TileGrid::new(0, 0, 1, 1));
        assert_eq!(grid.count(), 4);
    }

    #[test]
    fn edge_exactly_on_tile_boundary_does_not_double_count() {
        // The full width at zoom 1 spans two tiles; a box stopping exactly
        // at the shared boundary must not pull in the next tile.
        let tile_size = 2.0 * MERCATOR_ORIGIN / 2.0;
        let bbox = BoundingBox::new(-MERCATOR_ORIGIN, -MERCATOR_ORIGIN, -MERCATOR_ORIGIN + tile_size, MERCATOR_ORIGIN, Crs::WebMercator);
        let grid = tile_grid(&bbox, 1).unwrap();
        assert_eq!(grid.min_x, 0);
        assert_eq!(grid.max_x, 0, "box ending exactly on the boundary must not include the next tile");
    }

    #[test]
    fn union_is_component_wise_min_max() {
        let a = BoundingBox::new_wgs84(-10.0, -5.0, 10.0, 5.0);
        let b = BoundingBox::new_wgs84(-20.0, -2.0, 5.0, 20.0);
        let u = union(&a, &b).unwrap();
        assert_eq!((u.min_x, u.min_y, u.max_x, u.max_y), (-20.0, -5.0, 10.0, 20.0));
    }

    #[test]
    fn tile_grid_in_box_fits_single_cell() {
        let outer = BoundingBox::new_wgs84(-10.0, -10.0, 10.0, 10.0);
        let request = BoundingBox::new_wgs84(-1.0, -1.0, 1.0, 1.0);
        let grid = tile_grid_in_box(&outer, 1, 1, &request).unwrap();
        assert_eq!(grid, TileGrid::new(0, 0, 0, 0));
    }

    #[test]
    fn pixel_size_formula_matches_bbox() {
        let outer = to_web_mercator(&BoundingBox::full_world_wgs84()).unwrap();
        let matrix_width = 4u32;
        let matrix_height = 4u32;
        let tile_width = 256u32;
        let matrix = crate::model::TileMatrix::with_pixel_size(2, matrix_width, matrix_height, tile_width, tile_width, &outer);
        let reconstructed_width = matrix.pixel_x_size * f64::from(matrix_width) * f64::from(tile_width);
        assert!((reconstructed_width - outer.width()).abs() < 1e-6);
        let reconstructed_height = matrix.pixel_y_size * f64::from(matrix_height) * f64::from(tile_width);
        assert!((reconstructed_height - outer.height()).abs() < 1e-6);
    }

    #[test]
    fn tile_row_and_column_agree_with_tile_grid_in_box() {
        let outer = BoundingBox::new_wgs84(-10.0, -10.0, 10.0, 10.0);
        let (cx, cy) = (3.0, -4.0);
        let col = tile_column_of(&outer, 20, cx);
        let row = tile_row_of(&outer, 20, cy);
        let cell = web_mercator_bbox_of_fitted(&outer, 20, 20, col, row);
        assert!(cell.min_x <= cx && cx < cell.max_x);
        assert!(cell.min_y <= cy && cy < cell.max_y);
    }
}
