//! The data model shared by [`crate::coord_math`], the [`crate::engine`]
//! state machine, and the [`crate::container`] DAOs.

use crate::crs::Crs;

/// A `min ≤ max` rectangle in some [`Crs`]. When `crs` is [`Crs::Wgs84`],
/// `min_y`/`max_y` are additionally clamped to the Web-Mercator-representable
/// latitude range by [`BoundingBox::new_wgs84`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
    pub crs: Crs,
}

/// Latitude beyond which the Web Mercator projection is undefined for
/// practical purposes: `atan(sinh(pi)) in degrees`.
pub const MAX_MERCATOR_LATITUDE: f64 = 85.051_128_779_806_6;

impl BoundingBox {
    /// Construct a bounding box, enforcing `min ≤ max` on both axes.
    #[must_use]
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64, crs: Crs) -> Self {
        debug_assert!(min_x <= max_x, "min_x ({min_x}) must be <= max_x ({max_x})");
        debug_assert!(min_y <= max_y, "min_y ({min_y}) must be <= max_y ({max_y})");
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
            crs,
        }
    }

    /// Construct a WGS84 bounding box, clamping latitudes to the
    /// Web-Mercator-safe range.
    #[must_use]
    pub fn new_wgs84(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        Self::new(
            min_lon,
            min_lat.clamp(-MAX_MERCATOR_LATITUDE, MAX_MERCATOR_LATITUDE),
            max_lon,
            max_lat.clamp(-MAX_MERCATOR_LATITUDE, MAX_MERCATOR_LATITUDE),
            Crs::Wgs84,
        )
    }

    /// The full world, in WGS84, clamped to mercator-safe latitudes.
    #[must_use]
    pub fn full_world_wgs84() -> Self {
        Self::new_wgs84(-180.0, -MAX_MERCATOR_LATITUDE, 180.0, MAX_MERCATOR_LATITUDE)
    }

    #[must_use]
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    #[must_use]
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    #[must_use]
    pub fn center(&self) -> (f64, f64) {
        ((self.min_x + self.max_x) / 2.0, (self.min_y + self.max_y) / 2.0)
    }
}

/// An inclusive rectangle of tile columns/rows at some zoom level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGrid {
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
}

impl TileGrid {
    #[must_use]
    pub fn new(min_x: u32, min_y: u32, max_x: u32, max_y: u32) -> Self {
        debug_assert!(min_x <= max_x);
        debug_assert!(min_y <= max_y);
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }

    #[must_use]
    pub fn count(&self) -> u64 {
        u64::from(self.width()) * u64::from(self.height())
    }

    /// Ascending `(x, y)` iteration, `x` fastest-varying within each row —
    /// the order fresh tile generation requires.
    pub fn iter(&self) -> TileGridIter {
        TileGridIter {
            grid: *self,
            x: self.min_x,
            y: self.min_y,
            done: false,
        }
    }
}

/// Iterator over `(x, y)` pairs of a [`TileGrid`], ascending.
pub struct TileGridIter {
    grid: TileGrid,
    x: u32,
    y: u32,
    done: bool,
}

impl Iterator for TileGridIter {
    type Item = (u32, u32);

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let current = (self.x, self.y);
        if self.x < self.grid.max_x {
            self.x += 1;
        } else if self.y < self.grid.max_y {
            self.x = self.grid.min_x;
            self.y += 1;
        } else {
            self.done = true;
        }
        Some(current)
    }
}

/// Whether a tile table addresses tiles globally (`Google`) or locally
/// fitted to a bounding box (`Fitted`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressingFormat {
    Google,
    Fitted,
}

impl AddressingFormat {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            AddressingFormat::Google => "google",
            AddressingFormat::Fitted => "fitted",
        }
    }
}

/// One tile table's outer matrix-set bounding box and format.
#[derive(Debug, Clone, PartialEq)]
pub struct TileMatrixSet {
    pub table_name: String,
    pub bbox: BoundingBox,
    pub format: AddressingFormat,
}

/// Per-`(table, zoom)` matrix dimensions and pixel geometry.
/// Invariant: `pixel_x_size = matrix_set.width / matrix_width / tile_width`
/// (and analogously for Y).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileMatrix {
    pub zoom: u8,
    pub matrix_width: u32,
    pub matrix_height: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub pixel_x_size: f64,
    pub pixel_y_size: f64,
}

impl TileMatrix {
    /// Compute `pixel_x_size`/`pixel_y_size` from a matrix-set bounding box.
    #[must_use]
    pub fn with_pixel_size(
        zoom: u8,
        matrix_width: u32,
        matrix_height: u32,
        tile_width: u32,
        tile_height: u32,
        bbox: &BoundingBox,
    ) -> Self {
        Self {
            zoom,
            matrix_width,
            matrix_height,
            tile_width,
            tile_height,
            pixel_x_size: bbox.width() / f64::from(matrix_width) / f64::from(tile_width),
            pixel_y_size: bbox.height() / f64::from(matrix_height) / f64::from(tile_height),
        }
    }
}

/// A persisted tile. `(zoom, tile_column, tile_row)` is the unique key.
#[derive(Debug, Clone, PartialEq)]
pub struct TileRow {
    pub zoom: u8,
    pub tile_column: u32,
    pub tile_row: u32,
    pub data: Vec<u8>,
}

/// The table's content row: bounding box, last-modified timestamp, table type.
#[derive(Debug, Clone, PartialEq)]
pub struct Contents {
    pub table_name: String,
    pub bbox: BoundingBox,
    pub last_change: chrono::DateTime<chrono::Utc>,
    pub data_type: &'static str,
}

impl Contents {
    #[must_use]
    pub fn tiles(table_name: impl Into<String>, bbox: BoundingBox, last_change: chrono::DateTime<chrono::Utc>) -> Self {
        Self {
            table_name: table_name.into(),
            bbox,
            last_change,
            data_type: "tiles",
        }
    }
}
