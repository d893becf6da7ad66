//! The container collaborator: DAOs for the spatial reference registry,
//! the contents row, the tile-matrix-set row, the per-zoom tile-matrix
//! rows, and the per-table tile store.
//!
//! A concrete implementation ([`sqlite::SqliteContainer`]) is provided so
//! the engine is exercisable end to end, grounded on
//! `versatiles_container::container::mbtiles::writer::MBTilesWriter`'s use
//! of a pooled `r2d2_sqlite` connection, generalized to the richer
//! GeoPackage-style schema this engine needs.

pub mod sqlite;

use crate::crs::Crs;
use crate::error::Result;
use crate::model::{AddressingFormat, Contents, TileGrid, TileMatrix, TileMatrixSet, TileRow};

/// The container collaborator's DAO surface.
pub trait TileContainer {
    // -- spatial_reference --
    /// Registers `crs` in the spatial reference registry if not already
    /// present; idempotent.
    fn get_or_create_srs(&self, crs: Crs) -> Result<()>;

    // -- contents --
    fn contents_query_by_id(&self, table: &str) -> Result<Option<Contents>>;
    fn contents_update(&self, contents: &Contents) -> Result<()>;
    fn contents_get_srs(&self, table: &str) -> Result<Option<Crs>>;

    // -- tile_matrix_set --
    fn tile_matrix_set_table_exists(&self, table: &str) -> Result<bool>;
    fn tile_matrix_set_query_for_id(&self, table: &str) -> Result<Option<TileMatrixSet>>;
    fn tile_matrix_set_create(
        &self,
        table: &str,
        bbox_wgs84: &crate::model::BoundingBox,
        bbox_web_mercator: &crate::model::BoundingBox,
        format: AddressingFormat,
    ) -> Result<()>;
    fn tile_matrix_set_update(&self, tms: &TileMatrixSet) -> Result<()>;

    // -- tile_matrix --
    fn tile_matrix_id_exists(&self, table: &str, zoom: u8) -> Result<bool>;
    fn tile_matrix_create(&self, table: &str, matrix: &TileMatrix) -> Result<()>;
    fn tile_matrix_update(&self, table: &str, matrix: &TileMatrix) -> Result<()>;
    fn tile_matrix_at(&self, table: &str, zoom: u8) -> Result<Option<TileMatrix>>;

    // -- tile_dao --
    fn tile_dao_create(&self, table: &str, row: &TileRow) -> Result<()>;
    /// Moves the stored tile at `(zoom, old_column, old_row)` to
    /// `(new_column, new_row)` — the per-tile step of the relocation pass.
    /// The caller is responsible for descending-order iteration so this
    /// never collides with a not-yet-moved row.
    fn tile_dao_update(&self, table: &str, zoom: u8, old_column: u32, old_row: u32, new_column: u32, new_row: u32) -> Result<()>;
    fn tile_dao_delete_tile(&self, table: &str, zoom: u8, column: u32, row: u32) -> Result<()>;
    /// Deletes every stored tile at `zoom` whose `(column, row)` falls
    /// inside `grid` — the end-of-zoom sanity sweep for an undecodable
    /// zoom level.
    fn tile_dao_delete_in_grid(&self, table: &str, zoom: u8, grid: &TileGrid) -> Result<()>;
    /// Descending `(column, row)` scan of every stored tile at `zoom` —
    /// the ordering the relocation pass depends on to avoid transient
    /// primary-key collisions.
    fn tile_dao_query_for_tile_descending(&self, table: &str, zoom: u8) -> Result<Vec<TileRow>>;
    fn tile_dao_min_zoom(&self, table: &str) -> Result<Option<u8>>;
    fn tile_dao_max_zoom(&self, table: &str) -> Result<Option<u8>>;
    fn tile_dao_existing_zooms(&self, table: &str) -> Result<Vec<u8>>;

    // -- table lifecycle --
    fn create_tile_table_with_metadata(
        &self,
        table: &str,
        bbox_wgs84: &crate::model::BoundingBox,
        bbox_web_mercator: &crate::model::BoundingBox,
        format: AddressingFormat,
    ) -> Result<()>;
    fn delete_table_quietly(&self, table: &str);
}
