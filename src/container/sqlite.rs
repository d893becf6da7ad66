//! A GeoPackage-shaped SQLite container, grounded on
//! `versatiles_container::container::mbtiles::writer::MBTilesWriter`'s use
//! of a pooled `r2d2_sqlite` connection and a single batched `CREATE TABLE`
//! statement, generalized to the separate `gpkg_contents` /
//! `gpkg_tile_matrix_set` / `gpkg_tile_matrix` / `gpkg_spatial_ref_sys`
//! tables a GeoPackage-style tile store needs.

use super::TileContainer;
use crate::crs::Crs;
use crate::error::Result;
use crate::model::{AddressingFormat, BoundingBox, Contents, TileGrid, TileMatrix, TileMatrixSet, TileRow};
use r2d2::Pool;
use r2d2_sqlite::rusqlite::{params, OptionalExtension};
use r2d2_sqlite::SqliteConnectionManager;
use std::path::Path;

pub struct SqliteContainer {
    pool: Pool<SqliteConnectionManager>,
}

fn check_table_name(table: &str) -> Result<()> {
    let ok = !table.is_empty()
        && table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !table.chars().next().unwrap().is_ascii_digit();
    if ok {
        Ok(())
    } else {
        Err(crate::error::RetileError::Config(format!("invalid table name: {table}")))
    }
}

impl SqliteContainer {
    /// Opens (creating if absent) a GeoPackage-shaped SQLite container at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path);
        let pool = Pool::builder().max_size(8).build(manager)?;
        pool.get()?.execute_batch(
            "CREATE TABLE IF NOT EXISTS gpkg_spatial_ref_sys (
                srs_id INTEGER PRIMARY KEY,
                srs_name TEXT NOT NULL,
                definition TEXT NOT NULL
             );
             CREATE TABLE IF NOT EXISTS gpkg_contents (
                table_name TEXT PRIMARY KEY,
                data_type TEXT NOT NULL,
                min_x REAL NOT NULL, min_y REAL NOT NULL,
                max_x REAL NOT NULL, max_y REAL NOT NULL,
                srs_id INTEGER NOT NULL,
                last_change TEXT NOT NULL
             );
             CREATE TABLE IF NOT EXISTS gpkg_tile_matrix_set (
                table_name TEXT PRIMARY KEY,
                srs_id INTEGER NOT NULL,
                min_x REAL NOT NULL, min_y REAL NOT NULL,
                max_x REAL NOT NULL, max_y REAL NOT NULL,
                format TEXT NOT NULL
             );
             CREATE TABLE IF NOT EXISTS gpkg_tile_matrix (
                table_name TEXT NOT NULL,
                zoom_level INTEGER NOT NULL,
                matrix_width INTEGER NOT NULL,
                matrix_height INTEGER NOT NULL,
                tile_width INTEGER NOT NULL,
                tile_height INTEGER NOT NULL,
                pixel_x_size REAL NOT NULL,
                pixel_y_size REAL NOT NULL,
                PRIMARY KEY (table_name, zoom_level)
             );",
        )?;
        Ok(Self { pool })
    }

    /// In-memory container for tests; each instance gets its own isolated
    /// database (`r2d2_sqlite`'s `SqliteConnectionManager::memory` opens a
    /// new connection per pool checkout, so the pool is capped at one).
    pub fn open_in_memory() -> Result<Self> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder().max_size(1).build(manager)?;
        pool.get()?.execute_batch(
            "CREATE TABLE gpkg_spatial_ref_sys (
                srs_id INTEGER PRIMARY KEY, srs_name TEXT NOT NULL, definition TEXT NOT NULL
             );
             CREATE TABLE gpkg_contents (
                table_name TEXT PRIMARY KEY, data_type TEXT NOT NULL,
                min_x REAL NOT NULL, min_y REAL NOT NULL, max_x REAL NOT NULL, max_y REAL NOT NULL,
                srs_id INTEGER NOT NULL, last_change TEXT NOT NULL
             );
             CREATE TABLE gpkg_tile_matrix_set (
                table_name TEXT PRIMARY KEY, srs_id INTEGER NOT NULL,
                min_x REAL NOT NULL, min_y REAL NOT NULL, max_x REAL NOT NULL, max_y REAL NOT NULL,
                format TEXT NOT NULL
             );
             CREATE TABLE gpkg_tile_matrix (
                table_name TEXT NOT NULL, zoom_level INTEGER NOT NULL,
                matrix_width INTEGER NOT NULL, matrix_height INTEGER NOT NULL,
                tile_width INTEGER NOT NULL, tile_height INTEGER NOT NULL,
                pixel_x_size REAL NOT NULL, pixel_y_size REAL NOT NULL,
                PRIMARY KEY (table_name, zoom_level)
             );",
        )?;
        Ok(Self { pool })
    }

    fn bbox_from_row(min_x: f64, min_y: f64, max_x: f64, max_y: f64, crs: Crs) -> BoundingBox {
        BoundingBox::new(min_x, min_y, max_x, max_y, crs)
    }

    fn srs_of(srs_id: i64) -> Crs {
        if srs_id == i64::from(Crs::WebMercator.epsg_code()) {
            Crs::WebMercator
        } else {
            Crs::Wgs84
        }
    }
}

impl TileContainer for SqliteContainer {
    fn get_or_create_srs(&self, crs: Crs) -> Result<()> {
        self.pool.get()?.execute(
            "INSERT OR IGNORE INTO gpkg_spatial_ref_sys (srs_id, srs_name, definition) VALUES (?1, ?2, ?3)",
            params![crs.epsg_code(), crs.as_str(), crs.well_known_text()],
        )?;
        Ok(())
    }

    fn contents_query_by_id(&self, table: &str) -> Result<Option<Contents>> {
        let conn = self.pool.get()?;
        let row = conn
            .query_row(
                "SELECT min_x, min_y, max_x, max_y, srs_id, last_change FROM gpkg_contents WHERE table_name = ?1",
                params![table],
                |r| {
                    let min_x: f64 = r.get(0)?;
                    let min_y: f64 = r.get(1)?;
                    let max_x: f64 = r.get(2)?;
                    let max_y: f64 = r.get(3)?;
                    let srs_id: i64 = r.get(4)?;
                    let last_change: String = r.get(5)?;
                    Ok((min_x, min_y, max_x, max_y, srs_id, last_change))
                },
            )
            .optional()?;
        Ok(row.map(|(min_x, min_y, max_x, max_y, srs_id, last_change)| Contents {
            table_name: table.to_string(),
            bbox: Self::bbox_from_row(min_x, min_y, max_x, max_y, Self::srs_of(srs_id)),
            last_change: last_change.parse().unwrap_or_else(|_| chrono::Utc::now()),
            data_type: "tiles",
        }))
    }

    fn contents_update(&self, contents: &Contents) -> Result<()> {
        self.pool.get()?.execute(
            "INSERT INTO gpkg_contents (table_name, data_type, min_x, min_y, max_x, max_y, srs_id, last_change)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(table_name) DO UPDATE SET
                min_x = excluded.min_x, min_y = excluded.min_y,
                max_x = excluded.max_x, max_y = excluded.max_y,
                srs_id = excluded.srs_id, last_change = excluded.last_change",
            params![
                contents.table_name,
                contents.data_type,
                contents.bbox.min_x,
                contents.bbox.min_y,
                contents.bbox.max_x,
                contents.bbox.max_y,
                contents.bbox.crs.epsg_code(),
                contents.last_change.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn contents_get_srs(&self, table: &str) -> Result<Option<Crs>> {
        let conn = self.pool.get()?;
        let srs_id: Option<i64> = conn
            .query_row(
                "SELECT srs_id FROM gpkg_contents WHERE table_name = ?1",
                params![table],
                |r| r.get(0),
            )
            .optional()?;
        Ok(srs_id.map(Self::srs_of))
    }

    fn tile_matrix_set_table_exists(&self, table: &str) -> Result<bool> {
        let conn = self.pool.get()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![table],
            |r| r.get(0),
        )?;
        Ok(count > 0)
    }

    fn tile_matrix_set_query_for_id(&self, table: &str) -> Result<Option<TileMatrixSet>> {
        let conn = self.pool.get()?;
        let row = conn
            .query_row(
                "SELECT srs_id, min_x, min_y, max_x, max_y, format FROM gpkg_tile_matrix_set WHERE table_name = ?1",
                params![table],
                |r| {
                    let srs_id: i64 = r.get(0)?;
                    let min_x: f64 = r.get(1)?;
                    let min_y: f64 = r.get(2)?;
                    let max_x: f64 = r.get(3)?;
                    let max_y: f64 = r.get(4)?;
                    let format: String = r.get(5)?;
                    Ok((srs_id, min_x, min_y, max_x, max_y, format))
                },
            )
            .optional()?;
        Ok(row.map(|(srs_id, min_x, min_y, max_x, max_y, format)| TileMatrixSet {
            table_name: table.to_string(),
            bbox: Self::bbox_from_row(min_x, min_y, max_x, max_y, Self::srs_of(srs_id)),
            format: if format == "google" {
                AddressingFormat::Google
            } else {
                AddressingFormat::Fitted
            },
        }))
    }

    fn tile_matrix_set_create(
        &self,
        table: &str,
        bbox_wgs84: &BoundingBox,
        bbox_web_mercator: &BoundingBox,
        format: AddressingFormat,
    ) -> Result<()> {
        let _ = bbox_wgs84;
        self.pool.get()?.execute(
            "INSERT INTO gpkg_tile_matrix_set (table_name, srs_id, min_x, min_y, max_x, max_y, format)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                table,
                Crs::WebMercator.epsg_code(),
                bbox_web_mercator.min_x,
                bbox_web_mercator.min_y,
                bbox_web_mercator.max_x,
                bbox_web_mercator.max_y,
                format.name(),
            ],
        )?;
        Ok(())
    }

    fn tile_matrix_set_update(&self, tms: &TileMatrixSet) -> Result<()> {
        self.pool.get()?.execute(
            "UPDATE gpkg_tile_matrix_set SET min_x = ?2, min_y = ?3, max_x = ?4, max_y = ?5 WHERE table_name = ?1",
            params![tms.table_name, tms.bbox.min_x, tms.bbox.min_y, tms.bbox.max_x, tms.bbox.max_y],
        )?;
        Ok(())
    }

    fn tile_matrix_id_exists(&self, table: &str, zoom: u8) -> Result<bool> {
        let conn = self.pool.get()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM gpkg_tile_matrix WHERE table_name = ?1 AND zoom_level = ?2",
            params![table, zoom],
            |r| r.get(0),
        )?;
        Ok(count > 0)
    }

    fn tile_matrix_create(&self, table: &str, matrix: &TileMatrix) -> Result<()> {
        self.pool.get()?.execute(
            "INSERT INTO gpkg_tile_matrix
             (table_name, zoom_level, matrix_width, matrix_height, tile_width, tile_height, pixel_x_size, pixel_y_size)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                table,
                matrix.zoom,
                matrix.matrix_width,
                matrix.matrix_height,
                matrix.tile_width,
                matrix.tile_height,
                matrix.pixel_x_size,
                matrix.pixel_y_size,
            ],
        )?;
        Ok(())
    }

    fn tile_matrix_update(&self, table: &str, matrix: &TileMatrix) -> Result<()> {
        self.pool.get()?.execute(
            "UPDATE gpkg_tile_matrix SET matrix_width = ?3, matrix_height = ?4, pixel_x_size = ?5, pixel_y_size = ?6
             WHERE table_name = ?1 AND zoom_level = ?2",
            params![
                table,
                matrix.zoom,
                matrix.matrix_width,
                matrix.matrix_height,
                matrix.pixel_x_size,
                matrix.pixel_y_size,
            ],
        )?;
        Ok(())
    }

    fn tile_matrix_at(&self, table: &str, zoom: u8) -> Result<Option<TileMatrix>> {
        let conn = self.pool.get()?;
        conn.query_row(
            "SELECT matrix_width, matrix_height, tile_width, tile_height, pixel_x_size, pixel_y_size
             FROM gpkg_tile_matrix WHERE table_name = ?1 AND zoom_level = ?2",
            params![table, zoom],
            |r| {
                Ok(TileMatrix {
                    zoom,
                    matrix_width: r.get(0)?,
                    matrix_height: r.get(1)?,
                    tile_width: r.get(2)?,
                    tile_height: r.get(3)?,
                    pixel_x_size: r.get(4)?,
                    pixel_y_size: r.get(5)?,
                })
            },
        )
        .optional()
        .map_err(Into::into)
    }

    fn tile_dao_create(&self, table: &str, row: &TileRow) -> Result<()> {
        check_table_name(table)?;
        self.pool.get()?.execute(
            &format!(
                "INSERT INTO \"{table}\" (zoom_level, tile_column, tile_row, tile_data) VALUES (?1, ?2, ?3, ?4)"
            ),
            params![row.zoom, row.tile_column, row.tile_row, row.data],
        )?;
        Ok(())
    }

    fn tile_dao_update(&self, table: &str, zoom: u8, old_column: u32, old_row: u32, new_column: u32, new_row: u32) -> Result<()> {
        check_table_name(table)?;
        self.pool.get()?.execute(
            &format!(
                "UPDATE \"{table}\" SET tile_column = ?4, tile_row = ?5
                 WHERE zoom_level = ?1 AND tile_column = ?2 AND tile_row = ?3"
            ),
            params![zoom, old_column, old_row, new_column, new_row],
        )?;
        Ok(())
    }

    fn tile_dao_delete_tile(&self, table: &str, zoom: u8, column: u32, row: u32) -> Result<()> {
        check_table_name(table)?;
        self.pool.get()?.execute(
            &format!("DELETE FROM \"{table}\" WHERE zoom_level = ?1 AND tile_column = ?2 AND tile_row = ?3"),
            params![zoom, column, row],
        )?;
        Ok(())
    }

    fn tile_dao_delete_in_grid(&self, table: &str, zoom: u8, grid: &TileGrid) -> Result<()> {
        check_table_name(table)?;
        self.pool.get()?.execute(
            &format!(
                "DELETE FROM \"{table}\" WHERE zoom_level = ?1
                 AND tile_column BETWEEN ?2 AND ?3 AND tile_row BETWEEN ?4 AND ?5"
            ),
            params![zoom, grid.min_x, grid.max_x, grid.min_y, grid.max_y],
        )?;
        Ok(())
    }

    fn tile_dao_query_for_tile_descending(&self, table: &str, zoom: u8) -> Result<Vec<TileRow>> {
        check_table_name(table)?;
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT tile_column, tile_row, tile_data FROM \"{table}\" WHERE zoom_level = ?1
             ORDER BY tile_column DESC, tile_row DESC"
        ))?;
        let rows = stmt
            .query_map(params![zoom], |r| {
                Ok(TileRow {
                    zoom,
                    tile_column: r.get(0)?,
                    tile_row: r.get(1)?,
                    data: r.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn tile_dao_min_zoom(&self, table: &str) -> Result<Option<u8>> {
        check_table_name(table)?;
        let conn = self.pool.get()?;
        let zoom: Option<i64> = conn
            .query_row(&format!("SELECT MIN(zoom_level) FROM \"{table}\""), [], |r| r.get(0))
            .optional()?
            .flatten();
        Ok(zoom.map(|z| z as u8))
    }

    fn tile_dao_max_zoom(&self, table: &str) -> Result<Option<u8>> {
        check_table_name(table)?;
        let conn = self.pool.get()?;
        let zoom: Option<i64> = conn
            .query_row(&format!("SELECT MAX(zoom_level) FROM \"{table}\""), [], |r| r.get(0))
            .optional()?
            .flatten();
        Ok(zoom.map(|z| z as u8))
    }

    fn tile_dao_existing_zooms(&self, table: &str) -> Result<Vec<u8>> {
        check_table_name(table)?;
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT DISTINCT zoom_level FROM \"{table}\" ORDER BY zoom_level ASC"
        ))?;
        let zooms = stmt
            .query_map([], |r| r.get::<_, i64>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?
            .into_iter()
            .map(|z| z as u8)
            .collect();
        Ok(zooms)
    }

    fn create_tile_table_with_metadata(
        &self,
        table: &str,
        bbox_wgs84: &BoundingBox,
        bbox_web_mercator: &BoundingBox,
        format: AddressingFormat,
    ) -> Result<()> {
        check_table_name(table)?;
        self.get_or_create_srs(Crs::Wgs84)?;
        self.get_or_create_srs(Crs::WebMercator)?;

        let conn = self.pool.get()?;
        conn.execute_batch(&format!(
            "CREATE TABLE \"{table}\" (
                zoom_level INTEGER NOT NULL,
                tile_column INTEGER NOT NULL,
                tile_row INTEGER NOT NULL,
                tile_data BLOB NOT NULL,
                UNIQUE (zoom_level, tile_column, tile_row)
             );
             CREATE UNIQUE INDEX \"{table}_idx\" ON \"{table}\" (zoom_level, tile_column, tile_row);"
        ))?;
        drop(conn);

        self.tile_matrix_set_create(table, bbox_wgs84, bbox_web_mercator, format)?;
        self.contents_update(&Contents::tiles(table, *bbox_wgs84, chrono::Utc::now()))?;
        Ok(())
    }

    fn delete_table_quietly(&self, table: &str) {
        if check_table_name(table).is_err() {
            return;
        }
        if let Ok(conn) = self.pool.get() {
            let _ = conn.execute_batch(&format!(
                "DROP TABLE IF EXISTS \"{table}\";
                 DELETE FROM gpkg_contents WHERE table_name = '{table}';
                 DELETE FROM gpkg_tile_matrix_set WHERE table_name = '{table}';
                 DELETE FROM gpkg_tile_matrix WHERE table_name = '{table}';"
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unsafe_table_names() {
        assert!(check_table_name("tiles").is_ok());
        assert!(check_table_name("tiles_2").is_ok());
        assert!(check_table_name("1tiles").is_err());
        assert!(check_table_name("tiles; DROP TABLE x").is_err());
    }

    #[test]
    fn create_and_query_table_round_trip() {
        let c = SqliteContainer::open_in_memory().unwrap();
        let wgs84 = BoundingBox::full_world_wgs84();
        let merc = crate::coord_math::to_web_mercator(&wgs84).unwrap();
        c.create_tile_table_with_metadata("tiles", &wgs84, &merc, AddressingFormat::Google)
            .unwrap();
        assert!(c.tile_matrix_set_table_exists("tiles").unwrap());
        let tms = c.tile_matrix_set_query_for_id("tiles").unwrap().unwrap();
        assert_eq!(tms.format, AddressingFormat::Google);

        let row = TileRow {
            zoom: 0,
            tile_column: 0,
            tile_row: 0,
            data: vec![9, 9, 9],
        };
        c.tile_dao_create("tiles", &row).unwrap();
        let scanned = c.tile_dao_query_for_tile_descending("tiles", 0).unwrap();
        assert_eq!(scanned, vec![row]);
    }

    #[test]
    fn open_creates_file_backed_container() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiles.gpkg");
        let c = SqliteContainer::open(&path).unwrap();
        assert!(path.exists());

        let wgs84 = BoundingBox::full_world_wgs84();
        let merc = crate::coord_math::to_web_mercator(&wgs84).unwrap();
        c.create_tile_table_with_metadata("tiles", &wgs84, &merc, AddressingFormat::Fitted)
            .unwrap();
        drop(c);

        // Reopening the same path must see the already-created table.
        let reopened = SqliteContainer::open(&path).unwrap();
        assert!(reopened.tile_matrix_set_table_exists("tiles").unwrap());
    }
}
