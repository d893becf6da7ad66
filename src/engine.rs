//! The retiling engine's generation state machine.
//!
//! Grounded on the generate/finalize flow in `versatiles_container`'s mbtiles
//! writer (progress ticks interleaved with per-tile fetch/insert, a single
//! compensating action on fatal failure) but restructured into the five
//! named phases this engine's merge/relocation semantics require.

use crate::coord_math::{
    tile_column_of, tile_grid, tile_grid_in_box, tile_row_of, tiles_per_side, to_web_mercator, to_wgs84,
    web_mercator_bbox_of_fitted, web_mercator_bbox_of_tile, union,
};
use crate::container::TileContainer;
use crate::crs::Crs;
use crate::error::{RetileError, Result};
use crate::image_probe::ImageProbe;
use crate::model::{AddressingFormat, BoundingBox, Contents, TileGrid, TileMatrix, TileMatrixSet, TileRow};
use crate::progress::ProgressSink;
use crate::tile_source::TileSource;
use std::collections::HashMap;

/// One `generate()` call's configuration, already resolved to WGS84.
pub struct GenerateRequest {
    pub table: String,
    pub bbox_wgs84: BoundingBox,
    pub min_zoom: u8,
    pub max_zoom: u8,
    pub google_mode: bool,
    pub compress_format: Option<String>,
    pub compress_quality: Option<f64>,
}

/// The mutable state threaded through phases 2-4: the matrix-set bounding
/// box and the current zoom's matrix dimensions.
struct PlanState {
    google_mode: bool,
    tile_matrix_set_bbox_wgs84: BoundingBox,
    web_mercator_bbox: BoundingBox,
    matrix_width: u32,
    matrix_height: u32,
}

pub struct RetileEngine<'a> {
    container: &'a dyn TileContainer,
    source: &'a dyn TileSource,
    probe: &'a dyn ImageProbe,
    progress: &'a dyn ProgressSink,
}

impl<'a> RetileEngine<'a> {
    pub fn new(
        container: &'a dyn TileContainer,
        source: &'a dyn TileSource,
        probe: &'a dyn ImageProbe,
        progress: &'a dyn ProgressSink,
    ) -> Self {
        Self {
            container,
            source,
            probe,
            progress,
        }
    }

    /// Runs one complete `generate()` call and returns the number of tiles
    /// committed.
    pub async fn generate(&self, request: &GenerateRequest) -> Result<u64> {
        if request.min_zoom > request.max_zoom {
            return Err(RetileError::Config(format!(
                "min_zoom ({}) must be <= max_zoom ({})",
                request.min_zoom, request.max_zoom
            )));
        }
        if let Some(q) = request.compress_quality {
            if !(0.0..=1.0).contains(&q) {
                return Err(RetileError::Config(format!("compress quality {q} is outside [0.0, 1.0]")));
            }
        }

        log::info!("generate: table={} zoom={}..={} google={}", request.table, request.min_zoom, request.max_zoom, request.google_mode);

        // Phase 1 — Plan.
        log::debug!("phase 1 (plan): table={}", request.table);
        let grids = self.plan(request)?;

        // Phase 2 — Bounds adjustment.
        log::debug!("phase 2 (bounds adjustment): table={}", request.table);
        let mut state = self.bounds_adjustment(request.google_mode, &request.bbox_wgs84, request.min_zoom)?;

        // Phase 3 (+3a) — Create-or-merge.
        log::debug!("phase 3 (create-or-merge): table={}", request.table);
        let update = match self.create_or_merge(request, &mut state).await {
            Ok(update) => update,
            Err(err @ RetileError::FormatConflict { .. }) => return Err(err),
            Err(err) => {
                log::error!("phase 3 failed for table={}, dropping table: {err}", request.table);
                self.container.delete_table_quietly(&request.table);
                return Err(err);
            }
        };

        // Phase 4 + 5 — Per-zoom generation, finalize.
        log::debug!("phase 4 (per-zoom generation): table={}", request.table);
        match self.generate_zooms(request, &mut state, &grids, update).await {
            Ok(count) => {
                log::info!("generate: table={} committed {count} tiles", request.table);
                Ok(count)
            }
            Err(err) => {
                log::error!("phase 4 failed for table={}, dropping table: {err}", request.table);
                self.container.delete_table_quietly(&request.table);
                Err(err)
            }
        }
    }

    /// Phase 1: sum tile counts across the requested zoom range and cache
    /// each zoom's global web-mercator tile grid for Phase 4's iteration.
    fn plan(&self, request: &GenerateRequest) -> Result<HashMap<u8, TileGrid>> {
        let merc_bbox = to_web_mercator(&request.bbox_wgs84)?;
        let mut grids = HashMap::new();
        let mut total = 0u64;
        for z in request.min_zoom..=request.max_zoom {
            let grid = tile_grid(&merc_bbox, z)?;
            total += grid.count();
            grids.insert(z, grid);
        }
        self.progress.set_max(total);
        Ok(grids)
    }

    /// Phase 2: derive the matrix-set bounding box and current zoom's
    /// matrix dimensions for `google_mode` or fitted addressing. Fitted
    /// addressing is always computed at `min_zoom` — the tile grid at any
    /// other zoom would not match the matrix dimensions Phase 4 starts
    /// iterating from.
    fn bounds_adjustment(&self, google_mode: bool, bbox_wgs84: &BoundingBox, min_zoom: u8) -> Result<PlanState> {
        if google_mode {
            let tile_matrix_set_bbox_wgs84 = BoundingBox::full_world_wgs84();
            let web_mercator_bbox = to_web_mercator(&tile_matrix_set_bbox_wgs84)?;
            Ok(PlanState {
                google_mode: true,
                tile_matrix_set_bbox_wgs84,
                web_mercator_bbox,
                matrix_width: 1,
                matrix_height: 1,
            })
        } else {
            self.bounds_adjustment_fitted(bbox_wgs84, min_zoom)
        }
    }

    /// Fitted-mode bounds computation at an explicit zoom (used both by
    /// Phase 2 at `min_zoom` and by the Phase 3a relocation pass at
    /// `min_new_or_update_zoom`).
    fn bounds_adjustment_fitted(&self, bbox_wgs84: &BoundingBox, zoom: u8) -> Result<PlanState> {
        let merc_bbox = to_web_mercator(bbox_wgs84)?;
        let grid = tile_grid(&merc_bbox, zoom)?;
        let web_mercator_bbox = web_mercator_bbox_of_tile(&grid, zoom);
        let tile_matrix_set_bbox_wgs84 = to_wgs84(&web_mercator_bbox)?;
        Ok(PlanState {
            google_mode: false,
            tile_matrix_set_bbox_wgs84,
            web_mercator_bbox,
            matrix_width: grid.width(),
            matrix_height: grid.height(),
        })
    }

    /// Phase 3: create the tile table if absent, or merge into an existing
    /// one (resolving format compatibility and running the relocation
    /// pass). Returns whether this call is an update of a pre-existing
    /// table.
    async fn create_or_merge(&self, request: &GenerateRequest, state: &mut PlanState) -> Result<bool> {
        if !self.container.tile_matrix_set_table_exists(&request.table)? {
            self.container.get_or_create_srs(Crs::Wgs84)?;
            self.container.get_or_create_srs(Crs::WebMercator)?;
            let format = if state.google_mode { AddressingFormat::Google } else { AddressingFormat::Fitted };
            self.container
                .create_tile_table_with_metadata(&request.table, &state.tile_matrix_set_bbox_wgs84, &state.web_mercator_bbox, format)?;
            return Ok(false);
        }

        let existing_tms = self
            .container
            .tile_matrix_set_query_for_id(&request.table)?
            .ok_or_else(|| RetileError::Config(format!("table {} has no tile matrix set row", request.table)))?;
        let requested_format = if state.google_mode { AddressingFormat::Google } else { AddressingFormat::Fitted };

        match (existing_tms.format, requested_format) {
            // Silent upgrade: a fitted request against an already-google
            // table simply adopts google addressing.
            (AddressingFormat::Google, AddressingFormat::Fitted) => {
                *state = self.bounds_adjustment(true, &request.bbox_wgs84, request.min_zoom)?;
            }
            // The reverse is a hard conflict.
            (AddressingFormat::Fitted, AddressingFormat::Google) => {
                return Err(RetileError::FormatConflict {
                    existing: "fitted",
                    requested: "google",
                });
            }
            _ => {}
        }

        if !state.google_mode {
            self.relocate(request, state, &existing_tms.bbox).await?;
        }

        Ok(true)
    }

    /// Phase 3a: rewrite every persisted tile's (column,row) to match a
    /// matrix-set box that has grown to cover `request.bbox_wgs84` as well
    /// as the previously-stored contents box.
    ///
    /// `prev_mx_set_bbox_merc` is the stored `TileMatrixSet` box, already in
    /// web-mercator (persisted that way by `SqliteContainer`).
    async fn relocate(&self, request: &GenerateRequest, state: &mut PlanState, prev_mx_set_bbox_merc: &BoundingBox) -> Result<()> {
        let contents = self
            .container
            .contents_query_by_id(&request.table)?
            .ok_or_else(|| RetileError::Config(format!("table {} has no contents row", request.table)))?;
        let new_bbox_wgs84 = union(&contents.bbox, &request.bbox_wgs84)?;

        let existing_min_zoom = self.container.tile_dao_min_zoom(&request.table)?.unwrap_or(request.min_zoom);
        let min_new_or_update_zoom = request.min_zoom.min(existing_min_zoom);

        let mut recomputed = self.bounds_adjustment_fitted(&new_bbox_wgs84, min_new_or_update_zoom)?;

        for z in self.container.tile_dao_existing_zooms(&request.table)? {
            let adjustment = 1u32 << u32::from(z - min_new_or_update_zoom);
            let zoom_mx_w = recomputed.matrix_width * adjustment;
            let zoom_mx_h = recomputed.matrix_height * adjustment;

            let existing_matrix = self
                .container
                .tile_matrix_at(&request.table, z)?
                .ok_or_else(|| RetileError::Config(format!("table {} missing tile matrix at zoom {z}", request.table)))?;

            let rows = self.container.tile_dao_query_for_tile_descending(&request.table, z)?;
            for row in rows {
                let old_bbox = web_mercator_bbox_of_fitted(
                    prev_mx_set_bbox_merc,
                    existing_matrix.matrix_width,
                    existing_matrix.matrix_height,
                    row.tile_column,
                    row.tile_row,
                );
                let (mid_x, mid_y) = old_bbox.center();
                let new_col = tile_column_of(&recomputed.web_mercator_bbox, zoom_mx_w, mid_x);
                let new_row = tile_row_of(&recomputed.web_mercator_bbox, zoom_mx_h, mid_y);
                self.container
                    .tile_dao_update(&request.table, z, row.tile_column, row.tile_row, new_col, new_row)?;
            }

            let tile_matrix = TileMatrix::with_pixel_size(
                z,
                zoom_mx_w,
                zoom_mx_h,
                existing_matrix.tile_width,
                existing_matrix.tile_height,
                &recomputed.web_mercator_bbox,
            );
            self.container.tile_matrix_update(&request.table, &tile_matrix)?;
        }

        // Guard strictly on `<`: when the gap is zero, the multiplicative
        // step is skipped outright rather than executed as a no-op multiply
        // by one.
        if min_new_or_update_zoom < request.min_zoom {
            let gap = u32::from(request.min_zoom - min_new_or_update_zoom);
            recomputed.matrix_width <<= gap;
            recomputed.matrix_height <<= gap;
        }

        if recomputed.tile_matrix_set_bbox_wgs84 != contents.bbox {
            self.container
                .contents_update(&Contents::tiles(&request.table, recomputed.tile_matrix_set_bbox_wgs84, contents.last_change))?;
        }
        if recomputed.web_mercator_bbox != *prev_mx_set_bbox_merc {
            self.container.tile_matrix_set_update(&TileMatrixSet {
                table_name: request.table.clone(),
                bbox: recomputed.web_mercator_bbox,
                format: AddressingFormat::Fitted,
            })?;
        }

        *state = recomputed;
        Ok(())
    }

    /// Phases 4 and 5: generate every zoom's tiles, then finalize.
    async fn generate_zooms(
        &self,
        request: &GenerateRequest,
        state: &mut PlanState,
        grids: &HashMap<u8, TileGrid>,
        update: bool,
    ) -> Result<u64> {
        let mut count = 0u64;
        let mut cancelled = false;
        let request_merc_bbox = to_web_mercator(&request.bbox_wgs84)?;

        'zooms: for z in request.min_zoom..=request.max_zoom {
            if !self.progress.is_active() {
                cancelled = true;
                break;
            }

            let (current_matrix_width, current_matrix_height) = if state.google_mode {
                (tiles_per_side(z), tiles_per_side(z))
            } else {
                (state.matrix_width, state.matrix_height)
            };
            let local_tile_grid = if state.google_mode {
                None
            } else {
                Some(tile_grid_in_box(&state.web_mercator_bbox, current_matrix_width, current_matrix_height, &request_merc_bbox)?)
            };

            let grid = grids.get(&z).copied().ok_or_else(|| RetileError::Config(format!("no cached tile grid for zoom {z}")))?;
            let mut tile_dims: Option<(u32, u32)> = None;

            for (x, y) in grid.iter() {
                if !self.progress.is_active() {
                    cancelled = true;
                    break 'zooms;
                }

                let (tile_column, tile_row) = match &local_tile_grid {
                    None => (x, y),
                    Some(local) => (x - grid.min_x + local.min_x, y - grid.min_y + local.min_y),
                };

                if update {
                    self.container.tile_dao_delete_tile(&request.table, z, tile_column, tile_row)?;
                }

                let fetched = match self.source.fetch(z, x, y).await {
                    Ok(bytes) => bytes,
                    Err(err) => {
                        log::warn!("tile fetch failed at z={z} x={x} y={y}: {err}");
                        self.progress.add_progress(1);
                        continue;
                    }
                };
                let Some(mut bytes) = fetched else {
                    self.progress.add_progress(1);
                    continue;
                };

                if let Some(format_name) = &request.compress_format {
                    match self.probe.transcode(&bytes, format_name, request.compress_quality) {
                        Ok(transcoded) => bytes = transcoded,
                        Err(err) => {
                            log::warn!("tile transcode failed at z={z} x={x} y={y}: {err}");
                            self.progress.add_progress(1);
                            continue;
                        }
                    }
                }

                // Undecodable-but-stored: insert unconditionally, probing
                // only to learn pixel dimensions when possible.
                let dims = self.probe.probe(&bytes);

                self.container.tile_dao_create(
                    &request.table,
                    &TileRow {
                        zoom: z,
                        tile_column,
                        tile_row,
                        data: bytes,
                    },
                )?;
                count += 1;
                if tile_dims.is_none() {
                    if let Some(d) = dims {
                        tile_dims = Some((d.width, d.height));
                    }
                }
                self.progress.add_progress(1);
            }

            match tile_dims {
                None => {
                    self.container.tile_dao_delete_in_grid(&request.table, z, &grid)?;
                }
                Some((tile_width, tile_height)) => {
                    let already_present = self.container.tile_matrix_id_exists(&request.table, z)?;
                    if !(update && already_present) {
                        let effective_bbox = if state.google_mode {
                            to_web_mercator(&BoundingBox::full_world_wgs84())?
                        } else {
                            state.web_mercator_bbox
                        };
                        let tm = TileMatrix::with_pixel_size(z, current_matrix_width, current_matrix_height, tile_width, tile_height, &effective_bbox);
                        self.container.tile_matrix_create(&request.table, &tm)?;
                    }
                }
            }

            if !state.google_mode {
                state.matrix_width *= 2;
                state.matrix_height *= 2;
            }
        }

        // Phase 5 — Finalize.
        log::debug!("phase 5 (finalize): table={} cancelled={cancelled}", request.table);
        if cancelled && self.progress.cleanup_on_cancel() {
            log::info!("generation of table={} was cancelled, dropping table", request.table);
            self.container.delete_table_quietly(&request.table);
            return Ok(0);
        }

        self.container
            .contents_update(&Contents::tiles(&request.table, state.tile_matrix_set_bbox_wgs84, chrono::Utc::now()))?;
        Ok(count)
    }
}
