//! The public entry point: a configuration builder that becomes an actor
//! once `generate()` begins.

use crate::container::TileContainer;
use crate::engine::{GenerateRequest, RetileEngine};
use crate::error::{RetileError, Result};
use crate::image_probe::ImageProbe;
use crate::model::BoundingBox;
use crate::progress::{NullProgress, ProgressSink};
use crate::tile_source::TileSource;

/// Tracks whether `generate()` has started, so configuration setters can
/// refuse further mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Configuring,
    Generating,
}

pub struct Orchestrator<'a> {
    container: &'a dyn TileContainer,
    source: &'a dyn TileSource,
    probe: &'a dyn ImageProbe,
    progress: Box<dyn ProgressSink + 'a>,

    table: String,
    bbox_wgs84: Option<BoundingBox>,
    min_zoom: u8,
    max_zoom: u8,
    google_tiles: bool,
    compress_format: Option<String>,
    compress_quality: Option<f64>,

    tile_count: Option<u64>,
    phase: Phase,
}

impl<'a> Orchestrator<'a> {
    #[must_use]
    pub fn new(table: impl Into<String>, container: &'a dyn TileContainer, source: &'a dyn TileSource, probe: &'a dyn ImageProbe) -> Self {
        Self {
            container,
            source,
            probe,
            progress: Box::new(NullProgress),
            table: table.into(),
            bbox_wgs84: None,
            min_zoom: 0,
            max_zoom: 0,
            google_tiles: false,
            compress_format: None,
            compress_quality: None,
            tile_count: None,
            phase: Phase::Configuring,
        }
    }

    fn guard_configurable(&self) -> Result<()> {
        if self.phase == Phase::Generating {
            Err(RetileError::Config("cannot reconfigure after generate() has begun".to_string()))
        } else {
            Ok(())
        }
    }

    /// Sets the requested bounding box (and zoom range), storing it as
    /// WGS84 with mercator-safe latitude clamping.
    pub fn set_tile_bounding_box(&mut self, bbox: BoundingBox) -> Result<()> {
        self.guard_configurable()?;
        let wgs84 = match bbox.crs {
            crate::crs::Crs::Wgs84 => BoundingBox::new_wgs84(bbox.min_x, bbox.min_y, bbox.max_x, bbox.max_y),
            crate::crs::Crs::WebMercator => crate::coord_math::to_wgs84(&bbox)?,
        };
        self.bbox_wgs84 = Some(wgs84);
        self.tile_count = None;
        Ok(())
    }

    /// Sets the inclusive zoom range to generate, under the same "no
    /// reconfiguration after generate()" guard as the other setters.
    pub fn set_zoom_range(&mut self, min_zoom: u8, max_zoom: u8) -> Result<()> {
        self.guard_configurable()?;
        if min_zoom > max_zoom {
            return Err(RetileError::Config(format!("min_zoom ({min_zoom}) must be <= max_zoom ({max_zoom})")));
        }
        self.min_zoom = min_zoom;
        self.max_zoom = max_zoom;
        self.tile_count = None;
        Ok(())
    }

    pub fn set_compress_format(&mut self, name: impl Into<String>) -> Result<()> {
        self.guard_configurable()?;
        self.compress_format = Some(name.into());
        Ok(())
    }

    pub fn set_compress_quality(&mut self, quality: f64) -> Result<()> {
        self.guard_configurable()?;
        if !(0.0..=1.0).contains(&quality) {
            return Err(RetileError::Config(format!("compress quality {quality} is outside [0.0, 1.0]")));
        }
        self.compress_quality = Some(quality);
        Ok(())
    }

    pub fn set_google_tiles(&mut self, google: bool) -> Result<()> {
        self.guard_configurable()?;
        self.google_tiles = google;
        Ok(())
    }

    pub fn set_progress(&mut self, sink: Box<dyn ProgressSink + 'a>) -> Result<()> {
        self.guard_configurable()?;
        self.progress = sink;
        Ok(())
    }

    #[must_use]
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        self.bbox_wgs84
    }

    #[must_use]
    pub fn zoom_range(&self) -> (u8, u8) {
        (self.min_zoom, self.max_zoom)
    }

    #[must_use]
    pub fn compress_format(&self) -> Option<&str> {
        self.compress_format.as_deref()
    }

    #[must_use]
    pub fn compress_quality(&self) -> Option<f64> {
        self.compress_quality
    }

    #[must_use]
    pub fn google_tiles(&self) -> bool {
        self.google_tiles
    }

    /// Lazily computes and caches the total tile count for the current
    /// configuration.
    pub fn tile_count(&mut self) -> Result<u64> {
        if let Some(n) = self.tile_count {
            return Ok(n);
        }
        let bbox = self
            .bbox_wgs84
            .ok_or_else(|| RetileError::Config("tile_bounding_box must be set before tile_count()".to_string()))?;
        let merc = crate::coord_math::to_web_mercator(&bbox)?;
        let mut total = 0u64;
        for z in self.min_zoom..=self.max_zoom {
            total += crate::coord_math::tile_grid(&merc, z)?.count();
        }
        self.tile_count = Some(total);
        Ok(total)
    }

    /// Runs one generation, returning the number of tiles committed.
    pub async fn generate(&mut self) -> Result<u64> {
        self.guard_configurable()?;
        let bbox_wgs84 = self
            .bbox_wgs84
            .ok_or_else(|| RetileError::Config("tile_bounding_box must be set before generate()".to_string()))?;
        if self.min_zoom > self.max_zoom {
            return Err(RetileError::Config(format!(
                "min_zoom ({}) must be <= max_zoom ({})",
                self.min_zoom, self.max_zoom
            )));
        }

        self.phase = Phase::Generating;
        let request = GenerateRequest {
            table: self.table.clone(),
            bbox_wgs84,
            min_zoom: self.min_zoom,
            max_zoom: self.max_zoom,
            google_mode: self.google_tiles,
            compress_format: self.compress_format.clone(),
            compress_quality: self.compress_quality,
        };
        let engine = RetileEngine::new(self.container, self.source, self.probe, self.progress.as_ref());
        let result = engine.generate(&request).await;
        self.phase = Phase::Configuring;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::sqlite::SqliteContainer;
    use crate::crs::Crs;
    use crate::image_probe::CodecImageProbe;
    use crate::tile_source::StaticTileSource;

    fn png_bytes(w: u32, h: u32) -> Vec<u8> {
        let image = image::DynamicImage::new_rgba8(w, h);
        let mut out = Vec::new();
        image::ImageEncoder::write_image(
            image::codecs::png::PngEncoder::new(&mut out),
            image.to_rgba8().as_raw(),
            w,
            h,
            image::ExtendedColorType::Rgba8,
        )
        .unwrap();
        out
    }

    #[test]
    fn rejects_reconfiguration_after_generating_begins() {
        let container = SqliteContainer::open_in_memory().unwrap();
        let source = StaticTileSource::always(png_bytes(4, 4));
        let probe = CodecImageProbe;
        let mut orchestrator = Orchestrator::new("tiles", &container, &source, &probe);
        orchestrator.phase = Phase::Generating;
        assert!(orchestrator.set_google_tiles(true).is_err());
    }

    #[test]
    fn tile_count_matches_grid_counts() {
        let container = SqliteContainer::open_in_memory().unwrap();
        let source = StaticTileSource::always(png_bytes(4, 4));
        let probe = CodecImageProbe;
        let mut orchestrator = Orchestrator::new("tiles", &container, &source, &probe);
        orchestrator.set_tile_bounding_box(BoundingBox::full_world_wgs84()).unwrap();
        orchestrator.set_zoom_range(0, 1).unwrap();
        assert_eq!(orchestrator.tile_count().unwrap(), 5);
    }

    #[test]
    fn set_tile_bounding_box_accepts_web_mercator() {
        let container = SqliteContainer::open_in_memory().unwrap();
        let source = StaticTileSource::always(png_bytes(4, 4));
        let probe = CodecImageProbe;
        let mut orchestrator = Orchestrator::new("tiles", &container, &source, &probe);
        let merc = crate::coord_math::to_web_mercator(&BoundingBox::full_world_wgs84()).unwrap();
        orchestrator.set_tile_bounding_box(merc).unwrap();
        assert_eq!(orchestrator.bounding_box().unwrap().crs, Crs::Wgs84);
    }
}
