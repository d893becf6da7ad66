use retile::container::sqlite::SqliteContainer;
use retile::container::TileContainer;
use retile::image_probe::CodecImageProbe;
use retile::model::{AddressingFormat, BoundingBox};
use retile::orchestrator::Orchestrator;
use retile::progress::CountingProgress;
use retile::tile_source::StaticTileSource;

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

// S1: an empty container, full-world bbox, google addressing, zoom 0..=1
// writes the full pyramid (1 + 4 = 5 tiles) and records google addressing.
#[tokio::test]
async fn s1_full_world_google_pyramid() {
    let container = SqliteContainer::open_in_memory().unwrap();
    let source = StaticTileSource::always(png_bytes(4, 4));
    let probe = CodecImageProbe;
    let mut orchestrator = Orchestrator::new("tiles", &container, &source, &probe);
    orchestrator.set_tile_bounding_box(BoundingBox::full_world_wgs84()).unwrap();
    orchestrator.set_zoom_range(0, 1).unwrap();
    orchestrator.set_google_tiles(true).unwrap();

    let committed = orchestrator.generate().await.unwrap();
    assert_eq!(committed, 5);

    let tms = container.tile_matrix_set_query_for_id("tiles").unwrap().unwrap();
    assert_eq!(tms.format, AddressingFormat::Google);
    assert_eq!(container.tile_dao_existing_zooms("tiles").unwrap(), vec![0, 1]);
}

// S2: fitted addressing over a small request box produces a matrix tightly
// sized to that box rather than the full world.
#[tokio::test]
async fn s2_fitted_matrix_is_tight() {
    let container = SqliteContainer::open_in_memory().unwrap();
    let source = StaticTileSource::always(png_bytes(4, 4));
    let probe = CodecImageProbe;
    let mut orchestrator = Orchestrator::new("tiles", &container, &source, &probe);
    orchestrator
        .set_tile_bounding_box(BoundingBox::new_wgs84(-1.0, -1.0, 1.0, 1.0))
        .unwrap();
    orchestrator.set_zoom_range(2, 3).unwrap();
    orchestrator.set_google_tiles(false).unwrap();

    orchestrator.generate().await.unwrap();

    let matrix_at_min_zoom = container.tile_matrix_at("tiles", 2).unwrap().unwrap();
    // A fitted grid at zoom 2 over a near-equatorial few-degree box should
    // be far smaller than the global 4x4 zoom-2 grid.
    assert!(matrix_at_min_zoom.matrix_width < 4);
    assert!(matrix_at_min_zoom.matrix_height < 4);

    // The stored matrix-set box itself must hug the request, not default
    // to the full world — a fitted grid built at zoom 0 would always
    // produce a single full-world tile here, which this catches. Both
    // sides are compared in web-mercator meters, since that's how the
    // matrix-set box is persisted.
    let tms = container.tile_matrix_set_query_for_id("tiles").unwrap().unwrap();
    let full_world_merc_width = retile::coord_math::to_web_mercator(&BoundingBox::full_world_wgs84()).unwrap().width();
    assert!(
        tms.bbox.width() < full_world_merc_width / 4.0,
        "fitted matrix-set box ({}) should be a small fraction of the full world ({full_world_merc_width})",
        tms.bbox.width()
    );
}

// S3: merging a larger request into an existing fitted table relocates
// every stored tile without hitting a primary-key collision.
#[tokio::test]
async fn s3_merge_relocates_without_collision() {
    let container = SqliteContainer::open_in_memory().unwrap();
    let source = StaticTileSource::always(png_bytes(4, 4));
    let probe = CodecImageProbe;

    {
        let mut orchestrator = Orchestrator::new("tiles", &container, &source, &probe);
        orchestrator
            .set_tile_bounding_box(BoundingBox::new_wgs84(-1.0, -1.0, 1.0, 1.0))
            .unwrap();
        orchestrator.set_zoom_range(0, 3).unwrap();
        orchestrator.set_google_tiles(false).unwrap();
        let first = orchestrator.generate().await.unwrap();
        assert!(first > 0);
    }

    {
        let mut orchestrator = Orchestrator::new("tiles", &container, &source, &probe);
        orchestrator
            .set_tile_bounding_box(BoundingBox::new_wgs84(-20.0, -20.0, 20.0, 20.0))
            .unwrap();
        orchestrator.set_zoom_range(0, 3).unwrap();
        orchestrator.set_google_tiles(false).unwrap();
        let second = orchestrator.generate().await.unwrap();
        assert!(second > 0);
    }

    for z in container.tile_dao_existing_zooms("tiles").unwrap() {
        let rows = container.tile_dao_query_for_tile_descending("tiles", z).unwrap();
        let mut seen = std::collections::HashSet::new();
        for row in &rows {
            assert!(seen.insert((row.tile_column, row.tile_row)), "duplicate (column,row) at zoom {z}");
        }
    }
}

// S4: cancelling partway through, with cleanup-on-cancel enabled, drops
// the table entirely and returns zero committed tiles.
#[tokio::test]
async fn s4_cancellation_with_cleanup_drops_table() {
    let container = SqliteContainer::open_in_memory().unwrap();
    let source = StaticTileSource::always(png_bytes(4, 4));
    let probe = CodecImageProbe;
    let mut orchestrator = Orchestrator::new("tiles", &container, &source, &probe);
    orchestrator.set_tile_bounding_box(BoundingBox::full_world_wgs84()).unwrap();
    orchestrator.set_zoom_range(0, 3).unwrap();
    orchestrator.set_google_tiles(true).unwrap();
    orchestrator
        .set_progress(Box::new(CountingProgress::new(true).cancel_after(3)))
        .unwrap();

    let committed = orchestrator.generate().await.unwrap();
    assert_eq!(committed, 0);
    assert!(!container.tile_matrix_set_table_exists("tiles").unwrap());
}

// S5: a google-mode request against an already-fitted table is a hard
// format conflict, and the table is left untouched.
#[tokio::test]
async fn s5_format_conflict_leaves_table_untouched() {
    let container = SqliteContainer::open_in_memory().unwrap();
    let source = StaticTileSource::always(png_bytes(4, 4));
    let probe = CodecImageProbe;

    {
        let mut orchestrator = Orchestrator::new("tiles", &container, &source, &probe);
        orchestrator
            .set_tile_bounding_box(BoundingBox::new_wgs84(-1.0, -1.0, 1.0, 1.0))
            .unwrap();
        orchestrator.set_zoom_range(0, 1).unwrap();
        orchestrator.set_google_tiles(false).unwrap();
        orchestrator.generate().await.unwrap();
    }

    let tms_before = container.tile_matrix_set_query_for_id("tiles").unwrap().unwrap();

    let mut orchestrator = Orchestrator::new("tiles", &container, &source, &probe);
    orchestrator.set_tile_bounding_box(BoundingBox::full_world_wgs84()).unwrap();
    orchestrator.set_zoom_range(0, 1).unwrap();
    orchestrator.set_google_tiles(true).unwrap();
    let err = orchestrator.generate().await.unwrap_err();
    assert!(matches!(err, retile::RetileError::FormatConflict { .. }));

    let tms_after = container.tile_matrix_set_query_for_id("tiles").unwrap().unwrap();
    assert_eq!(tms_before, tms_after);
}

// S6: when every tile at a zoom level is undecodable garbage, the
// end-of-zoom sweep removes them all and no tile-matrix row is created.
#[tokio::test]
async fn s6_undecodable_zoom_is_swept() {
    let container = SqliteContainer::open_in_memory().unwrap();
    let source = StaticTileSource::always(vec![0xde, 0xad, 0xbe, 0xef]);
    let probe = CodecImageProbe;
    let mut orchestrator = Orchestrator::new("tiles", &container, &source, &probe);
    orchestrator.set_tile_bounding_box(BoundingBox::full_world_wgs84()).unwrap();
    orchestrator.set_zoom_range(0, 0).unwrap();
    orchestrator.set_google_tiles(true).unwrap();

    let committed = orchestrator.generate().await.unwrap();
    assert_eq!(committed, 0);
    assert!(container.tile_matrix_at("tiles", 0).unwrap().is_none());
    assert!(container.tile_dao_query_for_tile_descending("tiles", 0).unwrap().is_empty());
}
