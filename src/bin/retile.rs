//! CLI front-end for the `retile` crate, grounded on the `versatiles` CLI's
//! clap-derive subcommand shape (bbox as a comma-separated string, min/max
//! zoom as plain options).

use clap::Parser;
use retile::container::sqlite::SqliteContainer;
use retile::image_probe::CodecImageProbe;
use retile::model::BoundingBox;
use retile::orchestrator::Orchestrator;
use retile::progress::TerminalProgress;
use retile::tile_source::HttpTileSource;
use std::path::PathBuf;
use std::process::ExitCode;

/// Materialize a tile pyramid into a GeoPackage-style container.
#[derive(Parser)]
#[command(name = "retile", version, about)]
struct Cli {
    /// container file to create or update
    container: PathBuf,

    /// tile table name
    #[arg(long, default_value = "tiles")]
    table: String,

    /// tile source URL template, e.g. https://tile.example.com/{z}/{x}/{y}.png
    #[arg(long)]
    source: String,

    /// requested bounding box: lon_min,lat_min,lon_max,lat_max (WGS84)
    #[arg(long, value_name = "lon_min,lat_min,lon_max,lat_max", allow_hyphen_values = true)]
    bbox: String,

    /// minimum zoom level
    #[arg(long)]
    min_zoom: u8,

    /// maximum zoom level
    #[arg(long)]
    max_zoom: u8,

    /// lay tiles out on the global web-mercator grid instead of a box-fitted one
    #[arg(long)]
    google: bool,

    /// re-encode fetched tiles in this format (e.g. jpeg, png, webp)
    #[arg(long)]
    compress: Option<String>,

    /// re-encode quality in [0.0, 1.0], only meaningful with --compress
    #[arg(long)]
    quality: Option<f64>,
}

fn parse_bbox(value: &str) -> Result<BoundingBox, String> {
    let parts: Vec<f64> = value
        .split(',')
        .map(|s| s.trim().parse::<f64>().map_err(|e| format!("invalid bbox component {s:?}: {e}")))
        .collect::<Result<_, _>>()?;
    match parts.as_slice() {
        [min_lon, min_lat, max_lon, max_lat] => Ok(BoundingBox::new_wgs84(*min_lon, *min_lat, *max_lon, *max_lat)),
        _ => Err(format!("bbox must have exactly 4 components, got {}", parts.len())),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let bbox = match parse_bbox(&cli.bbox) {
        Ok(bbox) => bbox,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };

    let container = match SqliteContainer::open(&cli.container) {
        Ok(container) => container,
        Err(err) => {
            eprintln!("error opening container: {err}");
            return ExitCode::FAILURE;
        }
    };
    let source = HttpTileSource::new(cli.source.clone());
    let probe = CodecImageProbe;

    let mut orchestrator = Orchestrator::new(cli.table.clone(), &container, &source, &probe);
    if let Err(err) = orchestrator.set_tile_bounding_box(bbox) {
        eprintln!("error: {err}");
        return ExitCode::FAILURE;
    }
    if let Err(err) = orchestrator.set_zoom_range(cli.min_zoom, cli.max_zoom) {
        eprintln!("error: {err}");
        return ExitCode::FAILURE;
    }
    if let Err(err) = orchestrator.set_google_tiles(cli.google) {
        eprintln!("error: {err}");
        return ExitCode::FAILURE;
    }
    if let Some(format) = &cli.compress {
        if let Err(err) = orchestrator.set_compress_format(format.clone()) {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    }
    if let Some(quality) = cli.quality {
        if let Err(err) = orchestrator.set_compress_quality(quality) {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    }
    if let Err(err) = orchestrator.set_progress(Box::new(TerminalProgress::new("retile"))) {
        eprintln!("error: {err}");
        return ExitCode::FAILURE;
    }

    match orchestrator.generate().await {
        Ok(count) => {
            eprintln!();
            println!("committed {count} tiles");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("\nerror: {err}");
            ExitCode::FAILURE
        }
    }
}
