//! A reprojection-aware tile pyramid generator.
//!
//! Given a requested geographic bounding box and an inclusive zoom range,
//! [`RetileEngine`](engine::RetileEngine) fetches and writes the covering
//! tile set into a GeoPackage-style container, either laid out on the
//! global web-mercator grid ("google" addressing) or tightly fitted around
//! the request box ("fitted" addressing). Re-running generation against a
//! box that grows an existing tile set re-grids every stored tile into the
//! new coordinate space instead of starting over.
//!
//! ```no_run
//! # async fn run() -> retile::error::Result<()> {
//! use retile::container::sqlite::SqliteContainer;
//! use retile::image_probe::CodecImageProbe;
//! use retile::model::BoundingBox;
//! use retile::orchestrator::Orchestrator;
//! use retile::tile_source::HttpTileSource;
//! use std::path::Path;
//!
//! let container = SqliteContainer::open(Path::new("tiles.gpkg"))?;
//! let source = HttpTileSource::new("https://tile.example.com/{z}/{x}/{y}.png");
//! let probe = CodecImageProbe;
//! let mut orchestrator = Orchestrator::new("tiles", &container, &source, &probe);
//! orchestrator.set_tile_bounding_box(BoundingBox::new_wgs84(-10.0, -10.0, 10.0, 10.0))?;
//! orchestrator.set_zoom_range(0, 8)?;
//! let committed = orchestrator.generate().await?;
//! # let _ = committed;
//! # Ok(())
//! # }
//! ```

pub mod container;
pub mod coord_math;
pub mod crs;
pub mod engine;
pub mod error;
pub mod image_probe;
pub mod model;
pub mod orchestrator;
pub mod progress;
pub mod tile_source;

pub use engine::{GenerateRequest, RetileEngine};
pub use error::{RetileError, Result};
pub use orchestrator::Orchestrator;
