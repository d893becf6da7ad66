//! Supplies raw tile bytes. Input coordinates are always *global*
//! web-mercator tile indices, regardless of the tile table's own
//! addressing scheme.

use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// A single operation: fetch the raw bytes for one global tile, or report
/// it absent.
#[async_trait]
pub trait TileSource: Send + Sync {
    async fn fetch(&self, z: u8, x: u32, y: u32) -> Result<Option<Vec<u8>>>;
}

/// Fetches tiles over HTTP from a `{z}/{x}/{y}` URL template, e.g.
/// `https://tile.example.com/{z}/{x}/{y}.png`.
pub struct HttpTileSource {
    client: reqwest::blocking::Client,
    url_template: String,
}

impl HttpTileSource {
    #[must_use]
    pub fn new(url_template: impl Into<String>) -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
            url_template: url_template.into(),
        }
    }

    fn url_for(&self, z: u8, x: u32, y: u32) -> String {
        self.url_template
            .replace("{z}", &z.to_string())
            .replace("{x}", &x.to_string())
            .replace("{y}", &y.to_string())
    }
}

#[async_trait]
impl TileSource for HttpTileSource {
    async fn fetch(&self, z: u8, x: u32, y: u32) -> Result<Option<Vec<u8>>> {
        let url = self.url_for(z, x, y);
        let client = self.client.clone();
        let response = tokio::task::spawn_blocking(move || client.get(&url).send())
            .await
            .expect("blocking HTTP task panicked")?;

        if !response.status().is_success() {
            return Ok(None);
        }
        let bytes = response.bytes()?;
        Ok(Some(bytes.to_vec()))
    }
}

/// A deterministic stub used by tests and as a stand-in for a local
/// renderer: returns a fixed byte blob for every coordinate, or tracks
/// per-coordinate overrides (including deliberate absences) for scenarios
/// like an undecodable source.
pub struct StaticTileSource {
    default_bytes: Option<Vec<u8>>,
    overrides: Mutex<HashMap<(u8, u32, u32), Option<Vec<u8>>>>,
}

impl StaticTileSource {
    #[must_use]
    pub fn always(bytes: Vec<u8>) -> Self {
        Self {
            default_bytes: Some(bytes),
            overrides: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn never() -> Self {
        Self {
            default_bytes: None,
            overrides: Mutex::new(HashMap::new()),
        }
    }

    pub fn set(&self, z: u8, x: u32, y: u32, bytes: Option<Vec<u8>>) {
        self.overrides.lock().unwrap().insert((z, x, y), bytes);
    }
}

#[async_trait]
impl TileSource for StaticTileSource {
    async fn fetch(&self, z: u8, x: u32, y: u32) -> Result<Option<Vec<u8>>> {
        if let Some(bytes) = self.overrides.lock().unwrap().get(&(z, x, y)) {
            return Ok(bytes.clone());
        }
        Ok(self.default_bytes.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_source_returns_default_unless_overridden() {
        let source = StaticTileSource::always(vec![1, 2, 3]);
        assert_eq!(source.fetch(0, 0, 0).await.unwrap(), Some(vec![1, 2, 3]));
        source.set(0, 0, 0, None);
        assert_eq!(source.fetch(0, 0, 0).await.unwrap(), None);
        assert_eq!(source.fetch(1, 0, 0).await.unwrap(), Some(vec![1, 2, 3]));
    }
}
