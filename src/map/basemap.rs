//! Optional vector basemap drawn behind the region outlines.
//!
//! Tiles are GeoJSON documents in EPSG:25833 addressed through the national
//! tile grid. Failed tiles are retried with `TileBackoff`; the retry sleeps in
//! its own task so the UI loop never waits on it.

use color_eyre::{eyre::eyre, Result};
use geo::{Geometry, LineString};
use geojson::GeoJson;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;

use super::tiles::{TileBackoff, TileCoord};
use crate::api::ApiClient;

/// Loaded tiles kept before tiles of other zoom levels are dropped
const MAX_CACHED_TILES: usize = 512;
/// Tile downloads running at once per request batch
const TILE_CONCURRENCY: usize = 6;

#[derive(Debug, Clone, PartialEq)]
pub enum TileState {
  Loading,
  Loaded(Vec<LineString<f64>>),
  /// Gave up after the last retry
  Failed,
}

type TileResult = (TileCoord, Result<Vec<LineString<f64>>, String>);

pub struct Basemap {
  client: ApiClient,
  template: String,
  tiles: HashMap<TileCoord, TileState>,
  backoff: TileBackoff,
  tx: mpsc::UnboundedSender<TileResult>,
  rx: mpsc::UnboundedReceiver<TileResult>,
}

impl Basemap {
  pub fn new(client: ApiClient, template: String) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();
    Self {
      client,
      template,
      tiles: HashMap::new(),
      backoff: TileBackoff::new(),
      tx,
      rx,
    }
  }

  /// Start loading every tile in `coords` not seen before
  pub fn request(&mut self, coords: &[TileCoord]) {
    if self.tiles.len() > MAX_CACHED_TILES {
      if let Some(z) = coords.first().map(|c| c.z) {
        self
          .tiles
          .retain(|coord, state| coord.z == z || *state == TileState::Loading);
      }
    }

    let mut batch = Vec::new();
    for coord in coords {
      if self.tiles.contains_key(coord) {
        continue;
      }
      self.tiles.insert(*coord, TileState::Loading);
      batch.push(*coord);
    }
    self.spawn_batch(batch);
  }

  /// Apply finished loads. Returns whether any tile became drawable.
  pub fn poll(&mut self) -> bool {
    let mut updated = false;
    while let Ok((coord, result)) = self.rx.try_recv() {
      match result {
        Ok(lines) => {
          self.tiles.insert(coord, TileState::Loaded(lines));
          updated = true;
        }
        Err(error) => {
          tracing::debug!(?coord, %error, "tile load failed");
          match self.backoff.on_error(coord, &mut rand::thread_rng()) {
            Some(delay) => self.spawn_load(coord, delay),
            None => {
              self.tiles.insert(coord, TileState::Failed);
            }
          }
        }
      }
    }
    updated
  }

  /// Lines of the loaded tiles among `coords`
  pub fn lines<'a>(&'a self, coords: &'a [TileCoord]) -> impl Iterator<Item = &'a LineString<f64>> {
    coords.iter().filter_map(|c| match self.tiles.get(c) {
      Some(TileState::Loaded(lines)) => Some(lines.iter()),
      _ => None,
    })
    .flatten()
  }

  fn spawn_batch(&self, coords: Vec<TileCoord>) {
    use futures::StreamExt;

    if coords.is_empty() {
      return;
    }
    tracing::trace!(tiles = coords.len(), "loading basemap tiles");

    let client = self.client.clone();
    let template = self.template.clone();
    let tx = self.tx.clone();

    tokio::spawn(async move {
      futures::stream::iter(coords)
        .map(|coord| {
          let client = client.clone();
          let url = coord.url(&template);
          async move { (coord, load_tile(&client, &url).await) }
        })
        .buffer_unordered(TILE_CONCURRENCY)
        .for_each(|message| {
          let _ = tx.send(message);
          async {}
        })
        .await;
    });
  }

  /// Retry one tile after `delay`
  fn spawn_load(&self, coord: TileCoord, delay: Duration) {
    let client = self.client.clone();
    let url = coord.url(&self.template);
    let tx = self.tx.clone();

    tokio::spawn(async move {
      tokio::time::sleep(delay).await;
      let result = load_tile(&client, &url).await;
      let _ = tx.send((coord, result));
    });
  }
}

async fn load_tile(client: &ApiClient, url: &str) -> Result<Vec<LineString<f64>>, String> {
  let text = client.load_source(url).await.map_err(|e| e.to_string())?;
  parse_tile(&text).map_err(|e| e.to_string())
}

/// Every line in a tile: linestrings as is, polygon rings as outlines
pub fn parse_tile(text: &str) -> Result<Vec<LineString<f64>>> {
  let geojson: GeoJson = text
    .parse()
    .map_err(|e| eyre!("Failed to parse tile GeoJSON: {}", e))?;

  let geometries: Vec<geojson::Geometry> = match geojson {
    GeoJson::FeatureCollection(fc) => fc.features.into_iter().filter_map(|f| f.geometry).collect(),
    GeoJson::Feature(f) => f.geometry.into_iter().collect(),
    GeoJson::Geometry(g) => vec![g],
  };

  let mut lines = Vec::new();
  for geometry in geometries {
    match Geometry::<f64>::try_from(geometry) {
      Ok(geometry) => collect_lines(geometry, &mut lines),
      Err(e) => tracing::trace!(error = %e, "skipping tile geometry"),
    }
  }
  Ok(lines)
}

fn collect_lines(geometry: Geometry<f64>, out: &mut Vec<LineString<f64>>) {
  match geometry {
    Geometry::LineString(line) => out.push(line),
    Geometry::MultiLineString(lines) => out.extend(lines.0),
    Geometry::Polygon(polygon) => {
      let (exterior, interiors) = polygon.into_inner();
      out.push(exterior);
      out.extend(interiors);
    }
    Geometry::MultiPolygon(polygons) => {
      for polygon in polygons.0 {
        collect_lines(Geometry::Polygon(polygon), out);
      }
    }
    Geometry::GeometryCollection(collection) => {
      for geometry in collection.0 {
        collect_lines(geometry, out);
      }
    }
    _ => {}
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::Config;

  #[test]
  fn test_parse_tile_collects_lines_and_rings() {
    let text = r#"{
      "type": "FeatureCollection",
      "features": [
        {"type": "Feature", "properties": {},
         "geometry": {"type": "LineString", "coordinates": [[0, 0], [1, 1]]}},
        {"type": "Feature", "properties": {},
         "geometry": {"type": "Polygon", "coordinates": [[[0, 0], [2, 0], [2, 2], [0, 0]]]}},
        {"type": "Feature", "properties": {},
         "geometry": {"type": "Point", "coordinates": [5, 5]}}
      ]
    }"#;

    let lines = parse_tile(text).unwrap();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[1].0.len(), 4);
  }

  #[tokio::test]
  async fn test_tiles_load_from_template() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path();
    std::fs::create_dir_all(dir.join("9/3")).unwrap();
    std::fs::write(
      dir.join("9/3/4.json"),
      r#"{"type": "LineString", "coordinates": [[0, 0], [1, 1]]}"#,
    )
    .unwrap();

    let template = format!("{}/{{z}}/{{x}}/{{y}}.json", dir.display());
    let client = ApiClient::new(&Config::default()).unwrap();
    let mut basemap = Basemap::new(client, template);

    let loaded = TileCoord::new(9, 3, 4);
    let missing = TileCoord::new(9, 3, 5);
    basemap.request(&[loaded, missing]);
    assert_eq!(basemap.tiles.get(&loaded), Some(&TileState::Loading));

    let mut updated = false;
    for _ in 0..50 {
      tokio::time::sleep(Duration::from_millis(10)).await;
      updated |= basemap.poll();
      if updated && basemap.backoff.attempts(missing) > 0 {
        break;
      }
    }

    assert!(updated);
    assert_eq!(basemap.lines(&[loaded, missing]).count(), 1);
    // The missing tile is being retried, not given up on
    assert_eq!(basemap.tiles.get(&missing), Some(&TileState::Loading));
    assert!(basemap.backoff.attempts(missing) >= 1);
  }
}
