//! Tile grid of the EPSG:25833 basemap and retry bookkeeping for failed tiles.

use rand::Rng;
use std::collections::HashMap;
use std::time::Duration;

use super::view::RESOLUTIONS;

/// Grid extent: [minx, miny, maxx, maxy]. Tiles are counted from the top-left.
pub const PROJECTION_EXTENT: [f64; 4] = [-2_500_000.0, 6_420_992.0, 1_130_000.0, 9_045_984.0];
pub const TILE_SIZE: f64 = 256.0;

/// Base delay of the first retry
pub const EXP_TIMEOUT: Duration = Duration::from_millis(500);
/// Retries per tile before giving up
pub const MAX_ATTEMPTS: u32 = 5;

/// Upper bound on tiles requested for one view
const MAX_VISIBLE_TILES: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileCoord {
  pub z: u8,
  pub x: u32,
  pub y: u32,
}

impl TileCoord {
  pub fn new(z: u8, x: u32, y: u32) -> Self {
    Self { z, x, y }
  }

  /// Ground extent of the tile
  pub fn extent(&self) -> [f64; 4] {
    let span = tile_span(self.z);
    let minx = PROJECTION_EXTENT[0] + self.x as f64 * span;
    let maxy = PROJECTION_EXTENT[3] - self.y as f64 * span;
    [minx, maxy - span, minx + span, maxy]
  }

  /// Fill a `{z}/{x}/{y}` URL template
  pub fn url(&self, template: &str) -> String {
    template
      .replace("{z}", &self.z.to_string())
      .replace("{x}", &self.x.to_string())
      .replace("{y}", &self.y.to_string())
  }
}

/// Ground width of one tile at zoom `z`
fn tile_span(z: u8) -> f64 {
  RESOLUTIONS[z as usize] * TILE_SIZE
}

/// Tiles of zoom `z` covering `extent`, clipped to the grid
pub fn tiles_for_extent(extent: [f64; 4], z: u8) -> Vec<TileCoord> {
  let span = tile_span(z);
  let [gminx, gminy, gmaxx, gmaxy] = PROJECTION_EXTENT;
  let cols = ((gmaxx - gminx) / span).ceil() as i64;
  let rows = ((gmaxy - gminy) / span).ceil() as i64;

  let [minx, miny, maxx, maxy] = extent;
  let x0 = (((minx - gminx) / span).floor() as i64).max(0);
  let x1 = (((maxx - gminx) / span).floor() as i64).min(cols - 1);
  let y0 = (((gmaxy - maxy) / span).floor() as i64).max(0);
  let y1 = (((gmaxy - miny) / span).floor() as i64).min(rows - 1);

  if x0 > x1 || y0 > y1 {
    return Vec::new();
  }

  let count = ((x1 - x0 + 1) * (y1 - y0 + 1)) as usize;
  if count > MAX_VISIBLE_TILES {
    tracing::debug!(z, count, "too many tiles for view, skipping basemap");
    return Vec::new();
  }

  let mut tiles = Vec::with_capacity(count);
  for y in y0..=y1 {
    for x in x0..=x1 {
      tiles.push(TileCoord::new(z, x as u32, y as u32));
    }
  }
  tiles
}

/// Exponential backoff per tile coordinate.
///
/// The first failure of a tile retries after `random * 500 ms`, each further
/// one doubles the window. Once a tile has been retried `MAX_ATTEMPTS` times
/// its failures are ignored.
#[derive(Debug, Default)]
pub struct TileBackoff {
  attempts: HashMap<TileCoord, u32>,
}

impl TileBackoff {
  pub fn new() -> Self {
    Self::default()
  }

  /// Record a failure. Returns the delay before the next attempt, if any.
  pub fn on_error<R: Rng + ?Sized>(&mut self, coord: TileCoord, rng: &mut R) -> Option<Duration> {
    let attempts = self.attempts.entry(coord).or_insert(0);
    if *attempts >= MAX_ATTEMPTS {
      return None;
    }

    let window = EXP_TIMEOUT.as_secs_f64() * 2f64.powi(*attempts as i32);
    *attempts += 1;
    Some(Duration::from_secs_f64(rng.gen::<f64>() * window))
  }

  pub fn attempts(&self, coord: TileCoord) -> u32 {
    self.attempts.get(&coord).copied().unwrap_or(0)
  }
}
