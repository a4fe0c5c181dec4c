//! The map view: center, zoom level and the extent they cover on screen.
//!
//! All coordinates are EPSG:25833 metres. Zoom levels index into the
//! resolution ladder of the national tile grid, so the view and the basemap
//! always agree on scale.

use crate::store::{KeyValueStore, StoreKey};

/// Metres per screen pixel for every zoom level
pub const RESOLUTIONS: [f64; 18] = [
  21664.0,
  10832.0,
  5416.0,
  2708.0,
  1354.0,
  677.0,
  338.5,
  169.25,
  84.625,
  42.3125,
  21.15625,
  10.578125,
  5.2890625,
  2.64453125,
  1.322265625,
  0.6611328125,
  0.33056640625,
  0.165283203125,
];

pub const INIT_CENTER: (f64, f64) = (438_700.0, 7_264_409.0);
pub const INIT_ZOOM: u8 = 7;
pub const MIN_ZOOM: u8 = 6;
pub const MAX_ZOOM: u8 = 17;

/// The center is kept inside this box: [minx, miny, maxx, maxy]
pub const VIEW_EXTENT: [f64; 4] = [-100_000.0, 6_450_000.0, 1_130_000.0, 8_000_000.0];

/// Screen pixels a terminal cell stands for (width, height)
pub const CELL_PIXELS: (f64, f64) = (8.0, 16.0);

/// Which event layer is drawn at the current zoom
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveLayer {
  Clusters,
  Events,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapView {
  center: (f64, f64),
  zoom: u8,
  /// Canvas size in terminal cells
  size: (u16, u16),
}

impl Default for MapView {
  fn default() -> Self {
    Self::new(INIT_CENTER, INIT_ZOOM)
  }
}

impl MapView {
  pub fn new(center: (f64, f64), zoom: u8) -> Self {
    let mut view = Self {
      center,
      zoom: zoom.clamp(MIN_ZOOM, MAX_ZOOM),
      size: (80, 24),
    };
    view.clamp_center();
    view
  }

  /// Restore the last session's view. All three values must be present and
  /// non-zero, otherwise the initial view is used.
  pub fn restore(store: &dyn KeyValueStore) -> Self {
    let read = |key| {
      store
        .read(key)
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v != 0.0)
    };

    match (
      read(StoreKey::Eastings),
      read(StoreKey::Northings),
      read(StoreKey::ZoomLevel),
    ) {
      (Some(x), Some(y), Some(zoom)) => Self::new((x, y), zoom.round() as u8),
      _ => Self::default(),
    }
  }

  pub fn persist(&self, store: &dyn KeyValueStore) {
    store.persist(StoreKey::ZoomLevel, &self.zoom.to_string());
    store.persist(StoreKey::Eastings, &self.center.0.to_string());
    store.persist(StoreKey::Northings, &self.center.1.to_string());
  }

  pub fn center(&self) -> (f64, f64) {
    self.center
  }

  pub fn zoom(&self) -> u8 {
    self.zoom
  }

  pub fn resolution(&self) -> f64 {
    RESOLUTIONS[self.zoom as usize]
  }

  pub fn active_layer(&self, cluster_zoom: u8) -> ActiveLayer {
    if self.zoom < cluster_zoom {
      ActiveLayer::Clusters
    } else {
      ActiveLayer::Events
    }
  }

  /// Update the canvas size. Returns whether it changed.
  pub fn set_size(&mut self, width: u16, height: u16) -> bool {
    let size = (width.max(1), height.max(1));
    if size == self.size {
      return false;
    }
    self.size = size;
    true
  }

  /// Half width and half height of the visible area in metres
  fn half_span(&self) -> (f64, f64) {
    self.half_span_at(self.zoom)
  }

  fn half_span_at(&self, zoom: u8) -> (f64, f64) {
    let resolution = RESOLUTIONS[zoom as usize];
    (
      self.size.0 as f64 * CELL_PIXELS.0 * resolution / 2.0,
      self.size.1 as f64 * CELL_PIXELS.1 * resolution / 2.0,
    )
  }

  /// Visible area as [minx, miny, maxx, maxy]
  pub fn extent(&self) -> [f64; 4] {
    let (hw, hh) = self.half_span();
    [
      self.center.0 - hw,
      self.center.1 - hh,
      self.center.0 + hw,
      self.center.1 + hh,
    ]
  }

  /// Ground distance covered by one terminal cell horizontally
  pub fn cell_width(&self) -> f64 {
    CELL_PIXELS.0 * self.resolution()
  }

  /// Move by a fraction of the visible width/height
  pub fn pan(&mut self, dx: f64, dy: f64) {
    let (hw, hh) = self.half_span();
    self.center.0 += dx * hw * 2.0;
    self.center.1 += dy * hh * 2.0;
    self.clamp_center();
  }

  pub fn set_center(&mut self, x: f64, y: f64) {
    self.center = (x, y);
    self.clamp_center();
  }

  /// Change zoom by `delta` levels. Returns whether the zoom changed.
  pub fn zoom_by(&mut self, delta: i8) -> bool {
    let zoom = (self.zoom as i16 + delta as i16).clamp(MIN_ZOOM as i16, MAX_ZOOM as i16) as u8;
    self.set_zoom(zoom)
  }

  pub fn set_zoom(&mut self, zoom: u8) -> bool {
    let zoom = zoom.clamp(MIN_ZOOM, MAX_ZOOM);
    let changed = zoom != self.zoom;
    self.zoom = zoom;
    changed
  }

  /// Center on `rect` at the closest zoom that shows all of it
  pub fn fit(&mut self, rect: &geo::Rect<f64>) {
    let width = rect.width();
    let height = rect.height();

    let zoom = (MIN_ZOOM..=MAX_ZOOM)
      .rev()
      .find(|z| {
        let (hw, hh) = self.half_span_at(*z);
        width <= hw * 2.0 && height <= hh * 2.0
      })
      .unwrap_or(MIN_ZOOM);

    let center = rect.center();
    self.zoom = zoom;
    self.set_center(center.x, center.y);
  }

  fn clamp_center(&mut self) {
    let [minx, miny, maxx, maxy] = VIEW_EXTENT;
    self.center.0 = self.center.0.clamp(minx, maxx);
    self.center.1 = self.center.1.clamp(miny, maxy);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::MemoryStore;

  #[test]
  fn test_extent_follows_size_and_zoom() {
    let mut view = MapView::new((500_000.0, 7_000_000.0), 10);
    view.set_size(100, 50);

    let [minx, miny, maxx, maxy] = view.extent();
    assert_eq!(maxx - minx, 100.0 * 8.0 * 21.15625);
    assert_eq!(maxy - miny, 50.0 * 16.0 * 21.15625);
    assert_eq!((minx + maxx) / 2.0, 500_000.0);

    view.zoom_by(1);
    let [minx, _, maxx, _] = view.extent();
    assert_eq!(maxx - minx, 100.0 * 8.0 * 10.578125);
  }

  #[test]
  fn test_zoom_is_clamped() {
    let mut view = MapView::default();
    assert!(view.zoom_by(-5));
    assert_eq!(view.zoom(), MIN_ZOOM);
    assert!(!view.zoom_by(-1));
    assert!(view.set_zoom(40));
    assert_eq!(view.zoom(), MAX_ZOOM);
    assert!(!view.zoom_by(1));
  }

  #[test]
  fn test_center_stays_in_view_extent() {
    let mut view = MapView::default();
    view.set_center(-5_000_000.0, 9_000_000.0);
    assert_eq!(view.center(), (VIEW_EXTENT[0], VIEW_EXTENT[3]));
  }

  #[test]
  fn test_active_layer_switches_at_cluster_zoom() {
    let mut view = MapView::default();
    view.set_zoom(10);
    assert_eq!(view.active_layer(11), ActiveLayer::Clusters);
    view.set_zoom(11);
    assert_eq!(view.active_layer(11), ActiveLayer::Events);
  }

  #[test]
  fn test_fit_shows_whole_rect() {
    let mut view = MapView::default();
    view.set_size(120, 40);
    let rect = geo::Rect::new(
      geo::coord! { x: 400_000.0, y: 7_000_000.0 },
      geo::coord! { x: 460_000.0, y: 7_040_000.0 },
    );
    view.fit(&rect);

    let [minx, miny, maxx, maxy] = view.extent();
    assert!(minx <= 400_000.0 && maxx >= 460_000.0);
    assert!(miny <= 7_000_000.0 && maxy >= 7_040_000.0);

    // One level closer would no longer fit
    let mut closer = view.clone();
    if closer.zoom_by(1) {
      let [minx, miny, maxx, maxy] = closer.extent();
      assert!(minx > 400_000.0 || maxx < 460_000.0 || miny > 7_000_000.0 || maxy < 7_040_000.0);
    }
  }

  #[test]
  fn test_restore_round_trips_through_store() {
    let store = MemoryStore::new();
    assert_eq!(MapView::restore(&store), MapView::default());

    let view = MapView::new((300_000.0, 6_700_000.0), 12);
    view.persist(&store);
    let restored = MapView::restore(&store);
    assert_eq!(restored.center(), (300_000.0, 6_700_000.0));
    assert_eq!(restored.zoom(), 12);
  }

  #[test]
  fn test_restore_needs_all_values() {
    let store = MemoryStore::new();
    store.persist(StoreKey::Eastings, "300000");
    store.persist(StoreKey::ZoomLevel, "12");
    assert_eq!(MapView::restore(&store), MapView::default());
  }
}
