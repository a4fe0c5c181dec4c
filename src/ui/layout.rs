use ratatui::prelude::*;

use crate::store::{KeyValueStore, StoreKey};

const CHARTS_DEFAULT: u16 = 40;
const CHARTS_RANGE: (u16, u16) = (15, 80);
const STATISTICS_DEFAULT: u16 = 25;
const STATISTICS_RANGE: (u16, u16) = (10, 50);

/// Screen areas of the dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Areas {
  pub header: Rect,
  pub map: Rect,
  pub statistics: Rect,
  pub charts: Rect,
  pub footer: Rect,
}

/// Split between the map and the lower panel, kept between sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanelLayout {
  /// Percentage of the body height given to the lower panel (`size`)
  charts: u16,
  /// Percentage of the lower panel width given to the statistics (`sizeDepth`)
  statistics: u16,
}

impl Default for PanelLayout {
  fn default() -> Self {
    Self {
      charts: CHARTS_DEFAULT,
      statistics: STATISTICS_DEFAULT,
    }
  }
}

impl PanelLayout {
  pub fn restore(store: &dyn KeyValueStore) -> Self {
    let read = |key, default, (min, max): (u16, u16)| {
      store
        .read(key)
        .and_then(|v| v.trim().parse::<u16>().ok())
        .map(|v| v.clamp(min, max))
        .unwrap_or(default)
    };

    Self {
      charts: read(StoreKey::Size, CHARTS_DEFAULT, CHARTS_RANGE),
      statistics: read(StoreKey::SizeDepth, STATISTICS_DEFAULT, STATISTICS_RANGE),
    }
  }

  /// Returns whether the split moved
  pub fn grow_charts(&mut self, delta: i16, store: &dyn KeyValueStore) -> bool {
    let value = step(self.charts, delta, CHARTS_RANGE);
    if value == self.charts {
      return false;
    }
    self.charts = value;
    store.persist(StoreKey::Size, &value.to_string());
    true
  }

  pub fn grow_statistics(&mut self, delta: i16, store: &dyn KeyValueStore) -> bool {
    let value = step(self.statistics, delta, STATISTICS_RANGE);
    if value == self.statistics {
      return false;
    }
    self.statistics = value;
    store.persist(StoreKey::SizeDepth, &value.to_string());
    true
  }

  pub fn split(&self, area: Rect) -> Areas {
    let [header, body, footer] = Layout::vertical([
      Constraint::Length(1),
      Constraint::Min(3),
      Constraint::Length(1),
    ])
    .areas(area);

    let [map, panel] = Layout::vertical([
      Constraint::Percentage(100 - self.charts),
      Constraint::Percentage(self.charts),
    ])
    .areas(body);

    let [statistics, charts] = Layout::horizontal([
      Constraint::Percentage(self.statistics),
      Constraint::Percentage(100 - self.statistics),
    ])
    .areas(panel);

    Areas {
      header,
      map,
      statistics,
      charts,
      footer,
    }
  }
}

fn step(value: u16, delta: i16, (min, max): (u16, u16)) -> u16 {
  (value as i16 + delta).clamp(min as i16, max as i16) as u16
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::MemoryStore;

  #[test]
  fn test_restore_defaults_and_clamps() {
    let store = MemoryStore::new();
    assert_eq!(PanelLayout::restore(&store), PanelLayout::default());

    store.persist(StoreKey::Size, "95");
    store.persist(StoreKey::SizeDepth, "30");
    let layout = PanelLayout::restore(&store);
    assert_eq!(layout.charts, 80);
    assert_eq!(layout.statistics, 30);
  }

  #[test]
  fn test_grow_persists_until_limit() {
    let store = MemoryStore::new();
    let mut layout = PanelLayout::default();

    assert!(layout.grow_charts(30, &store));
    assert_eq!(store.read(StoreKey::Size).as_deref(), Some("70"));
    assert!(layout.grow_charts(30, &store));
    assert!(!layout.grow_charts(5, &store));
    assert_eq!(layout.charts, 80);
    assert_eq!(store.writes(), 2);

    assert!(layout.grow_statistics(-20, &store));
    assert_eq!(store.read(StoreKey::SizeDepth).as_deref(), Some("10"));
  }

  #[test]
  fn test_split_covers_area() {
    let areas = PanelLayout::default().split(Rect::new(0, 0, 100, 52));
    assert_eq!(areas.header.height, 1);
    assert_eq!(areas.footer.y, 51);
    assert_eq!(areas.map.height + areas.charts.height, 50);
    assert_eq!(areas.statistics.width + areas.charts.width, 100);
    assert_eq!(areas.statistics.y, areas.charts.y);
  }
}
