//! Chart model behind the bar charts of the lower panel.
//!
//! Every update replaces values; nothing is incremented. The aggregated
//! points payload covers the whole filter, so applying it overwrites the
//! timeline, elevation and exposition series outright. The size chart is
//! recomputed from the displayed event polygons.

use chrono::NaiveDate;

use crate::api::{Dimension, PointsPayload};
use crate::date::{date_range, day_offset, format_date, parse_date};
use crate::feature::{size_category, Feature, PrecisionBand, EXPOSITIONS, SIZE_CATEGORIES};

/// Width of one elevation bucket in metres
pub const HEIGHT_STEP: u32 = 200;
/// Buckets 0, 200, ... 2400; higher stop elevations land in the last one
pub const HEIGHT_BUCKETS: usize = 13;

#[derive(Debug, Clone, PartialEq)]
pub struct Series {
  pub name: &'static str,
  pub values: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Chart {
  pub title: &'static str,
  pub categories: Vec<String>,
  pub series: Vec<Series>,
}

impl Chart {
  fn new(title: &'static str, categories: Vec<String>, names: &[&'static str]) -> Self {
    let len = categories.len();
    Self {
      title,
      categories,
      series: names
        .iter()
        .map(|name| Series {
          name: *name,
          values: vec![0; len],
        })
        .collect(),
    }
  }

  fn precision(title: &'static str, categories: Vec<String>) -> Self {
    let names = PrecisionBand::ALL.map(|band| band.label());
    Self::new(title, categories, &names)
  }

  /// Replace one value. Out-of-range positions are ignored.
  pub fn set_point(&mut self, series: usize, offset: usize, value: u64) -> bool {
    match self
      .series
      .get_mut(series)
      .and_then(|s| s.values.get_mut(offset))
    {
      Some(slot) => {
        *slot = value;
        true
      }
      None => false,
    }
  }

  /// Replace a whole series
  fn set_series(&mut self, series: usize, values: Vec<u64>) {
    for (offset, value) in values.into_iter().enumerate() {
      self.set_point(series, offset, value);
    }
  }

  pub fn clear(&mut self) {
    for series in &mut self.series {
      series.values.iter_mut().for_each(|v| *v = 0);
    }
  }

  /// Sum of all series per category
  pub fn stacked(&self) -> Vec<u64> {
    (0..self.categories.len())
      .map(|i| self.series.iter().map(|s| s.values[i]).sum())
      .collect()
  }

  #[cfg(test)]
  pub fn total(&self) -> u64 {
    self.series.iter().flat_map(|s| s.values.iter()).sum()
  }
}

#[derive(Debug, Clone)]
pub struct Charts {
  pub timeline: Chart,
  pub heights: Chart,
  pub expositions: Chart,
  pub sizes: Chart,
  /// First day of the timeline categories
  start: NaiveDate,
  /// The size chart is built from viewport data only
  sizes_partial: bool,
}

impl Charts {
  pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
    let heights = (0..HEIGHT_BUCKETS)
      .map(|i| format!("{}", i as u32 * HEIGHT_STEP))
      .collect();

    Self {
      timeline: Chart::precision("Avalanche timeline", timeline_categories(start, end)),
      heights: Chart::precision("Stop elevation", heights),
      expositions: Chart::precision(
        "Debris exposition",
        EXPOSITIONS.iter().map(|s| s.to_string()).collect(),
      ),
      sizes: Chart::new(
        "Debris area",
        SIZE_CATEGORIES.iter().map(|s| s.to_string()).collect(),
        &["Avalanches"],
      ),
      start,
      sizes_partial: true,
    }
  }

  pub fn sizes_partial(&self) -> bool {
    self.sizes_partial
  }

  /// Replace the timeline, elevation and exposition series from the payload
  pub fn apply_points(&mut self, payload: &PointsPayload) {
    let days = self.timeline.categories.len();

    for band in PrecisionBand::ALL {
      let series = band.index();

      let mut timeline = vec![0; days];
      for (key, count) in payload.counts(Dimension::Dates, band) {
        let Some(day) = key.get(..10).and_then(parse_date) else {
          continue;
        };
        let offset = day_offset(self.start, day);
        if offset >= 0 && (offset as usize) < days {
          timeline[offset as usize] += count;
        }
      }
      self.timeline.set_series(series, timeline);

      let mut heights = vec![0; HEIGHT_BUCKETS];
      for (key, count) in payload.counts(Dimension::Heights, band) {
        if let Some(bucket) = height_bucket(key) {
          heights[bucket] += count;
        }
      }
      self.heights.set_series(series, heights);

      let mut expositions = vec![0; EXPOSITIONS.len()];
      for (key, count) in payload.counts(Dimension::Expositions, band) {
        match key.trim().parse::<usize>() {
          Ok(octant) if octant < EXPOSITIONS.len() => expositions[octant] += count,
          _ => tracing::trace!(key = %key, "ignoring exposition key"),
        }
      }
      self.expositions.set_series(series, expositions);
    }
  }

  /// Re-index the timeline to a new date range.
  ///
  /// Days present in both ranges keep their value at their new offset, every
  /// other day starts at zero.
  pub fn update_timeline_dates(&mut self, start: NaiveDate, end: NaiveDate) {
    let old_start = self.start;
    let old_len = self.timeline.categories.len() as i64;
    let categories = timeline_categories(start, end);

    for series in &mut self.timeline.series {
      let values = date_range(start, end)
        .into_iter()
        .map(|day| {
          let old = day_offset(old_start, day);
          if (0..old_len).contains(&old) {
            series.values[old as usize]
          } else {
            0
          }
        })
        .collect();
      series.values = values;
    }

    self.timeline.categories = categories;
    self.start = start;
  }

  /// Recount the size chart from the displayed event polygons
  pub fn set_sizes<'a>(&mut self, features: impl IntoIterator<Item = &'a Feature>, complete: bool) {
    let mut counts = vec![0; SIZE_CATEGORIES.len()];
    for feature in features {
      if let Some(area) = feature.area {
        counts[size_category(area)] += 1;
      }
    }
    self.sizes.set_series(0, counts);
    self.sizes_partial = !complete;
  }

  /// Zero every series, keeping the categories
  pub fn clear(&mut self) {
    self.timeline.clear();
    self.heights.clear();
    self.expositions.clear();
    self.sizes.clear();
    self.sizes_partial = true;
  }
}

fn timeline_categories(start: NaiveDate, end: NaiveDate) -> Vec<String> {
  date_range(start, end).into_iter().map(format_date).collect()
}

/// Elevation bucket for a payload key such as "400" or "400.0"
fn height_bucket(key: &str) -> Option<usize> {
  let metres: f64 = key.trim().parse().ok()?;
  if !metres.is_finite() || metres < 0.0 {
    return None;
  }
  let bucket = (metres / HEIGHT_STEP as f64).floor() as usize;
  Some(bucket.min(HEIGHT_BUCKETS - 1))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::feature::fixtures::point;
  use serde_json::json;

  fn d(s: &str) -> NaiveDate {
    parse_date(s).unwrap()
  }

  fn payload() -> PointsPayload {
    serde_json::from_value(json!({
      "dates_lt24": {"2023-01-01": 3, "2023-01-02": 1, "2022-12-31": 9},
      "dates_gt48": {"2023-01-02": 2},
      "heights_lte48": {"0": 1, "600": 4, "3000": 2},
      "expositions_lt24": {"0": 5, "7": 1, "12": 3}
    }))
    .unwrap()
  }

  #[test]
  fn test_apply_points_replaces_values() {
    let mut charts = Charts::new(d("2023-01-01"), d("2023-01-03"));
    charts.apply_points(&payload());

    assert_eq!(charts.timeline.categories, vec!["2023-01-01", "2023-01-02"]);
    assert_eq!(charts.timeline.series[0].values, vec![3, 1]);
    assert_eq!(charts.timeline.series[2].values, vec![0, 2]);
    assert_eq!(charts.timeline.stacked(), vec![3, 3]);

    assert_eq!(charts.heights.series[1].values[0], 1);
    assert_eq!(charts.heights.series[1].values[3], 4);
    assert_eq!(charts.heights.series[1].values[HEIGHT_BUCKETS - 1], 2);

    assert_eq!(charts.expositions.series[0].values[0], 5);
    assert_eq!(charts.expositions.series[0].values[7], 1);
    assert_eq!(charts.expositions.total(), 6);

    // Applying the same payload again changes nothing
    let before = charts.timeline.clone();
    charts.apply_points(&payload());
    assert_eq!(charts.timeline, before);

    // An empty payload zeroes everything
    charts.apply_points(&PointsPayload::default());
    assert_eq!(charts.timeline.total(), 0);
    assert_eq!(charts.heights.total(), 0);
  }

  #[test]
  fn test_update_timeline_dates_moves_overlap() {
    let mut charts = Charts::new(d("2023-01-01"), d("2023-01-04"));
    charts.timeline.set_point(0, 0, 1);
    charts.timeline.set_point(0, 1, 2);
    charts.timeline.set_point(0, 2, 3);

    charts.update_timeline_dates(d("2023-01-02"), d("2023-01-06"));

    assert_eq!(
      charts.timeline.categories,
      vec!["2023-01-02", "2023-01-03", "2023-01-04", "2023-01-05"]
    );
    assert_eq!(charts.timeline.series[0].values, vec![2, 3, 0, 0]);
    assert_eq!(charts.timeline.series[1].values, vec![0, 0, 0, 0]);
  }

  #[test]
  fn test_set_point_ignores_out_of_range() {
    let mut charts = Charts::new(d("2023-01-01"), d("2023-01-02"));
    assert!(charts.timeline.set_point(0, 0, 4));
    assert!(!charts.timeline.set_point(0, 1, 4));
    assert!(!charts.timeline.set_point(3, 0, 4));
    assert_eq!(charts.timeline.total(), 4);
  }

  #[test]
  fn test_sizes_recount_from_features() {
    let mut charts = Charts::new(d("2023-01-01"), d("2023-01-02"));
    let mut big = point("b", "2023-01-01", 0.0, 0.0);
    big.area = Some(750_000.0);
    let features = vec![point("a", "2023-01-01", 0.0, 0.0), big];

    charts.set_sizes(&features, false);
    assert_eq!(charts.sizes.series[0].values, vec![0, 1, 0, 0, 1]);
    assert!(charts.sizes_partial());

    charts.set_sizes(features.iter().take(1), true);
    assert_eq!(charts.sizes.series[0].values, vec![0, 1, 0, 0, 0]);
    assert!(!charts.sizes_partial());
  }

  #[test]
  fn test_height_bucket() {
    assert_eq!(height_bucket("0"), Some(0));
    assert_eq!(height_bucket("199.9"), Some(0));
    assert_eq!(height_bucket("200"), Some(1));
    assert_eq!(height_bucket("9000"), Some(HEIGHT_BUCKETS - 1));
    assert_eq!(height_bucket("-5"), None);
    assert_eq!(height_bucket("high"), None);
  }
}
