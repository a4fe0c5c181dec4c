use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Arc;

use crate::feature::{Feature, FeatureId, PrecisionBand};

/// Distance in screen pixels within which points are merged into one cluster
pub const CLUSTER_DISTANCE: f64 = 40.0;

/// Features handed to one map layer for drawing
#[derive(Debug, Default)]
pub struct VectorSource {
  features: HashMap<(NaiveDate, FeatureId), Arc<Feature>>,
}

impl VectorSource {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn add_features(&mut self, features: impl IntoIterator<Item = Arc<Feature>>) {
    for feature in features {
      self
        .features
        .insert((feature.day(), feature.id.clone()), feature);
    }
  }

  pub fn clear(&mut self) {
    self.features.clear();
  }

  /// Replace the contents
  pub fn rebuild(&mut self, features: impl IntoIterator<Item = Arc<Feature>>) {
    self.clear();
    self.add_features(features);
  }

  pub fn len(&self) -> usize {
    self.features.len()
  }

  pub fn is_empty(&self) -> bool {
    self.features.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &Arc<Feature>> {
    self.features.values()
  }

  /// Features whose anchor lies in [minx, miny, maxx, maxy]
  pub fn within(&self, extent: [f64; 4]) -> impl Iterator<Item = &Arc<Feature>> {
    let [minx, miny, maxx, maxy] = extent;
    self.features.values().filter(move |f| {
      let (x, y) = f.anchor;
      x >= minx && x <= maxx && y >= miny && y <= maxy
    })
  }

  /// Closest feature to (x, y) no further away than `max_distance`
  pub fn nearest(&self, x: f64, y: f64, max_distance: f64) -> Option<&Arc<Feature>> {
    self
      .features
      .values()
      .map(|f| (f, (f.anchor.0 - x).hypot(f.anchor.1 - y)))
      .filter(|(_, d)| *d <= max_distance)
      .min_by(|a, b| a.1.total_cmp(&b.1))
      .map(|(f, _)| f)
  }
}

/// A group of nearby points drawn as one marker
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
  pub x: f64,
  pub y: f64,
  pub count: usize,
  /// Most precise band among the members
  pub band: PrecisionBand,
}

/// Group points on a grid of `CLUSTER_DISTANCE` screen pixels.
pub fn cluster<'a>(
  features: impl IntoIterator<Item = &'a Arc<Feature>>,
  resolution: f64,
) -> Vec<Cluster> {
  let cell = CLUSTER_DISTANCE * resolution;
  let mut cells: HashMap<(i64, i64), (f64, f64, usize, PrecisionBand)> = HashMap::new();

  for feature in features {
    let (x, y) = feature.anchor;
    let key = ((x / cell).floor() as i64, (y / cell).floor() as i64);
    let entry = cells
      .entry(key)
      .or_insert((0.0, 0.0, 0, PrecisionBand::Old));
    entry.0 += x;
    entry.1 += y;
    entry.2 += 1;
    entry.3 = entry.3.min(feature.precision_band());
  }

  let mut clusters: Vec<Cluster> = cells
    .into_values()
    .map(|(sx, sy, count, band)| Cluster {
      x: sx / count as f64,
      y: sy / count as f64,
      count,
      band,
    })
    .collect();
  clusters.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));
  clusters
}
