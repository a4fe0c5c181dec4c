//! Serde-deserializable types matching skredview API responses.

use serde::Deserialize;
use std::collections::BTreeMap;

use crate::feature::{Feature, PrecisionBand};

/// Count per category key (day, elevation bucket, octant or region ID)
pub type Counts = BTreeMap<String, u64>;

/// Dimensions the points endpoint aggregates over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
  Dates,
  Heights,
  Expositions,
  Regions,
}

/// Aggregated counts from `/api/events/points/`, split by precision band.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PointsPayload {
  pub dates_lt24: Counts,
  pub dates_lte48: Counts,
  pub dates_gt48: Counts,
  pub heights_lt24: Counts,
  pub heights_lte48: Counts,
  pub heights_gt48: Counts,
  pub expositions_lt24: Counts,
  pub expositions_lte48: Counts,
  pub expositions_gt48: Counts,
  pub regions_lt24: Counts,
  pub regions_lte48: Counts,
  pub regions_gt48: Counts,
}

impl PointsPayload {
  pub fn counts(&self, dimension: Dimension, band: PrecisionBand) -> &Counts {
    use Dimension::*;
    use PrecisionBand::*;
    match (dimension, band) {
      (Dates, New) => &self.dates_lt24,
      (Dates, Medium) => &self.dates_lte48,
      (Dates, Old) => &self.dates_gt48,
      (Heights, New) => &self.heights_lt24,
      (Heights, Medium) => &self.heights_lte48,
      (Heights, Old) => &self.heights_gt48,
      (Expositions, New) => &self.expositions_lt24,
      (Expositions, Medium) => &self.expositions_lte48,
      (Expositions, Old) => &self.expositions_gt48,
      (Regions, New) => &self.regions_lt24,
      (Regions, Medium) => &self.regions_lte48,
      (Regions, Old) => &self.regions_gt48,
    }
  }

  /// Sum over every category of one dimension and band
  #[cfg(test)]
  pub fn total(&self, dimension: Dimension, band: PrecisionBand) -> u64 {
    self.counts(dimension, band).values().sum()
  }
}

/// What a request channel hands back to the UI loop
#[derive(Debug)]
pub enum Payload {
  Features(Vec<Feature>),
  Points(PointsPayload),
}
