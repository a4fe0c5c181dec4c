//! Avalanche event features and their domain attributes.

use chrono::{NaiveDate, NaiveDateTime};
use color_eyre::{eyre::eyre, Result};
use geo::Centroid;
use serde_json::{Map, Value};
use std::fmt;

use crate::date::parse_db_timestamp;

/// Stable avalanche identifier (`skredID`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeatureId(String);

impl FeatureId {
  pub fn new(id: impl Into<String>) -> Self {
    Self(id.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for FeatureId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// Timestamp certainty, in the three bands every chart is split by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PrecisionBand {
  /// Precision < 24 h
  New,
  /// Precision ≤ 48 h
  Medium,
  /// Precision > 48 h, or unknown
  Old,
}

impl PrecisionBand {
  pub const ALL: [PrecisionBand; 3] = [PrecisionBand::New, PrecisionBand::Medium, PrecisionBand::Old];

  pub fn from_hours(hours: Option<u32>) -> Self {
    match hours {
      Some(h) if h < 24 => PrecisionBand::New,
      Some(h) if h <= 48 => PrecisionBand::Medium,
      _ => PrecisionBand::Old,
    }
  }

  /// Key suffix used by the aggregated points payload
  pub fn label(&self) -> &'static str {
    match self {
      PrecisionBand::New => "Precision < 24 h",
      PrecisionBand::Medium => "Precision ≤ 48 h",
      PrecisionBand::Old => "Precision > 48 h",
    }
  }

  pub fn index(&self) -> usize {
    match self {
      PrecisionBand::New => 0,
      PrecisionBand::Medium => 1,
      PrecisionBand::Old => 2,
    }
  }
}

/// Hours of uncertainty for a `noySkredTidspunkt` value
pub fn precision_hours(text: &str) -> Option<u32> {
  match text.trim() {
    "Eksakt" | "1 min" => Some(0),
    "1 time" => Some(1),
    "4 timer" => Some(4),
    "6 timer" => Some(6),
    "12 timer" => Some(12),
    "1 dag" | "1 dager" => Some(24),
    "2 dager" => Some(48),
    "3 dager" => Some(72),
    _ => None,
  }
}

pub const EXPOSITIONS: [&str; 8] = ["N", "NE", "E", "SE", "S", "SW", "W", "NW"];

/// Octant index (0 = N, clockwise) for an aspect in degrees
pub fn exposition_octant(degrees: f64) -> Option<usize> {
  if !degrees.is_finite() {
    return None;
  }
  let idx = ((degrees + 22.5) / 45.0).floor() as i64;
  Some(idx.rem_euclid(8) as usize)
}

pub const SIZE_CATEGORIES: [&str; 5] = [
  "< 10.000 m²",
  "< 50.000 m²",
  "< 100.000 m²",
  "< 500.000 m²",
  "≥ 500.000 m²",
];

/// Size category index for a debris area in m²
pub fn size_category(area: f64) -> usize {
  match area {
    a if a < 10_000.0 => 0,
    a if a < 50_000.0 => 1,
    a if a < 100_000.0 => 2,
    a if a < 500_000.0 => 3,
    _ => 4,
  }
}

/// One avalanche record: an event polygon or a point
#[derive(Debug, Clone)]
pub struct Feature {
  pub id: FeatureId,
  /// Local wall-clock trigger time
  pub triggered: NaiveDateTime,
  pub geometry: geo::Geometry<f64>,
  /// Representative point used for clustering and picking
  pub anchor: (f64, f64),
  /// Raw `noySkredTidspunkt`
  pub precision_text: Option<String>,
  /// Debris area in m²
  pub area: Option<f64>,
  /// Aspect of the run-out zone in degrees
  pub exposition: Option<f64>,
  /// Elevation where the avalanche stopped, m.a.s.l.
  pub elevation: Option<f64>,
  /// Raw `noyHoydeStoppSkred`, e.g. "50m"
  pub elevation_precision: Option<String>,
  /// Run-out zone slope in degrees
  pub slope: SlopeRange,
  /// Raw `regStatus`
  pub registration_status: Option<String>,
  pub registered: Option<NaiveDateTime>,
  pub edited: Option<NaiveDateTime>,
}

/// Mean, minimum and maximum slope of the run-out zone
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SlopeRange {
  pub mean: Option<f64>,
  pub min: Option<f64>,
  pub max: Option<f64>,
}

/// English label for a `regStatus` value, the raw text when unknown
pub fn registration_status_label(status: &str) -> &str {
  match status {
    "Godkjent kvalitet A" => "Approved quality A",
    "Godkjent kvalitet B" => "Approved quality B",
    "Godkjent kvalitet C" => "Approved quality C",
    other => other,
  }
}

impl Feature {
  /// Calendar day the feature is bucketed under
  pub fn day(&self) -> NaiveDate {
    self.triggered.date()
  }

  pub fn precision_hours(&self) -> Option<u32> {
    self.precision_text.as_deref().and_then(precision_hours)
  }

  pub fn precision_band(&self) -> PrecisionBand {
    PrecisionBand::from_hours(self.precision_hours())
  }

  /// Decode a GeoJSON feature from the events API
  pub fn from_geojson(feature: geojson::Feature) -> Result<Self> {
    let props = feature.properties.unwrap_or_default();

    let id = match props.get("skredID") {
      Some(Value::String(s)) if !s.is_empty() => FeatureId::new(s.clone()),
      Some(Value::Number(n)) => FeatureId::new(n.to_string()),
      _ => return Err(eyre!("Feature without skredID")),
    };

    let triggered = props
      .get("skredTidspunkt")
      .and_then(Value::as_str)
      .and_then(parse_db_timestamp)
      .ok_or_else(|| eyre!("Feature {} has no valid skredTidspunkt", id))?;

    let geometry = feature
      .geometry
      .ok_or_else(|| eyre!("Feature {} has no geometry", id))?;
    let geometry = geo::Geometry::<f64>::try_from(geometry)
      .map_err(|e| eyre!("Feature {} has unsupported geometry: {}", id, e))?;

    let anchor = geometry
      .centroid()
      .map(|p| (p.x(), p.y()))
      .ok_or_else(|| eyre!("Feature {} has empty geometry", id))?;

    Ok(Self {
      id,
      triggered,
      geometry,
      anchor,
      precision_text: prop_string(&props, "noySkredTidspunkt"),
      area: prop_f64(&props, "area"),
      exposition: prop_f64(&props, "eksposisjonUtlopsomr"),
      elevation: prop_f64(&props, "hoydeStoppSkred_moh"),
      elevation_precision: prop_string(&props, "noyHoydeStoppSkred"),
      slope: SlopeRange {
        mean: prop_f64(&props, "snittHelningUtlopssomr_gr"),
        min: prop_f64(&props, "minHelningUtlopsomr_gr"),
        max: prop_f64(&props, "maksHelningUtlopsomr_gr"),
      },
      registration_status: prop_string(&props, "regStatus"),
      registered: prop_timestamp(&props, "registrertDato"),
      edited: prop_timestamp(&props, "endretDato"),
    })
  }
}

/// Numeric property that may arrive as a number or a numeric string
fn prop_f64(props: &Map<String, Value>, key: &str) -> Option<f64> {
  match props.get(key)? {
    Value::Number(n) => n.as_f64(),
    Value::String(s) => s.trim().parse().ok(),
    _ => None,
  }
}

fn prop_string(props: &Map<String, Value>, key: &str) -> Option<String> {
  props
    .get(key)
    .and_then(Value::as_str)
    .filter(|s| !s.trim().is_empty())
    .map(String::from)
}

fn prop_timestamp(props: &Map<String, Value>, key: &str) -> Option<NaiveDateTime> {
  props
    .get(key)
    .and_then(Value::as_str)
    .and_then(parse_db_timestamp)
}
