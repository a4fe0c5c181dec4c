use crate::api::{Dimension, PointsPayload};
use crate::feature::{PrecisionBand, EXPOSITIONS};

/// Key figures for the current filter, taken from the aggregated payload.
///
/// Totals are summed over the exposition dimension, which counts every
/// avalanche exactly once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Statistics {
  pub total: u64,
  /// Avalanches with precision < 24 h
  pub recent: u64,
  /// Most common exposition octant
  pub dominant_exposition: Option<&'static str>,
}

impl Statistics {
  pub fn from_points(payload: &PointsPayload) -> Self {
    let mut by_band = [[0u64; EXPOSITIONS.len()]; PrecisionBand::ALL.len()];
    for band in PrecisionBand::ALL {
      for (key, count) in payload.counts(Dimension::Expositions, band) {
        if let Ok(octant) = key.trim().parse::<usize>() {
          if let Some(slot) = by_band[band.index()].get_mut(octant) {
            *slot += count;
          }
        }
      }
    }

    let mut aspects = [0u64; EXPOSITIONS.len()];
    for band in &by_band {
      for (total, count) in aspects.iter_mut().zip(band) {
        *total += count;
      }
    }

    let total = aspects.iter().sum();
    let recent = by_band[PrecisionBand::New.index()].iter().sum();

    // First octant wins a tie
    let dominant_exposition = aspects
      .iter()
      .enumerate()
      .filter(|(_, count)| **count > 0)
      .fold(None, |best: Option<(usize, u64)>, (i, count)| match best {
        Some((_, top)) if top >= *count => best,
        _ => Some((i, *count)),
      })
      .map(|(i, _)| EXPOSITIONS[i]);

    Self {
      total,
      recent,
      dominant_exposition,
    }
  }

  /// Show the "no results" banner
  pub fn is_empty(&self) -> bool {
    self.total == 0
  }
}

/// Thousands separated by a space, as on Norwegian displays
pub fn format_count(n: u64) -> String {
  let digits = n.to_string();
  let mut out = String::with_capacity(digits.len() + digits.len() / 3);
  for (i, c) in digits.chars().enumerate() {
    if i > 0 && (digits.len() - i) % 3 == 0 {
      out.push(' ');
    }
    out.push(c);
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_statistics_from_points() {
    let payload: PointsPayload = serde_json::from_value(json!({
      "expositions_lt24": {"0": 2, "4": 1},
      "expositions_lte48": {"4": 3},
      "expositions_gt48": {"2": 1, "9": 50}
    }))
    .unwrap();

    let stats = Statistics::from_points(&payload);
    assert_eq!(stats.total, 7);
    assert_eq!(stats.recent, 3);
    assert_eq!(stats.dominant_exposition, Some("S"));
    assert!(!stats.is_empty());
  }

  #[test]
  fn test_unknown_exposition_keys_count_nowhere() {
    let payload: PointsPayload = serde_json::from_value(json!({
      "expositions_lt24": {"3": 1, "12": 40, "flat": 5}
    }))
    .unwrap();

    let stats = Statistics::from_points(&payload);
    assert_eq!(stats.total, 1);
    assert_eq!(stats.recent, 1);
    assert!(stats.recent <= stats.total);
  }

  #[test]
  fn test_empty_payload_means_no_results() {
    let stats = Statistics::from_points(&PointsPayload::default());
    assert!(stats.is_empty());
    assert_eq!(stats.dominant_exposition, None);
  }

  #[test]
  fn test_tie_keeps_first_octant() {
    let payload: PointsPayload = serde_json::from_value(json!({
      "expositions_gt48": {"1": 2, "6": 2}
    }))
    .unwrap();
    assert_eq!(
      Statistics::from_points(&payload).dominant_exposition,
      Some("NE")
    );
  }

  #[test]
  fn test_format_count() {
    assert_eq!(format_count(0), "0");
    assert_eq!(format_count(999), "999");
    assert_eq!(format_count(1000), "1 000");
    assert_eq!(format_count(1234567), "1 234 567");
  }
}
