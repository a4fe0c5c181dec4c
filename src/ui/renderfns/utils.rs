use ratatui::prelude::Color;

use crate::feature::PrecisionBand;

/// Truncate a string to a maximum number of characters, adding "..." if truncated
pub fn truncate(s: &str, max_len: usize) -> String {
  if s.chars().count() <= max_len {
    s.to_string()
  } else {
    let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{}...", kept)
  }
}

/// Display color for a precision band
pub fn band_color(band: PrecisionBand) -> Color {
  match band {
    PrecisionBand::New => Color::Rgb(0xe7, 0x29, 0x8a),
    PrecisionBand::Medium => Color::Rgb(0xd9, 0x5f, 0x02),
    PrecisionBand::Old => Color::Rgb(0x75, 0x70, 0xb3),
  }
}

/// Region outline
pub const BORDER_COLOR: Color = Color::Rgb(0xff, 0x63, 0x54);
/// Outline of the selected region
pub const BORDER_SELECTED_COLOR: Color = Color::Rgb(0x7f, 0xed, 0x0b);

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_truncate_short_string() {
    assert_eq!(truncate("hello", 10), "hello");
  }

  #[test]
  fn test_truncate_exact_length() {
    assert_eq!(truncate("hello", 5), "hello");
  }

  #[test]
  fn test_truncate_long_string() {
    assert_eq!(truncate("hello world", 8), "hello...");
  }

  #[test]
  fn test_truncate_counts_chars() {
    assert_eq!(truncate("Nord-Trøndelag", 8), "Nord-...");
  }

  #[test]
  fn test_band_colors_are_distinct() {
    let colors = PrecisionBand::ALL.map(band_color);
    assert_ne!(colors[0], colors[1]);
    assert_ne!(colors[1], colors[2]);
    assert_eq!(band_color(PrecisionBand::New), Color::Rgb(231, 41, 138));
  }
}
