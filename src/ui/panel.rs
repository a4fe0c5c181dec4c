use ratatui::prelude::*;
use ratatui::widgets::{Bar, BarChart, BarGroup, Block, Borders, Clear, Paragraph, Wrap};

use super::renderfns::band_color;
use crate::app::App;
use crate::charts::Chart;
use crate::date::TIME_FORMAT;
use crate::feature::{
  exposition_octant, registration_status_label, Feature, PrecisionBand, EXPOSITIONS,
};
use crate::statistics::format_count;

const LABEL: Style = Style::new().fg(Color::DarkGray);

pub fn draw_statistics(frame: &mut Frame, area: Rect, app: &App) {
  let block = Block::default()
    .borders(Borders::ALL)
    .border_style(Style::default().fg(Color::Blue))
    .title(" Statistics ");

  let mut lines = match app.statistics() {
    None => vec![Line::from(Span::styled("Loading…", LABEL))],
    Some(stats) if stats.is_empty() => vec![Line::from(Span::styled(
      "No results",
      Style::default().fg(Color::Yellow),
    ))],
    Some(stats) => vec![
      Line::from(vec![
        Span::styled("Avalanches  ", LABEL),
        Span::styled(format_count(stats.total), Style::default().bold()),
      ]),
      Line::from(vec![
        Span::styled("Within 24 h ", LABEL),
        Span::styled(
          format_count(stats.recent),
          Style::default().fg(band_color(PrecisionBand::New)),
        ),
      ]),
      Line::from(vec![
        Span::styled("Exposition  ", LABEL),
        Span::raw(stats.dominant_exposition.unwrap_or("-")),
      ]),
    ],
  };

  lines.push(Line::default());
  for band in PrecisionBand::ALL {
    lines.push(Line::from(vec![
      Span::styled("■ ", Style::default().fg(band_color(band))),
      Span::raw(band.label()),
    ]));
  }

  frame.render_widget(Paragraph::new(lines).block(block), area);
}

pub fn draw_charts(frame: &mut Frame, area: Rect, app: &App) {
  let charts = app.charts();
  let [timeline, lower] =
    Layout::vertical([Constraint::Percentage(50), Constraint::Percentage(50)]).areas(area);
  let [heights, expositions, sizes] = Layout::horizontal([
    Constraint::Percentage(40),
    Constraint::Percentage(30),
    Constraint::Percentage(30),
  ])
  .areas(lower);

  draw_chart(frame, timeline, &charts.timeline, None);
  draw_chart(frame, heights, &charts.heights, None);
  draw_chart(frame, expositions, &charts.expositions, None);
  let note = charts.sizes_partial().then_some("view only");
  draw_chart(frame, sizes, &charts.sizes, note);
}

fn draw_chart(frame: &mut Frame, area: Rect, chart: &Chart, note: Option<&str>) {
  let title = match note {
    Some(note) => format!(" {} ({}) ", chart.title, note),
    None => format!(" {} ", chart.title),
  };
  let block = Block::default()
    .borders(Borders::ALL)
    .border_style(Style::default().fg(Color::DarkGray))
    .title(title);
  let inner = block.inner(area);

  let categories = chart.categories.len();
  let series = chart.series.len();
  let mut bar_chart = BarChart::default().block(block).bar_gap(0).group_gap(1);

  match bar_width(inner.width, categories, series) {
    Some(width) => {
      bar_chart = bar_chart.bar_width(width);
      for (i, category) in chart.categories.iter().enumerate() {
        let bars: Vec<Bar> = chart
          .series
          .iter()
          .enumerate()
          .map(|(s, values)| {
            Bar::default()
              .value(values.values[i])
              .style(Style::default().fg(series_color(chart, s)))
              .text_value(String::new())
          })
          .collect();
        bar_chart = bar_chart.data(
          BarGroup::default()
            .label(Line::from(category_label(category)))
            .bars(&bars),
        );
      }
    }
    None => {
      // Too many categories for grouped bars, show the totals
      let width = bar_width(inner.width, categories, 1).unwrap_or(1);
      let bars: Vec<Bar> = chart
        .stacked()
        .into_iter()
        .zip(&chart.categories)
        .map(|(total, category)| {
          Bar::default()
            .value(total)
            .label(Line::from(category_label(category)))
            .style(Style::default().fg(Color::Gray))
            .text_value(String::new())
        })
        .collect();
      bar_chart = bar_chart
        .bar_width(width)
        .bar_gap(if width > 1 { 1 } else { 0 })
        .data(BarGroup::default().bars(&bars));
    }
  }

  frame.render_widget(bar_chart, area);
}

/// Width of one bar when every category gets a group of `series` bars.
/// `None` when the groups do not fit side by side.
fn bar_width(available: u16, categories: usize, series: usize) -> Option<u16> {
  if categories == 0 || series == 0 {
    return Some(1);
  }
  let per_group = (available as usize / categories).checked_sub(1)?;
  let width = per_group / series;
  (width >= 1).then(|| width.min(8) as u16)
}

fn series_color(chart: &Chart, series: usize) -> Color {
  if chart.series.len() == PrecisionBand::ALL.len() {
    band_color(PrecisionBand::ALL[series])
  } else {
    Color::Cyan
  }
}

/// Dates are shortened to "mm-dd"
fn category_label(category: &str) -> String {
  match category.get(5..) {
    Some(rest) if category.len() == 10 && category.as_bytes()[4] == b'-' => rest.to_string(),
    _ => category.to_string(),
  }
}

/// Label/value rows of the popup, skipping what the record does not have
fn popup_rows(feature: &Feature) -> Vec<(&'static str, String)> {
  let mut rows = vec![("Avalanche ID", feature.id.to_string())];

  let mut time = feature.triggered.format(TIME_FORMAT).to_string();
  match (feature.precision_hours(), &feature.precision_text) {
    (Some(hours), _) => time.push_str(&format!(" ± {} h", hours)),
    (None, Some(text)) => time.push_str(&format!(" ± {}", text)),
    (None, None) => {}
  }
  rows.push(("Triggered", time));

  if let Some(deg) = feature.exposition {
    if let Some(octant) = exposition_octant(deg) {
      rows.push(("Exposition", format!("{} ({:.0}°)", EXPOSITIONS[octant], deg)));
    }
  }
  if let Some(area) = feature.area {
    rows.push(("Area", format!("{} m²", format_count(area.round().max(0.0) as u64))));
  }
  if let Some(elevation) = feature.elevation {
    let mut height = format!("{} m.a.s.l.", format_count(elevation.round().max(0.0) as u64));
    if let Some(precision) = &feature.elevation_precision {
      let metres = precision.trim().trim_end_matches('m').trim();
      height.push_str(&format!(" ± {} m", metres));
    }
    rows.push(("Stop height", height));
  }

  let slope = feature.slope;
  if let Some(mean) = slope.mean {
    rows.push(("Mean slope", format!("{:.0}°", mean)));
  }
  if let (Some(min), Some(max)) = (slope.min, slope.max) {
    rows.push(("Slope", format!("{:.0}°–{:.0}°", max, min)));
  }

  if let Some(status) = &feature.registration_status {
    rows.push(("Registration", registration_status_label(status).to_string()));
  }
  if let Some(registered) = feature.registered {
    rows.push(("Registered", registered.format(TIME_FORMAT).to_string()));
  }
  if let Some(edited) = feature.edited.filter(|e| Some(*e) != feature.registered) {
    rows.push(("Last edited", edited.format(TIME_FORMAT).to_string()));
  }

  rows
}

/// Details of the picked avalanche, over the map
pub fn draw_popup(frame: &mut Frame, area: Rect, feature: &Feature) {
  let band = feature.precision_band();

  let mut lines: Vec<Line> = popup_rows(feature)
    .into_iter()
    .map(|(label, value)| {
      Line::from(vec![Span::styled(format!("{:<14}", label), LABEL), Span::raw(value)])
    })
    .collect();
  lines.insert(
    2,
    Line::from(vec![
      Span::styled(format!("{:<14}", "Precision"), LABEL),
      Span::styled(band.label(), Style::default().fg(band_color(band))),
    ]),
  );

  let width = 60.min(area.width);
  let height = (lines.len() as u16 + 2).min(area.height);
  let popup = Rect::new(
    area.x + area.width.saturating_sub(width) / 2,
    area.y + area.height.saturating_sub(height) / 2,
    width,
    height,
  );

  let block = Block::default()
    .borders(Borders::ALL)
    .border_style(Style::default().fg(band_color(band)))
    .title(" Avalanche ")
    .title_bottom(Line::from(" Esc close ").right_aligned());

  frame.render_widget(Clear, popup);
  frame.render_widget(
    Paragraph::new(lines).block(block).wrap(Wrap { trim: true }),
    popup,
  );
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::feature::fixtures::point;
  use crate::feature::SlopeRange;

  #[test]
  fn test_bar_width_fits_groups() {
    // 8 groups of 3 bars plus a gap each in 34 columns
    assert_eq!(bar_width(34, 8, 3), Some(1));
    assert_eq!(bar_width(80, 8, 3), Some(3));
    assert_eq!(bar_width(20, 8, 3), None);
    assert_eq!(bar_width(400, 2, 1), Some(8));
  }

  #[test]
  fn test_popup_rows() {
    let mut feature = point("42", "2023-01-02", 0.0, 0.0);
    feature.precision_text = Some("2 dager".to_string());
    feature.elevation = Some(1234.4);
    feature.elevation_precision = Some("50m".to_string());
    feature.slope = SlopeRange {
      mean: Some(31.6),
      min: Some(12.0),
      max: Some(44.0),
    };
    feature.registration_status = Some("Godkjent kvalitet A".to_string());
    feature.registered = feature.triggered.checked_add_signed(chrono::Duration::days(1));
    feature.edited = feature.registered;

    let rows = popup_rows(&feature);
    let value = |label: &str| {
      rows
        .iter()
        .find(|(l, _)| *l == label)
        .map(|(_, v)| v.clone())
    };

    assert_eq!(value("Avalanche ID").as_deref(), Some("42"));
    assert_eq!(value("Triggered").as_deref(), Some("02.01.2023 12:00:00 ± 48 h"));
    assert_eq!(value("Exposition").as_deref(), Some("N (10°)"));
    assert_eq!(value("Area").as_deref(), Some("20 000 m²"));
    assert_eq!(value("Stop height").as_deref(), Some("1 234 m.a.s.l. ± 50 m"));
    assert_eq!(value("Mean slope").as_deref(), Some("32°"));
    assert_eq!(value("Slope").as_deref(), Some("44°–12°"));
    assert_eq!(value("Registration").as_deref(), Some("Approved quality A"));
    assert_eq!(value("Registered").as_deref(), Some("03.01.2023 12:00:00"));
    // Unchanged since registration
    assert_eq!(value("Last edited"), None);
  }

  #[test]
  fn test_popup_rows_unknown_precision_keeps_text() {
    let mut feature = point("7", "2023-01-02", 0.0, 0.0);
    feature.precision_text = Some("ukjent".to_string());
    feature.area = None;

    let rows = popup_rows(&feature);
    assert_eq!(rows[1].1, "02.01.2023 12:00:00 ± ukjent");
    assert!(rows.iter().all(|(label, _)| *label != "Area"));
  }

  #[test]
  fn test_category_label() {
    assert_eq!(category_label("2023-01-05"), "01-05");
    assert_eq!(category_label("NE"), "NE");
    assert_eq!(category_label("< 10.000 m²"), "< 10.000 m²");
  }
}
