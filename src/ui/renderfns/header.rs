use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

use super::truncate;
use crate::app::App;
use crate::date::format_date;

const SHORTCUTS: [(&str, &str); 4] = [
  ("<s/e>", " dates"),
  ("<r>", " region"),
  ("<Enter>", " pick"),
  ("<q>", " quit"),
];

/// Draw the header bar with name, data source, filter and shortcuts
pub fn draw_header(frame: &mut Frame, area: Rect, app: &App) {
  let domain = extract_domain(app.api_url());
  let controls = app.controls();

  let region = match app.selected_region() {
    Some(region) => truncate(&region.name, 24),
    None => "All regions".to_string(),
  };

  let separator = || Span::styled("│", Style::default().fg(Color::DarkGray));
  let mut spans = vec![
    Span::styled(" skredview ", Style::default().fg(Color::Cyan).bold()),
    separator(),
    Span::styled(format!(" {} ", domain), Style::default().fg(Color::White)),
    separator(),
    Span::styled(
      format!(
        " {} .. {} ",
        format_date(controls.start()),
        format_date(controls.end())
      ),
      Style::default().fg(Color::Yellow).bold(),
    ),
    separator(),
    Span::styled(format!(" {} ", region), Style::default().fg(Color::Yellow)),
  ];

  if app.is_loading() {
    spans.push(separator());
    spans.push(Span::styled(" loading… ", Style::default().fg(Color::DarkGray)));
  }

  spans.push(Span::raw("  "));
  for (key, label) in SHORTCUTS {
    spans.push(Span::styled(key, Style::default().fg(Color::Cyan)));
    spans.push(Span::styled(label, Style::default().fg(Color::DarkGray)));
    spans.push(Span::raw("   "));
  }

  let paragraph = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black));
  frame.render_widget(paragraph, area);
}

/// Host part of the API URL
fn extract_domain(url: &str) -> &str {
  url
    .strip_prefix("https://")
    .or_else(|| url.strip_prefix("http://"))
    .unwrap_or(url)
    .split('/')
    .next()
    .unwrap_or(url)
}
