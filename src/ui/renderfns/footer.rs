use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

use crate::app::{App, Mode, RegionStatus};
use crate::date::format_date;

/// Draw the key hints for the current mode, or a region load error
pub fn draw_footer(frame: &mut Frame, area: Rect, app: &App) {
  let hint = Style::default().fg(Color::DarkGray);

  let line = match app.mode() {
    Mode::Normal => match app.region_status() {
      RegionStatus::Failed(e) => Line::from(Span::styled(
        format!(" Failed to load regions: {}", e),
        Style::default().fg(Color::Red),
      )),
      _ => Line::from(Span::styled(
        " hjkl:pan  +/-:zoom  Enter:pick  [ ]:start  { }:end  x:all regions  < > , .:resize  Esc:close",
        hint,
      )),
    },
    Mode::DateStart => Line::from(vec![
      Span::styled(" start date", Style::default().fg(Color::Yellow)),
      Span::styled(
        format!(
          "  latest {}  ↑/↓:day  Enter:apply  Esc:cancel",
          format_date(app.controls().start_max())
        ),
        hint,
      ),
    ]),
    Mode::DateEnd => Line::from(vec![
      Span::styled(" end date", Style::default().fg(Color::Yellow)),
      Span::styled(
        format!(
          "  {} to {}  ↑/↓:day  Enter:apply  Esc:cancel",
          format_date(app.controls().end_min()),
          format_date(app.controls().end_max())
        ),
        hint,
      ),
    ]),
    Mode::RegionPicker => Line::from(Span::styled(
      " type to filter  ↑/↓:move  Enter:select  Esc:cancel",
      hint,
    )),
  };

  frame.render_widget(Paragraph::new(line), area);
}
