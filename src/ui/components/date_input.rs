use chrono::NaiveDate;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Clear, Paragraph};

use crate::date::{format_date, parse_date};

/// Longest accepted input: yyyy-mm-dd
const MAX_LEN: usize = 10;

/// Result of handling a key event in the date input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputResult {
  /// Key was handled, keep editing
  Consumed,
  /// Enter pressed, here's the submitted value
  Submitted(String),
  /// Escape pressed, editing cancelled
  Cancelled,
  /// Key not handled
  NotHandled,
}

/// Single-line editor for a `yyyy-mm-dd` date.
///
/// Only digits and dashes are accepted. Up/Down step a complete date by one
/// day; what is submitted is validated by the caller.
#[derive(Debug, Clone, Default)]
pub struct DateInput {
  buffer: String,
  cursor: usize,
}

impl DateInput {
  pub fn new() -> Self {
    Self::default()
  }

  /// Begin editing from `date`
  pub fn start(&mut self, date: NaiveDate) {
    self.buffer = format_date(date);
    self.cursor = self.buffer.len();
  }

  pub fn value(&self) -> &str {
    &self.buffer
  }

  pub fn clear(&mut self) {
    self.buffer.clear();
    self.cursor = 0;
  }

  pub fn cursor_position(&self) -> usize {
    self.cursor
  }

  /// Whether the buffer currently holds a valid date
  pub fn is_valid(&self) -> bool {
    parse_date(&self.buffer).is_some()
  }

  pub fn handle_key(&mut self, key: KeyEvent) -> InputResult {
    match key.code {
      KeyCode::Esc => InputResult::Cancelled,
      KeyCode::Enter => InputResult::Submitted(self.buffer.clone()),
      KeyCode::Backspace => {
        if self.cursor > 0 {
          self.cursor -= 1;
          self.buffer.remove(self.cursor);
        }
        InputResult::Consumed
      }
      KeyCode::Delete => {
        if self.cursor < self.buffer.len() {
          self.buffer.remove(self.cursor);
        }
        InputResult::Consumed
      }
      KeyCode::Left => {
        self.cursor = self.cursor.saturating_sub(1);
        InputResult::Consumed
      }
      KeyCode::Right => {
        self.cursor = (self.cursor + 1).min(self.buffer.len());
        InputResult::Consumed
      }
      KeyCode::Home => {
        self.cursor = 0;
        InputResult::Consumed
      }
      KeyCode::End => {
        self.cursor = self.buffer.len();
        InputResult::Consumed
      }
      KeyCode::Up => self.step(1),
      KeyCode::Down => self.step(-1),
      KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
        self.buffer = self.buffer[self.cursor..].to_string();
        self.cursor = 0;
        InputResult::Consumed
      }
      KeyCode::Char(c) if c.is_ascii_digit() || c == '-' => {
        if self.buffer.len() < MAX_LEN {
          self.buffer.insert(self.cursor, c);
          self.cursor += 1;
        }
        InputResult::Consumed
      }
      KeyCode::Char(_) => InputResult::Consumed,
      _ => InputResult::NotHandled,
    }
  }

  fn step(&mut self, days: i64) -> InputResult {
    if let Some(date) = parse_date(&self.buffer)
      .and_then(|d| d.checked_add_signed(chrono::Duration::days(days)))
    {
      self.start(date);
    }
    InputResult::Consumed
  }

  /// Render as a small box anchored at the top left of `area`
  pub fn render_overlay(&self, frame: &mut Frame, area: Rect, title: &str) {
    let width = (title.len() as u16 + 4).max(MAX_LEN as u16 + 4).min(area.width);
    let overlay = Rect::new(area.x + 1, area.y, width, 3.min(area.height));

    let color = if self.is_valid() {
      Color::Yellow
    } else {
      Color::Red
    };
    let block = Block::default()
      .borders(Borders::ALL)
      .border_style(Style::default().fg(color))
      .title(format!(" {} ", title));
    let inner = block.inner(overlay);

    frame.render_widget(Clear, overlay);
    frame.render_widget(block, overlay);

    let text = if self.value().is_empty() {
      Span::styled("yyyy-mm-dd", Style::default().fg(Color::DarkGray))
    } else {
      Span::styled(self.value(), Style::default().fg(Color::White))
    };
    frame.render_widget(Paragraph::new(Line::from(text)), inner);
    frame.set_cursor_position((inner.x + self.cursor_position() as u16, inner.y));
  }
}
