use super::KeyResult;
use crate::region::{Region, RegionId};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState};

const ALL_REGIONS: &str = "All regions";

/// Events emitted by the region picker that the app needs to handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegionPickerEvent {
  /// A region was chosen, `None` for all regions
  Selected(Option<RegionId>),
  /// Picker cancelled
  Cancelled,
}

#[derive(Debug, Clone)]
struct Entry {
  id: Option<RegionId>,
  name: String,
}

/// Region selector. Typing narrows the list by name.
#[derive(Debug, Clone, Default)]
pub struct RegionPicker {
  active: bool,
  entries: Vec<Entry>,
  query: String,
  /// Index into the filtered entries
  selected: usize,
}

impl RegionPicker {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn is_active(&self) -> bool {
    self.active
  }

  /// Show the picker with the current selection highlighted
  pub fn show(&mut self, regions: &[&Region], current: Option<RegionId>) {
    self.active = true;
    self.query.clear();
    self.entries = std::iter::once(Entry {
      id: None,
      name: ALL_REGIONS.to_string(),
    })
    .chain(regions.iter().map(|r| Entry {
      id: Some(r.id),
      name: r.name.clone(),
    }))
    .collect();
    self.selected = self
      .entries
      .iter()
      .position(|e| e.id == current)
      .unwrap_or(0);
  }

  pub fn hide(&mut self) {
    self.active = false;
    self.entries.clear();
    self.query.clear();
    self.selected = 0;
  }

  pub fn query(&self) -> &str {
    &self.query
  }

  fn visible(&self) -> Vec<&Entry> {
    let query = self.query.to_lowercase();
    self
      .entries
      .iter()
      .filter(|e| query.is_empty() || e.name.to_lowercase().contains(&query))
      .collect()
  }

  pub fn handle_key(&mut self, key: KeyEvent) -> KeyResult<RegionPickerEvent> {
    if !self.active {
      return KeyResult::NotHandled;
    }

    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    let count = self.visible().len();

    match key.code {
      KeyCode::Esc => {
        self.hide();
        KeyResult::Event(RegionPickerEvent::Cancelled)
      }
      KeyCode::Enter => {
        let chosen = self.visible().get(self.selected).map(|e| e.id);
        self.hide();
        match chosen {
          Some(id) => KeyResult::Event(RegionPickerEvent::Selected(id)),
          None => KeyResult::Event(RegionPickerEvent::Cancelled),
        }
      }
      KeyCode::Down | KeyCode::Tab => {
        if count > 0 {
          self.selected = (self.selected + 1) % count;
        }
        KeyResult::Handled
      }
      KeyCode::Char('n') if ctrl => {
        if count > 0 {
          self.selected = (self.selected + 1) % count;
        }
        KeyResult::Handled
      }
      KeyCode::Up | KeyCode::BackTab => {
        self.select_previous(count);
        KeyResult::Handled
      }
      KeyCode::Char('p') if ctrl => {
        self.select_previous(count);
        KeyResult::Handled
      }
      KeyCode::Backspace => {
        self.query.pop();
        self.selected = 0;
        KeyResult::Handled
      }
      KeyCode::Char(c) if !ctrl => {
        self.query.push(c);
        self.selected = 0;
        KeyResult::Handled
      }
      _ => KeyResult::Handled,
    }
  }

  fn select_previous(&mut self, count: usize) {
    if count > 0 {
      self.selected = if self.selected == 0 {
        count - 1
      } else {
        self.selected - 1
      };
    }
  }

  /// Render the picker overlay centered in `area` if active
  pub fn render_overlay(&self, frame: &mut Frame, area: Rect) {
    if !self.is_active() {
      return;
    }

    let visible = self.visible();
    let max_name_len = self
      .entries
      .iter()
      .map(|e| e.name.chars().count())
      .max()
      .unwrap_or(10);
    let width = (max_name_len as u16 + 6)
      .max(24)
      .min(area.width.saturating_sub(4));
    let height = (self.entries.len() as u16 + 3)
      .min(area.height.saturating_sub(2))
      .max(4);

    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    let overlay_area = Rect::new(x, y, width, height).intersection(area);

    frame.render_widget(Clear, overlay_area);

    let block = Block::default()
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Yellow))
      .title(" Region ");
    let inner = block.inner(overlay_area);
    frame.render_widget(block, overlay_area);

    if inner.height < 2 {
      return;
    }

    let [query_area, list_area] =
      Layout::vertical([Constraint::Length(1), Constraint::Min(1)]).areas(inner);

    let query = Line::from(vec![
      Span::styled("/", Style::default().fg(Color::DarkGray)),
      Span::raw(self.query()),
    ]);
    frame.render_widget(query, query_area);

    let items: Vec<ListItem> = visible
      .iter()
      .map(|entry| {
        let style = match entry.id {
          None => Style::default().fg(Color::Gray),
          Some(_) => Style::default().fg(Color::Cyan),
        };
        ListItem::new(Line::from(Span::styled(entry.name.as_str(), style)))
      })
      .collect();

    let list =
      List::new(items).highlight_style(Style::default().bg(Color::DarkGray).fg(Color::White));

    let mut state = ListState::default();
    state.select((!visible.is_empty()).then_some(self.selected));

    frame.render_stateful_widget(list, list_area, &mut state);
  }
}
