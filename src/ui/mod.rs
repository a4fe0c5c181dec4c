pub mod components;
pub mod layout;
mod map;
mod panel;
mod renderfns;

use crate::app::{App, Mode};
use ratatui::prelude::*;

pub use map::map_canvas_area;

/// Main draw function
pub fn draw(frame: &mut Frame, app: &App) {
  let screen = frame.area();
  let areas = app.layout().split(screen);

  renderfns::draw_header(frame, areas.header, app);
  map::draw_map(frame, areas.map, app);
  panel::draw_statistics(frame, areas.statistics, app);
  panel::draw_charts(frame, areas.charts, app);
  renderfns::draw_footer(frame, areas.footer, app);

  if let Some(feature) = app.popup() {
    panel::draw_popup(frame, areas.map, feature);
  }

  match app.mode() {
    Mode::DateStart => app.date_input().render_overlay(frame, areas.map, "Start date"),
    Mode::DateEnd => app.date_input().render_overlay(frame, areas.map, "End date"),
    Mode::RegionPicker => app.region_picker().render_overlay(frame, screen),
    Mode::Normal => {}
  }
}
