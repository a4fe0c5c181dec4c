use geo::{Geometry, LineString, Polygon};
use ratatui::prelude::*;
use ratatui::symbols::Marker;
use ratatui::widgets::canvas::{Canvas, Context, Line as CanvasLine, Points};
use ratatui::widgets::{Block, Borders, Clear, Paragraph};

use super::renderfns::{band_color, BORDER_COLOR, BORDER_SELECTED_COLOR};
use crate::app::App;
use crate::map::ActiveLayer;

const BASEMAP_COLOR: Color = Color::DarkGray;

fn map_block(title: String) -> Block<'static> {
  Block::default()
    .borders(Borders::ALL)
    .border_style(Style::default().fg(Color::Blue))
    .title(title)
}

/// Drawable part of the map panel
pub fn map_canvas_area(area: Rect) -> Rect {
  map_block(String::new()).inner(area)
}

pub fn draw_map(frame: &mut Frame, area: Rect, app: &App) {
  let view = app.view();
  let extent = view.extent();
  let [minx, miny, maxx, maxy] = extent;
  let layer = app.active_layer();

  let layer_name = match layer {
    ActiveLayer::Clusters => "clusters".to_string(),
    ActiveLayer::Events if app.event_source().is_empty() => "events".to_string(),
    ActiveLayer::Events => format!("events ({})", app.event_source().len()),
  };
  let title = format!(" Map  z{}  {} ", view.zoom(), layer_name);

  let basemap = app.basemap_lines();
  let selected = app.selected_region().map(|r| r.id);
  let in_view = |rect: &geo::Rect<f64>| {
    rect.max().x >= minx && rect.min().x <= maxx && rect.max().y >= miny && rect.min().y <= maxy
  };
  let regions: Vec<_> = app
    .regions()
    .iter()
    .filter(|r| Some(r.id) != selected && in_view(&r.bbox))
    .collect();
  let selected_region = app.selected_region();

  let events: Vec<_> = match layer {
    ActiveLayer::Events => app.event_source().within(extent).collect(),
    ActiveLayer::Clusters => Vec::new(),
  };
  let clusters = match layer {
    ActiveLayer::Clusters => app.clusters(),
    ActiveLayer::Events => Vec::new(),
  };
  let center = view.center();

  let canvas = Canvas::default()
    .block(map_block(title))
    .marker(Marker::Braille)
    .x_bounds([minx, maxx])
    .y_bounds([miny, maxy])
    .paint(|ctx| {
      for line in &basemap {
        draw_line_string(ctx, line, BASEMAP_COLOR);
      }
      ctx.layer();

      for region in &regions {
        for polygon in &region.geometry {
          draw_polygon(ctx, polygon, BORDER_COLOR);
        }
      }
      if let Some(region) = selected_region {
        for polygon in &region.geometry {
          draw_polygon(ctx, polygon, BORDER_SELECTED_COLOR);
        }
      }
      ctx.layer();

      for feature in &events {
        let color = band_color(feature.precision_band());
        draw_geometry(ctx, &feature.geometry, color);
        ctx.draw(&Points {
          coords: &[feature.anchor],
          color,
        });
      }

      for cluster in &clusters {
        let label = match cluster.count {
          1 => "●".to_string(),
          n => n.to_string(),
        };
        ctx.print(
          cluster.x,
          cluster.y,
          Span::styled(label, Style::default().fg(band_color(cluster.band)).bold()),
        );
      }
      ctx.layer();

      ctx.print(center.0, center.1, Span::styled("+", Style::default().fg(Color::White)));
    });

  frame.render_widget(canvas, area);

  if app.statistics().is_some_and(|s| s.is_empty()) {
    draw_no_results(frame, map_canvas_area(area));
  }
}

fn draw_no_results(frame: &mut Frame, area: Rect) {
  let text = " No results ";
  let width = (text.len() as u16 + 2).min(area.width);
  let banner = Rect::new(
    area.x + area.width.saturating_sub(width) / 2,
    area.y + 1.min(area.height),
    width,
    1.min(area.height),
  );
  frame.render_widget(Clear, banner);
  frame.render_widget(
    Paragraph::new(text)
      .alignment(Alignment::Center)
      .style(Style::default().fg(Color::Black).bg(Color::Yellow)),
    banner,
  );
}

fn draw_geometry(ctx: &mut Context, geometry: &Geometry<f64>, color: Color) {
  match geometry {
    Geometry::Polygon(polygon) => draw_polygon(ctx, polygon, color),
    Geometry::MultiPolygon(polygons) => {
      for polygon in polygons {
        draw_polygon(ctx, polygon, color);
      }
    }
    Geometry::LineString(line) => draw_line_string(ctx, line, color),
    Geometry::MultiLineString(lines) => {
      for line in lines {
        draw_line_string(ctx, line, color);
      }
    }
    // Points are drawn from the anchor
    _ => {}
  }
}

fn draw_polygon(ctx: &mut Context, polygon: &Polygon<f64>, color: Color) {
  draw_line_string(ctx, polygon.exterior(), color);
  for ring in polygon.interiors() {
    draw_line_string(ctx, ring, color);
  }
}

fn draw_line_string(ctx: &mut Context, line: &LineString<f64>, color: Color) {
  for segment in line.lines() {
    ctx.draw(&CanvasLine {
      x1: segment.start.x,
      y1: segment.start.y,
      x2: segment.end.x,
      y2: segment.end.y,
      color,
    });
  }
}
