use crate::api::{ApiClient, EventQuery, Payload, Resource};
use crate::charts::Charts;
use crate::config::Config;
use crate::controls::{Controls, DateChange, StartupOverrides};
use crate::date::{date_range, format_date};
use crate::event::{Event, EventHandler};
use crate::feature::Feature;
use crate::map::source::CLUSTER_DISTANCE;
use crate::map::{cluster, tiles_for_extent, ActiveLayer, Basemap, Cluster, MapView, TileCoord, VectorSource};
use crate::network::{Channel, Delivery, Requests};
use crate::region::{Region, RegionId, Regions};
use crate::statistics::Statistics;
use crate::store::{KeyValueStore, MemoryStore, SqliteStore};
use crate::sync::{FeatureCache, RegionFilter};
use crate::ui::components::{DateInput, InputResult, KeyResult, RegionPicker, RegionPickerEvent};
use crate::ui;
use crate::ui::layout::PanelLayout;
use chrono::{Local, NaiveDate};
use color_eyre::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{
  disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::prelude::*;
use std::io::stdout;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

/// Fraction of the visible map moved per pan key
const PAN_STEP: f64 = 0.25;

/// Input mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
  Normal,
  /// Editing the first day of the range
  DateStart,
  /// Editing the day after the last day of the range
  DateEnd,
  RegionPicker,
}

/// Progress of the one-off region load
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegionStatus {
  Loading,
  Loaded,
  Failed(String),
}

/// Main application state
pub struct App {
  config: Config,
  client: ApiClient,
  store: Arc<dyn KeyValueStore>,

  controls: Controls,
  regions: Regions,
  region_status: RegionStatus,
  regions_rx: Option<oneshot::Receiver<Result<Regions>>>,

  view: MapView,
  layout: PanelLayout,
  basemap: Option<Basemap>,
  visible_tiles: Vec<TileCoord>,

  /// Event polygons
  events: FeatureCache,
  event_source: VectorSource,
  /// Event points behind the cluster layer
  points: FeatureCache,
  point_source: VectorSource,
  requests: Requests<Payload>,

  charts: Charts,
  /// `None` until the aggregated payload for the current filter arrives
  statistics: Option<Statistics>,
  popup: Option<Arc<Feature>>,

  mode: Mode,
  date_input: DateInput,
  region_picker: RegionPicker,

  should_quit: bool,
}

impl App {
  pub fn new(config: Config, overrides: StartupOverrides) -> Result<Self> {
    let store: Arc<dyn KeyValueStore> = match SqliteStore::open() {
      Ok(store) => Arc::new(store),
      Err(e) => {
        tracing::warn!(error = %e, "failed to open state database, view state will not be kept");
        Arc::new(MemoryStore::new())
      }
    };

    Self::with_store(config, store, overrides, Local::now().date_naive())
  }

  /// Build the app on a given state store, as of `today`
  pub fn with_store(
    config: Config,
    store: Arc<dyn KeyValueStore>,
    overrides: StartupOverrides,
    today: NaiveDate,
  ) -> Result<Self> {
    let client = ApiClient::new(&config)?;
    let controls = Controls::with_today(store.clone(), overrides, today);
    let view = MapView::restore(store.as_ref());
    let layout = PanelLayout::restore(store.as_ref());
    let charts = Charts::new(controls.start(), controls.end());
    let basemap = config
      .basemap_url
      .clone()
      .map(|template| Basemap::new(client.clone(), template));

    tracing::info!(
      start = %controls.start(),
      end = %controls.end(),
      region = ?controls.region(),
      "starting"
    );

    Ok(Self {
      config,
      client,
      store,
      controls,
      regions: Regions::default(),
      region_status: RegionStatus::Loading,
      regions_rx: None,
      view,
      layout,
      basemap,
      visible_tiles: Vec::new(),
      events: FeatureCache::new(),
      event_source: VectorSource::new(),
      points: FeatureCache::new(),
      point_source: VectorSource::new(),
      requests: Requests::new(),
      charts,
      statistics: None,
      popup: None,
      mode: Mode::Normal,
      date_input: DateInput::new(),
      region_picker: RegionPicker::new(),
      should_quit: false,
    })
  }

  pub async fn run(&mut self) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let mut events = EventHandler::new(Duration::from_millis(self.config.tick_rate_ms));

    self.load_regions();
    self.fit_to_terminal(&terminal)?;
    self.fetch();

    let result = self.event_loop(&mut terminal, &mut events).await;

    // Cleanup terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    result
  }

  async fn event_loop<B: Backend>(
    &mut self,
    terminal: &mut Terminal<B>,
    events: &mut EventHandler,
  ) -> Result<()> {
    enum Step {
      Input(Option<Event>),
      Delivery(Option<Delivery<Payload>>),
    }

    while !self.should_quit {
      terminal.draw(|frame| ui::draw(frame, self))?;

      let step = tokio::select! {
        event = events.next() => Step::Input(event),
        delivery = self.requests.next() => Step::Delivery(delivery),
      };

      match step {
        Step::Input(Some(Event::Key(key))) => self.handle_key(key),
        Step::Input(Some(Event::Resize)) => {
          if self.fit_to_terminal(terminal)? {
            self.fetch();
          }
        }
        Step::Input(Some(Event::Tick)) => self.tick(),
        Step::Input(None) => break,
        Step::Delivery(Some(delivery)) => {
          self.handle_delivery(delivery);
          // Merge whatever else has arrived before the next redraw
          while let Some(delivery) = self.requests.try_next() {
            self.handle_delivery(delivery);
          }
        }
        Step::Delivery(None) => {}
      }
    }

    self.requests.abort_all();
    Ok(())
  }

  /// Size the map view to its canvas. Returns whether the extent changed.
  fn fit_to_terminal<B: Backend>(&mut self, terminal: &Terminal<B>) -> Result<bool> {
    let size = terminal.size()?;
    let areas = self.layout.split(Rect::new(0, 0, size.width, size.height));
    let canvas = ui::map_canvas_area(areas.map);
    Ok(self.view.set_size(canvas.width, canvas.height))
  }

  fn tick(&mut self) {
    self.poll_regions();
    if let Some(basemap) = &mut self.basemap {
      basemap.poll();
    }
  }

  // -- Regions --

  fn load_regions(&mut self) {
    let (tx, rx) = oneshot::channel();
    let client = self.client.clone();
    let source = self.config.areas_source();
    let crs = self.config.areas_crs;
    let groups = self.config.region_groups.clone();

    tokio::spawn(async move {
      let result = async {
        let text = client.load_source(&source).await?;
        Regions::from_geojson(&text, crs, groups)
      }
      .await;
      let _ = tx.send(result);
    });

    self.regions_rx = Some(rx);
  }

  fn poll_regions(&mut self) {
    let Some(rx) = &mut self.regions_rx else {
      return;
    };

    let result = match rx.try_recv() {
      Ok(result) => result,
      Err(oneshot::error::TryRecvError::Empty) => return,
      Err(oneshot::error::TryRecvError::Closed) => {
        Err(color_eyre::eyre::eyre!("Region loader stopped"))
      }
    };
    self.regions_rx = None;

    match result {
      Ok(regions) => {
        self.regions = regions;
        self.region_status = RegionStatus::Loaded;
        self.controls.retain_known_region(&self.regions);
        if self.controls.region().is_some() {
          self.on_region_change(false);
        }
      }
      Err(e) => {
        tracing::error!(error = %e, "failed to load regions");
        self.region_status = RegionStatus::Failed(e.to_string());
      }
    }
  }

  /// Region used for filtering. Nothing is filtered until the polygons are in.
  fn active_region(&self) -> Option<RegionId> {
    match self.region_status {
      RegionStatus::Loaded => self.controls.region(),
      _ => None,
    }
  }

  // -- Fetching and merging --

  /// Request the viewport data, and the full data unless already loaded or started
  fn fetch(&mut self) {
    let state = self.controls.state();
    let query = EventQuery {
      start: state.start,
      end: state.end,
      region: state.region,
    };
    let bbox = self.view.extent();

    let requests = [
      (Channel::ViewportEvents, Resource::Polygons, Some(bbox)),
      (Channel::ViewportClusters, Resource::Points, Some(bbox)),
    ];
    for (channel, resource, bbox) in requests {
      self.request_features(channel, resource, &query, bbox);
    }

    if self.events.begin_full_load() {
      self.request_features(Channel::FullEvents, Resource::Polygons, &query, None);
    }
    if self.points.begin_full_load() {
      self.request_points(&query);
    }

    self.request_basemap();
  }

  fn request_features(
    &mut self,
    channel: Channel,
    resource: Resource,
    query: &EventQuery,
    bbox: Option<[f64; 4]>,
  ) {
    let url = match self.client.events_url(resource, query, bbox) {
      Ok(url) => url,
      Err(e) => {
        tracing::warn!(error = %e, ?channel, "failed to build request");
        return;
      }
    };

    tracing::debug!(?channel, %url, "fetching");
    let client = self.client.clone();
    self.requests.get(channel, async move {
      client
        .get_features(url)
        .await
        .map(Payload::Features)
        .map_err(|e| e.to_string())
    });
  }

  fn request_points(&mut self, query: &EventQuery) {
    let url = match self.client.events_url(Resource::Points, query, None) {
      Ok(url) => url,
      Err(e) => {
        tracing::warn!(error = %e, "failed to build request");
        return;
      }
    };

    tracing::debug!(channel = ?Channel::FullClusters, %url, "fetching");
    let client = self.client.clone();
    self.requests.get(Channel::FullClusters, async move {
      client
        .get_points(url)
        .await
        .map(Payload::Points)
        .map_err(|e| e.to_string())
    });
  }

  fn request_basemap(&mut self) {
    let Some(basemap) = &mut self.basemap else {
      return;
    };
    self.visible_tiles = tiles_for_extent(self.view.extent(), self.view.zoom());
    basemap.request(&self.visible_tiles);
  }

  fn handle_delivery(&mut self, delivery: Delivery<Payload>) {
    let complete = delivery.complete();
    let selected = self.active_region();

    match (delivery.channel, delivery.data) {
      (Channel::ViewportEvents | Channel::FullEvents, Payload::Features(features)) => {
        let filter = RegionFilter::new(&self.regions, selected);
        let shown = self.events.ingest(features, complete, filter);
        self.event_source.add_features(shown);
        self.refresh_sizes();
      }
      (Channel::ViewportClusters, Payload::Features(features)) => {
        let filter = RegionFilter::new(&self.regions, selected);
        let shown = self.points.ingest(features, complete, filter);
        self.point_source.add_features(shown);
      }
      (Channel::FullClusters, Payload::Points(points)) => {
        self.points.mark_loaded();
        self.charts.apply_points(&points);
        self.statistics = Some(Statistics::from_points(&points));
      }
      (channel, _) => tracing::warn!(?channel, "unexpected payload for channel"),
    }
  }

  fn refresh_sizes(&mut self) {
    let complete = self.events.is_loaded();
    self
      .charts
      .set_sizes(self.event_source.iter().map(Arc::as_ref), complete);
  }

  /// Abort everything in flight and bring the caches in line with the filter
  fn reset_vectors(&mut self, skip_dates: bool, skip_regions: bool) {
    self.requests.abort_all();

    let range = (self.controls.start(), self.controls.end());
    let filter = RegionFilter::new(&self.regions, self.active_region());

    if self
      .events
      .reset(skip_dates, skip_regions, range, filter)
      .needs_rebuild()
    {
      self.event_source.rebuild(self.events.displayed_features());
    }
    if self
      .points
      .reset(skip_dates, skip_regions, range, filter)
      .needs_rebuild()
    {
      self.point_source.rebuild(self.points.displayed_features());
    }
  }

  /// Show cached features for the whole range that are not displayed yet
  fn recall(&mut self) {
    let dates = date_range(self.controls.start(), self.controls.end());
    let filter = RegionFilter::new(&self.regions, self.active_region());

    let events = self.events.recall(&dates, filter);
    let points = self.points.recall(&dates, filter);
    tracing::debug!(events = events.len(), points = points.len(), "recalled from cache");

    self.event_source.add_features(events);
    self.point_source.add_features(points);
  }

  fn on_date_change(&mut self, change: DateChange) {
    tracing::info!(
      from = %format_date(change.old_start),
      to = %format_date(change.old_end),
      start = %format_date(self.controls.start()),
      end = %format_date(self.controls.end()),
      "date range changed"
    );

    self.popup = None;
    self.statistics = None;
    self.reset_vectors(false, true);
    self
      .charts
      .update_timeline_dates(self.controls.start(), self.controls.end());
    self.recall();
    self.refresh_sizes();
    self.fetch();
  }

  /// Re-filter for the selected region. `fit` moves the view onto it.
  fn on_region_change(&mut self, fit: bool) {
    let selected = self.active_region();
    tracing::info!(region = ?selected, "region changed");

    self.popup = None;
    self.statistics = None;
    self.reset_vectors(true, selected.is_none());
    self.recall();
    self.charts.clear();
    self.refresh_sizes();

    if fit {
      if let Some(region) = selected.and_then(|id| self.regions.get(id)) {
        self.view.fit(&region.bbox);
        self.view.persist(self.store.as_ref());
      }
    }
    self.fetch();
  }

  fn on_view_change(&mut self) {
    self.view.persist(self.store.as_ref());
    self.fetch();
  }

  fn select_region(&mut self, region: Option<RegionId>) {
    if self.controls.set_region(region) {
      self.on_region_change(true);
    }
  }

  // -- Input --

  fn handle_key(&mut self, key: KeyEvent) {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
      self.should_quit = true;
      return;
    }

    match self.mode {
      Mode::Normal => self.handle_normal_key(key),
      Mode::DateStart | Mode::DateEnd => self.handle_date_key(key),
      Mode::RegionPicker => self.handle_picker_key(key),
    }
  }

  fn handle_normal_key(&mut self, key: KeyEvent) {
    match key.code {
      KeyCode::Char('q') => self.should_quit = true,
      KeyCode::Esc => self.popup = None,

      // Map navigation
      KeyCode::Left | KeyCode::Char('h') => self.pan(-PAN_STEP, 0.0),
      KeyCode::Right | KeyCode::Char('l') => self.pan(PAN_STEP, 0.0),
      KeyCode::Up | KeyCode::Char('k') => self.pan(0.0, PAN_STEP),
      KeyCode::Down | KeyCode::Char('j') => self.pan(0.0, -PAN_STEP),
      KeyCode::Char('+') | KeyCode::Char('=') => self.zoom(1),
      KeyCode::Char('-') => self.zoom(-1),
      KeyCode::Enter => self.pick(),

      // Filter
      KeyCode::Char('s') => {
        self.date_input.start(self.controls.start());
        self.mode = Mode::DateStart;
      }
      KeyCode::Char('e') => {
        self.date_input.start(self.controls.end());
        self.mode = Mode::DateEnd;
      }
      KeyCode::Char('[') => self.apply_date_change(|c| c.step_start(-1)),
      KeyCode::Char(']') => self.apply_date_change(|c| c.step_start(1)),
      KeyCode::Char('{') => self.apply_date_change(|c| c.step_end(-1)),
      KeyCode::Char('}') => self.apply_date_change(|c| c.step_end(1)),
      KeyCode::Char('r') => {
        if self.region_status == RegionStatus::Loaded && !self.regions.is_empty() {
          let regions: Vec<&Region> = self.regions.sorted_by_name();
          self.region_picker.show(&regions, self.controls.region());
          self.mode = Mode::RegionPicker;
        }
      }
      KeyCode::Char('x') => self.select_region(None),

      // Panel layout
      KeyCode::Char('<') => self.resize_panel(|l, s| l.grow_charts(-5, s)),
      KeyCode::Char('>') => self.resize_panel(|l, s| l.grow_charts(5, s)),
      KeyCode::Char(',') => self.resize_panel(|l, s| l.grow_statistics(-5, s)),
      KeyCode::Char('.') => self.resize_panel(|l, s| l.grow_statistics(5, s)),

      _ => {}
    }
  }

  fn handle_date_key(&mut self, key: KeyEvent) {
    match self.date_input.handle_key(key) {
      InputResult::Submitted(value) => {
        let change = match self.mode {
          Mode::DateStart => self.controls.input_date_start(&value),
          _ => self.controls.input_date_end(&value),
        };
        self.mode = Mode::Normal;
        self.date_input.clear();
        match change {
          Some(change) => self.on_date_change(change),
          None => tracing::debug!(input = %value, "rejected date input"),
        }
      }
      InputResult::Cancelled => {
        self.mode = Mode::Normal;
        self.date_input.clear();
      }
      InputResult::Consumed | InputResult::NotHandled => {}
    }
  }

  fn handle_picker_key(&mut self, key: KeyEvent) {
    match self.region_picker.handle_key(key) {
      KeyResult::Event(RegionPickerEvent::Selected(region)) => {
        self.mode = Mode::Normal;
        self.select_region(region);
      }
      KeyResult::Event(RegionPickerEvent::Cancelled) => self.mode = Mode::Normal,
      KeyResult::Handled | KeyResult::NotHandled => {}
    }
  }

  fn apply_date_change(&mut self, f: impl FnOnce(&mut Controls) -> Option<DateChange>) {
    if let Some(change) = f(&mut self.controls) {
      self.on_date_change(change);
    }
  }

  fn resize_panel(&mut self, f: impl FnOnce(&mut PanelLayout, &dyn KeyValueStore) -> bool) {
    if f(&mut self.layout, self.store.as_ref()) {
      let size = self.view_canvas_hint();
      if self.view.set_size(size.0, size.1) {
        self.fetch();
      }
    }
  }

  /// Canvas size for the current layout, from the last full terminal size
  fn view_canvas_hint(&self) -> (u16, u16) {
    match crossterm::terminal::size() {
      Ok((width, height)) => {
        let areas = self.layout.split(Rect::new(0, 0, width, height));
        let canvas = ui::map_canvas_area(areas.map);
        (canvas.width, canvas.height)
      }
      Err(_) => (1, 1),
    }
  }

  fn pan(&mut self, dx: f64, dy: f64) {
    self.view.pan(dx, dy);
    self.on_view_change();
  }

  fn zoom(&mut self, delta: i8) {
    if self.view.zoom_by(delta) {
      self.on_view_change();
    }
  }

  /// Act on whatever is under the crosshair in the middle of the map
  fn pick(&mut self) {
    let (x, y) = self.view.center();

    match self.view.active_layer(self.config.cluster_zoom) {
      ActiveLayer::Events => {
        let radius = self.view.cell_width() * 3.0;
        if let Some(feature) = self.event_source.nearest(x, y, radius) {
          self.popup = Some(feature.clone());
          return;
        }
      }
      ActiveLayer::Clusters => {
        let radius = CLUSTER_DISTANCE * self.view.resolution() / 2.0;
        let hit = self
          .clusters()
          .into_iter()
          .filter(|c| (c.x - x).hypot(c.y - y) <= radius)
          .min_by(|a, b| (a.x - x).hypot(a.y - y).total_cmp(&(b.x - x).hypot(b.y - y)));
        if let Some(hit) = hit {
          self.view.set_center(hit.x, hit.y);
          self.view.set_zoom(self.config.cluster_zoom);
          self.on_view_change();
          return;
        }
      }
    }

    if self.popup.take().is_some() {
      return;
    }

    // Clicking the selected region clears it, any other region selects it
    let under = self.regions.at_point(x, y).map(|r| r.id);
    match under {
      Some(id) if self.controls.region() == Some(id) => self.select_region(None),
      Some(id) => self.select_region(Some(id)),
      None => {}
    }
  }

  // -- Read access for rendering --

  pub fn api_url(&self) -> &str {
    &self.config.api_url
  }

  pub fn mode(&self) -> Mode {
    self.mode
  }

  pub fn controls(&self) -> &Controls {
    &self.controls
  }

  pub fn regions(&self) -> &Regions {
    &self.regions
  }

  pub fn region_status(&self) -> &RegionStatus {
    &self.region_status
  }

  pub fn selected_region(&self) -> Option<&Region> {
    self.controls.region().and_then(|id| self.regions.get(id))
  }

  pub fn view(&self) -> &MapView {
    &self.view
  }

  pub fn layout(&self) -> &PanelLayout {
    &self.layout
  }

  pub fn active_layer(&self) -> ActiveLayer {
    self.view.active_layer(self.config.cluster_zoom)
  }

  pub fn event_source(&self) -> &VectorSource {
    &self.event_source
  }

  /// Clusters of the points inside the view
  pub fn clusters(&self) -> Vec<Cluster> {
    cluster(
      self.point_source.within(self.view.extent()),
      self.view.resolution(),
    )
  }

  pub fn basemap_lines(&self) -> Vec<&geo::LineString<f64>> {
    match &self.basemap {
      Some(basemap) => basemap.lines(&self.visible_tiles).collect(),
      None => Vec::new(),
    }
  }

  pub fn charts(&self) -> &Charts {
    &self.charts
  }

  pub fn statistics(&self) -> Option<&Statistics> {
    self.statistics.as_ref()
  }

  pub fn popup(&self) -> Option<&Feature> {
    self.popup.as_deref()
  }

  pub fn date_input(&self) -> &DateInput {
    &self.date_input
  }

  pub fn region_picker(&self) -> &RegionPicker {
    &self.region_picker
  }

  /// Whether any request is still out
  pub fn is_loading(&self) -> bool {
    Channel::ALL.iter().any(|c| self.requests.is_pending(*c))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::PointsPayload;
  use crate::feature::fixtures::point;
  use crate::region::fixtures::square;
  use std::collections::BTreeMap;

  fn day(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
  }

  fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
  }

  /// App on a memory store with an unreachable API, showing 2023-01-10..2023-01-13
  fn app() -> (App, Arc<MemoryStore>) {
    let config = Config {
      api_url: "http://127.0.0.1:9".to_string(),
      basemap_url: None,
      ..Config::default()
    };
    let store = Arc::new(MemoryStore::new());
    let overrides = StartupOverrides {
      date_from: Some(day("2023-01-10")),
      date_to: Some(day("2023-01-13")),
      region_id: None,
    };
    let app = App::with_store(config, store.clone(), overrides, day("2023-01-20")).unwrap();
    (app, store)
  }

  fn deliver(app: &mut App, channel: Channel, features: Vec<Feature>) {
    app.handle_delivery(Delivery {
      channel,
      data: Payload::Features(features),
    });
  }

  fn source_ids(source: &VectorSource) -> Vec<String> {
    let mut ids: Vec<String> = source.iter().map(|f| f.id.as_str().to_string()).collect();
    ids.sort();
    ids
  }

  fn displayed_ids(cache: &FeatureCache) -> Vec<String> {
    let mut ids: Vec<String> = cache
      .displayed()
      .iter()
      .map(|f| f.id.as_str().to_string())
      .collect();
    ids.sort();
    ids
  }

  #[tokio::test]
  async fn test_inverted_end_input_fetches_nothing() {
    let (mut app, store) = app();

    app.handle_key(key(KeyCode::Char('e')));
    assert_eq!(app.mode(), Mode::DateEnd);
    assert_eq!(app.date_input().value(), "2023-01-13");

    app.handle_key(key(KeyCode::Backspace));
    app.handle_key(key(KeyCode::Backspace));
    app.handle_key(key(KeyCode::Char('0')));
    app.handle_key(key(KeyCode::Char('9')));
    app.handle_key(key(KeyCode::Enter));

    assert_eq!(app.mode(), Mode::Normal);
    assert_eq!(app.controls().end(), day("2023-01-13"));
    assert!(Channel::ALL.iter().all(|c| !app.requests.is_pending(*c)));
    assert!(!app.is_loading());
    assert_eq!(store.writes(), 0);
  }

  #[tokio::test]
  async fn test_valid_end_input_refetches() {
    let (mut app, store) = app();

    app.handle_key(key(KeyCode::Char('e')));
    app.handle_key(key(KeyCode::Backspace));
    app.handle_key(key(KeyCode::Char('5')));
    app.handle_key(key(KeyCode::Enter));

    assert_eq!(app.controls().end(), day("2023-01-15"));
    assert_eq!(store.writes(), 1);
    assert!(app.requests.is_pending(Channel::ViewportEvents));
    assert!(app.requests.is_pending(Channel::FullEvents));
  }

  #[tokio::test]
  async fn test_narrowing_range_keeps_source_in_line_with_cache() {
    let (mut app, _store) = app();
    deliver(
      &mut app,
      Channel::ViewportEvents,
      vec![
        point("a", "2023-01-10", 10.0, 10.0),
        point("b", "2023-01-12", 20.0, 20.0),
      ],
    );
    assert_eq!(app.event_source.len(), 2);

    let change = app.controls.set_date_end(day("2023-01-11")).unwrap();
    app.on_date_change(change);

    assert_eq!(source_ids(&app.event_source), displayed_ids(&app.events));
    assert_eq!(source_ids(&app.event_source), vec!["a".to_string()]);
    assert!(app.events.cache().iter().all(|f| f.day() < day("2023-01-11")));
  }

  #[tokio::test]
  async fn test_shifted_range_keeps_cached_days_in_view() {
    let (mut app, _store) = app();
    deliver(
      &mut app,
      Channel::ViewportEvents,
      vec![
        point("a", "2023-01-10", 10.0, 10.0),
        point("c", "2023-01-12", 10.0, 10.0),
      ],
    );

    let change = app.controls.set_date_start(day("2023-01-11")).unwrap();
    app.on_date_change(change);

    // Shown straight away, while the refetch is still out
    assert_eq!(app.controls().end(), day("2023-01-14"));
    assert_eq!(source_ids(&app.event_source), vec!["c".to_string()]);
    assert!(app.requests.is_pending(Channel::ViewportEvents));
    assert!(app.requests.is_pending(Channel::FullEvents));
  }

  #[tokio::test]
  async fn test_full_events_delivery_stops_full_requests() {
    let (mut app, _store) = app();

    app.fetch();
    assert!(app.requests.is_pending(Channel::FullEvents));
    assert!(app.requests.is_pending(Channel::FullClusters));

    deliver(&mut app, Channel::FullEvents, vec![point("a", "2023-01-10", 0.0, 0.0)]);
    assert!(app.events.is_loaded());
    assert!(!app.charts().sizes_partial());

    app.requests.abort_all();
    app.fetch();
    assert!(!app.requests.is_pending(Channel::FullEvents));
    assert!(app.requests.is_pending(Channel::ViewportEvents));
    assert!(app.requests.is_pending(Channel::ViewportClusters));
  }

  #[tokio::test]
  async fn test_full_clusters_delivery_sets_statistics() {
    let (mut app, _store) = app();
    assert!(app.statistics().is_none());

    app.handle_delivery(Delivery {
      channel: Channel::FullClusters,
      data: Payload::Points(PointsPayload::default()),
    });

    assert!(app.points.is_loaded());
    assert!(app.statistics().is_some());
  }

  #[tokio::test]
  async fn test_mismatched_payload_is_ignored() {
    let (mut app, _store) = app();

    app.handle_delivery(Delivery {
      channel: Channel::FullClusters,
      data: Payload::Features(vec![point("a", "2023-01-10", 0.0, 0.0)]),
    });

    assert!(app.event_source.is_empty());
    assert!(app.point_source.is_empty());
    assert!(!app.points.is_loaded());
  }

  #[tokio::test]
  async fn test_viewport_clusters_feed_point_source() {
    let (mut app, _store) = app();
    deliver(
      &mut app,
      Channel::ViewportClusters,
      vec![point("p", "2023-01-11", 5.0, 5.0)],
    );

    assert_eq!(app.point_source.len(), 1);
    assert!(app.event_source.is_empty());
    assert!(!app.points.is_loaded());
  }

  #[tokio::test]
  async fn test_region_selection_filters_and_clearing_recalls() {
    let (mut app, _store) = app();
    app.regions = Regions::new(
      vec![
        square(3011, "Tromsø", (0.0, 0.0), (100.0, 100.0)),
        square(3010, "Lyngen", (200.0, 0.0), (300.0, 100.0)),
      ],
      BTreeMap::new(),
    );
    app.region_status = RegionStatus::Loaded;
    deliver(
      &mut app,
      Channel::ViewportEvents,
      vec![
        point("in", "2023-01-10", 50.0, 50.0),
        point("out", "2023-01-10", 250.0, 50.0),
      ],
    );
    assert_eq!(app.event_source.len(), 2);

    app.select_region(Some(3011));
    assert_eq!(source_ids(&app.event_source), vec!["in".to_string()]);
    assert_eq!(source_ids(&app.event_source), displayed_ids(&app.events));

    // The hidden feature comes back from the cache, not the network
    app.requests.abort_all();
    app.select_region(None);
    assert_eq!(
      source_ids(&app.event_source),
      vec!["in".to_string(), "out".to_string()]
    );
    assert_eq!(app.controls().region(), None);
  }

  #[tokio::test]
  async fn test_region_filter_waits_for_regions() {
    let (mut app, _store) = app();
    assert!(app.controls.set_region(Some(3011)));

    assert_eq!(app.active_region(), None);
    deliver(
      &mut app,
      Channel::ViewportEvents,
      vec![point("a", "2023-01-10", 500.0, 500.0)],
    );
    assert_eq!(app.event_source.len(), 1);
  }
}
