//! Filter state: the date range and the selected region.
//!
//! Inputs are validated against the same bounds the date pickers enforce.
//! An invalid input leaves the state untouched and writes nothing, so the
//! caller simply redraws the last good value.

use chrono::{Local, NaiveDate};
use std::sync::Arc;

use crate::date::{format_date, next_day, parse_date};
use crate::region::{RegionId, Regions};
use crate::store::{KeyValueStore, StoreKey};

/// Longest accepted range, about ten years. Every day is a timeline category.
pub const MAX_RANGE_DAYS: i64 = 3653;

/// Startup values given on the command line
#[derive(Debug, Clone, Copy, Default)]
pub struct StartupOverrides {
  pub date_from: Option<NaiveDate>,
  pub date_to: Option<NaiveDate>,
  pub region_id: Option<RegionId>,
}

/// The filter a fetch is made for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterState {
  /// First day, inclusive
  pub start: NaiveDate,
  /// Last day, exclusive
  pub end: NaiveDate,
  pub region: Option<RegionId>,
}

/// An accepted date change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateChange {
  pub old_start: NaiveDate,
  pub old_end: NaiveDate,
}

pub struct Controls {
  state: FilterState,
  store: Arc<dyn KeyValueStore>,
  today: NaiveDate,
}

impl std::fmt::Debug for Controls {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Controls")
      .field("state", &self.state)
      .field("today", &self.today)
      .finish_non_exhaustive()
  }
}

impl Controls {
  pub fn new(store: Arc<dyn KeyValueStore>, overrides: StartupOverrides) -> Self {
    Self::with_today(store, overrides, Local::now().date_naive())
  }

  /// Initial state: command line, then stored values, then today..tomorrow.
  pub fn with_today(
    store: Arc<dyn KeyValueStore>,
    overrides: StartupOverrides,
    today: NaiveDate,
  ) -> Self {
    let stored_date = |key| store.read(key).as_deref().and_then(parse_date);

    let start = overrides
      .date_from
      .or_else(|| stored_date(StoreKey::DateStart))
      .unwrap_or(today);
    let mut end = overrides
      .date_to
      .or_else(|| stored_date(StoreKey::DateEnd))
      .unwrap_or_else(|| next_day(today));
    if end <= start {
      tracing::debug!(%start, %end, "inverted initial range, showing one day");
      end = next_day(start);
    }
    if (end - start).num_days() > MAX_RANGE_DAYS {
      tracing::info!(%start, %end, "initial range too long, shortening");
      end = start + chrono::Duration::days(MAX_RANGE_DAYS);
    }

    let region = overrides.region_id.or_else(|| {
      store
        .read(StoreKey::Region)
        .and_then(|v| v.trim().parse().ok())
    });

    Self {
      state: FilterState { start, end, region },
      store,
      today,
    }
  }

  pub fn state(&self) -> FilterState {
    self.state
  }

  pub fn start(&self) -> NaiveDate {
    self.state.start
  }

  pub fn end(&self) -> NaiveDate {
    self.state.end
  }

  pub fn region(&self) -> Option<RegionId> {
    self.state.region
  }

  /// Latest accepted start date
  pub fn start_max(&self) -> NaiveDate {
    next_day(self.today)
  }

  /// Earliest accepted end date
  pub fn end_min(&self) -> NaiveDate {
    next_day(self.state.start)
  }

  /// Latest accepted end date
  pub fn end_max(&self) -> NaiveDate {
    self.state.start + chrono::Duration::days(MAX_RANGE_DAYS)
  }

  /// Parse and apply a new start date. The end date moves by the same
  /// number of days so the range keeps its length.
  pub fn input_date_start(&mut self, input: &str) -> Option<DateChange> {
    self.set_date_start(parse_date(input)?)
  }

  pub fn input_date_end(&mut self, input: &str) -> Option<DateChange> {
    self.set_date_end(parse_date(input)?)
  }

  pub fn set_date_start(&mut self, start: NaiveDate) -> Option<DateChange> {
    if start > self.start_max() || start == self.state.start {
      return None;
    }

    let change = self.date_change();
    let delta = start - self.state.start;
    self.state.start = start;
    self.state.end = self.state.end + delta;

    self
      .store
      .persist(StoreKey::DateStart, &format_date(self.state.start));
    self
      .store
      .persist(StoreKey::DateEnd, &format_date(self.state.end));
    Some(change)
  }

  pub fn set_date_end(&mut self, end: NaiveDate) -> Option<DateChange> {
    if end < self.end_min() || end > self.end_max() || end == self.state.end {
      return None;
    }

    let change = self.date_change();
    self.state.end = end;
    self
      .store
      .persist(StoreKey::DateEnd, &format_date(self.state.end));
    Some(change)
  }

  /// Move the start date by whole days
  pub fn step_start(&mut self, days: i64) -> Option<DateChange> {
    let start = self
      .state
      .start
      .checked_add_signed(chrono::Duration::days(days))?;
    self.set_date_start(start)
  }

  /// Move the end date by whole days
  pub fn step_end(&mut self, days: i64) -> Option<DateChange> {
    let end = self
      .state
      .end
      .checked_add_signed(chrono::Duration::days(days))?;
    self.set_date_end(end)
  }

  /// Select a region, or none. Returns whether the selection changed.
  pub fn set_region(&mut self, region: Option<RegionId>) -> bool {
    if region == self.state.region {
      return false;
    }
    self.state.region = region;
    let value = region.map(|id| id.to_string()).unwrap_or_default();
    self.store.persist(StoreKey::Region, &value);
    true
  }

  /// Forget a selected region that does not exist. Returns whether it was dropped.
  pub fn retain_known_region(&mut self, regions: &Regions) -> bool {
    match self.state.region {
      Some(id) if regions.get(id).is_none() => {
        tracing::info!(region = id, "unknown region, clearing selection");
        self.state.region = None;
        true
      }
      _ => false,
    }
  }

  fn date_change(&self) -> DateChange {
    DateChange {
      old_start: self.state.start,
      old_end: self.state.end,
    }
  }
}
