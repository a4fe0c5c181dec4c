//! Client-side feature cache and view synchronization.
//!
//! Every feature type (event polygons, event points) keeps two parallel
//! day-bucketed stores:
//!
//! - `cache`: everything fetched so far for the current date range
//! - `displayed`: the subset that passes the active region filter and is
//!   rendered
//!
//! Both are keyed by calendar day, then by feature ID, and `displayed` is
//! always a subset of `cache`. Filter changes are first answered from the
//! cache (`recall`), network responses are merged with `ingest`, and
//! `reset` prunes both stores when the filter narrows.

use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::feature::{Feature, FeatureId};
use crate::region::{RegionId, Regions};

/// Calendar day -> feature ID -> feature
#[derive(Debug, Clone, Default)]
pub struct DateBuckets {
  days: BTreeMap<NaiveDate, HashMap<FeatureId, Arc<Feature>>>,
}

impl DateBuckets {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn contains(&self, day: NaiveDate, id: &FeatureId) -> bool {
    self
      .days
      .get(&day)
      .is_some_and(|bucket| bucket.contains_key(id))
  }

  /// Insert under the feature's own day. Returns false if (day, ID) was present.
  pub fn insert(&mut self, feature: Arc<Feature>) -> bool {
    let bucket = self.days.entry(feature.day()).or_default();
    if bucket.contains_key(&feature.id) {
      return false;
    }
    bucket.insert(feature.id.clone(), feature);
    true
  }

  pub fn remove(&mut self, day: NaiveDate, id: &FeatureId) -> bool {
    let Some(bucket) = self.days.get_mut(&day) else {
      return false;
    };
    let removed = bucket.remove(id).is_some();
    if bucket.is_empty() {
      self.days.remove(&day);
    }
    removed
  }

  /// Features bucketed under `day`
  pub fn day(&self, day: NaiveDate) -> impl Iterator<Item = &Arc<Feature>> {
    self.days.get(&day).into_iter().flat_map(|bucket| bucket.values())
  }

  /// Drop every day outside [start, end). Returns the number of features removed.
  pub fn retain_range(&mut self, start: NaiveDate, end: NaiveDate) -> usize {
    let mut removed = 0;
    self.days.retain(|day, bucket| {
      let keep = *day >= start && *day < end;
      if !keep {
        removed += bucket.len();
      }
      keep
    });
    removed
  }

  pub fn iter(&self) -> impl Iterator<Item = &Arc<Feature>> {
    self.days.values().flat_map(|bucket| bucket.values())
  }

  pub fn len(&self) -> usize {
    self.days.values().map(HashMap::len).sum()
  }

  #[cfg(test)]
  pub fn is_empty(&self) -> bool {
    self.days.is_empty()
  }

  /// Number of non-empty day buckets
  #[cfg(test)]
  pub fn day_count(&self) -> usize {
    self.days.len()
  }

  #[cfg(test)]
  pub fn days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
    self.days.keys().copied()
  }
}

/// Memoized region membership, keyed by (feature ID, region ID).
///
/// Point-in-polygon tests are expensive and the same features are filtered
/// again on every filter change, so each answer is computed once.
#[derive(Debug, Clone, Default)]
pub struct RegionMemo {
  results: HashMap<(FeatureId, RegionId), bool>,
}

impl RegionMemo {
  #[cfg(test)]
  pub fn new() -> Self {
    Self::default()
  }

  pub fn is_member(&mut self, regions: &Regions, region: RegionId, feature: &Feature) -> bool {
    *self
      .results
      .entry((feature.id.clone(), region))
      .or_insert_with(|| regions.contains_geometry(region, &feature.geometry))
  }

  #[cfg(test)]
  pub fn len(&self) -> usize {
    self.results.len()
  }

  /// Forget memoized results for features no longer cached
  pub fn retain_features(&mut self, keep: impl Fn(&FeatureId) -> bool) {
    self.results.retain(|(id, _), _| keep(id));
  }
}

/// The region side of the filter
#[derive(Debug, Clone, Copy)]
pub struct RegionFilter<'a> {
  pub regions: &'a Regions,
  pub selected: Option<RegionId>,
}

impl<'a> RegionFilter<'a> {
  pub fn new(regions: &'a Regions, selected: Option<RegionId>) -> Self {
    Self { regions, selected }
  }
}

/// Keep the features whose region membership equals `keep`.
///
/// Without a selected region every feature counts as a member: `keep = true`
/// keeps everything and `keep = false` keeps nothing.
pub fn region_filter(
  features: Vec<Arc<Feature>>,
  keep: bool,
  filter: RegionFilter<'_>,
  memo: &mut RegionMemo,
) -> Vec<Arc<Feature>> {
  let Some(region) = filter.selected else {
    return if keep { features } else { Vec::new() };
  };

  features
    .into_iter()
    .filter(|feature| memo.is_member(filter.regions, region, feature) == keep)
    .collect()
}

/// Outcome of a `reset`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResetOutcome {
  /// Features dropped from the cache because their day left the range
  pub pruned_days: usize,
  /// Features hidden because they fell outside the region
  pub hidden_by_region: usize,
}

impl ResetOutcome {
  /// Whether the rendering source must be rebuilt from `displayed`
  pub fn needs_rebuild(&self) -> bool {
    self.pruned_days > 0 || self.hidden_by_region > 0
  }
}

/// Cache and displayed set for one feature type, plus its load flags.
#[derive(Debug, Default)]
pub struct FeatureCache {
  cache: DateBuckets,
  displayed: DateBuckets,
  memo: RegionMemo,
  /// The full (non-viewport) dataset for the current filter has arrived
  loaded: bool,
  /// The full dataset has been requested for the current filter
  load_started: bool,
}

impl FeatureCache {
  pub fn new() -> Self {
    Self::default()
  }

  #[cfg(test)]
  pub fn cache(&self) -> &DateBuckets {
    &self.cache
  }

  pub fn displayed(&self) -> &DateBuckets {
    &self.displayed
  }

  /// Everything currently displayed, for rebuilding a rendering source
  pub fn displayed_features(&self) -> Vec<Arc<Feature>> {
    self.displayed.iter().cloned().collect()
  }

  pub fn is_loaded(&self) -> bool {
    self.loaded
  }

  /// Decide whether the full dataset must be requested, and mark it started.
  pub fn begin_full_load(&mut self) -> bool {
    if self.loaded || self.load_started {
      return false;
    }
    self.load_started = true;
    true
  }

  pub fn mark_loaded(&mut self) {
    self.loaded = true;
  }

  /// Promote cached features for `dates` that are not displayed yet.
  ///
  /// Purely local. Returns the features newly added to `displayed`, which
  /// the caller adds to its rendering source.
  pub fn recall(&mut self, dates: &[NaiveDate], filter: RegionFilter<'_>) -> Vec<Arc<Feature>> {
    let candidates: Vec<Arc<Feature>> = dates
      .iter()
      .flat_map(|day| self.cache.day(*day))
      .filter(|feature| !self.displayed.contains(feature.day(), &feature.id))
      .cloned()
      .collect();

    let accepted = region_filter(candidates, true, filter, &mut self.memo);
    self.promote(accepted)
  }

  /// Merge a network response.
  ///
  /// Features already cached under the same (day, ID) are ignored, so
  /// repeated and reordered deliveries are harmless. New features go into
  /// `cache` and, if they pass the region filter, into `displayed`.
  /// Returns the features newly displayed.
  pub fn ingest(
    &mut self,
    features: Vec<Feature>,
    complete: bool,
    filter: RegionFilter<'_>,
  ) -> Vec<Arc<Feature>> {
    let received = features.len();
    let mut fresh = Vec::new();
    for feature in features {
      let feature = Arc::new(feature);
      if self.cache.insert(feature.clone()) {
        fresh.push(feature);
      }
    }

    if complete {
      self.loaded = true;
    }

    let new_in_cache = fresh.len();
    let accepted = region_filter(fresh, true, filter, &mut self.memo);
    let shown = self.promote(accepted);

    tracing::debug!(
      received,
      new_in_cache,
      shown = shown.len(),
      complete,
      "merged features"
    );
    shown
  }

  /// Bring the stores in line with a changed filter.
  ///
  /// Clears the load flags. Unless `skip_dates`, drops cached and displayed
  /// features whose day falls outside [start, end). Unless `skip_regions`,
  /// re-checks region membership of every displayed feature and hides the
  /// ones that no longer match; they stay cached.
  pub fn reset(
    &mut self,
    skip_dates: bool,
    skip_regions: bool,
    range: (NaiveDate, NaiveDate),
    filter: RegionFilter<'_>,
  ) -> ResetOutcome {
    self.loaded = false;
    self.load_started = false;

    let mut outcome = ResetOutcome::default();

    if !skip_dates {
      let (start, end) = range;
      outcome.pruned_days = self.cache.retain_range(start, end);
      self.displayed.retain_range(start, end);

      if outcome.pruned_days > 0 {
        let cache = &self.cache;
        let live: std::collections::HashSet<&FeatureId> = cache.iter().map(|f| &f.id).collect();
        self.memo.retain_features(|id| live.contains(id));
      }
    }

    if !skip_regions {
      let excluded = region_filter(self.displayed_features(), false, filter, &mut self.memo);
      if filter.selected.is_some() {
        for feature in &excluded {
          if self.displayed.remove(feature.day(), &feature.id) {
            outcome.hidden_by_region += 1;
          }
        }
      }
    }

    tracing::debug!(
      pruned_days = outcome.pruned_days,
      hidden_by_region = outcome.hidden_by_region,
      cached = self.cache.len(),
      displayed = self.displayed.len(),
      "reset feature cache"
    );
    outcome
  }

  fn promote(&mut self, features: Vec<Arc<Feature>>) -> Vec<Arc<Feature>> {
    features
      .into_iter()
      .filter(|feature| self.displayed.insert(feature.clone()))
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::date::{date_range, parse_date};
  use crate::feature::fixtures::point;
  use crate::region::fixtures::square;

  fn d(s: &str) -> NaiveDate {
    parse_date(s).unwrap()
  }

  fn regions() -> Regions {
    Regions::new(
      vec![
        square(1, "West", (0.0, 0.0), (100.0, 100.0)),
        square(2, "East", (100.0, 0.0), (200.0, 100.0)),
      ],
      BTreeMap::new(),
    )
  }

  fn ids(features: &[Arc<Feature>]) -> Vec<String> {
    let mut ids: Vec<String> = features.iter().map(|f| f.id.to_string()).collect();
    ids.sort();
    ids
  }

  #[test]
  fn test_fetch_scenario_and_duplicate_delivery() {
    let regions = regions();
    let filter = RegionFilter::new(&regions, None);
    let mut cache = FeatureCache::new();

    let first = vec![
      point("a", "2023-01-01", 10.0, 10.0),
      point("b", "2023-01-01", 20.0, 10.0),
      point("c", "2023-01-01", 30.0, 10.0),
      point("d", "2023-01-02", 40.0, 10.0),
    ];
    let shown = cache.ingest(first, false, filter);
    assert_eq!(shown.len(), 4);
    assert_eq!(cache.displayed().len(), 4);
    assert_eq!(cache.displayed().day_count(), 2);

    let second = vec![point("b", "2023-01-01", 20.0, 10.0)];
    let shown = cache.ingest(second, true, filter);
    assert!(shown.is_empty());
    assert_eq!(cache.displayed().len(), 4);
    assert_eq!(cache.cache().len(), 4);
    assert!(cache.is_loaded());
  }

  #[test]
  fn test_same_id_on_different_days_are_distinct() {
    let regions = regions();
    let filter = RegionFilter::new(&regions, None);
    let mut cache = FeatureCache::new();

    cache.ingest(vec![point("a", "2023-01-01", 1.0, 1.0)], false, filter);
    cache.ingest(vec![point("a", "2023-01-02", 1.0, 1.0)], false, filter);
    assert_eq!(cache.cache().len(), 2);
  }

  #[test]
  fn test_region_filter_partitions() {
    let regions = regions();
    let features: Vec<Arc<Feature>> = vec![
      Arc::new(point("w1", "2023-01-01", 10.0, 10.0)),
      Arc::new(point("w2", "2023-01-01", 90.0, 50.0)),
      Arc::new(point("e1", "2023-01-01", 150.0, 50.0)),
      Arc::new(point("x1", "2023-01-01", 500.0, 50.0)),
    ];

    for selected in [None, Some(1), Some(2)] {
      let filter = RegionFilter::new(&regions, selected);
      let mut memo = RegionMemo::new();
      let kept = region_filter(features.clone(), true, filter, &mut memo);
      let dropped = region_filter(features.clone(), false, filter, &mut memo);

      let mut all = ids(&kept);
      all.extend(ids(&dropped));
      all.sort();
      assert_eq!(all, ids(&features), "region {:?}", selected);
      assert!(ids(&kept).iter().all(|id| !ids(&dropped).contains(id)));
    }

    let mut memo = RegionMemo::new();
    let west = region_filter(features.clone(), true, RegionFilter::new(&regions, Some(1)), &mut memo);
    assert_eq!(ids(&west), vec!["w1", "w2"]);
    assert_eq!(memo.len(), 4);
  }

  #[test]
  fn test_membership_is_memoized_per_region() {
    let regions = regions();
    let feature = point("w1", "2023-01-01", 10.0, 10.0);
    let mut memo = RegionMemo::new();

    assert!(memo.is_member(&regions, 1, &feature));
    assert!(!memo.is_member(&regions, 2, &feature));
    assert!(memo.is_member(&regions, 1, &feature));
    assert_eq!(memo.len(), 2);
  }

  #[test]
  fn test_reset_prunes_days_outside_range() {
    let regions = regions();
    let filter = RegionFilter::new(&regions, None);
    let mut cache = FeatureCache::new();
    cache.ingest(
      vec![
        point("a", "2023-01-01", 1.0, 1.0),
        point("b", "2023-01-02", 1.0, 1.0),
        point("c", "2023-01-03", 1.0, 1.0),
        point("d", "2023-01-04", 1.0, 1.0),
      ],
      true,
      filter,
    );

    let outcome = cache.reset(false, true, (d("2023-01-02"), d("2023-01-04")), filter);

    assert_eq!(outcome.pruned_days, 2);
    assert!(outcome.needs_rebuild());
    assert!(!cache.is_loaded());
    let cached_days: Vec<NaiveDate> = cache.cache().days().collect();
    assert_eq!(cached_days, vec![d("2023-01-02"), d("2023-01-03")]);
    let shown_days: Vec<NaiveDate> = cache.displayed().days().collect();
    assert_eq!(shown_days, cached_days);
  }

  #[test]
  fn test_reset_skip_dates_keeps_everything() {
    let regions = regions();
    let filter = RegionFilter::new(&regions, None);
    let mut cache = FeatureCache::new();
    cache.ingest(vec![point("a", "2023-01-01", 1.0, 1.0)], false, filter);

    let outcome = cache.reset(true, true, (d("2023-02-01"), d("2023-02-02")), filter);
    assert!(!outcome.needs_rebuild());
    assert_eq!(cache.cache().len(), 1);
  }

  #[test]
  fn test_region_change_hides_but_keeps_cache_then_recalls() {
    let regions = regions();
    let mut cache = FeatureCache::new();
    cache.ingest(
      vec![
        point("w", "2023-01-01", 10.0, 10.0),
        point("e", "2023-01-01", 150.0, 10.0),
      ],
      false,
      RegionFilter::new(&regions, None),
    );

    let west = RegionFilter::new(&regions, Some(1));
    let outcome = cache.reset(true, false, (d("2023-01-01"), d("2023-01-02")), west);
    assert_eq!(outcome.hidden_by_region, 1);
    assert_eq!(ids(&cache.displayed_features()), vec!["w"]);
    assert_eq!(cache.cache().len(), 2);

    // Clearing the region brings the hidden feature back from the cache
    let any = RegionFilter::new(&regions, None);
    cache.reset(true, true, (d("2023-01-01"), d("2023-01-02")), any);
    let recalled = cache.recall(&date_range(d("2023-01-01"), d("2023-01-02")), any);
    assert_eq!(ids(&recalled), vec!["e"]);
    assert_eq!(cache.displayed().len(), 2);
  }

  #[test]
  fn test_recall_only_scans_requested_days() {
    let regions = regions();
    let west = RegionFilter::new(&regions, Some(1));
    let mut cache = FeatureCache::new();
    cache.ingest(
      vec![
        point("e1", "2023-01-01", 150.0, 10.0),
        point("e2", "2023-01-02", 150.0, 10.0),
      ],
      false,
      west,
    );
    assert!(cache.displayed().is_empty());

    let east = RegionFilter::new(&regions, Some(2));
    let recalled = cache.recall(&[d("2023-01-02")], east);
    assert_eq!(ids(&recalled), vec!["e2"]);

    // Recalling again is a no-op
    assert!(cache.recall(&[d("2023-01-02")], east).is_empty());
  }

  #[test]
  fn test_ingest_respects_region() {
    let regions = regions();
    let mut cache = FeatureCache::new();
    let shown = cache.ingest(
      vec![
        point("w", "2023-01-01", 10.0, 10.0),
        point("e", "2023-01-01", 150.0, 10.0),
      ],
      false,
      RegionFilter::new(&regions, Some(2)),
    );
    assert_eq!(ids(&shown), vec!["e"]);
    assert_eq!(cache.cache().len(), 2);
  }

  #[test]
  fn test_full_load_flags() {
    let mut cache = FeatureCache::new();
    assert!(cache.begin_full_load());
    assert!(!cache.begin_full_load());

    cache.mark_loaded();
    assert!(!cache.begin_full_load());

    let regions = regions();
    cache.reset(true, true, (d("2023-01-01"), d("2023-01-02")), RegionFilter::new(&regions, None));
    assert!(cache.begin_full_load());
  }

  #[test]
  fn test_date_buckets_remove_drops_empty_day() {
    let mut buckets = DateBuckets::new();
    let f = Arc::new(point("a", "2023-01-01", 0.0, 0.0));
    assert!(buckets.insert(f.clone()));
    assert!(!buckets.insert(f.clone()));
    assert!(buckets.contains(f.day(), &f.id));
    assert!(buckets.remove(f.day(), &f.id));
    assert!(!buckets.remove(f.day(), &f.id));
    assert_eq!(buckets.day_count(), 0);
  }
}
