//! Forecast regions: named polygons used for filtering and for fitting the
//! view. Loaded once at startup and never modified.

use color_eyre::{eyre::eyre, Result};
use geo::{BoundingRect, Contains, Relate};
use geojson::GeoJson;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::config::Crs;
use crate::projection::project_geometry;

pub type RegionId = u32;

#[derive(Debug, Clone)]
pub struct Region {
  pub id: RegionId,
  pub name: String,
  pub geometry: geo::MultiPolygon<f64>,
  pub bbox: geo::Rect<f64>,
}

impl Region {
  pub fn new(id: RegionId, name: impl Into<String>, geometry: geo::MultiPolygon<f64>) -> Result<Self> {
    let bbox = geometry
      .bounding_rect()
      .ok_or_else(|| eyre!("Region {} has an empty geometry", id))?;
    Ok(Self {
      id,
      name: name.into(),
      geometry,
      bbox,
    })
  }
}

/// All regions plus the static association table
#[derive(Debug, Clone, Default)]
pub struct Regions {
  regions: BTreeMap<RegionId, Region>,
  groups: BTreeMap<RegionId, Vec<RegionId>>,
}

impl Regions {
  pub fn new(regions: Vec<Region>, groups: BTreeMap<RegionId, Vec<RegionId>>) -> Self {
    Self {
      regions: regions.into_iter().map(|r| (r.id, r)).collect(),
      groups,
    }
  }

  /// Parse the `areas.json` feature collection (`omradeID`, `omradeNavn`).
  ///
  /// Features without an ID, name or polygon geometry are skipped.
  pub fn from_geojson(
    text: &str,
    crs: Crs,
    groups: BTreeMap<RegionId, Vec<RegionId>>,
  ) -> Result<Self> {
    let geojson: GeoJson = text
      .parse()
      .map_err(|e| eyre!("Failed to parse region GeoJSON: {}", e))?;
    let collection = match geojson {
      GeoJson::FeatureCollection(fc) => fc,
      _ => return Err(eyre!("Region GeoJSON is not a FeatureCollection")),
    };

    let mut regions = Vec::new();
    for feature in collection.features {
      match parse_region(feature, crs) {
        Ok(region) => regions.push(region),
        Err(e) => tracing::warn!(error = %e, "skipping region"),
      }
    }

    tracing::info!(count = regions.len(), "loaded regions");
    Ok(Self::new(regions, groups))
  }

  pub fn get(&self, id: RegionId) -> Option<&Region> {
    self.regions.get(&id)
  }

  pub fn is_empty(&self) -> bool {
    self.regions.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &Region> {
    self.regions.values()
  }

  /// Regions ordered by name, as listed in the picker
  pub fn sorted_by_name(&self) -> Vec<&Region> {
    let mut regions: Vec<&Region> = self.regions.values().collect();
    regions.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
    regions
  }

  /// Region whose polygon contains the point
  pub fn at_point(&self, x: f64, y: f64) -> Option<&Region> {
    let point = geo::Point::new(x, y);
    self
      .regions
      .values()
      .find(|r| rect_covers(&r.bbox, &geo::Rect::new(point.0, point.0)) && r.geometry.contains(&point))
  }

  /// The region itself followed by its associated regions
  pub fn members(&self, id: RegionId) -> impl Iterator<Item = &Region> {
    let associated = self.groups.get(&id).map(Vec::as_slice).unwrap_or(&[]);
    std::iter::once(id)
      .chain(associated.iter().copied())
      .filter_map(|id| self.regions.get(&id))
  }

  /// Whether `geometry` lies within the region or one of its associated regions
  pub fn contains_geometry(&self, id: RegionId, geometry: &geo::Geometry<f64>) -> bool {
    let Some(bbox) = geometry.bounding_rect() else {
      return false;
    };
    self.members(id).any(|region| {
      rect_covers(&region.bbox, &bbox) && geometry.relate(&geo::Geometry::MultiPolygon(region.geometry.clone())).is_within()
    })
  }
}

/// Cheap pre-check before the exact within test
fn rect_covers(outer: &geo::Rect<f64>, inner: &geo::Rect<f64>) -> bool {
  outer.min().x <= inner.min().x
    && outer.min().y <= inner.min().y
    && outer.max().x >= inner.max().x
    && outer.max().y >= inner.max().y
}

fn parse_region(feature: geojson::Feature, crs: Crs) -> Result<Region> {
  let props = feature.properties.unwrap_or_default();

  let id = match props.get("omradeID") {
    Some(Value::Number(n)) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
    Some(Value::String(s)) => s.trim().parse().ok(),
    _ => None,
  }
  .ok_or_else(|| eyre!("Region without omradeID"))?;

  let name = props
    .get("omradeNavn")
    .and_then(Value::as_str)
    .map(String::from)
    .ok_or_else(|| eyre!("Region {} without omradeNavn", id))?;

  let geometry = feature
    .geometry
    .ok_or_else(|| eyre!("Region {} without geometry", id))?;
  let geometry = geo::Geometry::<f64>::try_from(geometry)
    .map_err(|e| eyre!("Region {} has unsupported geometry: {}", id, e))?;
  let geometry = match crs {
    Crs::Wgs84 => project_geometry(&geometry),
    Crs::Utm33 => geometry,
  };

  let polygons = match geometry {
    geo::Geometry::Polygon(p) => geo::MultiPolygon::new(vec![p]),
    geo::Geometry::MultiPolygon(mp) => mp,
    _ => return Err(eyre!("Region {} is not a polygon", id)),
  };

  Region::new(id, name, polygons)
}

#[cfg(test)]
pub(crate) mod fixtures {
  use super::*;

  /// Axis-aligned square region
  pub fn square(id: RegionId, name: &str, min: (f64, f64), max: (f64, f64)) -> Region {
    let rect = geo::Rect::new(geo::coord! { x: min.0, y: min.1 }, geo::coord! { x: max.0, y: max.1 });
    Region::new(id, name, geo::MultiPolygon::new(vec![rect.to_polygon()])).unwrap()
  }
}

#[cfg(test)]
mod tests {
  use super::fixtures::square;
  use super::*;

  const AREAS: &str = r#"{
    "type": "FeatureCollection",
    "features": [
      {
        "type": "Feature",
        "properties": {"omradeID": 3011, "omradeNavn": "Tromsø"},
        "geometry": {"type": "Polygon", "coordinates": [[[0,0],[100,0],[100,100],[0,100],[0,0]]]}
      },
      {
        "type": "Feature",
        "properties": {"omradeID": "3010", "omradeNavn": "Lyngen"},
        "geometry": {"type": "MultiPolygon", "coordinates": [[[[200,0],[300,0],[300,100],[200,100],[200,0]]]]}
      },
      {
        "type": "Feature",
        "properties": {"omradeNavn": "Nameless"},
        "geometry": {"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,0]]]}
      }
    ]
  }"#;

  #[test]
  fn test_parse_areas() {
    let regions = Regions::from_geojson(AREAS, Crs::Utm33, BTreeMap::new()).unwrap();
    let names: Vec<&str> = regions.sorted_by_name().iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["Lyngen", "Tromsø"]);
    assert_eq!(regions.get(3010).unwrap().bbox.max().x, 300.0);
  }

  #[test]
  fn test_parse_rejects_non_collection() {
    let point = r#"{"type": "Point", "coordinates": [1.0, 2.0]}"#;
    assert!(Regions::from_geojson(point, Crs::Utm33, BTreeMap::new()).is_err());
  }

  #[test]
  fn test_contains_geometry_with_group() {
    let mut groups = BTreeMap::new();
    groups.insert(1, vec![2]);
    let regions = Regions::new(
      vec![
        square(1, "Parent", (0.0, 0.0), (10.0, 10.0)),
        square(2, "Child", (20.0, 0.0), (30.0, 10.0)),
      ],
      groups,
    );

    let inside_parent = geo::Geometry::Point(geo::Point::new(5.0, 5.0));
    let inside_child = geo::Geometry::Point(geo::Point::new(25.0, 5.0));
    let outside = geo::Geometry::Point(geo::Point::new(50.0, 5.0));

    assert!(regions.contains_geometry(1, &inside_parent));
    assert!(regions.contains_geometry(1, &inside_child));
    assert!(!regions.contains_geometry(1, &outside));
    assert!(!regions.contains_geometry(2, &inside_parent));
  }

  #[test]
  fn test_polygon_crossing_border_is_not_within() {
    let regions = Regions::new(vec![square(1, "A", (0.0, 0.0), (10.0, 10.0))], BTreeMap::new());
    let crossing = geo::Geometry::Polygon(
      geo::Rect::new(geo::coord! { x: 8.0, y: 2.0 }, geo::coord! { x: 12.0, y: 4.0 }).to_polygon(),
    );
    assert!(!regions.contains_geometry(1, &crossing));
  }

  #[test]
  fn test_at_point() {
    let regions = Regions::new(vec![square(7, "A", (0.0, 0.0), (10.0, 10.0))], BTreeMap::new());
    assert_eq!(regions.at_point(1.0, 1.0).map(|r| r.id), Some(7));
    assert!(regions.at_point(11.0, 1.0).is_none());
  }
}
