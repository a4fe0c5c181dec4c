use chrono::NaiveDate;
use color_eyre::{eyre::eyre, Result};
use geojson::GeoJson;
use std::time::Duration;
use url::Url;

use crate::api::types::PointsPayload;
use crate::chunked::yielding_filter_map;
use crate::config::Config;
use crate::date::format_date;
use crate::feature::Feature;
use crate::region::RegionId;

/// Filter part of an events query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventQuery {
  pub start: NaiveDate,
  pub end: NaiveDate,
  pub region: Option<RegionId>,
}

/// Event resources served by the API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
  Polygons,
  Points,
}

impl Resource {
  fn path(&self) -> &'static str {
    match self {
      Resource::Polygons => "polygons",
      Resource::Points => "points",
    }
  }
}

/// skredview HTTP API client
#[derive(Clone)]
pub struct ApiClient {
  http: reqwest::Client,
  base: Url,
  chunk_size: usize,
}

impl ApiClient {
  pub fn new(config: &Config) -> Result<Self> {
    let base = Url::parse(&config.api_url)
      .map_err(|e| eyre!("Invalid api_url {}: {}", config.api_url, e))?;

    let http = reqwest::Client::builder()
      .user_agent(concat!("skredview/", env!("CARGO_PKG_VERSION")))
      .timeout(Duration::from_secs(60))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      http,
      base,
      chunk_size: config.chunk_size,
    })
  }

  /// Build an events URL.
  ///
  /// With a bounding box `[minx, miny, maxx, maxy]` the query is limited to
  /// the view (`/api/events/{resource}/within/{bbox}/`), otherwise it covers
  /// the whole filter (`/api/events/{resource}/`).
  pub fn events_url(
    &self,
    resource: Resource,
    query: &EventQuery,
    bbox: Option<[f64; 4]>,
  ) -> Result<Url> {
    let path = match bbox {
      Some([minx, miny, maxx, maxy]) => format!(
        "/api/events/{}/within/{:.0}/{:.0}/{:.0}/{:.0}/",
        resource.path(),
        minx,
        miny,
        maxx,
        maxy
      ),
      None => format!("/api/events/{}/", resource.path()),
    };

    let mut url = self
      .base
      .join(&path)
      .map_err(|e| eyre!("Failed to build URL {}: {}", path, e))?;

    {
      let mut pairs = url.query_pairs_mut();
      pairs
        .append_pair("start", &format_date(query.start))
        .append_pair("end", &format_date(query.end));
      if let Some(region) = query.region {
        pairs.append_pair("region", &region.to_string());
      }
    }

    Ok(url)
  }

  /// GET a URL and return the body. Any status outside 2xx/3xx is an error.
  pub async fn get_text(&self, url: Url) -> Result<String> {
    let response = self
      .http
      .get(url.clone())
      .send()
      .await
      .map_err(|e| eyre!("Request to {} failed: {}", url, e))?;

    let status = response.status();
    if !(status.is_success() || status.is_redirection()) {
      return Err(eyre!("Request to {} returned {}", url, status));
    }

    response
      .text()
      .await
      .map_err(|e| eyre!("Failed to read response from {}: {}", url, e))
  }

  /// GET a GeoJSON feature collection of events
  pub async fn get_features(&self, url: Url) -> Result<Vec<Feature>> {
    let text = self.get_text(url).await?;
    decode_features(&text, self.chunk_size).await
  }

  /// GET the aggregated points payload
  pub async fn get_points(&self, url: Url) -> Result<PointsPayload> {
    let text = self.get_text(url.clone()).await?;
    serde_json::from_str(&text).map_err(|e| eyre!("Failed to parse points from {}: {}", url, e))
  }

  /// Load a static resource from an http(s) URL or a local file
  pub async fn load_source(&self, source: &str) -> Result<String> {
    match Url::parse(source) {
      Ok(url) if matches!(url.scheme(), "http" | "https") => self.get_text(url).await,
      _ => tokio::fs::read_to_string(source)
        .await
        .map_err(|e| eyre!("Failed to read {}: {}", source, e)),
    }
  }
}

/// Decode an events feature collection, skipping malformed features.
pub async fn decode_features(text: &str, chunk_size: usize) -> Result<Vec<Feature>> {
  let geojson: GeoJson = text
    .parse()
    .map_err(|e| eyre!("Failed to parse events GeoJSON: {}", e))?;

  let features = match geojson {
    GeoJson::FeatureCollection(fc) => fc.features,
    GeoJson::Feature(f) => vec![f],
    GeoJson::Geometry(_) => return Err(eyre!("Events GeoJSON is a bare geometry")),
  };

  let total = features.len();
  let decoded = yielding_filter_map(features, chunk_size, |feature| {
    Feature::from_geojson(feature)
      .map_err(|e| tracing::trace!(error = %e, "skipping feature"))
      .ok()
  })
  .await;

  if decoded.len() < total {
    tracing::debug!(total, decoded = decoded.len(), "dropped malformed features");
  }
  Ok(decoded)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn client() -> ApiClient {
    let config = Config {
      api_url: "http://localhost:5000".to_string(),
      ..Config::default()
    };
    ApiClient::new(&config).unwrap()
  }

  fn query(region: Option<RegionId>) -> EventQuery {
    EventQuery {
      start: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
      end: NaiveDate::from_ymd_opt(2023, 1, 3).unwrap(),
      region,
    }
  }

  #[test]
  fn test_viewport_url() {
    let url = client()
      .events_url(
        Resource::Polygons,
        &query(None),
        Some([-1000.4, 6_450_000.0, 1_130_000.0, 8_000_000.6]),
      )
      .unwrap();
    assert_eq!(
      url.as_str(),
      "http://localhost:5000/api/events/polygons/within/-1000/6450000/1130000/8000001/?start=2023-01-01&end=2023-01-03"
    );
  }

  #[test]
  fn test_full_url_with_region() {
    let url = client()
      .events_url(Resource::Points, &query(Some(3011)), None)
      .unwrap();
    assert_eq!(
      url.as_str(),
      "http://localhost:5000/api/events/points/?start=2023-01-01&end=2023-01-03&region=3011"
    );
  }

  #[tokio::test]
  async fn test_decode_skips_bad_features() {
    let text = r#"{
      "type": "FeatureCollection",
      "features": [
        {"type": "Feature", "geometry": {"type": "Point", "coordinates": [1, 2]},
         "properties": {"skredID": 1, "skredTidspunkt": "2023-01-01 10:00:00"}},
        {"type": "Feature", "geometry": {"type": "Point", "coordinates": [1, 2]},
         "properties": {"skredTidspunkt": "2023-01-01 10:00:00"}},
        {"type": "Feature", "geometry": {"type": "Point", "coordinates": [3, 4]},
         "properties": {"skredID": 2, "skredTidspunkt": "2023-01-02 10:00:00"}}
      ]
    }"#;

    let features = decode_features(text, 1).await.unwrap();
    let ids: Vec<&str> = features.iter().map(|f| f.id.as_str()).collect();
    assert_eq!(ids, vec!["1", "2"]);
  }

  #[tokio::test]
  async fn test_decode_rejects_garbage() {
    assert!(decode_features("<html>", 10).await.is_err());
  }

  #[tokio::test]
  async fn test_load_source_from_file() {
    let file = tempfile::NamedTempFile::new().unwrap();
    std::fs::write(file.path(), "{}").unwrap();
    let text = client()
      .load_source(file.path().to_str().unwrap())
      .await
      .unwrap();
    assert_eq!(text, "{}");
  }
}
