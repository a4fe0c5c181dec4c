use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const DEFAULT_API_URL: &str = "https://skredview.app";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Base URL of the skredview API
  pub api_url: String,
  /// URL or file path of the region polygons (default: {api_url}/static/geojson/areas.json)
  pub areas: Option<String>,
  /// Coordinate system of the region polygons
  pub areas_crs: Crs,
  /// Tile template for the background map, with {z}/{x}/{y} placeholders
  pub basemap_url: Option<String>,
  /// Zoom level at which the event layer replaces the cluster layer
  pub cluster_zoom: u8,
  /// Features decoded per batch before yielding back to the runtime
  pub chunk_size: usize,
  /// UI tick in milliseconds
  pub tick_rate_ms: u64,
  /// Region ID -> associated region IDs that count as part of it
  pub region_groups: BTreeMap<u32, Vec<u32>>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
pub enum Crs {
  /// WGS84 longitude/latitude, projected on load
  #[default]
  #[serde(rename = "EPSG:4326")]
  Wgs84,
  /// ETRS89 / UTM zone 33N, used as is
  #[serde(rename = "EPSG:25833")]
  Utm33,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      api_url: DEFAULT_API_URL.to_string(),
      areas: None,
      areas_crs: Crs::default(),
      basemap_url: None,
      cluster_zoom: 11,
      chunk_size: 500,
      tick_rate_ms: 250,
      region_groups: BTreeMap::new(),
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./skredview.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/skredview/config.yaml
  ///
  /// Without a file the defaults are used. `SKREDVIEW_API_URL` overrides
  /// the API URL in every case.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => {
        tracing::info!("no config file found, using defaults");
        Config::default()
      }
    };

    if let Ok(url) = std::env::var("SKREDVIEW_API_URL") {
      config.api_url = url;
    }

    config.validate()?;
    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("skredview.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("skredview").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    tracing::info!(path = %path.display(), "loaded config");
    Ok(config)
  }

  fn validate(&self) -> Result<()> {
    url::Url::parse(&self.api_url).map_err(|e| eyre!("Invalid api_url {}: {}", self.api_url, e))?;
    if self.chunk_size == 0 {
      return Err(eyre!("chunk_size must be at least 1"));
    }
    Ok(())
  }

  /// Where the region polygons come from
  pub fn areas_source(&self) -> String {
    self.areas.clone().unwrap_or_else(|| {
      format!(
        "{}/static/geojson/areas.json",
        self.api_url.trim_end_matches('/')
      )
    })
  }
}
