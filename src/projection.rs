//! WGS84 longitude/latitude to UTM zone 33N eastings/northings.
//!
//! Region polygons may be delivered in lon/lat while the map works in
//! EPSG:25833 metres. ETRS89 and WGS84 differ by well under a metre here.

use geo::MapCoords;
use utm::to_utm_wgs84;

const ZONE: u8 = 33;

/// Project a longitude/latitude pair (degrees) to UTM33 eastings/northings.
pub fn lonlat_to_utm33(lon: f64, lat: f64) -> (f64, f64) {
  let (northing, easting, _convergence) = to_utm_wgs84(lat, lon, ZONE);
  (easting, northing)
}

/// Project every coordinate of a lon/lat geometry to UTM33
pub fn project_geometry(geometry: &geo::Geometry<f64>) -> geo::Geometry<f64> {
  geometry.map_coords(|c| {
    let (x, y) = lonlat_to_utm33(c.x, c.y);
    geo::coord! { x: x, y: y }
  })
}
