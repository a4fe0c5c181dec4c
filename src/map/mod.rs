//! Map model: view, vector sources and the optional tiled basemap.

pub mod basemap;
pub mod source;
pub mod tiles;
pub mod view;

pub use basemap::Basemap;
pub use source::{cluster, Cluster, VectorSource};
pub use tiles::{tiles_for_extent, TileCoord};
pub use view::{ActiveLayer, MapView};
