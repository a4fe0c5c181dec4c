pub mod footer;
pub mod header;
pub mod utils;

pub use footer::draw_footer;
pub use header::draw_header;
pub use utils::{band_color, truncate, BORDER_COLOR, BORDER_SELECTED_COLOR};
