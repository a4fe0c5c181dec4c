mod date_input;
mod key_result;
mod region_picker;

pub use date_input::{DateInput, InputResult};
pub use key_result::KeyResult;
pub use region_picker::{RegionPicker, RegionPickerEvent};
