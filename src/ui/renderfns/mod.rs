pub mod footer;
pub mod header;
pub mod utils;

pub use footer::draw_footer;
pub use header::{draw_header, extract_domain};
pub use utils::{
  avatar_marker, error_message, format_age, format_created_at, format_elapsed, truncate,
};
