pub mod log_format;
pub mod safe_lower;

pub use log_format::{compress_name_list, preview_compact};
pub use safe_lower::{lowercase_cow, safe_lowercase};
