pub mod constants;
pub mod string_utils;
pub mod url_utils;

pub use constants::*;
pub use string_utils::{normalize_whitespace, truncate_chars, truncate_plain_text};
pub use url_utils::{from_proxy_url, host_of, is_valid_url, resolve_normalized, to_proxy_url};
