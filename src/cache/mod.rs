pub mod offline;
pub mod range;
pub mod worker;

pub const CACHE_PREFIX: &str = "swm-site";
pub const SHOW_CACHE: &str = "swm-site:show:v1";
pub const PAGES_CACHE: &str = "swm-site:pages:v1";
