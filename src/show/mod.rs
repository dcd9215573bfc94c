pub mod loader;
pub mod meta;
pub mod script;
