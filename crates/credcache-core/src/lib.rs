//! credcache core - paths and configuration shared by the credcache tools

pub mod config;
pub mod paths;

pub use config::Config;
pub use paths::Paths;
