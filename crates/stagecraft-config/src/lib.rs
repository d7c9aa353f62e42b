#![allow(clippy::must_use_candidate)]

pub mod cors;
pub mod edit;
mod env;
pub mod health;
mod loader;
pub mod rate_limit;
pub mod server;

use serde::Deserialize;

pub use cors::*;
pub use edit::*;
pub use health::*;
pub use rate_limit::*;
pub use server::*;

/// Top-level stagecraft configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Image editing provider configuration
    #[serde(default)]
    pub edit: EditConfig,
}
