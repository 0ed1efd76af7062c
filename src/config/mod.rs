//! Configuration for the metadata store.
//!
//! Provides layered configuration loading with priority:
//! 1. Default values (hardcoded)
//! 2. Optional config file
//! 3. Environment variables (highest priority)

mod retry;
mod store;
pub use retry::*;
pub use store::*;


//---
use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;

use crate::Result;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    /// Store root path and notification behavior
    #[serde(default)]
    pub store: StoreConfig,
    /// Retry policies for remote operations
    #[serde(default)]
    pub retry: RetryPolicies,
}

impl Settings {
    /// Loads configuration from an optional file plus an `MSTORE`-prefixed
    /// environment overlay (e.g. `MSTORE_STORE__ROOT=/my-root`).
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut config = Config::builder();

        if let Some(path) = config_path {
            config = config.add_source(File::with_name(path).required(true));
        }

        config = config.add_source(
            Environment::with_prefix("MSTORE")
                // keep the prefix joined with a single underscore; without
                // this the nesting separator below also applies to the
                // prefix and MSTORE_STORE__ROOT would never match
                .prefix_separator("_")
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true),
        );

        Ok(config.build()?.try_deserialize()?)
    }
}
