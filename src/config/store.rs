use serde::Deserialize;

use crate::DEFAULT_ROOT;

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Root node under which all entries of this store live.
    /// Instances sharing a root share state and observe each other's changes.
    #[serde(default = "default_root")]
    pub root: String,

    /// When true, a data-changed event whose value equals the last-known
    /// value still fires `on_update`. Default suppresses such events, which
    /// also dedups the redundant self-watch fire after a local write.
    #[serde(default)]
    pub notify_unchanged_updates: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            notify_unchanged_updates: false,
        }
    }
}

fn default_root() -> String {
    DEFAULT_ROOT.to_string()
}
