mod listener;
mod metadata_store;
mod path;
mod watcher;

pub use listener::*;
pub use metadata_store::*;
pub(crate) use path::*;
pub(crate) use watcher::*;
