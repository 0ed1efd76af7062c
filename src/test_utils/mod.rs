//! Shared utils and components between unit tests.
mod common;
mod recording;

pub use common::*;
pub use recording::*;
