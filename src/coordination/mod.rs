mod client;
mod event;
mod memory;

pub use client::*;
pub use event::*;
pub use memory::*;
