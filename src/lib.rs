mod config;
mod constants;
mod coordination;
mod errors;
mod store;
pub mod utils;

pub use config::*;
pub use constants::*;
pub use coordination::*;
pub use errors::*;
pub use store::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;
