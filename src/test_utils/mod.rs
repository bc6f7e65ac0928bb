mod common;
mod memory_store;
pub use common::*;
pub use memory_store::*;
