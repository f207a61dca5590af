//! Gradient tables and the RAS+B adapter.

pub mod rasb;
pub mod table;

pub use rasb::*;
pub use table::*;
