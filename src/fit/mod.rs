//! Fit orchestration.
//!
//! Responsibilities:
//!
//! - split the fitted voxels into contiguous chunks
//! - fit / predict each chunk independently (parallel)
//! - reassemble per-voxel results in chunk order

pub mod chunks;
pub mod engine;

pub use chunks::*;
pub use engine::*;
