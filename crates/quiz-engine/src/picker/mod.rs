//! Question selection.
//!
//! - [`circular`]: per-difficulty shuffled queue, no repeats within a cycle
//! - [`fallback`]: uniform random pick with nearest-difficulty search

pub mod circular;
pub mod fallback;

pub use circular::{cycle_seed, pick_circular, shuffle_with_seed};
pub use fallback::{nearest_bucket, pick_random};
