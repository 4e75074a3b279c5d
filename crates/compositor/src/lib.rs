//! Longexpo Compositor
//!
//! Folds a sequence of aligned frames into one image:
//! - **Accumulator:** Per-pixel, per-channel running state whose shape
//!   depends on the blend mode (`u64` sums or `u8` extrema)
//! - **Compositor:** Validates the sequence, folds frames sequentially or in
//!   parallel partitions, merges partials, and finalizes the result
//!
//! All four blend modes are associative and commutative, so partial
//! accumulators built on different threads merge into the same result as a
//! single in-order fold.

pub mod accumulator;
pub mod compositor;

pub use accumulator::Accumulator;
pub use compositor::{composite, CompositeResult, Compositor};
