//! Longexpo Frame Model
//!
//! Defines the data contracts shared by every stage of the engine:
//! - **Frames:** Immutable 4-channel 8-bit bitmaps and their sizes
//! - **Offsets:** Translations produced by registration, applied by alignment
//! - **Blend modes / fill policies:** Per-pixel compositing and padding rules
//! - **Engine config:** Sampling, registration, and compositing options
//! - **Progress / cancellation:** Primitives owned by a single pipeline call
//!
//! This crate has no I/O and no knowledge of where frames come from.

pub mod blend;
pub mod cancel;
pub mod config;
pub mod frame;
pub mod offset;
pub mod progress;

pub use blend::*;
pub use cancel::*;
pub use config::*;
pub use frame::*;
pub use offset::*;
pub use progress::*;
