//! Longexpo Common Utilities
//!
//! Shared infrastructure for all Longexpo crates:
//! - Error types and result aliases
//! - Frame sampling plans derived from interval and frame budget
//! - Tracing/logging initialization
//! - Configuration loading

pub mod config;
pub mod error;
pub mod logging;
pub mod sampling;

pub use config::*;
pub use error::*;
pub use sampling::*;
