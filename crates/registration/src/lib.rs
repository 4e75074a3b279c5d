//! Longexpo Registration
//!
//! Cancels camera jitter between sampled frames:
//! - **Estimator:** Phase correlation on a downsampled luminance image,
//!   refined to sub-pixel precision, with a confidence gate that falls back
//!   to the identity offset instead of failing
//! - **Aligner:** Bilinear resampling of a frame by `-offset` into the
//!   reference frame's canvas, with a configurable fill policy
//!
//! This crate is pure computation: no I/O, no shared mutable state. Every
//! call reads its inputs and returns new values, so frames can be processed
//! on any number of threads.

pub mod align;
pub mod estimator;
pub mod luminance;
pub mod phase_correlation;

pub use align::{align, FrameAligner};
pub use estimator::{
    IdentityEstimator, LowConfidenceReason, PhaseCorrelationEstimator, PreparedReference,
    Registration, RegistrationEstimator, RegistrationStatus,
};
