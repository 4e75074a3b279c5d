//! Translational offsets between frames.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Tolerance used when deciding whether an offset lands on whole pixels.
const INTEGRAL_EPSILON: f64 = 1e-9;

/// Displacement of a candidate frame relative to the reference frame, in pixels.
///
/// Subtracting the offset from the candidate's pixel coordinates superimposes
/// its content onto the reference: content at `(x, y)` in the reference is
/// found at `(x + dx, y + dy)` in the candidate.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Offset {
    pub dx: f64,
    pub dy: f64,
}

impl Offset {
    /// The identity offset.
    pub const ZERO: Offset = Offset { dx: 0.0, dy: 0.0 };

    pub const fn new(dx: f64, dy: f64) -> Self {
        Self { dx, dy }
    }

    pub fn is_zero(&self) -> bool {
        self.dx == 0.0 && self.dy == 0.0
    }

    /// True if both components are whole pixels.
    pub fn is_integral(&self) -> bool {
        (self.dx - self.dx.round()).abs() < INTEGRAL_EPSILON
            && (self.dy - self.dy.round()).abs() < INTEGRAL_EPSILON
    }

    /// Components rounded to the nearest whole pixel.
    pub fn rounded(&self) -> (i64, i64) {
        (self.dx.round() as i64, self.dy.round() as i64)
    }

    /// Euclidean length in pixels.
    pub fn magnitude(&self) -> f64 {
        self.dx.hypot(self.dy)
    }

    /// Multiply both components by `factor`.
    pub fn scaled(&self, factor: f64) -> Self {
        Self::new(self.dx * factor, self.dy * factor)
    }

    pub fn is_finite(&self) -> bool {
        self.dx.is_finite() && self.dy.is_finite()
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:+.3}, {:+.3})", self.dx, self.dy)
    }
}
