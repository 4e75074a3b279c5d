//! Engine configuration.
//!
//! One `EngineConfig` drives a full long-exposure run: how frames are
//! sampled, how they are registered, and how they are blended.

use serde::{Deserialize, Serialize};

use crate::blend::{BlendMode, FillPolicy};

/// Complete configuration for a long-exposure run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Per-pixel blend rule.
    pub blend_mode: BlendMode,

    /// Fill rule for pixels exposed by alignment.
    pub fill_policy: FillPolicy,

    /// Frame sampling cadence.
    pub sampling: SamplingConfig,

    /// Registration tuning.
    pub registration: RegistrationConfig,

    /// Compositing strategy.
    pub compositor: CompositorConfig,

    /// Worker threads for alignment and compositing (`None` = all cores).
    pub worker_threads: Option<usize>,
}

/// How many frames are taken from the source, and how far apart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Seconds between sampled frames.
    pub frame_interval_secs: f64,

    /// Upper bound on the number of sampled frames.
    pub max_frames: usize,
}

/// Registration estimator tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationConfig {
    /// When false every frame is composited unaligned.
    pub enabled: bool,

    /// Longest side of the luminance image used for correlation.
    pub max_analysis_dim: u32,

    /// Minimum correlation peak height, in `[0, 1]`.
    pub min_peak_value: f64,

    /// Minimum peak-to-sidelobe confidence, in `[0, 1]`.
    pub min_confidence: f64,

    /// Largest accepted shift as a fraction of the frame size, in `(0, 1]`.
    pub max_shift_fraction: f64,

    /// Refine the correlation peak to sub-pixel precision.
    pub subpixel: bool,
}

/// Compositor tuning.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositorConfig {
    pub strategy: CompositeStrategy,
}

/// How the accumulator is fed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum CompositeStrategy {
    /// One owner folds frames in order; each fold is split across rows.
    #[default]
    Sequential,
    /// Contiguous frame chunks fold into partial accumulators in parallel,
    /// which are merged at the end.
    Partitioned { partitions: usize },
}

/// Invalid configuration value.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Invalid value for {field}: {reason}")]
pub struct ConfigError {
    pub field: &'static str,
    pub reason: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            blend_mode: BlendMode::default(),
            fill_policy: FillPolicy::default(),
            sampling: SamplingConfig::default(),
            registration: RegistrationConfig::default(),
            compositor: CompositorConfig::default(),
            worker_threads: None,
        }
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            frame_interval_secs: 0.1,
            max_frames: 50,
        }
    }
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_analysis_dim: 512,
            min_peak_value: 0.05,
            min_confidence: 0.2,
            max_shift_fraction: 0.25,
            subpixel: true,
        }
    }
}

impl EngineConfig {
    /// Check every field for values the engine cannot honor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let sampling = &self.sampling;
        if !(sampling.frame_interval_secs.is_finite() && sampling.frame_interval_secs > 0.0) {
            return Err(invalid(
                "sampling.frame_interval_secs",
                format!("must be positive, got {}", sampling.frame_interval_secs),
            ));
        }
        if sampling.max_frames == 0 {
            return Err(invalid("sampling.max_frames", "must be at least 1"));
        }

        let reg = &self.registration;
        if reg.max_analysis_dim < 8 {
            return Err(invalid(
                "registration.max_analysis_dim",
                format!("must be at least 8, got {}", reg.max_analysis_dim),
            ));
        }
        for (field, value) in [
            ("registration.min_peak_value", reg.min_peak_value),
            ("registration.min_confidence", reg.min_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(field, format!("must be within [0, 1], got {value}")));
            }
        }
        if !(reg.max_shift_fraction > 0.0 && reg.max_shift_fraction <= 1.0) {
            return Err(invalid(
                "registration.max_shift_fraction",
                format!("must be within (0, 1], got {}", reg.max_shift_fraction),
            ));
        }

        if let CompositeStrategy::Partitioned { partitions: 0 } = self.compositor.strategy {
            return Err(invalid("compositor.strategy.partitions", "must be at least 1"));
        }
        if self.worker_threads == Some(0) {
            return Err(invalid("worker_threads", "must be at least 1 when set"));
        }

        Ok(())
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError {
        field,
        reason: reason.into(),
    }
}
