//! Frame sampling plans.
//!
//! A source clip is sampled at a fixed cadence: one frame every
//! `frame_interval_secs`, capped at `max_frames`. When the cap applies the
//! samples are spread evenly over the whole clip instead of being bunched
//! at its start.

use longexpo_frame_model::SamplingConfig;

/// The timestamps at which frames are pulled from a source.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingPlan {
    duration_secs: f64,
    timestamps: Vec<f64>,
}

impl SamplingPlan {
    /// Build a plan for a clip of `duration_secs`.
    ///
    /// `count = min(floor(duration / interval), max_frames)`, raised to one
    /// for any clip with a positive duration so that a clip shorter than the
    /// interval still yields its first frame. Samples sit at
    /// `i * duration / count`.
    pub fn new(duration_secs: f64, frame_interval_secs: f64, max_frames: usize) -> Self {
        if !(duration_secs.is_finite() && duration_secs > 0.0)
            || !(frame_interval_secs.is_finite() && frame_interval_secs > 0.0)
            || max_frames == 0
        {
            return Self {
                duration_secs: duration_secs.max(0.0),
                timestamps: Vec::new(),
            };
        }

        // Guard against 0.3 / 0.1 == 2.9999999999999996.
        let by_interval = (duration_secs / frame_interval_secs + 1e-9).floor() as usize;
        let count = by_interval.min(max_frames).max(1);
        let step = duration_secs / count as f64;
        let timestamps = (0..count).map(|i| i as f64 * step).collect();

        Self {
            duration_secs,
            timestamps,
        }
    }

    /// Build a plan from the engine's sampling config.
    pub fn from_config(duration_secs: f64, config: &SamplingConfig) -> Self {
        Self::new(duration_secs, config.frame_interval_secs, config.max_frames)
    }

    /// Sample timestamps in seconds, ascending.
    pub fn timestamps(&self) -> &[f64] {
        &self.timestamps
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Duration of the clip the plan was built for.
    pub fn duration_secs(&self) -> f64 {
        self.duration_secs
    }

    /// Spacing between consecutive samples, if there are at least two.
    pub fn step_secs(&self) -> Option<f64> {
        match self.timestamps.as_slice() {
            [a, b, ..] => Some(b - a),
            _ => None,
        }
    }
}
