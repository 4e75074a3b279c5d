//! Run reports.
//!
//! A report records how each frame was registered, which lets a user see
//! why a composite looks blurred without re-running the pipeline.

use std::path::Path;

use chrono::{DateTime, Utc};
use longexpo_common::LongExposureResult;
use longexpo_frame_model::{BlendMode, FillPolicy, Offset, Size};
use longexpo_registration::{Registration, RegistrationStatus};
use serde::{Deserialize, Serialize};

/// Registration outcome for one sampled frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameRegistration {
    /// Position in the sampled sequence; 0 is the reference.
    pub index: usize,
    /// Source timestamp the frame was sampled at.
    pub timestamp_secs: f64,
    pub offset: Offset,
    pub confidence: f64,
    pub status: RegistrationStatus,
}

impl FrameRegistration {
    pub fn new(index: usize, timestamp_secs: f64, registration: &Registration) -> Self {
        Self {
            index,
            timestamp_secs,
            offset: registration.offset,
            confidence: registration.confidence,
            status: registration.status,
        }
    }

    pub fn is_low_confidence(&self) -> bool {
        matches!(self.status, RegistrationStatus::LowConfidence(_))
    }
}

/// Wall-clock time spent per stage, in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTimings {
    pub extract_ms: u64,
    pub align_ms: u64,
    pub composite_ms: u64,
}

impl StageTimings {
    pub fn total_ms(&self) -> u64 {
        self.extract_ms + self.align_ms + self.composite_ms
    }
}

/// Summary of a finished long-exposure run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub source: String,
    pub blend_mode: BlendMode,
    pub fill_policy: FillPolicy,
    pub estimator: String,
    pub frame_count: usize,
    pub size: Size,
    pub frames: Vec<FrameRegistration>,
    pub low_confidence_frames: usize,
    pub timings: StageTimings,
    pub generated_at: DateTime<Utc>,
}

impl RunReport {
    /// Largest registered shift, in pixels.
    pub fn max_shift(&self) -> f64 {
        self.frames
            .iter()
            .map(|f| f.offset.magnitude())
            .fold(0.0, f64::max)
    }

    /// Write the report as pretty JSON.
    pub fn save(&self, path: &Path) -> LongExposureResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        tracing::debug!(path = %path.display(), "Wrote run report");
        Ok(())
    }
}
