//! Longexpo Pipeline
//!
//! Turns a frame source into one long-exposure image:
//! - **Sources:** Image sequences on disk, in-memory frames, and procedural
//!   test scenes with camera jitter
//! - **State machine:** `Extracting -> Aligning -> Compositing -> Done`, with
//!   `Error` and `Cancelled` terminal states
//! - **Coordinator:** Samples frames, registers and aligns them in parallel,
//!   composites them, and records a per-run report
//!
//! Progress is delivered on an unspecified thread. Callers that drive a UI
//! must hand the value over to their own thread before touching it.

pub mod pipeline;
pub mod report;
pub mod source;
pub mod state;
pub mod synthetic;

pub use pipeline::{run_long_exposure, LongExposure, LongExposurePipeline, SampledFrame};
pub use report::{FrameRegistration, RunReport, StageTimings};
pub use source::{
    frame_from_image, frame_to_image, FrameSource, ImageSequenceSource, MemorySource,
};
pub use state::{PipelineProgress, PipelineProgressFn, PipelineState};
pub use synthetic::{SceneKind, SyntheticSource};
