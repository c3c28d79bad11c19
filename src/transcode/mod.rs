//! Transcoding module
//!
//! This module handles single-file conversion:
//! - Fixed MP3 output profile
//! - Codec engine trait and the ffmpeg process implementation
//! - Lifecycle/progress events
//! - Job wrapper with timeout and failure capture

pub mod engine;
pub mod job;
pub mod profile;
pub mod progress;

pub use engine::{CodecEngine, FfmpegEngine};
pub use job::{TranscodeFailure, TranscodeJob, TranscodeOutcome, TranscodeSuccess};
pub use profile::TranscodeProfile;
pub use progress::{spawn_progress_logger, JobEvent, ProgressReporter, TranscodeEvent};
