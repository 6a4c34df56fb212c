// FOVEA Pipeline Modules
// Copyright (c) 2026 The FOVEA Project

pub mod combiner;
pub mod encoder;
pub mod frame_source;
pub mod gaze;
pub mod gaze_log;
pub mod manifest;
pub mod mask;
pub mod orchestrator;
pub mod segment_buffer;

/// A decoded video frame: 8-bit RGB, owned by whichever stage is processing it.
pub type Frame = image::RgbImage;
