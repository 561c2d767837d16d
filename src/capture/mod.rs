// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Take capture.
//!
//! This module provides:
//! - Media-capture interfaces (devices, streams, encoder pipelines)
//! - Per-take capture sessions
//! - The capture state machine driven by pedal actions

pub mod machine;
pub mod media;
pub mod session;

pub use machine::{CaptureHandle, CaptureMachine, CaptureNotice, CaptureSnapshot, MachineConfig, MachineInput};
pub use media::{
    open_pipeline, CapturePipeline, MediaDevices, MediaStream, PipelineEvent, PipelineEvents,
    AUDIO_MIME_PREFERENCES, VIDEO_MIME_PREFERENCES,
};
pub use session::{CaptureMode, CaptureSession, CaptureState, SessionId, TakeBlob};
