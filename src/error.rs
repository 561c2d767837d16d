// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Error types shared across the crate.

use std::time::Duration;

use thiserror::Error;

use crate::timing::tempo::{MAX_BPM, MIN_BPM};

/// Rejected metronome parameters.
///
/// These are caller bugs, returned synchronously from the boundary API.
/// The scheduler itself only ever sees validated values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TempoError {
    #[error("tempo {0} BPM is outside {}-{} BPM", MIN_BPM, MAX_BPM)]
    OutOfRange(f64),
    #[error("tempo is not a finite number")]
    NotFinite,
    #[error("invalid time signature {beats}/{unit}")]
    InvalidTimeSignature { beats: u32, unit: u32 },
}

/// Error categories surfaced to the UI through `on_error`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    DeviceAccessDenied,
    NoActiveTracks,
    EncoderUnavailable,
    FinalizeTimeout,
    PersistFailure,
    PipelineFailure,
}

/// Capture pipeline and persistence failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CaptureError {
    #[error("capture device access denied: {0}")]
    DeviceAccessDenied(String),
    #[error("capture stream has no active tracks")]
    NoActiveTracks,
    #[error("no supported encoder (tried: {})", .tried.join(", "))]
    EncoderUnavailable { tried: Vec<String> },
    #[error("capture pipeline did not finalize within {0:?}")]
    FinalizeTimeout(Duration),
    #[error("library rejected the take: {0}")]
    PersistFailure(String),
    #[error("capture pipeline failed: {0}")]
    PipelineFailure(String),
}

impl CaptureError {
    /// Category used for UI reporting
    pub fn kind(&self) -> ErrorKind {
        match self {
            CaptureError::DeviceAccessDenied(_) => ErrorKind::DeviceAccessDenied,
            CaptureError::NoActiveTracks => ErrorKind::NoActiveTracks,
            CaptureError::EncoderUnavailable { .. } => ErrorKind::EncoderUnavailable,
            CaptureError::FinalizeTimeout(_) => ErrorKind::FinalizeTimeout,
            CaptureError::PersistFailure(_) => ErrorKind::PersistFailure,
            CaptureError::PipelineFailure(_) => ErrorKind::PipelineFailure,
        }
    }
}
