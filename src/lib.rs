// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Pedaltake: a look-ahead metronome and a two-pedal take recorder.
//!
//! The metronome schedules clicks slightly ahead of the audio clock so they
//! land sample-accurately. The capture state machine turns left/right pedal
//! presses into recorded, discarded or saved takes.

pub mod audio;
pub mod capture;
pub mod config;
pub mod control;
pub mod error;
pub mod library;
pub mod metronome;
pub mod studio;
pub mod timing;
pub mod ui;

pub use audio::{MixGraph, MixHandle, MixRoute};
pub use capture::{CaptureHandle, CaptureMachine, CaptureMode, CaptureNotice, CaptureState, MachineConfig};
pub use config::AppConfig;
pub use control::{InputDispatcher, LogicalAction, PedalBinding};
pub use error::{CaptureError, ErrorKind, TempoError};
pub use library::{DirectoryLibrary, FinishedTake, MemoryLibrary, SessionLibrary, TakeId, TargetRef};
pub use metronome::{BeatEvent, MetronomeSettings, SchedulerConfig, SchedulerEngine};
pub use studio::{Studio, StudioConfig, StudioEvent};
pub use timing::{ClockSource, ManualClock, SharedClock, SystemClock, Tempo, TimeSignature};
