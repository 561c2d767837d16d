// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Timing primitives.
//!
//! This module provides the clock sources the metronome schedules against
//! and the validated tempo and meter types.

pub mod clock;
pub mod tempo;

pub use clock::{ClockSource, FrameClock, ManualClock, SharedClock, SystemClock};
pub use tempo::{TapTempo, Tempo, TimeSignature, MAX_BPM, MIN_BPM};
