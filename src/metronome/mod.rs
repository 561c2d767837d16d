// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Metronome engine.
//!
//! This module provides:
//! - A look-ahead beat scheduler running on its own thread
//! - A click synthesizer rendering scheduled beats sample-accurately

pub mod click;
pub mod scheduler;

pub use click::{ClickSynth, ACCENT_FREQUENCY, BEAT_FREQUENCY, CLICK_DURATION};
pub use scheduler::{BeatCallback, BeatScheduler, ClickSink, SchedulerConfig, SchedulerEngine};

use crate::timing::{Tempo, TimeSignature};

/// One metronome beat, produced by the scheduler ahead of time.
///
/// `scheduled_time` is in the scheduler clock's time domain (seconds).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeatEvent {
    /// Position within the measure, 0-based
    pub beat_index: u32,
    /// When the click must sound
    pub scheduled_time: f64,
    /// Downbeat accent
    pub is_accent: bool,
}

/// Everything the scheduler needs to produce beats
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetronomeSettings {
    pub tempo: Tempo,
    pub time_signature: TimeSignature,
    pub accent_first_beat: bool,
}

impl MetronomeSettings {
    /// Create settings from validated parts
    pub fn new(tempo: Tempo, time_signature: TimeSignature, accent_first_beat: bool) -> Self {
        Self {
            tempo,
            time_signature,
            accent_first_beat,
        }
    }
}

impl Default for MetronomeSettings {
    fn default() -> Self {
        Self {
            tempo: Tempo::default(),
            time_signature: TimeSignature::default(),
            accent_first_beat: true,
        }
    }
}
