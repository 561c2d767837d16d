// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Tempo and time signature values.
//!
//! Both types validate on construction, so anything holding a [`Tempo`]
//! or [`TimeSignature`] can rely on the invariants without re-checking.

use std::fmt;
use std::time::{Duration, Instant};

use crate::error::TempoError;

/// Slowest supported tempo
pub const MIN_BPM: f64 = 40.0;
/// Fastest supported tempo
pub const MAX_BPM: f64 = 220.0;

/// Tempo in beats per minute, always within [`MIN_BPM`]..=[`MAX_BPM`]
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Tempo {
    bpm: f64,
}

impl Tempo {
    /// Validate a tempo
    pub fn new(bpm: f64) -> Result<Self, TempoError> {
        if !bpm.is_finite() {
            return Err(TempoError::NotFinite);
        }
        if !(MIN_BPM..=MAX_BPM).contains(&bpm) {
            return Err(TempoError::OutOfRange(bpm));
        }
        Ok(Self { bpm })
    }

    /// Clamp an arbitrary value into range (NaN becomes the default tempo)
    pub fn clamped(bpm: f64) -> Self {
        if bpm.is_nan() {
            return Self::default();
        }
        Self {
            bpm: bpm.clamp(MIN_BPM, MAX_BPM),
        }
    }

    /// Beats per minute
    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// Seconds between beats
    pub fn beat_interval(&self) -> f64 {
        60.0 / self.bpm
    }

    /// Return a tempo nudged by `delta` BPM, clamped into range
    pub fn nudged(&self, delta: f64) -> Self {
        Self::clamped(self.bpm + delta)
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Self { bpm: 120.0 }
    }
}

impl fmt::Display for Tempo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1} BPM", self.bpm)
    }
}

/// Musical meter, e.g. 3/4 or 6/8
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeSignature {
    beats_per_measure: u32,
    beat_unit: u32,
}

impl TimeSignature {
    /// Validate a time signature.
    ///
    /// `beats_per_measure` must be at least 1 and `beat_unit` a power of two
    /// no larger than 32.
    pub fn new(beats_per_measure: u32, beat_unit: u32) -> Result<Self, TempoError> {
        let unit_ok = beat_unit.is_power_of_two() && beat_unit <= 32;
        if beats_per_measure == 0 || !unit_ok {
            return Err(TempoError::InvalidTimeSignature {
                beats: beats_per_measure,
                unit: beat_unit,
            });
        }
        Ok(Self {
            beats_per_measure,
            beat_unit,
        })
    }

    /// Beats in one measure (time signature numerator)
    pub fn beats_per_measure(&self) -> u32 {
        self.beats_per_measure
    }

    /// Note value of one beat (time signature denominator)
    pub fn beat_unit(&self) -> u32 {
        self.beat_unit
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self {
            beats_per_measure: 4,
            beat_unit: 4,
        }
    }
}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.beats_per_measure, self.beat_unit)
    }
}

/// Tap tempo calculator
#[derive(Debug, Clone)]
pub struct TapTempo {
    /// Recent tap times
    taps: Vec<Instant>,
    /// Maximum number of taps to average
    max_taps: usize,
    /// Maximum time between taps before resetting
    timeout: Duration,
}

impl TapTempo {
    /// Create a new tap tempo calculator
    pub fn new(max_taps: usize, timeout_ms: u64) -> Self {
        Self {
            taps: Vec::with_capacity(max_taps),
            max_taps: max_taps.max(2),
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    /// Record a tap now
    pub fn tap(&mut self) -> Option<Tempo> {
        self.tap_at(Instant::now())
    }

    /// Record a tap at `now` and return the averaged tempo once two taps exist
    pub fn tap_at(&mut self, now: Instant) -> Option<Tempo> {
        if let Some(last) = self.taps.last() {
            if now.saturating_duration_since(*last) > self.timeout {
                self.taps.clear();
            }
        }

        self.taps.push(now);
        if self.taps.len() > self.max_taps {
            self.taps.remove(0);
        }

        if self.taps.len() < 2 {
            return None;
        }

        let first = self.taps[0];
        let last = self.taps[self.taps.len() - 1];
        let span = last.saturating_duration_since(first).as_secs_f64();
        if span <= 0.0 {
            return None;
        }
        let avg_interval = span / (self.taps.len() - 1) as f64;

        Some(Tempo::clamped(60.0 / avg_interval))
    }

    /// Forget all taps
    pub fn reset(&mut self) {
        self.taps.clear();
    }
}

impl Default for TapTempo {
    fn default() -> Self {
        Self::new(4, 2000)
    }
}
