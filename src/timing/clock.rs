// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Clock sources.
//!
//! All scheduling happens in a single time domain measured in seconds.
//! In a live session that domain is the audio device's own frame counter
//! ([`FrameClock`]), so clicks land on exact sample positions regardless of
//! how late a scheduler tick wakes up.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Monotonic time source, in seconds since an arbitrary origin
pub trait ClockSource: Send + Sync {
    /// Current time in seconds
    fn now(&self) -> f64;
}

/// Shared handle to a clock
pub type SharedClock = Arc<dyn ClockSource>;

/// Wall clock backed by `Instant`.
///
/// Used when no audio device is driving a [`FrameClock`].
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Create a clock starting at zero now
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockSource for SystemClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Clock advanced by the audio output callback, one block of frames at a time
#[derive(Debug)]
pub struct FrameClock {
    frames: AtomicU64,
    sample_rate: u32,
}

impl FrameClock {
    /// Create a frame clock for the given sample rate
    pub fn new(sample_rate: u32) -> Self {
        Self {
            frames: AtomicU64::new(0),
            sample_rate: sample_rate.max(1),
        }
    }

    /// Advance by `frames` and return the position (in frames) of the block start
    pub fn advance(&self, frames: u64) -> u64 {
        self.frames.fetch_add(frames, Ordering::AcqRel)
    }

    /// Frames rendered so far
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }

    /// Sample rate in Hz
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Convert a frame position to seconds
    pub fn frames_to_seconds(&self, frames: u64) -> f64 {
        frames as f64 / self.sample_rate as f64
    }
}

impl ClockSource for FrameClock {
    fn now(&self) -> f64 {
        self.frames_to_seconds(self.frames())
    }
}

/// Manually stepped clock for tests and offline rendering
#[derive(Debug, Default)]
pub struct ManualClock {
    // f64 bits
    seconds: AtomicU64,
}

impl ManualClock {
    /// Create a clock at the given time
    pub fn new(start: f64) -> Self {
        Self {
            seconds: AtomicU64::new(start.to_bits()),
        }
    }

    /// Jump to an absolute time
    pub fn set(&self, seconds: f64) {
        self.seconds.store(seconds.to_bits(), Ordering::Release);
    }

    /// Move forward by `delta` seconds
    pub fn advance(&self, delta: f64) {
        self.set(self.now() + delta);
    }
}

impl ClockSource for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.seconds.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now();
        thread::sleep(Duration::from_millis(5));
        let b = clock.now();
        assert!(b > a);
    }

    #[test]
    fn test_frame_clock_advance() {
        let clock = FrameClock::new(48_000);
        assert_eq!(clock.now(), 0.0);

        let start = clock.advance(480);
        assert_eq!(start, 0);
        assert_eq!(clock.frames(), 480);
        assert!((clock.now() - 0.01).abs() < 1e-12);

        let start = clock.advance(24_000);
        assert_eq!(start, 480);
        assert!((clock.now() - 0.51).abs() < 1e-12);
    }

    #[test]
    fn test_frame_clock_zero_rate_guard() {
        let clock = FrameClock::new(0);
        assert_eq!(clock.sample_rate(), 1);
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(1.5);
        assert_eq!(clock.now(), 1.5);
        clock.advance(0.25);
        assert_eq!(clock.now(), 1.75);
        clock.set(10.0);
        assert_eq!(clock.now(), 10.0);
    }

    #[test]
    fn test_shared_clock_object() {
        let clock: SharedClock = Arc::new(ManualClock::new(2.0));
        assert_eq!(clock.now(), 2.0);
    }
}
