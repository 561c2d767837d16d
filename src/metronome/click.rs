// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Click synthesis.
//!
//! Clicks are decaying sine bursts: 880 Hz for an accented downbeat, 440 Hz
//! otherwise. Rendering is a pure function of the schedule and the block
//! start time, so the monitor path and the record path can each render the
//! same schedule at their own block positions and land every click on the
//! same sample.

use std::collections::VecDeque;
use std::f32::consts::TAU;

use super::BeatEvent;

/// Accent click pitch in Hz
pub const ACCENT_FREQUENCY: f32 = 880.0;
/// Normal click pitch in Hz
pub const BEAT_FREQUENCY: f32 = 440.0;
/// Length of one click in seconds
pub const CLICK_DURATION: f64 = 0.03;

const ACCENT_GAIN: f32 = 0.8;
const BEAT_GAIN: f32 = 0.5;
// Amplitude falls to ~1% by the end of the burst
const DECAY_PER_SECOND: f32 = 150.0;

/// Scheduled-click renderer
#[derive(Debug, Clone)]
pub struct ClickSynth {
    sample_rate: u32,
    /// Pending clicks, ordered by scheduled time
    schedule: VecDeque<BeatEvent>,
}

impl ClickSynth {
    /// Create a synth for the given sample rate
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            schedule: VecDeque::with_capacity(16),
        }
    }

    /// Sample rate in Hz
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Render at a different rate from now on; queued clicks keep their times
    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate.max(1);
    }

    /// Queue a click for playback at `event.scheduled_time`
    pub fn schedule(&mut self, event: BeatEvent) {
        // Beats almost always arrive in order; fall back to sorted insert otherwise
        let pos = self
            .schedule
            .iter()
            .rposition(|e| e.scheduled_time <= event.scheduled_time)
            .map(|p| p + 1)
            .unwrap_or(0);
        self.schedule.insert(pos, event);
    }

    /// Drop every click scheduled strictly after `time`
    pub fn cancel_after(&mut self, time: f64) {
        self.schedule.retain(|e| e.scheduled_time <= time);
    }

    /// Drop every queued click
    pub fn clear(&mut self) {
        self.schedule.clear();
    }

    /// Forget clicks that finished sounding before `time`
    pub fn prune_before(&mut self, time: f64) {
        while let Some(front) = self.schedule.front() {
            if front.scheduled_time + CLICK_DURATION < time {
                self.schedule.pop_front();
            } else {
                break;
            }
        }
    }

    /// Number of queued clicks
    pub fn pending(&self) -> usize {
        self.schedule.len()
    }

    /// Mix the clicks overlapping `[block_start, block_start + out.len())` into `out`.
    ///
    /// `out` is mono; samples are added, not overwritten.
    pub fn render(&self, block_start: f64, out: &mut [f32]) {
        if out.is_empty() {
            return;
        }
        let sr = self.sample_rate as f64;
        let block_end = block_start + out.len() as f64 / sr;
        let click_frames = (CLICK_DURATION * sr).ceil() as i64;

        for event in &self.schedule {
            if event.scheduled_time >= block_end {
                break;
            }
            if event.scheduled_time + CLICK_DURATION <= block_start {
                continue;
            }

            // Click onset in frames relative to the block start
            let onset = ((event.scheduled_time - block_start) * sr).round() as i64;
            let first = onset.max(0);
            let last = (onset + click_frames).min(out.len() as i64);

            let (freq, gain) = if event.is_accent {
                (ACCENT_FREQUENCY, ACCENT_GAIN)
            } else {
                (BEAT_FREQUENCY, BEAT_GAIN)
            };

            for frame in first..last {
                let t = (frame - onset) as f32 / self.sample_rate as f32;
                let envelope = (-t * DECAY_PER_SECOND).exp();
                out[frame as usize] += (t * freq * TAU).sin() * envelope * gain;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn beat(index: u32, time: f64, accent: bool) -> BeatEvent {
        BeatEvent {
            beat_index: index,
            scheduled_time: time,
            is_accent: accent,
        }
    }

    fn first_nonzero(buf: &[f32]) -> Option<usize> {
        buf.iter().position(|s| s.abs() > 0.0)
    }

    #[test]
    fn test_click_lands_on_exact_sample() {
        let mut synth = ClickSynth::new(48_000);
        // 0.1 s = frame 4800; second sample of the burst is the first non-zero one
        synth.schedule(beat(1, 0.1, false));

        let mut buf = vec![0.0f32; 9600];
        synth.render(0.0, &mut buf);

        assert_eq!(first_nonzero(&buf), Some(4801));
        assert!(buf[..4800].iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_click_spanning_blocks_is_continuous() {
        let mut synth = ClickSynth::new(48_000);
        synth.schedule(beat(0, 0.01, true));

        let mut whole = vec![0.0f32; 4800];
        synth.render(0.0, &mut whole);

        let mut split = vec![0.0f32; 4800];
        let (a, b) = split.split_at_mut(512);
        synth.render(0.0, a);
        synth.render(512.0 / 48_000.0, b);

        for (x, y) in whole.iter().zip(split.iter()) {
            assert!((x - y).abs() < 1e-6);
        }
    }

    #[test]
    fn test_accent_is_louder() {
        let mut accent = ClickSynth::new(48_000);
        accent.schedule(beat(0, 0.0, true));
        let mut normal = ClickSynth::new(48_000);
        normal.schedule(beat(1, 0.0, false));

        let mut a = vec![0.0f32; 2048];
        let mut n = vec![0.0f32; 2048];
        accent.render(0.0, &mut a);
        normal.render(0.0, &mut n);

        let peak = |b: &[f32]| b.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!(peak(&a) > peak(&n));
    }

    #[test]
    fn test_render_adds_to_existing_signal() {
        let mut synth = ClickSynth::new(48_000);
        synth.schedule(beat(1, 0.0, false));

        let mut buf = vec![0.25f32; 2048];
        synth.render(0.0, &mut buf);
        assert_eq!(buf[0], 0.25);
        assert!(buf[1..].iter().any(|s| *s != 0.25));
    }

    #[test]
    fn test_schedule_keeps_order() {
        let mut synth = ClickSynth::new(48_000);
        synth.schedule(beat(2, 1.0, false));
        synth.schedule(beat(0, 0.0, true));
        synth.schedule(beat(1, 0.5, false));

        let times: Vec<f64> = synth.schedule.iter().map(|e| e.scheduled_time).collect();
        assert_eq!(times, vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn test_cancel_and_prune() {
        let mut synth = ClickSynth::new(48_000);
        for i in 0..4 {
            synth.schedule(beat(i, i as f64 * 0.5, i == 0));
        }
        assert_eq!(synth.pending(), 4);

        synth.cancel_after(0.75);
        assert_eq!(synth.pending(), 2);

        synth.prune_before(0.52);
        assert_eq!(synth.pending(), 1);

        synth.clear();
        assert_eq!(synth.pending(), 0);
    }

    #[test]
    fn test_rate_change_keeps_click_time() {
        let mut synth = ClickSynth::new(48_000);
        synth.schedule(beat(1, 0.1, false));
        synth.set_sample_rate(44_100);

        let mut buf = vec![0.0f32; 8820];
        synth.render(0.0, &mut buf);
        // 0.1 s at 44.1 kHz is frame 4410
        assert_eq!(first_nonzero(&buf), Some(4411));
    }

    #[test]
    fn test_empty_schedule_renders_silence() {
        let synth = ClickSynth::new(44_100);
        let mut buf = vec![0.0f32; 1024];
        synth.render(3.0, &mut buf);
        assert!(buf.iter().all(|s| *s == 0.0));
    }
}
