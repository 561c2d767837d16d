// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Mix graph routing microphone and click audio.
//!
//! Two outputs are rendered per block:
//! - the monitor path (performer's ears): clicks only, muted while a take
//!   is recording so the open microphone never picks them up
//! - the record path: microphone input, plus clicks only while the route is
//!   [`MixRoute::MonitorAndRecord`]
//!
//! Route and mute changes never switch abruptly; gains ramp to their target
//! over at most 5 ms. The graph lives behind a [`MixHandle`] mutex shared
//! with the audio callbacks, so a connection change is always applied
//! between two rendered blocks, never inside one.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use super::MixRoute;
use crate::metronome::{BeatEvent, ClickSink, ClickSynth};

/// Length of gain ramps, in seconds
pub const RAMP_SECONDS: f64 = 0.005;

/// Linear gain ramp
#[derive(Debug, Clone, Copy, PartialEq)]
struct GainRamp {
    current: f32,
    target: f32,
    step: f32,
}

impl GainRamp {
    fn new(value: f32) -> Self {
        Self {
            current: value,
            target: value,
            step: 0.0,
        }
    }

    fn set_target(&mut self, target: f32, ramp_samples: u32) {
        self.target = target;
        self.step = (target - self.current).abs() / ramp_samples.max(1) as f32;
    }

    fn next(&mut self) -> f32 {
        let delta = self.target - self.current;
        if delta.abs() <= self.step {
            self.current = self.target;
        } else {
            self.current += self.step.copysign(delta);
        }
        self.current
    }

    fn is_silent(&self) -> bool {
        self.current == 0.0 && self.target == 0.0
    }
}

/// Clicks kept behind the newest scheduled beat, for a path rendering late
const CLICK_HISTORY: f64 = 1.0;

/// One path's view of the click schedule, at that path's sample rate
#[derive(Debug)]
struct ClickPath {
    synth: ClickSynth,
    scratch: Vec<f32>,
    rendered_until: f64,
}

impl ClickPath {
    fn new(sample_rate: u32) -> Self {
        Self {
            synth: ClickSynth::new(sample_rate),
            scratch: Vec::with_capacity(4096),
            rendered_until: 0.0,
        }
    }

    fn schedule(&mut self, event: BeatEvent) {
        // A path that never renders must not grow without bound
        self.synth.prune_before(event.scheduled_time - CLICK_HISTORY);
        self.synth.schedule(event);
    }

    fn render(&mut self, block_start: f64, frames: usize) {
        self.scratch.clear();
        self.scratch.resize(frames, 0.0);
        self.synth.render(block_start, &mut self.scratch);

        let block_end = block_start + frames as f64 / self.synth.sample_rate() as f64;
        if block_end > self.rendered_until {
            self.rendered_until = block_end;
            self.synth.prune_before(block_end - CLICK_HISTORY);
        }
    }
}

/// Monitor and record mixing state
#[derive(Debug)]
pub struct MixGraph {
    volume: f32,
    monitor: ClickPath,
    monitor_muted: bool,
    monitor_gain: GainRamp,
    record: ClickPath,
    route: MixRoute,
    record_gain: GainRamp,
}

impl MixGraph {
    /// Create a graph with the monitor open and clicks kept out of the record path.
    ///
    /// Both paths start at `sample_rate`; see [`MixGraph::set_record_sample_rate`].
    pub fn new(sample_rate: u32) -> Self {
        Self {
            volume: 0.8,
            monitor: ClickPath::new(sample_rate),
            monitor_muted: false,
            monitor_gain: GainRamp::new(1.0),
            record: ClickPath::new(sample_rate),
            route: MixRoute::MonitorOnly,
            record_gain: GainRamp::new(0.0),
        }
    }

    /// Monitor (output) sample rate in Hz
    pub fn sample_rate(&self) -> u32 {
        self.monitor.synth.sample_rate()
    }

    /// Record (input) sample rate in Hz
    pub fn record_sample_rate(&self) -> u32 {
        self.record.synth.sample_rate()
    }

    /// Render the record path at the microphone's rate
    pub fn set_record_sample_rate(&mut self, sample_rate: u32) {
        self.record.synth.set_sample_rate(sample_rate);
    }

    fn ramp_samples(sample_rate: u32) -> u32 {
        (RAMP_SECONDS * sample_rate as f64).round() as u32
    }

    /// Click volume (0.0 - 1.0)
    pub fn set_volume(&mut self, volume: f32) {
        self.volume = if volume.is_nan() {
            0.0
        } else {
            volume.clamp(0.0, 1.0)
        };
    }

    /// Get click volume
    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Mute or unmute the monitor click tap
    pub fn mute_monitor(&mut self, muted: bool) {
        if self.monitor_muted == muted {
            return;
        }
        self.monitor_muted = muted;
        let ramp = Self::ramp_samples(self.sample_rate());
        self.monitor_gain
            .set_target(if muted { 0.0 } else { 1.0 }, ramp);
        debug!(muted, "monitor tap");
    }

    /// Check if the monitor tap is muted
    pub fn is_monitor_muted(&self) -> bool {
        self.monitor_muted
    }

    /// Connect or disconnect the click from the record path
    pub fn set_record_route(&mut self, route: MixRoute) {
        if self.route == route {
            return;
        }
        self.route = route;
        let target = match route {
            MixRoute::MonitorOnly => 0.0,
            MixRoute::MonitorAndRecord => 1.0,
        };
        let ramp = Self::ramp_samples(self.record_sample_rate());
        self.record_gain.set_target(target, ramp);
        debug!(?route, "record route");
    }

    /// Current record route
    pub fn record_route(&self) -> MixRoute {
        self.route
    }

    /// Whether any click signal can still reach the record path.
    ///
    /// Stays true for the few milliseconds of a disconnect ramp.
    pub fn is_click_in_record_path(&self) -> bool {
        self.route == MixRoute::MonitorAndRecord || !self.record_gain.is_silent()
    }

    /// Queue a click on both paths
    pub fn schedule_click(&mut self, event: BeatEvent) {
        self.monitor.schedule(event);
        self.record.schedule(event);
    }

    /// Withdraw clicks scheduled after `time`
    pub fn cancel_clicks_after(&mut self, time: f64) {
        self.monitor.synth.cancel_after(time);
        self.record.synth.cancel_after(time);
    }

    /// Number of clicks waiting to sound on the monitor path
    pub fn pending_clicks(&self) -> usize {
        self.monitor.synth.pending()
    }

    /// Render the monitor path (mono) for the block starting at `block_start`
    pub fn render_monitor(&mut self, block_start: f64, out: &mut [f32]) {
        self.monitor.render(block_start, out.len());
        for (sample, click) in out.iter_mut().zip(self.monitor.scratch.iter()) {
            *sample = click * self.monitor_gain.next() * self.volume;
        }
    }

    /// Render the record path (mono): microphone plus any routed click.
    ///
    /// `block_start` is the clock time of the first microphone frame, and
    /// `mic` is at the record sample rate.
    pub fn render_record(&mut self, block_start: f64, mic: &[f32], out: &mut [f32]) {
        let frames = mic.len().min(out.len());
        out[..frames].copy_from_slice(&mic[..frames]);

        if !self.is_click_in_record_path() {
            return;
        }

        self.record.render(block_start, frames);
        for (sample, click) in out[..frames].iter_mut().zip(self.record.scratch.iter()) {
            *sample += click * self.record_gain.next() * self.volume;
        }
    }
}

/// Shared, lockable handle to the mix graph
#[derive(Debug, Clone)]
pub struct MixHandle {
    graph: Arc<Mutex<MixGraph>>,
}

impl MixHandle {
    /// Wrap a graph for sharing with audio callbacks
    pub fn new(graph: MixGraph) -> Self {
        Self {
            graph: Arc::new(Mutex::new(graph)),
        }
    }

    /// Lock the graph; `None` if a previous holder panicked
    pub fn lock(&self) -> Option<MutexGuard<'_, MixGraph>> {
        self.graph.lock().ok()
    }

    /// Mute or unmute the monitor click tap
    pub fn mute_monitor(&self, muted: bool) {
        if let Some(mut graph) = self.lock() {
            graph.mute_monitor(muted);
        }
    }

    /// Render the record path at the microphone's rate
    pub fn set_record_sample_rate(&self, sample_rate: u32) {
        if let Some(mut graph) = self.lock() {
            graph.set_record_sample_rate(sample_rate);
        }
    }

    /// Set the record route
    pub fn set_record_route(&self, route: MixRoute) {
        if let Some(mut graph) = self.lock() {
            graph.set_record_route(route);
        }
    }

    /// Set click volume
    pub fn set_volume(&self, volume: f32) {
        if let Some(mut graph) = self.lock() {
            graph.set_volume(volume);
        }
    }

    /// Current record route (defaults to monitor-only if the lock is poisoned)
    pub fn record_route(&self) -> MixRoute {
        self.lock()
            .map(|g| g.record_route())
            .unwrap_or(MixRoute::MonitorOnly)
    }

    /// Check if the monitor tap is muted
    pub fn is_monitor_muted(&self) -> bool {
        self.lock().map(|g| g.is_monitor_muted()).unwrap_or(false)
    }
}

impl ClickSink for MixHandle {
    fn schedule_click(&mut self, event: BeatEvent) {
        if let Some(mut graph) = self.lock() {
            graph.schedule_click(event);
        }
    }

    fn cancel_clicks_after(&mut self, time: f64) {
        if let Some(mut graph) = self.lock() {
            graph.cancel_clicks_after(time);
        }
    }
}
