// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Look-ahead beat scheduler.
//!
//! A coarse periodic tick (~25 ms) emits every beat whose scheduled time
//! falls inside a fixed look-ahead window (~100 ms). Each beat is handed to
//! the click sink with its exact clock time, and the audio path renders it
//! on the matching sample. The tick only has to wake up before the window
//! runs dry, so timer jitter never reaches the audible click.
//!
//! [`BeatScheduler`] is the pure scheduling state and is driven with
//! explicit timestamps. [`SchedulerEngine`] owns one on a dedicated thread
//! and is the only writer of that state.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

use super::{BeatEvent, MetronomeSettings};
use crate::timing::SharedClock;

/// Visual notifications are delivered this close to the beat
const NOTIFY_TOLERANCE: f64 = 0.001;

/// Scheduler tuning
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerConfig {
    /// Period of the scheduling tick
    pub tick_interval: Duration,
    /// How far ahead of the clock beats are emitted
    pub lookahead: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(25),
            lookahead: Duration::from_millis(100),
        }
    }
}

/// Destination for scheduled clicks (the mix graph in a live session)
pub trait ClickSink: Send {
    /// Queue a click for exact playback at `event.scheduled_time`
    fn schedule_click(&mut self, event: BeatEvent);

    /// Withdraw clicks scheduled strictly after `time`
    fn cancel_clicks_after(&mut self, time: f64);
}

/// Visual beat callback, invoked on the scheduler thread at each beat's time
pub type BeatCallback = Box<dyn FnMut(BeatEvent) + Send>;

/// Pure look-ahead scheduling state
#[derive(Debug, Clone)]
pub struct BeatScheduler {
    lookahead: f64,
    settings: MetronomeSettings,
    next_event_time: f64,
    beat_index: u32,
    running: bool,
    /// Emitted beats that have not sounded yet
    in_flight: VecDeque<BeatEvent>,
}

impl BeatScheduler {
    /// Create a stopped scheduler
    pub fn new(lookahead: Duration) -> Self {
        Self {
            lookahead: lookahead.as_secs_f64(),
            settings: MetronomeSettings::default(),
            next_event_time: 0.0,
            beat_index: 0,
            running: false,
            in_flight: VecDeque::new(),
        }
    }

    /// Begin scheduling; the first beat (index 0) sounds at `now`
    pub fn start(&mut self, now: f64, settings: MetronomeSettings) {
        self.settings = settings;
        self.next_event_time = now;
        self.beat_index = 0;
        self.in_flight.clear();
        self.running = true;
    }

    /// Halt and reset the beat index
    pub fn stop(&mut self) {
        self.running = false;
        self.beat_index = 0;
        self.in_flight.clear();
    }

    /// Check if running
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Current settings
    pub fn settings(&self) -> &MetronomeSettings {
        &self.settings
    }

    /// Index the next emitted beat will carry
    pub fn beat_index(&self) -> u32 {
        self.beat_index
    }

    /// Clock time of the next beat to emit
    pub fn next_event_time(&self) -> f64 {
        self.next_event_time
    }

    /// Emit every beat scheduled before `now + lookahead`
    pub fn tick(&mut self, now: f64) -> Vec<BeatEvent> {
        if !self.running {
            return Vec::new();
        }

        while let Some(front) = self.in_flight.front() {
            if front.scheduled_time <= now {
                self.in_flight.pop_front();
            } else {
                break;
            }
        }

        let horizon = now + self.lookahead;
        let interval = self.settings.tempo.beat_interval();
        let beats = self.settings.time_signature.beats_per_measure();
        let mut emitted = Vec::new();

        while self.next_event_time < horizon {
            let event = BeatEvent {
                beat_index: self.beat_index,
                scheduled_time: self.next_event_time,
                is_accent: self.settings.accent_first_beat && self.beat_index == 0,
            };
            emitted.push(event);
            self.in_flight.push_back(event);

            self.next_event_time += interval;
            self.beat_index = (self.beat_index + 1) % beats;
        }

        emitted
    }

    /// Apply new settings, restarting with resume.
    ///
    /// Beats already emitted for times after `now` are withdrawn, the beat
    /// count resumes from the first withdrawn beat, and the next beat is
    /// placed one new interval after `now`. Returns the cutoff time after
    /// which previously emitted beats must be cancelled, or `None` when
    /// stopped.
    pub fn reschedule(&mut self, now: f64, settings: MetronomeSettings) -> Option<f64> {
        self.settings = settings;
        if !self.running {
            return None;
        }

        let resume = self
            .in_flight
            .iter()
            .find(|e| e.scheduled_time > now)
            .map(|e| e.beat_index)
            .unwrap_or(self.beat_index);
        self.in_flight.clear();

        self.beat_index = resume % settings.time_signature.beats_per_measure();
        self.next_event_time = now + settings.tempo.beat_interval();
        Some(now)
    }
}

enum EngineCommand {
    Update(MetronomeSettings),
    Stop,
}

/// Click sink and beat callback, moved into the worker thread while it runs
struct Outputs {
    sink: Box<dyn ClickSink>,
    on_beat: BeatCallback,
}

struct Worker {
    commands: Sender<EngineCommand>,
    handle: JoinHandle<Outputs>,
}

/// Owned metronome engine.
///
/// Each instance has its own clock handle, thread and outputs; instances
/// never share state.
pub struct SchedulerEngine {
    clock: SharedClock,
    config: SchedulerConfig,
    settings: MetronomeSettings,
    running: Arc<AtomicBool>,
    outputs: Option<Outputs>,
    worker: Option<Worker>,
}

impl SchedulerEngine {
    /// Create a stopped engine
    pub fn new(
        clock: SharedClock,
        config: SchedulerConfig,
        sink: Box<dyn ClickSink>,
        on_beat: BeatCallback,
    ) -> Self {
        Self {
            clock,
            config,
            settings: MetronomeSettings::default(),
            running: Arc::new(AtomicBool::new(false)),
            outputs: Some(Outputs { sink, on_beat }),
            worker: None,
        }
    }

    /// Start scheduling. When already running this behaves like [`Self::update`].
    pub fn start(&mut self, settings: MetronomeSettings) {
        if self.is_running() {
            self.update(settings);
            return;
        }
        let Some(outputs) = self.outputs.take() else {
            warn!("metronome outputs unavailable; engine cannot start");
            return;
        };

        self.settings = settings;
        let (tx, rx) = mpsc::channel();
        let clock = Arc::clone(&self.clock);
        let config = self.config;
        let running = Arc::clone(&self.running);
        running.store(true, Ordering::Release);

        let handle = thread::Builder::new()
            .name("metronome".into())
            .spawn(move || run_worker(clock, config, settings, outputs, rx, running));

        match handle {
            Ok(handle) => {
                debug!(tempo = %settings.tempo, signature = %settings.time_signature, "metronome started");
                self.worker = Some(Worker {
                    commands: tx,
                    handle,
                });
            }
            Err(e) => {
                // The closure (and the outputs in it) is gone; nothing more can be started
                self.running.store(false, Ordering::Release);
                warn!("failed to spawn metronome thread: {}", e);
            }
        }
    }

    /// Stop scheduling and reset the beat index.
    ///
    /// Returns once the worker has exited and withdrawn its pending clicks.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        let Some(worker) = self.worker.take() else {
            return;
        };
        let _ = worker.commands.send(EngineCommand::Stop);
        match worker.handle.join() {
            Ok(outputs) => self.outputs = Some(outputs),
            Err(_) => warn!("metronome thread panicked"),
        }
        debug!("metronome stopped");
    }

    /// Check if running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Change tempo, meter or accent; takes effect on the next tick
    pub fn update(&mut self, settings: MetronomeSettings) {
        self.settings = settings;
        if let Some(worker) = &self.worker {
            let _ = worker.commands.send(EngineCommand::Update(settings));
        }
    }

    /// Settings currently in effect (or to be used by the next start)
    pub fn settings(&self) -> MetronomeSettings {
        self.settings
    }
}

impl Drop for SchedulerEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_worker(
    clock: SharedClock,
    config: SchedulerConfig,
    settings: MetronomeSettings,
    mut outputs: Outputs,
    commands: Receiver<EngineCommand>,
    running: Arc<AtomicBool>,
) -> Outputs {
    let mut scheduler = BeatScheduler::new(config.lookahead);
    let mut notices: VecDeque<BeatEvent> = VecDeque::new();
    scheduler.start(clock.now(), settings);

    loop {
        let now = clock.now();
        for event in scheduler.tick(now) {
            outputs.sink.schedule_click(event);
            notices.push_back(event);
        }

        while let Some(front) = notices.front() {
            if front.scheduled_time <= now + NOTIFY_TOLERANCE {
                (outputs.on_beat)(*front);
                notices.pop_front();
            } else {
                break;
            }
        }

        // Sleep until the next tick, or the next visual beat if that comes first
        let mut wait = config.tick_interval;
        if let Some(front) = notices.front() {
            let until = Duration::from_secs_f64((front.scheduled_time - now).max(0.0));
            wait = wait.min(until);
        }

        match commands.recv_timeout(wait) {
            Ok(EngineCommand::Update(new_settings)) => {
                let now = clock.now();
                if let Some(cutoff) = scheduler.reschedule(now, new_settings) {
                    outputs.sink.cancel_clicks_after(cutoff);
                    notices.retain(|e| e.scheduled_time <= cutoff);
                    debug!(tempo = %new_settings.tempo, "metronome rescheduled");
                }
            }
            Ok(EngineCommand::Stop) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
    }

    scheduler.stop();
    outputs.sink.cancel_clicks_after(clock.now());
    running.store(false, Ordering::Release);
    outputs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timing::{ManualClock, Tempo, TimeSignature};
    use std::sync::Mutex;

    fn settings(bpm: f64, beats: u32, accent: bool) -> MetronomeSettings {
        MetronomeSettings::new(
            Tempo::new(bpm).unwrap(),
            TimeSignature::new(beats, 4).unwrap(),
            accent,
        )
    }

    /// Drive the scheduler with `step`-second ticks from 0 to `duration`
    fn run_for(scheduler: &mut BeatScheduler, duration: f64, step: f64) -> Vec<BeatEvent> {
        let mut events = Vec::new();
        let mut now = 0.0;
        while now <= duration {
            events.extend(scheduler.tick(now));
            now += step;
        }
        events
    }

    #[test]
    fn test_scheduler_starts_stopped() {
        let mut scheduler = BeatScheduler::new(Duration::from_millis(100));
        assert!(!scheduler.is_running());
        assert!(scheduler.tick(0.0).is_empty());
    }

    #[test]
    fn test_lookahead_window() {
        let mut scheduler = BeatScheduler::new(Duration::from_millis(100));
        scheduler.start(0.0, settings(120.0, 4, true));

        // Only the first beat falls inside [0, 0.1)
        let events = scheduler.tick(0.0);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].scheduled_time, 0.0);

        // Nothing new until the window reaches 0.5
        assert!(scheduler.tick(0.3).is_empty());
        let events = scheduler.tick(0.41);
        assert_eq!(events.len(), 1);
        assert!((events[0].scheduled_time - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_beat_count_matches_duration() {
        for bpm in [40.0, 60.0, 97.0, 120.0, 180.0, 220.0] {
            let mut scheduler = BeatScheduler::new(Duration::from_millis(100));
            scheduler.start(0.0, settings(bpm, 4, false));

            let duration = 10.0;
            let events = run_for(&mut scheduler, duration, 0.025);
            let sounded = events.iter().filter(|e| e.scheduled_time < duration).count() as i64;
            let expected = (duration / (60.0 / bpm)).floor() as i64;
            assert!(
                (sounded - expected).abs() <= 1,
                "bpm {}: {} beats, expected {}",
                bpm,
                sounded,
                expected
            );
        }
    }

    #[test]
    fn test_beat_indices_cycle_without_gaps() {
        for beats in [1, 3, 4, 7] {
            let mut scheduler = BeatScheduler::new(Duration::from_millis(100));
            scheduler.start(0.0, settings(200.0, beats, true));

            let events = run_for(&mut scheduler, 20.0, 0.02);
            for (i, event) in events.iter().enumerate() {
                assert_eq!(event.beat_index, i as u32 % beats);
            }
            for pair in events.windows(2) {
                assert!(pair[1].scheduled_time > pair[0].scheduled_time);
            }
        }
    }

    #[test]
    fn test_accent_only_on_downbeat() {
        let mut scheduler = BeatScheduler::new(Duration::from_millis(100));
        scheduler.start(0.0, settings(150.0, 3, true));
        for event in run_for(&mut scheduler, 5.0, 0.025) {
            assert_eq!(event.is_accent, event.beat_index == 0);
        }

        let mut scheduler = BeatScheduler::new(Duration::from_millis(100));
        scheduler.start(0.0, settings(150.0, 3, false));
        assert!(run_for(&mut scheduler, 5.0, 0.025).iter().all(|e| !e.is_accent));
    }

    #[test]
    fn test_120_bpm_four_four_sequence() {
        let mut scheduler = BeatScheduler::new(Duration::from_millis(100));
        scheduler.start(0.0, settings(120.0, 4, true));

        let events: Vec<BeatEvent> = run_for(&mut scheduler, 4.0, 0.025)
            .into_iter()
            .filter(|e| e.scheduled_time < 4.0)
            .collect();
        let indices: Vec<u32> = events.iter().map(|e| e.beat_index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 0, 1, 2, 3]);

        for pair in events.windows(2) {
            let spacing = pair[1].scheduled_time - pair[0].scheduled_time;
            assert!((spacing - 0.5).abs() < 0.015);
        }
    }

    #[test]
    fn test_stop_resets_index() {
        let mut scheduler = BeatScheduler::new(Duration::from_millis(100));
        scheduler.start(0.0, settings(120.0, 4, true));
        run_for(&mut scheduler, 1.2, 0.025);
        assert_ne!(scheduler.beat_index(), 0);

        scheduler.stop();
        assert!(!scheduler.is_running());
        assert_eq!(scheduler.beat_index(), 0);
        assert!(scheduler.tick(2.0).is_empty());
    }

    #[test]
    fn test_reschedule_resumes_count() {
        let mut scheduler = BeatScheduler::new(Duration::from_millis(100));
        scheduler.start(0.0, settings(120.0, 4, true));

        // Beats 0 and 1 emitted; beat 1 (at 0.5) has not sounded at 0.45
        scheduler.tick(0.0);
        scheduler.tick(0.45);

        let cutoff = scheduler.reschedule(0.45, settings(60.0, 4, true));
        assert_eq!(cutoff, Some(0.45));
        assert_eq!(scheduler.beat_index(), 1);
        assert!((scheduler.next_event_time() - 1.45).abs() < 1e-9);

        let events = scheduler.tick(1.4);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].beat_index, 1);
        assert!(!events[0].is_accent);
    }

    #[test]
    fn test_reschedule_new_signature_wraps_index() {
        let mut scheduler = BeatScheduler::new(Duration::from_millis(100));
        scheduler.start(0.0, settings(120.0, 4, true));
        run_for(&mut scheduler, 1.3, 0.025); // beats 0..=2 sounded, 3 pending

        scheduler.reschedule(1.3, settings(120.0, 3, true));
        assert_eq!(scheduler.beat_index(), 0);
    }

    #[test]
    fn test_reschedule_when_stopped() {
        let mut scheduler = BeatScheduler::new(Duration::from_millis(100));
        assert_eq!(scheduler.reschedule(0.0, settings(90.0, 3, false)), None);
        assert_eq!(scheduler.settings().time_signature.beats_per_measure(), 3);
    }

    #[derive(Clone, Default)]
    struct RecordingSink {
        clicks: Arc<Mutex<Vec<BeatEvent>>>,
        cancels: Arc<Mutex<Vec<f64>>>,
    }

    impl ClickSink for RecordingSink {
        fn schedule_click(&mut self, event: BeatEvent) {
            self.clicks.lock().unwrap().push(event);
        }

        fn cancel_clicks_after(&mut self, time: f64) {
            self.cancels.lock().unwrap().push(time);
        }
    }

    #[test]
    fn test_engine_lifecycle() {
        let clock = Arc::new(ManualClock::new(0.0));
        let sink = RecordingSink::default();
        let beats = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&beats);

        let mut engine = SchedulerEngine::new(
            clock.clone(),
            SchedulerConfig::default(),
            Box::new(sink.clone()),
            Box::new(move |e: BeatEvent| seen.lock().unwrap().push(e.beat_index)),
        );
        assert!(!engine.is_running());

        engine.start(settings(120.0, 4, true));
        assert!(engine.is_running());

        // Let the worker pass through a few ticks at t = 0
        thread::sleep(Duration::from_millis(60));
        assert_eq!(sink.clicks.lock().unwrap().len(), 1);
        assert_eq!(*beats.lock().unwrap(), vec![0]);

        clock.set(0.55);
        thread::sleep(Duration::from_millis(60));
        assert_eq!(*beats.lock().unwrap(), vec![0, 1]);

        engine.stop();
        assert!(!engine.is_running());
        assert!(!sink.cancels.lock().unwrap().is_empty());

        // Restartable after stop
        engine.start(settings(120.0, 4, true));
        assert!(engine.is_running());
        engine.stop();
    }

    #[test]
    fn test_independent_engines() {
        let clock_a = Arc::new(ManualClock::new(0.0));
        let clock_b = Arc::new(ManualClock::new(0.0));
        let sink_a = RecordingSink::default();
        let sink_b = RecordingSink::default();

        let mut a = SchedulerEngine::new(
            clock_a.clone(),
            SchedulerConfig::default(),
            Box::new(sink_a.clone()),
            Box::new(|_| {}),
        );
        let mut b = SchedulerEngine::new(
            clock_b,
            SchedulerConfig::default(),
            Box::new(sink_b.clone()),
            Box::new(|_| {}),
        );

        a.start(settings(120.0, 4, true));
        b.start(settings(60.0, 3, false));
        clock_a.set(2.0);
        thread::sleep(Duration::from_millis(80));

        a.stop();
        assert!(!a.is_running());
        assert!(b.is_running());

        let a_clicks = sink_a.clicks.lock().unwrap().len();
        let b_clicks = sink_b.clicks.lock().unwrap().len();
        assert!(a_clicks >= 4);
        assert_eq!(b_clicks, 1);
        drop(b);
    }
}
