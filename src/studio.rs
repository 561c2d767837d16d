// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Studio facade.
//!
//! Ties the metronome engine, the mix graph, the capture state machine and
//! the library together behind the command surface a front-end needs. All
//! notifications (beats, capture state, errors, saved takes) arrive on one
//! [`StudioEvent`] channel.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossterm::event::KeyCode;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::audio::MixHandle;
use crate::capture::{
    CaptureHandle, CaptureMachine, CaptureMode, CaptureNotice, CaptureState, MachineConfig, MediaDevices,
};
use crate::control::{GamepadPoller, GamepadSource, InputDispatcher, LogicalAction, PedalBinding};
use crate::error::{ErrorKind, TempoError};
use crate::library::{SessionLibrary, TakeId, TargetRef};
use crate::metronome::{BeatEvent, MetronomeSettings, SchedulerConfig, SchedulerEngine};
use crate::timing::{SharedClock, TapTempo, Tempo, TimeSignature};

/// Meters stepped through by [`Studio::cycle_time_signature`]
const SIGNATURE_CYCLE: [(u32, u32); 6] = [(4, 4), (3, 4), (2, 4), (6, 8), (5, 4), (7, 8)];

/// Everything a front-end is told about
#[derive(Debug, Clone, PartialEq)]
pub enum StudioEvent {
    /// A beat is sounding now
    Beat(BeatEvent),
    CaptureStateChanged(CaptureState),
    Error { kind: ErrorKind, message: String },
    Saved { take: TakeId, duration: Duration },
}

/// Studio construction parameters
#[derive(Debug, Clone)]
pub struct StudioConfig {
    pub metronome: MetronomeSettings,
    pub volume: f32,
    pub scheduler: SchedulerConfig,
    /// Capture tuning; `record_into_take` and `target` seed the first take
    pub capture: MachineConfig,
    pub pedals: PedalBinding,
    pub debounce: Duration,
    pub gamepad_poll: Duration,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            metronome: MetronomeSettings::default(),
            volume: 0.8,
            scheduler: SchedulerConfig::default(),
            capture: MachineConfig::default(),
            pedals: PedalBinding::default(),
            debounce: Duration::from_millis(150),
            gamepad_poll: Duration::from_millis(50),
        }
    }
}

/// Metronome and capture behind one command surface
pub struct Studio {
    engine: SchedulerEngine,
    mix: MixHandle,
    capture: CaptureHandle,
    library: Arc<dyn SessionLibrary>,
    dispatcher: Arc<Mutex<InputDispatcher>>,
    tap: TapTempo,
    settings: MetronomeSettings,
    record_into_take: bool,
    target: Option<TargetRef>,
    gamepad_poll: Duration,
    gamepad: Option<GamepadPoller>,
}

impl Studio {
    /// Build the studio on the current tokio runtime.
    ///
    /// `clock` must be the clock that drives `mix` rendering, so scheduled
    /// clicks land where the audio callback expects them.
    pub fn new(
        config: StudioConfig,
        clock: SharedClock,
        mix: MixHandle,
        devices: Arc<dyn MediaDevices>,
        library: Arc<dyn SessionLibrary>,
    ) -> (Self, UnboundedReceiver<StudioEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        mix.set_volume(config.volume);

        let beat_tx = events_tx.clone();
        let on_beat = Box::new(move |event: BeatEvent| {
            let _ = beat_tx.send(StudioEvent::Beat(event));
        });
        let mut engine = SchedulerEngine::new(clock, config.scheduler, Box::new(mix.clone()), on_beat);
        engine.update(config.metronome);

        let record_into_take = config.capture.record_into_take;
        let target = config.capture.target.clone();
        let (capture, notices, _task) =
            CaptureMachine::spawn(config.capture, devices, Arc::clone(&library), mix.clone());

        tokio::spawn(forward_notices(notices, events_tx));

        let studio = Self {
            engine,
            mix,
            capture,
            library,
            dispatcher: Arc::new(Mutex::new(InputDispatcher::new(config.pedals, config.debounce))),
            tap: TapTempo::default(),
            settings: config.metronome,
            record_into_take,
            target,
            gamepad_poll: config.gamepad_poll,
            gamepad: None,
        };
        (studio, events_rx)
    }

    // Pedal actions

    /// Left pedal: acquire, start recording, or discard
    pub fn left_action(&self) {
        self.capture.left();
    }

    /// Right pedal: stop recording or accept the take
    pub fn right_action(&self) {
        self.capture.right();
    }

    /// Route a logical action from any source
    pub fn dispatch(&self, action: LogicalAction) {
        match action {
            LogicalAction::Left => self.left_action(),
            LogicalAction::Right => self.right_action(),
        }
    }

    /// Direct UI tap
    pub fn ui_action(&self, action: LogicalAction) {
        let action = match self.dispatcher.lock() {
            Ok(d) => d.ui(action),
            Err(_) => action,
        };
        self.dispatch(action);
    }

    /// Feed a key press through the pedal binding. Returns true when the key
    /// is a pedal key, whether or not it was debounced.
    pub fn handle_key(&self, code: KeyCode) -> bool {
        let Ok(mut dispatcher) = self.dispatcher.lock() else {
            return false;
        };
        if dispatcher.binding().action_for(code).is_none() {
            return false;
        }
        let action = dispatcher.key_down(code);
        drop(dispatcher);
        if let Some(action) = action {
            self.dispatch(action);
        }
        true
    }

    /// Replace the pedal keys
    pub fn set_pedal_binding(&self, binding: PedalBinding) {
        if let Ok(mut d) = self.dispatcher.lock() {
            d.set_binding(binding);
        }
    }

    pub fn pedal_binding(&self) -> PedalBinding {
        self.dispatcher.lock().map(|d| d.binding()).unwrap_or_default()
    }

    /// Poll a gamepad for pedal presses; replaces any previous gamepad
    pub fn attach_gamepad(&mut self, source: Box<dyn GamepadSource>) {
        let capture = self.capture.clone();
        let poller = GamepadPoller::spawn(source, Arc::clone(&self.dispatcher), self.gamepad_poll, move |action| {
            match action {
                LogicalAction::Left => capture.left(),
                LogicalAction::Right => capture.right(),
            };
        });
        self.gamepad = Some(poller);
    }

    // Metronome

    /// Replace every metronome setting at once.
    ///
    /// Invalid tempo or meter is rejected and nothing changes.
    pub fn set_metronome(
        &mut self,
        bpm: f64,
        beats_per_measure: u32,
        beat_unit: u32,
        accent_first_beat: bool,
        record_into_take: bool,
    ) -> Result<(), TempoError> {
        let tempo = Tempo::new(bpm)?;
        let time_signature = TimeSignature::new(beats_per_measure, beat_unit)?;
        self.apply(MetronomeSettings::new(tempo, time_signature, accent_first_beat));
        self.set_record_into_take(record_into_take);
        Ok(())
    }

    /// Mix the click into the next take
    pub fn set_record_into_take(&mut self, enabled: bool) {
        if self.record_into_take != enabled {
            self.record_into_take = enabled;
            self.capture.set_record_into_take(enabled);
            debug!(enabled, "record click into take");
        }
    }

    pub fn toggle_record_into_take(&mut self) {
        self.set_record_into_take(!self.record_into_take);
    }

    pub fn record_into_take(&self) -> bool {
        self.record_into_take
    }

    pub fn start_metronome(&mut self) {
        self.engine.start(self.settings);
    }

    pub fn stop_metronome(&mut self) {
        self.engine.stop();
    }

    pub fn toggle_metronome(&mut self) {
        if self.engine.is_running() {
            self.stop_metronome();
        } else {
            self.start_metronome();
        }
    }

    pub fn is_metronome_running(&self) -> bool {
        self.engine.is_running()
    }

    pub fn settings(&self) -> MetronomeSettings {
        self.settings
    }

    /// Nudge tempo by `delta` BPM (clamped)
    pub fn adjust_tempo(&mut self, delta: f64) {
        let mut settings = self.settings;
        settings.tempo = settings.tempo.nudged(delta);
        self.apply(settings);
    }

    /// Register a tap; returns the new tempo once enough taps arrived
    pub fn tap_tempo(&mut self) -> Option<Tempo> {
        let tempo = self.tap.tap()?;
        let mut settings = self.settings;
        settings.tempo = tempo;
        self.apply(settings);
        Some(tempo)
    }

    pub fn toggle_accent(&mut self) {
        let mut settings = self.settings;
        settings.accent_first_beat = !settings.accent_first_beat;
        self.apply(settings);
    }

    /// Step to the next common meter
    pub fn cycle_time_signature(&mut self) {
        let current = self.settings.time_signature;
        let pos = SIGNATURE_CYCLE
            .iter()
            .position(|&(b, u)| b == current.beats_per_measure() && u == current.beat_unit());
        let (beats, unit) = SIGNATURE_CYCLE[pos.map_or(0, |p| (p + 1) % SIGNATURE_CYCLE.len())];
        if let Ok(sig) = TimeSignature::new(beats, unit) {
            let mut settings = self.settings;
            settings.time_signature = sig;
            self.apply(settings);
        }
    }

    fn apply(&mut self, settings: MetronomeSettings) {
        if settings != self.settings {
            info!(tempo = %settings.tempo, signature = %settings.time_signature, accent = settings.accent_first_beat, "metronome settings");
        }
        self.settings = settings;
        self.engine.update(settings);
    }

    /// Store current tempo and meter as the target's default.
    ///
    /// Failures are logged, never surfaced.
    pub fn save_tempo_default(&self) -> JoinHandle<()> {
        let library = Arc::clone(&self.library);
        let target = self.target.clone();
        let tempo = self.settings.tempo;
        let sig = self.settings.time_signature;
        tokio::task::spawn_blocking(move || {
            if let Err(e) = library.persist_tempo_default(target.as_ref(), tempo, sig) {
                warn!("failed to store tempo default: {:#}", e);
            }
        })
    }

    // Mix

    /// Monitor volume, 0..=1
    pub fn set_volume(&self, volume: f32) {
        self.mix.set_volume(volume);
    }

    pub fn volume(&self) -> f32 {
        self.mix.lock().map(|g| g.volume()).unwrap_or(0.0)
    }

    pub fn adjust_volume(&self, delta: f32) {
        self.set_volume(self.volume() + delta);
    }

    // Capture

    pub fn acquire(&self) {
        self.capture.acquire();
    }

    pub fn release(&self) {
        self.capture.release();
    }

    pub fn set_target(&mut self, target: Option<TargetRef>) {
        self.target = target.clone();
        self.capture.set_target(target);
    }

    pub fn target(&self) -> Option<&TargetRef> {
        self.target.as_ref()
    }

    pub fn set_capture_mode(&self, mode: CaptureMode) {
        self.capture.set_mode(mode);
    }

    pub fn capture_mode(&self) -> CaptureMode {
        self.capture.snapshot().mode
    }

    pub fn toggle_capture_mode(&self) {
        let next = match self.capture_mode() {
            CaptureMode::Audio => CaptureMode::Video,
            CaptureMode::Video => CaptureMode::Audio,
        };
        self.set_capture_mode(next);
    }

    pub fn capture_state(&self) -> CaptureState {
        self.capture.state()
    }

    /// Elapsed time of the current or last stopped take
    pub fn elapsed(&self) -> Duration {
        self.capture.elapsed()
    }

    /// Handle to the capture state machine
    pub fn capture(&self) -> &CaptureHandle {
        &self.capture
    }

    /// Mix graph handle
    pub fn mix(&self) -> &MixHandle {
        &self.mix
    }

    /// Stop everything. The event channel closes once the capture machine exits.
    pub fn shutdown(&mut self) {
        if let Some(gamepad) = self.gamepad.take() {
            gamepad.stop();
        }
        self.engine.stop();
        self.capture.shutdown();
    }
}

impl Drop for Studio {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn forward_notices(mut notices: UnboundedReceiver<CaptureNotice>, events: UnboundedSender<StudioEvent>) {
    while let Some(notice) = notices.recv().await {
        let event = match notice {
            CaptureNotice::StateChanged(state) => StudioEvent::CaptureStateChanged(state),
            CaptureNotice::Error { kind, message } => StudioEvent::Error { kind, message },
            CaptureNotice::Saved { take, duration } => StudioEvent::Saved { take, duration },
        };
        if events.send(event).is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::MixGraph;
    use crate::error::CaptureError;
    use crate::library::MemoryLibrary;
    use crate::timing::ManualClock;

    struct NoDevices;

    impl MediaDevices for NoDevices {
        fn acquire_stream(&self, _mode: CaptureMode) -> Result<Box<dyn crate::capture::MediaStream>, CaptureError> {
            Err(CaptureError::DeviceAccessDenied("test".into()))
        }
    }

    fn studio() -> (Studio, UnboundedReceiver<StudioEvent>, Arc<MemoryLibrary>) {
        let library = Arc::new(MemoryLibrary::new());
        let clock = Arc::new(ManualClock::new(0.0));
        let (studio, events) = Studio::new(
            StudioConfig::default(),
            clock,
            MixHandle::new(MixGraph::new(48_000)),
            Arc::new(NoDevices),
            library.clone(),
        );
        (studio, events, library)
    }

    #[tokio::test]
    async fn test_set_metronome_validates() {
        let (mut studio, _events, _lib) = studio();
        let before = studio.settings();

        assert_eq!(studio.set_metronome(300.0, 4, 4, true, false), Err(TempoError::OutOfRange(300.0)));
        assert!(studio.set_metronome(120.0, 0, 4, true, false).is_err());
        assert!(studio.set_metronome(120.0, 3, 5, true, false).is_err());
        assert_eq!(studio.settings(), before);

        studio.set_metronome(90.0, 3, 4, false, true).unwrap();
        assert_eq!(studio.settings().tempo.bpm(), 90.0);
        assert_eq!(studio.settings().time_signature.beats_per_measure(), 3);
        assert!(!studio.settings().accent_first_beat);
        assert!(studio.record_into_take());
    }

    #[tokio::test]
    async fn test_adjust_tempo_clamps() {
        let (mut studio, _events, _lib) = studio();
        studio.set_metronome(215.0, 4, 4, true, false).unwrap();
        studio.adjust_tempo(10.0);
        assert_eq!(studio.settings().tempo.bpm(), 220.0);
    }

    #[tokio::test]
    async fn test_cycle_time_signature_wraps() {
        let (mut studio, _events, _lib) = studio();
        let mut seen = Vec::new();
        for _ in 0..SIGNATURE_CYCLE.len() {
            studio.cycle_time_signature();
            seen.push(studio.settings().time_signature.to_string());
        }
        assert_eq!(seen, vec!["3/4", "2/4", "6/8", "5/4", "7/8", "4/4"]);
    }

    #[tokio::test]
    async fn test_volume_is_clamped() {
        let (studio, _events, _lib) = studio();
        studio.set_volume(0.5);
        assert!((studio.volume() - 0.5).abs() < 1e-6);
        studio.adjust_volume(2.0);
        assert_eq!(studio.volume(), 1.0);
    }

    #[tokio::test]
    async fn test_save_tempo_default_reaches_library() {
        let (mut studio, _events, lib) = studio();
        studio.set_target(Some(TargetRef::new("etude")));
        studio.set_metronome(72.0, 6, 8, true, false).unwrap();
        studio.save_tempo_default().await.unwrap();

        let stored = lib.tempo_defaults();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].0, Some(TargetRef::new("etude")));
        assert_eq!(stored[0].1.bpm(), 72.0);
        assert_eq!(stored[0].2.to_string(), "6/8");
    }

    #[tokio::test]
    async fn test_denied_device_surfaces_error() {
        let (studio, mut events, _lib) = studio();
        assert!(studio.handle_key(KeyCode::PageUp));
        assert!(!studio.handle_key(KeyCode::Char('z')));

        let event = tokio::time::timeout(Duration::from_secs(5), events.recv()).await.unwrap().unwrap();
        match event {
            StudioEvent::Error { kind, .. } => assert_eq!(kind, ErrorKind::DeviceAccessDenied),
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(studio.capture_state(), CaptureState::Idle);
    }
}
