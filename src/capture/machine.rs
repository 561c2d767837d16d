// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Capture state machine.
//!
//! A single task owns the stream, the active pipeline and the session. Pedal
//! actions, settings changes and pipeline callbacks all arrive on one ordered
//! inbox and are handled one at a time to completion.
//!
//! While a stopped pipeline has not delivered its terminal blob, pedal
//! actions are deferred. They are replayed in order once the blob arrives or
//! the finalize timeout expires, so a new take never overlaps the previous
//! pipeline.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use super::media::{open_pipeline, CapturePipeline, MediaDevices, MediaStream, PipelineEvent, PipelineEvents};
use super::session::{CaptureMode, CaptureSession, CaptureState, SessionId, TakeBlob};
use crate::audio::{MixHandle, MixRoute};
use crate::error::{CaptureError, ErrorKind};
use crate::library::{FinishedTake, SessionLibrary, TakeId, TargetRef};

/// Capture tuning
#[derive(Debug, Clone, PartialEq)]
pub struct MachineConfig {
    /// Audio or video takes
    pub mode: CaptureMode,
    /// Pipeline timeslice
    pub chunk_interval: Duration,
    /// How long a stopped pipeline may take to deliver its blob
    pub finalize_timeout: Duration,
    /// A left action this soon after a take started is ignored
    pub retrigger_guard: Duration,
    /// Mix the metronome into the take
    pub record_into_take: bool,
    /// Where saved takes belong
    pub target: Option<TargetRef>,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            mode: CaptureMode::Audio,
            chunk_interval: Duration::from_millis(1000),
            finalize_timeout: Duration::from_millis(3000),
            retrigger_guard: Duration::from_millis(300),
            record_into_take: false,
            target: None,
        }
    }
}

/// Everything the state machine reacts to
#[derive(Debug)]
pub enum MachineInput {
    /// Left pedal: acquire, record, or discard
    Left,
    /// Right pedal: stop or accept
    Right,
    /// Acquire the capture stream
    Acquire,
    /// Drop any session and release the stream
    Release,
    SetMode(CaptureMode),
    SetRecordIntoTake(bool),
    SetTarget(Option<TargetRef>),
    /// Callback from the pipeline of `session`
    Pipeline {
        session: SessionId,
        event: PipelineEvent,
    },
    Shutdown,
}

/// Notifications for the UI
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureNotice {
    StateChanged(CaptureState),
    Error { kind: ErrorKind, message: String },
    Saved { take: TakeId, duration: Duration },
}

/// Observable state, published after every input
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureSnapshot {
    pub state: CaptureState,
    pub mode: CaptureMode,
    pub record_into_take: bool,
    pub target: Option<TargetRef>,
    /// Set while the elapsed-time display is running
    pub recording_since: Option<Instant>,
    /// Length of the last stopped take; zero after a discard
    pub last_duration: Duration,
    /// A stopped pipeline has not delivered its blob yet
    pub finalizing: bool,
}

impl CaptureSnapshot {
    fn new(config: &MachineConfig) -> Self {
        Self {
            state: CaptureState::Idle,
            mode: config.mode,
            record_into_take: config.record_into_take,
            target: config.target.clone(),
            recording_since: None,
            last_duration: Duration::ZERO,
            finalizing: false,
        }
    }

    /// Elapsed recording time as of `now`
    pub fn elapsed(&self, now: Instant) -> Duration {
        match self.recording_since {
            Some(since) => now.saturating_duration_since(since),
            None => self.last_duration,
        }
    }
}

/// Cloneable front door to a running state machine
#[derive(Debug, Clone)]
pub struct CaptureHandle {
    inbox: mpsc::UnboundedSender<MachineInput>,
    snapshot: watch::Receiver<CaptureSnapshot>,
}

impl CaptureHandle {
    /// Queue an input; false once the machine has exited
    pub fn send(&self, input: MachineInput) -> bool {
        self.inbox.send(input).is_ok()
    }

    pub fn left(&self) -> bool {
        self.send(MachineInput::Left)
    }

    pub fn right(&self) -> bool {
        self.send(MachineInput::Right)
    }

    pub fn acquire(&self) -> bool {
        self.send(MachineInput::Acquire)
    }

    pub fn release(&self) -> bool {
        self.send(MachineInput::Release)
    }

    pub fn set_mode(&self, mode: CaptureMode) -> bool {
        self.send(MachineInput::SetMode(mode))
    }

    pub fn set_record_into_take(&self, enabled: bool) -> bool {
        self.send(MachineInput::SetRecordIntoTake(enabled))
    }

    pub fn set_target(&self, target: Option<TargetRef>) -> bool {
        self.send(MachineInput::SetTarget(target))
    }

    pub fn shutdown(&self) -> bool {
        self.send(MachineInput::Shutdown)
    }

    /// Latest published state
    pub fn state(&self) -> CaptureState {
        self.snapshot.borrow().state
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> CaptureSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Elapsed time of the current (or last stopped) take
    pub fn elapsed(&self) -> Duration {
        self.snapshot.borrow().elapsed(Instant::now())
    }

    /// Watch snapshots as they are published
    pub fn subscribe(&self) -> watch::Receiver<CaptureSnapshot> {
        self.snapshot.clone()
    }
}

/// A stopped pipeline awaiting its terminal callback
struct PendingFinalize {
    session: SessionId,
    deadline: Instant,
    /// False when the take was discarded while recording
    keep: bool,
    _pipeline: Box<dyn CapturePipeline>,
}

/// The capture state machine task
pub struct CaptureMachine {
    config: MachineConfig,
    devices: Arc<dyn MediaDevices>,
    library: Arc<dyn SessionLibrary>,
    mix: MixHandle,
    inbox: mpsc::UnboundedSender<MachineInput>,
    notices: mpsc::UnboundedSender<CaptureNotice>,
    snapshot: watch::Sender<CaptureSnapshot>,
    state: CaptureState,
    stream: Option<Box<dyn MediaStream>>,
    pipeline: Option<Box<dyn CapturePipeline>>,
    session: Option<CaptureSession>,
    next_session: SessionId,
    pending: Option<PendingFinalize>,
    deferred: VecDeque<MachineInput>,
    last_duration: Duration,
}

impl CaptureMachine {
    /// Spawn the machine on the current tokio runtime
    pub fn spawn(
        config: MachineConfig,
        devices: Arc<dyn MediaDevices>,
        library: Arc<dyn SessionLibrary>,
        mix: MixHandle,
    ) -> (CaptureHandle, mpsc::UnboundedReceiver<CaptureNotice>, JoinHandle<()>) {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let (notice_tx, notice_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(CaptureSnapshot::new(&config));

        let machine = CaptureMachine {
            config,
            devices,
            library,
            mix,
            inbox: inbox_tx.clone(),
            notices: notice_tx,
            snapshot: snapshot_tx,
            state: CaptureState::Idle,
            stream: None,
            pipeline: None,
            session: None,
            next_session: SessionId::first(),
            pending: None,
            deferred: VecDeque::new(),
            last_duration: Duration::ZERO,
        };

        let task = tokio::spawn(machine.run(inbox_rx));
        let handle = CaptureHandle {
            inbox: inbox_tx,
            snapshot: snapshot_rx,
        };
        (handle, notice_rx, task)
    }

    async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<MachineInput>) {
        loop {
            if self.pending.is_none() {
                if let Some(input) = self.deferred.pop_front() {
                    if !self.handle(input).await {
                        break;
                    }
                    continue;
                }
            }

            let input = match self.pending.as_ref().map(|p| p.deadline) {
                Some(deadline) => tokio::select! {
                    input = inbox.recv() => input,
                    _ = sleep_until(deadline) => {
                        self.finalize_timed_out();
                        continue;
                    }
                },
                None => inbox.recv().await,
            };

            let Some(input) = input else { break };
            if !self.handle(input).await {
                break;
            }
        }

        self.teardown();
        debug!("capture state machine stopped");
    }

    /// Handle one input. Returns false on shutdown.
    async fn handle(&mut self, input: MachineInput) -> bool {
        match input {
            MachineInput::Shutdown => return false,
            MachineInput::Pipeline { session, event } => self.on_pipeline_event(session, event),
            MachineInput::SetMode(mode) => {
                if self.config.mode != mode {
                    self.config.mode = mode;
                    // A stream is tied to its mode
                    if matches!(self.state, CaptureState::Ready) {
                        self.release_stream();
                        self.set_state(CaptureState::Idle);
                    }
                }
            }
            MachineInput::SetRecordIntoTake(enabled) => self.config.record_into_take = enabled,
            MachineInput::SetTarget(target) => self.config.target = target,
            input @ (MachineInput::Left
            | MachineInput::Right
            | MachineInput::Acquire
            | MachineInput::Release) => {
                if self.pending.is_some() {
                    debug!(?input, "deferred until the pipeline finalizes");
                    self.deferred.push_back(input);
                } else {
                    match input {
                        MachineInput::Left => self.on_left(),
                        MachineInput::Right => self.on_right().await,
                        MachineInput::Acquire => {
                            if self.state == CaptureState::Idle {
                                self.acquire();
                            }
                        }
                        _ => self.release(),
                    }
                }
            }
        }
        self.publish();
        true
    }

    fn on_left(&mut self) {
        match self.state {
            CaptureState::Idle => self.acquire(),
            CaptureState::Ready | CaptureState::Saved => self.start_recording(),
            CaptureState::Recording => self.discard_recording(),
            CaptureState::Stopped => {
                if let Some(session) = self.session.take() {
                    info!(session = %session.id(), "take discarded");
                }
                self.last_duration = Duration::ZERO;
                self.settle();
            }
        }
    }

    async fn on_right(&mut self) {
        match self.state {
            CaptureState::Idle | CaptureState::Ready | CaptureState::Saved => {}
            CaptureState::Recording => self.stop_recording(),
            CaptureState::Stopped => self.save().await,
        }
    }

    fn acquire(&mut self) {
        match self.devices.acquire_stream(self.config.mode) {
            Ok(stream) => {
                info!(mode = %self.config.mode, "capture stream acquired");
                self.stream = Some(stream);
                self.set_state(CaptureState::Ready);
            }
            Err(e) => self.report(e),
        }
    }

    fn release(&mut self) {
        if let Some(mut pipeline) = self.pipeline.take() {
            pipeline.stop();
        }
        self.session = None;
        self.last_duration = Duration::ZERO;
        self.reset_mix();
        self.release_stream();
        self.set_state(CaptureState::Idle);
    }

    fn start_recording(&mut self) {
        let Some(stream) = self.stream.as_mut() else {
            self.set_state(CaptureState::Idle);
            return;
        };
        if !stream.has_active_tracks() {
            self.report(CaptureError::NoActiveTracks);
            self.release_stream();
            self.set_state(CaptureState::Idle);
            return;
        }

        let id = self.next_session;
        self.next_session = id.next();
        let events = PipelineEvents::new(id, self.inbox.clone());

        let mut pipeline = match open_pipeline(&mut **stream, self.config.mode, events) {
            Ok(p) => p,
            Err(e) => {
                self.report(e);
                return;
            }
        };

        let route = if self.config.record_into_take {
            MixRoute::MonitorAndRecord
        } else {
            MixRoute::MonitorOnly
        };
        self.mix.mute_monitor(true);
        self.mix.set_record_route(route);

        if let Err(e) = pipeline.start(self.config.chunk_interval) {
            self.reset_mix();
            self.report(e);
            return;
        }

        let session = CaptureSession::new(id, self.config.mode, pipeline.mime_type(), Instant::now());
        info!(session = %id, mime = %pipeline.mime_type(), ?route, "recording started");
        self.session = Some(session);
        self.pipeline = Some(pipeline);
        self.last_duration = Duration::ZERO;
        self.set_state(CaptureState::Recording);
    }

    fn discard_recording(&mut self) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        // Stopping the pedal bounce from killing a take that just started
        if session.elapsed(Instant::now()) < self.config.retrigger_guard {
            debug!(session = %session.id(), "left action ignored inside re-trigger guard");
            return;
        }

        let id = session.id();
        self.session = None;
        if let Some(mut pipeline) = self.pipeline.take() {
            pipeline.stop();
            self.pending = Some(PendingFinalize {
                session: id,
                deadline: Instant::now() + self.config.finalize_timeout,
                keep: false,
                _pipeline: pipeline,
            });
        }
        self.reset_mix();
        self.last_duration = Duration::ZERO;
        info!(session = %id, "recording discarded");
        self.settle();
    }

    fn stop_recording(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.is_stopping() {
            return;
        }
        session.mark_stopped(Instant::now());
        self.last_duration = session.duration();
        let id = session.id();

        self.reset_mix();
        if let Some(mut pipeline) = self.pipeline.take() {
            pipeline.stop();
            self.pending = Some(PendingFinalize {
                session: id,
                deadline: Instant::now() + self.config.finalize_timeout,
                keep: true,
                _pipeline: pipeline,
            });
        }
        debug!(session = %id, "stop requested, awaiting terminal blob");
    }

    async fn save(&mut self) {
        let Some(session) = self.session.as_mut() else {
            self.settle();
            return;
        };
        let Some(blob) = session.take_result() else {
            self.report(CaptureError::PersistFailure("no finalized take".into()));
            return;
        };

        let duration = session.duration();
        let take = FinishedTake {
            blob: blob.bytes,
            mime_type: blob.mime_type,
            duration,
            target: self.config.target.clone(),
        };
        let library = Arc::clone(&self.library);
        let outcome = tokio::task::spawn_blocking(move || {
            let result = library.save_finished_take(&take);
            (take, result)
        })
        .await;

        match outcome {
            Ok((_, Ok(take_id))) => {
                if let Some(session) = self.session.as_mut() {
                    session.mark_saved();
                }
                self.session = None;
                self.set_state(CaptureState::Saved);
                self.notify(CaptureNotice::Saved {
                    take: take_id,
                    duration,
                });
                self.last_duration = Duration::ZERO;
                self.settle();
            }
            Ok((take, Err(e))) => {
                if let Some(session) = self.session.as_mut() {
                    session.restore_result(TakeBlob {
                        bytes: take.blob,
                        mime_type: take.mime_type,
                    });
                }
                self.report(CaptureError::PersistFailure(format!("{:#}", e)));
            }
            Err(e) => self.report(CaptureError::PersistFailure(e.to_string())),
        }
    }

    fn on_pipeline_event(&mut self, id: SessionId, event: PipelineEvent) {
        let pending = self.pending.as_ref().filter(|p| p.session == id).map(|p| p.keep);
        let current = self.session.as_ref().is_some_and(|s| s.id() == id);

        match (pending, event) {
            // Late callbacks of a discarded take
            (Some(false), event) => {
                if !matches!(event, PipelineEvent::DataAvailable(_)) {
                    debug!(session = %id, "discarded pipeline settled");
                    self.pending = None;
                }
            }
            (Some(true), PipelineEvent::DataAvailable(bytes)) => self.push_chunk(bytes),
            (Some(true), PipelineEvent::Finalized { blob, mime_type }) => {
                self.pending = None;
                if let Some(session) = self.session.as_mut() {
                    session.finalize(blob, mime_type);
                    info!(session = %id, bytes = session.result().map_or(0, |b| b.bytes.len()), "take finalized");
                }
                self.set_state(CaptureState::Stopped);
            }
            (Some(true), PipelineEvent::Failed(message)) => {
                self.pending = None;
                self.force_stop(CaptureError::PipelineFailure(message));
            }
            (Some(true), PipelineEvent::TracksEnded) => {
                self.pending = None;
                self.release_stream();
                self.force_stop(CaptureError::NoActiveTracks);
            }
            (None, event) if current && self.state == CaptureState::Recording => match event {
                PipelineEvent::DataAvailable(bytes) => self.push_chunk(bytes),
                PipelineEvent::Finalized { blob, mime_type } => {
                    self.pipeline = None;
                    self.reset_mix();
                    if let Some(session) = self.session.as_mut() {
                        session.mark_stopped(Instant::now());
                        self.last_duration = session.duration();
                        session.finalize(blob, mime_type);
                    }
                    self.set_state(CaptureState::Stopped);
                }
                PipelineEvent::Failed(message) => {
                    self.stop_pipeline();
                    self.force_stop(CaptureError::PipelineFailure(message));
                }
                PipelineEvent::TracksEnded => {
                    self.stop_pipeline();
                    self.release_stream();
                    self.force_stop(CaptureError::NoActiveTracks);
                }
            },
            (None, event) => debug!(session = %id, ?event, "stale pipeline event ignored"),
        }
    }

    fn finalize_timed_out(&mut self) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        if pending.keep {
            self.force_stop(CaptureError::FinalizeTimeout(self.config.finalize_timeout));
        } else {
            warn!(session = %pending.session, "discarded pipeline never finalized");
        }
        self.publish();
    }

    /// Move the current session to `Stopped` with whatever chunks arrived
    fn force_stop(&mut self, error: CaptureError) {
        self.reset_mix();
        if let Some(session) = self.session.as_mut() {
            session.mark_stopped(Instant::now());
            self.last_duration = session.duration();
            session.finalize_best_effort();
            warn!(session = %session.id(), chunks_bytes = session.result().map_or(0, |b| b.bytes.len()), "take force-finalized");
        }
        self.set_state(CaptureState::Stopped);
        self.report(error);
    }

    fn push_chunk(&mut self, bytes: Vec<u8>) {
        if let Some(session) = self.session.as_mut() {
            session.push_chunk(bytes);
        }
    }

    fn stop_pipeline(&mut self) {
        if let Some(mut pipeline) = self.pipeline.take() {
            pipeline.stop();
        }
    }

    /// Ready if the stream is still live, Idle otherwise
    fn settle(&mut self) {
        let live = self.stream.as_ref().is_some_and(|s| s.has_active_tracks());
        if live {
            self.set_state(CaptureState::Ready);
        } else {
            self.release_stream();
            self.set_state(CaptureState::Idle);
        }
    }

    fn release_stream(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
            debug!("capture stream released");
        }
    }

    fn reset_mix(&self) {
        self.mix.set_record_route(MixRoute::MonitorOnly);
        self.mix.mute_monitor(false);
    }

    fn set_state(&mut self, state: CaptureState) {
        if self.state != state {
            debug!(from = %self.state, to = %state, "capture state");
            self.state = state;
            self.notify(CaptureNotice::StateChanged(state));
        }
        self.publish();
    }

    fn report(&self, error: CaptureError) {
        warn!(kind = ?error.kind(), "{}", error);
        self.notify(CaptureNotice::Error {
            kind: error.kind(),
            message: error.to_string(),
        });
    }

    fn notify(&self, notice: CaptureNotice) {
        let _ = self.notices.send(notice);
    }

    fn publish(&self) {
        let recording = self.state == CaptureState::Recording
            && self.session.as_ref().is_some_and(|s| !s.is_stopping());
        let snapshot = CaptureSnapshot {
            state: self.state,
            mode: self.config.mode,
            record_into_take: self.config.record_into_take,
            target: self.config.target.clone(),
            recording_since: if recording {
                self.session.as_ref().map(|s| s.started_at())
            } else {
                None
            },
            last_duration: self.last_duration,
            finalizing: self.pending.is_some(),
        };
        self.snapshot.send_replace(snapshot);
    }

    fn teardown(&mut self) {
        self.stop_pipeline();
        self.pending = None;
        self.session = None;
        self.reset_mix();
        self.release_stream();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::MixGraph;
    use crate::library::MemoryLibrary;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Shared {
        events: Option<PipelineEvents>,
        stops: usize,
        pipelines: usize,
    }

    struct FakePipeline {
        shared: Arc<Mutex<Shared>>,
        auto_finalize: bool,
        events: PipelineEvents,
    }

    impl CapturePipeline for FakePipeline {
        fn mime_type(&self) -> &str {
            "audio/wav"
        }
        fn start(&mut self, _interval: Duration) -> Result<(), CaptureError> {
            Ok(())
        }
        fn stop(&mut self) {
            self.shared.lock().unwrap().stops += 1;
            if self.auto_finalize {
                self.events.finalized(vec![7; 16], "audio/wav");
            }
        }
    }

    struct FakeStream {
        shared: Arc<Mutex<Shared>>,
        auto_finalize: bool,
    }

    impl MediaStream for FakeStream {
        fn has_active_tracks(&self) -> bool {
            true
        }
        fn supports(&self, mime_type: &str) -> bool {
            mime_type == "audio/wav"
        }
        fn create_pipeline(
            &mut self,
            _mime_type: &str,
            events: PipelineEvents,
        ) -> Result<Box<dyn CapturePipeline>, CaptureError> {
            let mut shared = self.shared.lock().unwrap();
            shared.events = Some(events.clone());
            shared.pipelines += 1;
            Ok(Box::new(FakePipeline {
                shared: Arc::clone(&self.shared),
                auto_finalize: self.auto_finalize,
                events,
            }))
        }
        fn stop(&mut self) {}
    }

    struct FakeDevices {
        shared: Arc<Mutex<Shared>>,
        auto_finalize: bool,
        deny: bool,
    }

    impl MediaDevices for FakeDevices {
        fn acquire_stream(&self, _mode: CaptureMode) -> Result<Box<dyn MediaStream>, CaptureError> {
            if self.deny {
                return Err(CaptureError::DeviceAccessDenied("permission".into()));
            }
            Ok(Box::new(FakeStream {
                shared: Arc::clone(&self.shared),
                auto_finalize: self.auto_finalize,
            }))
        }
    }

    struct Rig {
        handle: CaptureHandle,
        notices: mpsc::UnboundedReceiver<CaptureNotice>,
        shared: Arc<Mutex<Shared>>,
        library: Arc<MemoryLibrary>,
        mix: MixHandle,
    }

    fn rig(auto_finalize: bool, deny: bool, config: MachineConfig) -> Rig {
        let shared = Arc::new(Mutex::new(Shared::default()));
        let devices = Arc::new(FakeDevices {
            shared: Arc::clone(&shared),
            auto_finalize,
            deny,
        });
        let library = Arc::new(MemoryLibrary::new());
        let mix = MixHandle::new(MixGraph::new(48_000));
        let (handle, notices, _task) =
            CaptureMachine::spawn(config, devices, library.clone(), mix.clone());
        Rig {
            handle,
            notices,
            shared,
            library,
            mix,
        }
    }

    fn no_guard() -> MachineConfig {
        MachineConfig {
            retrigger_guard: Duration::ZERO,
            ..Default::default()
        }
    }

    async fn next_notice(rig: &mut Rig) -> CaptureNotice {
        tokio::time::timeout(Duration::from_secs(10), rig.notices.recv())
            .await
            .expect("timed out waiting for notice")
            .expect("machine exited")
    }

    async fn expect_state(rig: &mut Rig, state: CaptureState) {
        loop {
            if let CaptureNotice::StateChanged(s) = next_notice(rig).await {
                assert_eq!(s, state);
                return;
            }
        }
    }

    #[tokio::test]
    async fn test_left_in_idle_acquires() {
        let mut rig = rig(true, false, no_guard());
        assert_eq!(rig.handle.state(), CaptureState::Idle);
        rig.handle.left();
        expect_state(&mut rig, CaptureState::Ready).await;
    }

    #[tokio::test]
    async fn test_right_in_idle_is_noop() {
        let mut rig = rig(true, false, no_guard());
        rig.handle.right();
        rig.handle.acquire();
        // First notice must come from the acquire, not the right action
        expect_state(&mut rig, CaptureState::Ready).await;
    }

    #[tokio::test]
    async fn test_access_denied_stays_idle() {
        let mut rig = rig(true, true, no_guard());
        rig.handle.left();
        match next_notice(&mut rig).await {
            CaptureNotice::Error { kind, .. } => assert_eq!(kind, ErrorKind::DeviceAccessDenied),
            other => panic!("unexpected notice {:?}", other),
        }
        assert_eq!(rig.handle.state(), CaptureState::Idle);
    }

    #[tokio::test]
    async fn test_recording_mutes_monitor_and_routes_click() {
        let config = MachineConfig {
            record_into_take: true,
            ..no_guard()
        };
        let mut rig = rig(true, false, config);
        rig.handle.acquire();
        expect_state(&mut rig, CaptureState::Ready).await;

        rig.handle.left();
        expect_state(&mut rig, CaptureState::Recording).await;
        assert!(rig.mix.is_monitor_muted());
        assert_eq!(rig.mix.record_route(), MixRoute::MonitorAndRecord);

        rig.handle.right();
        expect_state(&mut rig, CaptureState::Stopped).await;
        assert!(!rig.mix.is_monitor_muted());
        assert_eq!(rig.mix.record_route(), MixRoute::MonitorOnly);
    }

    #[tokio::test]
    async fn test_chunks_before_finalize_are_replaced_by_blob() {
        let mut rig = rig(true, false, no_guard());
        rig.handle.acquire();
        rig.handle.left();
        expect_state(&mut rig, CaptureState::Ready).await;
        expect_state(&mut rig, CaptureState::Recording).await;

        let events = rig.shared.lock().unwrap().events.clone().unwrap();
        events.data_available(vec![1, 2, 3]);
        rig.handle.right();
        expect_state(&mut rig, CaptureState::Stopped).await;

        rig.handle.right();
        expect_state(&mut rig, CaptureState::Saved).await;
        let takes = rig.library.takes();
        assert_eq!(takes.len(), 1);
        assert_eq!(takes[0].1.blob, vec![7; 16]);
    }

    #[tokio::test]
    async fn test_stale_events_are_ignored() {
        let mut rig = rig(true, false, no_guard());
        rig.handle.acquire();
        rig.handle.left();
        expect_state(&mut rig, CaptureState::Ready).await;
        expect_state(&mut rig, CaptureState::Recording).await;

        let stale_id = (0..50).fold(SessionId::first(), |id, _| id.next());
        let stale = PipelineEvents::new(stale_id, rig.handle.inbox.clone());
        stale.failed("not ours");
        rig.handle.right();
        expect_state(&mut rig, CaptureState::Stopped).await;
    }

    #[tokio::test]
    async fn test_pipeline_failure_forces_stopped() {
        let mut rig = rig(false, false, no_guard());
        rig.handle.acquire();
        rig.handle.left();
        expect_state(&mut rig, CaptureState::Ready).await;
        expect_state(&mut rig, CaptureState::Recording).await;

        let events = rig.shared.lock().unwrap().events.clone().unwrap();
        events.data_available(vec![5, 6]);
        events.failed("encoder crashed");

        expect_state(&mut rig, CaptureState::Stopped).await;
        match next_notice(&mut rig).await {
            CaptureNotice::Error { kind, .. } => assert_eq!(kind, ErrorKind::PipelineFailure),
            other => panic!("unexpected notice {:?}", other),
        }
        assert_eq!(rig.shared.lock().unwrap().stops, 1);

        rig.handle.right();
        expect_state(&mut rig, CaptureState::Saved).await;
        assert_eq!(rig.library.takes()[0].1.blob, vec![5, 6]);
    }

    #[tokio::test]
    async fn test_release_returns_to_idle() {
        let mut rig = rig(false, false, no_guard());
        rig.handle.acquire();
        rig.handle.left();
        expect_state(&mut rig, CaptureState::Ready).await;
        expect_state(&mut rig, CaptureState::Recording).await;

        rig.handle.release();
        expect_state(&mut rig, CaptureState::Idle).await;
        assert!(!rig.mix.is_monitor_muted());
        assert_eq!(rig.library.save_count(), 0);
    }

    #[tokio::test]
    async fn test_set_mode_drops_ready_stream() {
        let mut rig = rig(true, false, no_guard());
        rig.handle.acquire();
        expect_state(&mut rig, CaptureState::Ready).await;
        rig.handle.set_mode(CaptureMode::Video);
        expect_state(&mut rig, CaptureState::Idle).await;
        assert_eq!(rig.handle.snapshot().mode, CaptureMode::Video);
    }
}
