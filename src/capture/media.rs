// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Platform media-capture interfaces.
//!
//! A [`MediaDevices`] hands out streams; a [`MediaStream`] builds capture
//! pipelines for a mime type; a [`CapturePipeline`] reports back through
//! [`PipelineEvents`], which feeds the capture state machine's inbox.

use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use super::machine::MachineInput;
use super::session::{CaptureMode, SessionId};
use crate::error::CaptureError;

/// Encoder preference for audio takes, best first. `""` is the platform default.
pub const AUDIO_MIME_PREFERENCES: &[&str] = &[
    "audio/webm;codecs=opus",
    "audio/ogg;codecs=opus",
    "audio/wav",
    "",
];

/// Encoder preference for video takes, best first
pub const VIDEO_MIME_PREFERENCES: &[&str] = &[
    "video/webm;codecs=vp9,opus",
    "video/webm;codecs=vp8,opus",
    "video/mp4",
    "",
];

/// Preference list for a capture mode
pub fn mime_preferences(mode: CaptureMode) -> &'static [&'static str] {
    match mode {
        CaptureMode::Audio => AUDIO_MIME_PREFERENCES,
        CaptureMode::Video => VIDEO_MIME_PREFERENCES,
    }
}

/// Source of capture streams
pub trait MediaDevices: Send + Sync {
    /// Acquire a stream for `mode`
    fn acquire_stream(&self, mode: CaptureMode) -> Result<Box<dyn MediaStream>, CaptureError>;
}

/// An acquired capture stream
pub trait MediaStream: Send {
    /// False once every track has ended
    fn has_active_tracks(&self) -> bool;

    /// Whether a pipeline can encode `mime_type`
    fn supports(&self, mime_type: &str) -> bool;

    /// Build a pipeline that reports through `events`
    fn create_pipeline(
        &mut self,
        mime_type: &str,
        events: PipelineEvents,
    ) -> Result<Box<dyn CapturePipeline>, CaptureError>;

    /// Stop every track
    fn stop(&mut self);
}

/// An encoder over a stream
pub trait CapturePipeline: Send {
    /// Mime type this pipeline produces
    fn mime_type(&self) -> &str;

    /// Begin encoding, emitting a chunk every `interval`
    fn start(&mut self, interval: Duration) -> Result<(), CaptureError>;

    /// Request finalization. The terminal blob arrives later as
    /// [`PipelineEvent::Finalized`].
    fn stop(&mut self);
}

/// Asynchronous pipeline callbacks
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// One timesliced chunk
    DataAvailable(Vec<u8>),
    /// Terminal callback after `stop`
    Finalized { blob: Vec<u8>, mime_type: String },
    /// Encoder or device failure
    Failed(String),
    /// All tracks of the stream ended
    TracksEnded,
}

/// Sender half given to a pipeline; tags every event with its session
#[derive(Debug, Clone)]
pub struct PipelineEvents {
    session: SessionId,
    inbox: UnboundedSender<MachineInput>,
}

impl PipelineEvents {
    pub(crate) fn new(session: SessionId, inbox: UnboundedSender<MachineInput>) -> Self {
        Self { session, inbox }
    }

    /// Session these events belong to
    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Deliver an event; false when the state machine has shut down
    pub fn send(&self, event: PipelineEvent) -> bool {
        self.inbox
            .send(MachineInput::Pipeline {
                session: self.session,
                event,
            })
            .is_ok()
    }

    pub fn data_available(&self, bytes: Vec<u8>) -> bool {
        self.send(PipelineEvent::DataAvailable(bytes))
    }

    pub fn finalized(&self, blob: Vec<u8>, mime_type: impl Into<String>) -> bool {
        self.send(PipelineEvent::Finalized {
            blob,
            mime_type: mime_type.into(),
        })
    }

    pub fn failed(&self, message: impl Into<String>) -> bool {
        self.send(PipelineEvent::Failed(message.into()))
    }

    pub fn tracks_ended(&self) -> bool {
        self.send(PipelineEvent::TracksEnded)
    }
}

/// Build a pipeline from the first mime type in the mode's preference list
/// the stream accepts.
///
/// Fails with `EncoderUnavailable` only after every candidate was rejected.
pub fn open_pipeline(
    stream: &mut dyn MediaStream,
    mode: CaptureMode,
    events: PipelineEvents,
) -> Result<Box<dyn CapturePipeline>, CaptureError> {
    let mut tried = Vec::new();

    for mime in mime_preferences(mode) {
        let label = if mime.is_empty() { "platform default" } else { mime };
        tried.push(label.to_string());

        if !stream.supports(mime) {
            continue;
        }
        match stream.create_pipeline(mime, events.clone()) {
            Ok(pipeline) => {
                debug!(mime = %label, session = %events.session(), "capture pipeline created");
                return Ok(pipeline);
            }
            Err(e) => debug!(mime = %label, "encoder rejected: {}", e),
        }
    }

    Err(CaptureError::EncoderUnavailable { tried })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    struct StubPipeline(String);

    impl CapturePipeline for StubPipeline {
        fn mime_type(&self) -> &str {
            &self.0
        }
        fn start(&mut self, _interval: Duration) -> Result<(), CaptureError> {
            Ok(())
        }
        fn stop(&mut self) {}
    }

    /// Claims support for `supported` but fails to build anything in `broken`
    struct StubStream {
        supported: Vec<&'static str>,
        broken: Vec<&'static str>,
    }

    impl MediaStream for StubStream {
        fn has_active_tracks(&self) -> bool {
            true
        }
        fn supports(&self, mime_type: &str) -> bool {
            self.supported.contains(&mime_type)
        }
        fn create_pipeline(
            &mut self,
            mime_type: &str,
            _events: PipelineEvents,
        ) -> Result<Box<dyn CapturePipeline>, CaptureError> {
            if self.broken.contains(&mime_type) {
                return Err(CaptureError::PipelineFailure("broken".into()));
            }
            Ok(Box::new(StubPipeline(mime_type.to_string())))
        }
        fn stop(&mut self) {}
    }

    fn events() -> (PipelineEvents, mpsc::UnboundedReceiver<MachineInput>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (PipelineEvents::new(SessionId::first(), tx), rx)
    }

    #[test]
    fn test_prefers_first_supported() {
        let mut stream = StubStream {
            supported: vec!["audio/ogg;codecs=opus", "audio/wav"],
            broken: vec![],
        };
        let (ev, _rx) = events();
        let pipeline = open_pipeline(&mut stream, CaptureMode::Audio, ev).unwrap();
        assert_eq!(pipeline.mime_type(), "audio/ogg;codecs=opus");
    }

    #[test]
    fn test_falls_back_when_construction_fails() {
        let mut stream = StubStream {
            supported: vec!["audio/webm;codecs=opus", ""],
            broken: vec!["audio/webm;codecs=opus"],
        };
        let (ev, _rx) = events();
        let pipeline = open_pipeline(&mut stream, CaptureMode::Audio, ev).unwrap();
        assert_eq!(pipeline.mime_type(), "");
    }

    #[test]
    fn test_encoder_unavailable_lists_candidates() {
        let mut stream = StubStream {
            supported: vec![],
            broken: vec![],
        };
        let (ev, _rx) = events();
        let err = open_pipeline(&mut stream, CaptureMode::Video, ev).err().unwrap();
        match err {
            CaptureError::EncoderUnavailable { tried } => {
                assert_eq!(tried.len(), VIDEO_MIME_PREFERENCES.len());
                assert_eq!(tried.last().map(String::as_str), Some("platform default"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_events_are_tagged() {
        let (ev, mut rx) = events();
        assert!(ev.data_available(vec![1, 2]));
        assert!(ev.finalized(vec![3], "audio/wav"));

        match rx.try_recv().unwrap() {
            MachineInput::Pipeline { session, event } => {
                assert_eq!(session, SessionId::first());
                assert_eq!(event, PipelineEvent::DataAvailable(vec![1, 2]));
            }
            _ => panic!("expected pipeline input"),
        }
        assert!(matches!(
            rx.try_recv().unwrap(),
            MachineInput::Pipeline {
                event: PipelineEvent::Finalized { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_send_after_shutdown() {
        let (ev, rx) = events();
        drop(rx);
        assert!(!ev.tracks_ended());
    }
}
