// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Capture sessions.
//!
//! One `CaptureSession` exists per recording attempt. It is owned by the
//! capture state machine alone and dropped on discard or after a save.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// What the capture stream records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureMode {
    #[default]
    Audio,
    Video,
}

impl fmt::Display for CaptureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureMode::Audio => write!(f, "audio"),
            CaptureMode::Video => write!(f, "video"),
        }
    }
}

/// Capture state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureState {
    /// No stream acquired
    #[default]
    Idle,
    /// Stream acquired, not recording
    Ready,
    /// Pipeline running
    Recording,
    /// Take finalized, awaiting accept or discard
    Stopped,
    /// Take handed to the library
    Saved,
}

impl CaptureState {
    /// Short display name
    pub fn name(&self) -> &'static str {
        match self {
            CaptureState::Idle => "Idle",
            CaptureState::Ready => "Ready",
            CaptureState::Recording => "Recording",
            CaptureState::Stopped => "Stopped",
            CaptureState::Saved => "Saved",
        }
    }
}

impl fmt::Display for CaptureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Identifies one recording attempt; pipeline events carry it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    /// First id handed out by a state machine
    pub fn first() -> Self {
        SessionId(1)
    }

    /// The id after this one
    pub fn next(self) -> Self {
        SessionId(self.0 + 1)
    }

    /// Raw value
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Finalized take bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TakeBlob {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// A single recording attempt
#[derive(Debug)]
pub struct CaptureSession {
    id: SessionId,
    mode: CaptureMode,
    status: CaptureState,
    mime_type: String,
    started_at: Instant,
    stopped_at: Option<Instant>,
    chunks: Vec<Vec<u8>>,
    result: Option<TakeBlob>,
}

impl CaptureSession {
    /// Start a session that records with `mime_type`
    pub fn new(id: SessionId, mode: CaptureMode, mime_type: impl Into<String>, started_at: Instant) -> Self {
        Self {
            id,
            mode,
            status: CaptureState::Recording,
            mime_type: mime_type.into(),
            started_at,
            stopped_at: None,
            chunks: Vec::new(),
            result: None,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn mode(&self) -> CaptureMode {
        self.mode
    }

    pub fn status(&self) -> CaptureState {
        self.status
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Append one timesliced chunk
    pub fn push_chunk(&mut self, bytes: Vec<u8>) {
        if self.status == CaptureState::Recording && !bytes.is_empty() {
            self.chunks.push(bytes);
        }
    }

    /// Number of chunks received so far
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Stop elapsed-time tracking. Later calls keep the first stop time.
    pub fn mark_stopped(&mut self, at: Instant) {
        if self.stopped_at.is_none() {
            self.stopped_at = Some(at);
        }
    }

    /// Whether a stop has been requested
    pub fn is_stopping(&self) -> bool {
        self.stopped_at.is_some()
    }

    /// Recording time up to `now`, or up to the stop if there was one
    pub fn elapsed(&self, now: Instant) -> Duration {
        let end = self.stopped_at.unwrap_or(now);
        end.saturating_duration_since(self.started_at)
    }

    /// Take length; zero until stopped
    pub fn duration(&self) -> Duration {
        self.stopped_at
            .map(|end| end.saturating_duration_since(self.started_at))
            .unwrap_or_default()
    }

    /// Store the pipeline's terminal blob
    pub fn finalize(&mut self, bytes: Vec<u8>, mime_type: impl Into<String>) {
        let mut mime_type = mime_type.into();
        if mime_type.is_empty() {
            mime_type = self.mime_type.clone();
        }
        self.chunks.clear();
        self.result = Some(TakeBlob { bytes, mime_type });
        self.status = CaptureState::Stopped;
    }

    /// Finalize from the chunks gathered so far
    pub fn finalize_best_effort(&mut self) {
        let bytes = self.chunks.concat();
        let mime_type = self.mime_type.clone();
        self.finalize(bytes, mime_type);
    }

    /// The finalized take, if any
    pub fn result(&self) -> Option<&TakeBlob> {
        self.result.as_ref()
    }

    /// Move the finalized take out of the session
    pub fn take_result(&mut self) -> Option<TakeBlob> {
        self.result.take()
    }

    /// Put a take back after a failed save
    pub fn restore_result(&mut self, blob: TakeBlob) {
        self.result = Some(blob);
    }

    /// Mark the session handed off
    pub fn mark_saved(&mut self) {
        self.status = CaptureState::Saved;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> CaptureSession {
        CaptureSession::new(SessionId::first(), CaptureMode::Audio, "audio/wav", Instant::now())
    }

    #[test]
    fn test_session_ids_increase() {
        let a = SessionId::first();
        let b = a.next();
        assert!(b > a);
        assert_eq!(b.value(), 2);
        assert_eq!(b.to_string(), "#2");
    }

    #[test]
    fn test_chunks_concatenate_in_order() {
        let mut s = session();
        s.push_chunk(vec![1, 2]);
        s.push_chunk(Vec::new());
        s.push_chunk(vec![3]);
        assert_eq!(s.chunk_count(), 2);

        s.finalize_best_effort();
        let blob = s.result().unwrap();
        assert_eq!(blob.bytes, vec![1, 2, 3]);
        assert_eq!(blob.mime_type, "audio/wav");
        assert_eq!(s.status(), CaptureState::Stopped);
    }

    #[test]
    fn test_no_chunks_after_finalize() {
        let mut s = session();
        s.finalize(vec![9], "");
        s.push_chunk(vec![1]);
        assert_eq!(s.chunk_count(), 0);
        assert_eq!(s.result().unwrap().mime_type, "audio/wav");
    }

    #[test]
    fn test_duration_freezes_at_stop() {
        let start = Instant::now();
        let mut s = CaptureSession::new(SessionId::first(), CaptureMode::Audio, "audio/wav", start);
        assert_eq!(s.duration(), Duration::ZERO);

        s.mark_stopped(start + Duration::from_secs(3));
        s.mark_stopped(start + Duration::from_secs(5));
        assert_eq!(s.duration(), Duration::from_secs(3));
        assert_eq!(s.elapsed(start + Duration::from_secs(10)), Duration::from_secs(3));
    }

    #[test]
    fn test_take_and_restore_result() {
        let mut s = session();
        s.finalize(vec![1, 2, 3], "audio/ogg");
        let blob = s.take_result().unwrap();
        assert!(s.result().is_none());
        s.restore_result(blob);
        assert_eq!(s.result().unwrap().bytes.len(), 3);
    }

    #[test]
    fn test_mode_serde_names() {
        let mode: CaptureMode = serde_yaml::from_str("video").unwrap();
        assert_eq!(mode, CaptureMode::Video);
        assert_eq!(CaptureMode::Audio.to_string(), "audio");
    }
}
