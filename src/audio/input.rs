// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Microphone capture via cpal.
//!
//! The input stream lives on its own thread. Every input block is mixed down
//! to mono, passed through the mix graph's record path (which adds the click
//! only when routed), and appended to the active take. Takes are encoded as
//! 16-bit mono WAV with hound.
//!
//! Input blocks are placed on the metronome clock by counting delivered
//! frames from an anchor taken when a take starts. Reading the clock in each
//! callback would move clicks by the callback jitter and the output block
//! size.

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SampleFormat, SizedSample, Stream};
use tracing::{debug, error, info};

use super::MixHandle;
use crate::capture::{CaptureMode, CapturePipeline, MediaDevices, MediaStream, PipelineEvents};
use crate::error::CaptureError;
use crate::timing::SharedClock;

const WAV_MIME: &str = "audio/wav";

/// cpal-backed media devices (audio only)
pub struct CpalDevices {
    mix: MixHandle,
    clock: SharedClock,
}

impl CpalDevices {
    /// `clock` must be the clock the metronome schedules against
    pub fn new(mix: MixHandle, clock: SharedClock) -> Self {
        Self { mix, clock }
    }
}

impl MediaDevices for CpalDevices {
    fn acquire_stream(&self, mode: CaptureMode) -> Result<Box<dyn MediaStream>, CaptureError> {
        match mode {
            CaptureMode::Audio => {
                let stream = CpalStream::open(self.mix.clone(), Arc::clone(&self.clock))?;
                Ok(Box::new(stream))
            }
            CaptureMode::Video => Err(CaptureError::DeviceAccessDenied(
                "no camera backend available".into(),
            )),
        }
    }
}

type Tap = Arc<Mutex<Option<Recorder>>>;

/// Clock position of microphone blocks
#[derive(Debug, Clone)]
struct InputTimeline {
    sample_rate: u32,
    anchor: Option<f64>,
    frames: u64,
}

impl InputTimeline {
    fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            anchor: None,
            frames: 0,
        }
    }

    /// Take a new anchor from the next callback
    fn reanchor(&mut self) {
        self.anchor = None;
    }

    /// Start time of a block of `frames` delivered when the clock reads `now`
    fn block_start(&mut self, now: f64, frames: usize) -> f64 {
        let sr = self.sample_rate as f64;
        let anchor = match self.anchor {
            Some(anchor) => anchor,
            None => {
                // The callback runs once the block has been captured
                let anchor = now - frames as f64 / sr;
                self.anchor = Some(anchor);
                self.frames = 0;
                anchor
            }
        };
        let start = anchor + self.frames as f64 / sr;
        self.frames += frames as u64;
        start
    }
}

/// Samples of the take in progress
struct Recorder {
    sample_rate: u32,
    /// Set until the input callback has re-anchored its timeline
    starting: bool,
    samples: Vec<f32>,
    /// Samples already sent as chunks
    emitted: usize,
    interval: Duration,
    last_emit: Instant,
    events: PipelineEvents,
}

impl Recorder {
    fn new(sample_rate: u32, interval: Duration, events: PipelineEvents) -> Self {
        Self {
            sample_rate,
            starting: true,
            samples: Vec::with_capacity(sample_rate as usize * 60),
            emitted: 0,
            interval,
            last_emit: Instant::now(),
            events,
        }
    }

    fn push(&mut self, block: &[f32]) {
        self.samples.extend_from_slice(block);
        if self.last_emit.elapsed() >= self.interval {
            self.emit_chunk();
        }
    }

    /// Send the samples gathered since the last chunk. The first chunk
    /// carries a streaming WAV header so concatenated chunks stay playable.
    fn emit_chunk(&mut self) {
        let pending = &self.samples[self.emitted..];
        if pending.is_empty() {
            return;
        }
        let mut bytes = Vec::with_capacity(pending.len() * 2 + 44);
        if self.emitted == 0 {
            bytes.extend_from_slice(&streaming_wav_header(self.sample_rate));
        }
        for s in pending {
            bytes.extend_from_slice(&to_i16(*s).to_le_bytes());
        }
        self.emitted = self.samples.len();
        self.last_emit = Instant::now();
        self.events.data_available(bytes);
    }
}

fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

/// 44-byte header for a 16-bit mono WAV of unknown length
fn streaming_wav_header(sample_rate: u32) -> [u8; 44] {
    let mut h = [0u8; 44];
    h[0..4].copy_from_slice(b"RIFF");
    h[4..8].copy_from_slice(&u32::MAX.to_le_bytes());
    h[8..12].copy_from_slice(b"WAVE");
    h[12..16].copy_from_slice(b"fmt ");
    h[16..20].copy_from_slice(&16u32.to_le_bytes());
    h[20..22].copy_from_slice(&1u16.to_le_bytes());
    h[22..24].copy_from_slice(&1u16.to_le_bytes());
    h[24..28].copy_from_slice(&sample_rate.to_le_bytes());
    h[28..32].copy_from_slice(&(sample_rate * 2).to_le_bytes());
    h[32..34].copy_from_slice(&2u16.to_le_bytes());
    h[34..36].copy_from_slice(&16u16.to_le_bytes());
    h[36..40].copy_from_slice(b"data");
    h[40..44].copy_from_slice(&(u32::MAX - 36).to_le_bytes());
    h
}

/// Encode a finished take and deliver it as the pipeline's terminal event
fn finalize_take(recorder: Recorder) {
    match encode_wav(&recorder.samples, recorder.sample_rate) {
        Ok(bytes) => {
            debug!(samples = recorder.samples.len(), "take encoded");
            recorder.events.finalized(bytes, WAV_MIME);
        }
        Err(e) => {
            recorder.events.failed(format!("wav encoding failed: {}", e));
        }
    }
}

/// Device loss ends the tracks; anything else is a pipeline failure
fn report_stream_error(events: &PipelineEvents, err: &cpal::StreamError) {
    match err {
        cpal::StreamError::DeviceNotAvailable => {
            events.tracks_ended();
        }
        other => {
            events.failed(other.to_string());
        }
    }
}

/// Encode mono samples as a 16-bit WAV file
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, hound::Error> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for s in samples {
            writer.write_sample(to_i16(*s))?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

/// Open microphone stream
pub struct CpalStream {
    tap: Tap,
    failed: Arc<AtomicBool>,
    sample_rate: u32,
    stop_tx: Option<mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl CpalStream {
    fn open(mix: MixHandle, clock: SharedClock) -> Result<Self, CaptureError> {
        let tap: Tap = Arc::new(Mutex::new(None));
        let failed = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let thread_tap = Arc::clone(&tap);
        let thread_failed = Arc::clone(&failed);
        let thread = thread::Builder::new()
            .name("mic-input".into())
            .spawn(move || match build_input_stream(thread_tap, thread_failed, mix, clock) {
                Ok((stream, sample_rate)) => {
                    let _ = ready_tx.send(Ok(sample_rate));
                    // Keep the stream alive until stop
                    let _ = stop_rx.recv();
                    drop(stream);
                    debug!("microphone stream closed");
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            })
            .map_err(|e| CaptureError::DeviceAccessDenied(format!("failed to spawn input thread: {}", e)))?;

        let sample_rate = ready_rx
            .recv()
            .map_err(|_| CaptureError::DeviceAccessDenied("input thread exited".into()))??;

        Ok(Self {
            tap,
            failed,
            sample_rate,
            stop_tx: Some(stop_tx),
            thread: Some(thread),
        })
    }
}

impl MediaStream for CpalStream {
    fn has_active_tracks(&self) -> bool {
        let alive = self.thread.as_ref().is_some_and(|t| !t.is_finished());
        alive && !self.failed.load(Ordering::Acquire)
    }

    fn supports(&self, mime_type: &str) -> bool {
        mime_type == WAV_MIME || mime_type.is_empty()
    }

    fn create_pipeline(
        &mut self,
        mime_type: &str,
        events: PipelineEvents,
    ) -> Result<Box<dyn CapturePipeline>, CaptureError> {
        if !self.supports(mime_type) {
            return Err(CaptureError::EncoderUnavailable {
                tried: vec![mime_type.to_string()],
            });
        }
        Ok(Box::new(WavPipeline::new(
            Arc::clone(&self.tap),
            self.sample_rate,
            events,
        )))
    }

    fn stop(&mut self) {
        if let Ok(mut tap) = self.tap.lock() {
            *tap = None;
        }
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for CpalStream {
    fn drop(&mut self) {
        self.stop();
    }
}

fn build_input_stream(
    tap: Tap,
    failed: Arc<AtomicBool>,
    mix: MixHandle,
    clock: SharedClock,
) -> Result<(Stream, u32), CaptureError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| CaptureError::DeviceAccessDenied("no input device".into()))?;
    let supported = device
        .default_input_config()
        .map_err(|e| CaptureError::DeviceAccessDenied(e.to_string()))?;

    let sample_rate = supported.sample_rate().0;
    let format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();
    mix.set_record_sample_rate(sample_rate);

    let stream = match format {
        SampleFormat::F32 => build_typed::<f32>(&device, &config, tap, failed, mix, clock),
        SampleFormat::I16 => build_typed::<i16>(&device, &config, tap, failed, mix, clock),
        SampleFormat::U16 => build_typed::<u16>(&device, &config, tap, failed, mix, clock),
        other => Err(CaptureError::DeviceAccessDenied(format!(
            "unsupported input sample format {:?}",
            other
        ))),
    }?;

    stream
        .play()
        .map_err(|e| CaptureError::DeviceAccessDenied(format!("failed to start input stream: {}", e)))?;

    if let Ok(name) = device.name() {
        info!(device = %name, sample_rate, "microphone opened");
    }
    Ok((stream, sample_rate))
}

fn build_typed<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    tap: Tap,
    failed: Arc<AtomicBool>,
    mix: MixHandle,
    clock: SharedClock,
) -> Result<Stream, CaptureError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let channels = config.channels.max(1) as usize;
    let mut timeline = InputTimeline::new(config.sample_rate.0);
    let mut mono: Vec<f32> = Vec::new();
    let mut record: Vec<f32> = Vec::new();
    let error_tap = Arc::clone(&tap);

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                mono.clear();
                mono.extend(data.chunks(channels).map(|frame| {
                    frame.iter().map(|s| f32::from_sample_(*s)).sum::<f32>() / channels as f32
                }));

                let starting = match tap.lock() {
                    Ok(mut tap) => tap.as_mut().is_some_and(|r| std::mem::replace(&mut r.starting, false)),
                    Err(_) => false,
                };
                if starting {
                    timeline.reanchor();
                }
                let block_start = timeline.block_start(clock.now(), mono.len());

                record.clear();
                record.resize(mono.len(), 0.0);

                // Always render so record-path ramps keep settling between takes
                match mix.lock() {
                    Some(mut graph) => graph.render_record(block_start, &mono, &mut record),
                    None => record.copy_from_slice(&mono),
                }

                if let Ok(mut tap) = tap.lock() {
                    if let Some(recorder) = tap.as_mut() {
                        recorder.push(&record);
                    }
                }
            },
            move |err| {
                error!("microphone stream error: {}", err);
                failed.store(true, Ordering::Release);
                if let Ok(tap) = error_tap.lock() {
                    if let Some(recorder) = tap.as_ref() {
                        report_stream_error(&recorder.events, &err);
                    }
                }
            },
            None,
        )
        .map_err(|e| CaptureError::DeviceAccessDenied(format!("failed to build input stream: {}", e)))
}

/// WAV encoder over the microphone tap
struct WavPipeline {
    tap: Tap,
    sample_rate: u32,
    events: PipelineEvents,
    started: bool,
}

impl WavPipeline {
    fn new(tap: Tap, sample_rate: u32, events: PipelineEvents) -> Self {
        Self {
            tap,
            sample_rate,
            events,
            started: false,
        }
    }
}

impl CapturePipeline for WavPipeline {
    fn mime_type(&self) -> &str {
        WAV_MIME
    }

    fn start(&mut self, interval: Duration) -> Result<(), CaptureError> {
        let mut tap = self
            .tap
            .lock()
            .map_err(|_| CaptureError::PipelineFailure("microphone tap poisoned".into()))?;
        *tap = Some(Recorder::new(self.sample_rate, interval, self.events.clone()));
        self.started = true;
        Ok(())
    }

    fn stop(&mut self) {
        if !self.started {
            return;
        }
        self.started = false;

        let recorder = match self.tap.lock() {
            Ok(mut tap) => tap.take(),
            Err(_) => None,
        };
        let Some(recorder) = recorder else {
            self.events.failed("microphone tap unavailable");
            return;
        };

        // Encode off the caller; the blob arrives as an event
        let spawned = thread::Builder::new()
            .name("wav-encode".into())
            .spawn(move || finalize_take(recorder));
        if let Err(e) = spawned {
            self.events.failed(format!("failed to spawn encoder: {}", e));
        }
    }
}
