// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Monitor output via cpal.
//!
//! The output callback is the heartbeat of a live session: every block it
//! renders advances the [`FrameClock`] the metronome schedules against.

use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use tracing::{error, info};

use super::{AudioError, MixHandle};
use crate::timing::FrameClock;

/// Output stream parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioConfig {
    pub sample_rate: u32,
    /// Frames per callback
    pub buffer_size: u32,
    pub channels: u16,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            buffer_size: 256,
            channels: 2,
        }
    }
}

impl AudioConfig {
    /// Default config using the default output device's sample rate, if there is one
    pub fn for_default_device() -> Self {
        let sample_rate = cpal::default_host()
            .default_output_device()
            .and_then(|d| d.default_output_config().ok())
            .map(|c| c.sample_rate().0);

        Self {
            sample_rate: sample_rate.unwrap_or(48_000),
            ..Self::default()
        }
    }

    /// Latency of one buffer in milliseconds
    pub fn latency_ms(&self) -> f64 {
        (self.buffer_size as f64 / self.sample_rate as f64) * 1000.0
    }
}

/// Monitor output: renders the mix graph's monitor path and advances the frame clock
pub struct MonitorOutput {
    _stream: Stream,
    device_name: String,
    config: AudioConfig,
    clock: Arc<FrameClock>,
}

impl MonitorOutput {
    /// Open the default output device and start rendering.
    ///
    /// The monitor path is mono; every output channel gets the same sample.
    pub fn start(config: AudioConfig, mix: MixHandle) -> Result<Self, AudioError> {
        let device = cpal::default_host().default_output_device().ok_or(AudioError::NoDevice)?;
        let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());

        let stream_config = StreamConfig {
            channels: config.channels,
            sample_rate: cpal::SampleRate(config.sample_rate),
            buffer_size: cpal::BufferSize::Fixed(config.buffer_size),
        };
        let channels = usize::from(config.channels.max(1));

        let clock = Arc::new(FrameClock::new(config.sample_rate));
        let callback_clock = Arc::clone(&clock);
        let mut mono: Vec<f32> = Vec::with_capacity(config.buffer_size as usize * 2);

        let stream = device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let frames = data.len() / channels;
                    let first_frame = callback_clock.advance(frames as u64);
                    let block_start = callback_clock.frames_to_seconds(first_frame);

                    mono.clear();
                    mono.resize(frames, 0.0);
                    // Poisoned graph: this block stays silent
                    if let Some(mut graph) = mix.lock() {
                        graph.render_monitor(block_start, &mut mono);
                    }
                    for (frame, sample) in data.chunks_mut(channels).zip(mono.iter()) {
                        frame.fill(*sample);
                    }
                },
                move |err| {
                    error!("monitor output stream error: {}", err);
                },
                None,
            )
            .map_err(|e| AudioError::StreamFailed(format!("failed to build output stream: {}", e)))?;

        stream
            .play()
            .map_err(|e| AudioError::StreamFailed(format!("failed to start output stream: {}", e)))?;

        info!(device = %device_name, sample_rate = config.sample_rate, "monitor output running");

        Ok(Self {
            _stream: stream,
            device_name,
            config,
            clock,
        })
    }

    /// The audio clock driven by this output
    pub fn clock(&self) -> Arc<FrameClock> {
        Arc::clone(&self.clock)
    }

    pub fn config(&self) -> &AudioConfig {
        &self.config
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_low_latency() {
        let config = AudioConfig::default();
        assert_eq!(config.sample_rate, 48_000);
        // One block must fit well inside the scheduler look-ahead
        assert!(config.latency_ms() < 10.0);
    }

    #[test]
    fn test_latency_ms() {
        let config = AudioConfig {
            sample_rate: 44_100,
            buffer_size: 441,
            channels: 1,
        };
        assert!((config.latency_ms() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_config_for_default_device() {
        // Should not panic without audio hardware
        let config = AudioConfig::for_default_device();
        assert!(config.sample_rate > 0);
    }
}
