// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Audio layer.
//!
//! This module provides:
//! - The mix graph routing clicks to the monitor and (optionally) the take
//! - Monitor output via cpal, which also drives the audio frame clock
//! - Microphone capture via cpal, exposed through the capture media traits

pub mod input;
pub mod mix;
pub mod output;

pub use input::CpalDevices;
pub use mix::{MixGraph, MixHandle, RAMP_SECONDS};
pub use output::{AudioConfig, MonitorOutput};

use cpal::traits::{DeviceTrait, HostTrait};
use thiserror::Error;

/// Where the click synthesizer's output goes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MixRoute {
    /// Performer's ears only
    #[default]
    MonitorOnly,
    /// Ears and the record-bound stream
    MonitorAndRecord,
}

/// Audio device errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AudioError {
    /// No audio device available
    #[error("no audio device available")]
    NoDevice,
    /// Failed to query or configure the device
    #[error("audio initialization failed: {0}")]
    InitFailed(String),
    /// Failed to build or start an audio stream
    #[error("audio stream failed: {0}")]
    StreamFailed(String),
}

/// Names of the default host's input and output devices
pub fn list_devices() -> Result<(Vec<String>, Vec<String>), AudioError> {
    let host = cpal::default_host();

    let inputs = host
        .input_devices()
        .map_err(|e| AudioError::InitFailed(e.to_string()))?
        .filter_map(|d| d.name().ok())
        .collect();
    let outputs = host
        .output_devices()
        .map_err(|e| AudioError::InitFailed(e.to_string()))?
        .filter_map(|d| d.name().ok())
        .collect();

    Ok((inputs, outputs))
}

/// Print available audio devices to stdout
pub fn print_devices() {
    match list_devices() {
        Ok((inputs, outputs)) => {
            println!("Input devices:");
            if inputs.is_empty() {
                println!("  (none)");
            }
            for (i, name) in inputs.iter().enumerate() {
                println!("  {}: {}", i, name);
            }
            println!("Output devices:");
            if outputs.is_empty() {
                println!("  (none)");
            }
            for (i, name) in outputs.iter().enumerate() {
                println!("  {}: {}", i, name);
            }
        }
        Err(e) => println!("Failed to list audio devices: {}", e),
    }
}
