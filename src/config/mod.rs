// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Configuration system.
//!
//! This module provides the YAML application config (metronome defaults,
//! scheduler tuning, pedal keys, capture timings, library location) and the
//! conversions into the runtime types.

pub mod watcher;

pub use watcher::{validate_config, ConfigEvent, ConfigWatcher};

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::capture::{CaptureMode, MachineConfig};
use crate::control::PedalBinding;
use crate::error::TempoError;
use crate::metronome::{MetronomeSettings, SchedulerConfig};
use crate::studio::StudioConfig;
use crate::timing::{Tempo, TimeSignature};

/// Default config file name
pub const DEFAULT_CONFIG_FILE: &str = "pedaltake.yaml";

/// Root application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub metronome: MetronomeConfig,
    #[serde(default)]
    pub scheduler: SchedulerSection,
    #[serde(default)]
    pub pedals: PedalConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub library: LibraryConfig,
}

impl AppConfig {
    /// Load configuration from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        Self::from_yaml(&contents)
    }

    /// Load from `path` if it exists, defaults otherwise
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("Failed to parse YAML configuration")
    }

    /// Serialize to YAML string
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize configuration to YAML")
    }

    /// Save configuration to a YAML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = self.to_yaml()?;
        fs::write(path.as_ref(), yaml)
            .with_context(|| format!("Failed to write config file: {:?}", path.as_ref()))
    }

    /// Validated metronome settings
    pub fn metronome_settings(&self) -> Result<MetronomeSettings, TempoError> {
        let m = &self.metronome;
        Ok(MetronomeSettings::new(
            Tempo::new(m.tempo)?,
            TimeSignature::new(m.beats_per_measure, m.beat_unit)?,
            m.accent_first_beat,
        ))
    }

    /// Scheduler tuning; the tick is kept within 1..=lookahead
    pub fn scheduler_config(&self) -> SchedulerConfig {
        let lookahead = self.scheduler.lookahead_ms.max(10);
        SchedulerConfig {
            tick_interval: Duration::from_millis(self.scheduler.tick_interval_ms.clamp(1, lookahead)),
            lookahead: Duration::from_millis(lookahead),
        }
    }

    pub fn pedal_binding(&self) -> Result<PedalBinding> {
        PedalBinding::from_names(&self.pedals.left, &self.pedals.right).context("Invalid pedal keys")
    }

    pub fn machine_config(&self) -> MachineConfig {
        let c = &self.capture;
        MachineConfig {
            mode: c.mode,
            chunk_interval: Duration::from_millis(c.chunk_interval_ms.max(10)),
            finalize_timeout: Duration::from_millis(c.finalize_timeout_ms),
            retrigger_guard: Duration::from_millis(c.retrigger_guard_ms),
            record_into_take: self.metronome.record_into_take,
            target: None,
        }
    }

    /// Everything the studio needs
    pub fn studio_config(&self) -> Result<StudioConfig> {
        Ok(StudioConfig {
            metronome: self.metronome_settings().context("Invalid metronome settings")?,
            volume: self.metronome.volume.clamp(0.0, 1.0),
            scheduler: self.scheduler_config(),
            capture: self.machine_config(),
            pedals: self.pedal_binding()?,
            debounce: Duration::from_millis(self.pedals.debounce_ms),
            gamepad_poll: Duration::from_millis(self.pedals.gamepad_poll_ms.max(1)),
        })
    }
}

/// Metronome defaults
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetronomeConfig {
    /// Tempo in BPM (40-220)
    #[serde(default = "default_tempo")]
    pub tempo: f64,
    #[serde(default = "default_beats")]
    pub beats_per_measure: u32,
    #[serde(default = "default_beat_unit")]
    pub beat_unit: u32,
    #[serde(default = "default_true")]
    pub accent_first_beat: bool,
    /// Mix the click into recorded takes
    #[serde(default)]
    pub record_into_take: bool,
    /// Monitor volume (0.0 - 1.0)
    #[serde(default = "default_volume")]
    pub volume: f32,
}

fn default_tempo() -> f64 {
    100.0
}
fn default_beats() -> u32 {
    4
}
fn default_beat_unit() -> u32 {
    4
}
fn default_true() -> bool {
    true
}
fn default_volume() -> f32 {
    0.8
}

impl Default for MetronomeConfig {
    fn default() -> Self {
        Self {
            tempo: default_tempo(),
            beats_per_measure: default_beats(),
            beat_unit: default_beat_unit(),
            accent_first_beat: true,
            record_into_take: false,
            volume: default_volume(),
        }
    }
}

/// Scheduler timing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchedulerSection {
    #[serde(default = "default_tick")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_lookahead")]
    pub lookahead_ms: u64,
}

fn default_tick() -> u64 {
    25
}
fn default_lookahead() -> u64 {
    100
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick(),
            lookahead_ms: default_lookahead(),
        }
    }
}

/// Pedal keys and input timing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PedalConfig {
    /// Key name for the left pedal (e.g. "PageUp", "F5", "b")
    #[serde(default = "default_left")]
    pub left: String,
    #[serde(default = "default_right")]
    pub right: String,
    #[serde(default = "default_debounce")]
    pub debounce_ms: u64,
    #[serde(default = "default_gamepad_poll")]
    pub gamepad_poll_ms: u64,
}

fn default_left() -> String {
    "PageUp".to_string()
}
fn default_right() -> String {
    "PageDown".to_string()
}
fn default_debounce() -> u64 {
    150
}
fn default_gamepad_poll() -> u64 {
    50
}

impl Default for PedalConfig {
    fn default() -> Self {
        Self {
            left: default_left(),
            right: default_right(),
            debounce_ms: default_debounce(),
            gamepad_poll_ms: default_gamepad_poll(),
        }
    }
}

/// Capture timings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaptureConfig {
    #[serde(default)]
    pub mode: CaptureMode,
    #[serde(default = "default_chunk")]
    pub chunk_interval_ms: u64,
    #[serde(default = "default_finalize_timeout")]
    pub finalize_timeout_ms: u64,
    #[serde(default = "default_retrigger_guard")]
    pub retrigger_guard_ms: u64,
}

fn default_chunk() -> u64 {
    1000
}
fn default_finalize_timeout() -> u64 {
    3000
}
fn default_retrigger_guard() -> u64 {
    300
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            mode: CaptureMode::Audio,
            chunk_interval_ms: default_chunk(),
            finalize_timeout_ms: default_finalize_timeout(),
            retrigger_guard_ms: default_retrigger_guard(),
        }
    }
}

/// Where takes are stored
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LibraryConfig {
    #[serde(default = "default_root")]
    pub root: PathBuf,
}

fn default_root() -> PathBuf {
    PathBuf::from("takes")
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self { root: default_root() }
    }
}
