// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Control system for pedal, keyboard and gamepad input.
//!
//! This module provides:
//! - The input dispatcher reducing every source to left/right pedal actions
//! - Gamepad polling with press-edge detection
//! - Keyboard shortcuts for everything that is not a pedal

pub mod dispatcher;
pub mod gamepad;
pub mod keyboard;

pub use dispatcher::{BindingError, InputDispatcher, InputSource, LogicalAction, PedalBinding};
pub use gamepad::{GamepadPoller, GamepadSource, GilrsGamepad};
pub use keyboard::{key_name, parse_key_code, Binding, KeyChord, KeyboardController};

/// Non-pedal action triggered from the keyboard
#[derive(Debug, Clone, PartialEq)]
pub enum ControlAction {
    // Metronome
    /// Start or stop the click
    ToggleMetronome,
    /// Toggle the downbeat accent
    ToggleAccent,
    /// Step through common time signatures
    CycleTimeSignature,
    /// Toggle mixing the click into the next take
    ToggleRecordClick,

    // Tempo
    /// Adjust tempo by delta BPM
    AdjustTempo(f64),
    /// Tap tempo
    TapTempo,
    /// Store tempo and meter as the target's default
    SaveTempoDefault,

    /// Adjust volume by delta
    AdjustVolume(f32),

    // Capture
    /// Switch between audio and video takes
    ToggleCaptureMode,
    /// Release the capture device
    ReleaseStream,

    // UI
    ToggleHelp,
    Quit,
}

impl ControlAction {
    /// Check if this is a tempo action
    pub fn is_tempo(&self) -> bool {
        matches!(
            self,
            ControlAction::AdjustTempo(_) | ControlAction::TapTempo | ControlAction::SaveTempoDefault
        )
    }

    /// Check if this changes metronome settings
    pub fn is_metronome(&self) -> bool {
        self.is_tempo()
            || matches!(
                self,
                ControlAction::ToggleMetronome
                    | ControlAction::ToggleAccent
                    | ControlAction::CycleTimeSignature
                    | ControlAction::ToggleRecordClick
            )
    }
}
