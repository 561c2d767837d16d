// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Input dispatcher.
//!
//! Key presses, gamepad buttons and UI taps all reduce to two logical
//! actions. The dispatcher keeps no capture state: only the last press time
//! per source and action for debouncing, and the last-seen gamepad buttons
//! for edge detection.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crossterm::event::KeyCode;
use thiserror::Error;

use super::keyboard::{key_name, parse_key_code};

/// The two pedal actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalAction {
    /// Acquire / record / discard
    Left,
    /// Stop / accept
    Right,
}

/// Where an action came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputSource {
    Keyboard,
    Gamepad,
    Ui,
}

/// Invalid pedal configuration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindingError {
    #[error("unknown key name '{0}'")]
    UnknownKey(String),
    #[error("left and right pedal are both bound to {0}")]
    SameKey(String),
}

/// Keys the foot pedal sends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PedalBinding {
    pub left: KeyCode,
    pub right: KeyCode,
}

impl PedalBinding {
    /// Binding from two distinct keys
    pub fn new(left: KeyCode, right: KeyCode) -> Result<Self, BindingError> {
        if left == right {
            return Err(BindingError::SameKey(key_name(left)));
        }
        Ok(Self { left, right })
    }

    /// Binding from config key names
    pub fn from_names(left: &str, right: &str) -> Result<Self, BindingError> {
        let l = parse_key_code(left).ok_or_else(|| BindingError::UnknownKey(left.to_string()))?;
        let r = parse_key_code(right).ok_or_else(|| BindingError::UnknownKey(right.to_string()))?;
        Self::new(l, r)
    }

    /// Action bound to a key
    pub fn action_for(&self, code: KeyCode) -> Option<LogicalAction> {
        if code == self.left {
            Some(LogicalAction::Left)
        } else if code == self.right {
            Some(LogicalAction::Right)
        } else {
            None
        }
    }
}

impl Default for PedalBinding {
    /// Most page-turner pedals send PageUp/PageDown
    fn default() -> Self {
        Self {
            left: KeyCode::PageUp,
            right: KeyCode::PageDown,
        }
    }
}

/// Gamepad button index for each action
const GAMEPAD_BUTTONS: [(usize, LogicalAction); 2] = [(0, LogicalAction::Left), (1, LogicalAction::Right)];

/// Normalizes heterogeneous input into [`LogicalAction`]s
#[derive(Debug, Clone)]
pub struct InputDispatcher {
    binding: PedalBinding,
    debounce: Duration,
    last_fired: HashMap<(InputSource, LogicalAction), Instant>,
    gamepad_pressed: [bool; 2],
}

impl InputDispatcher {
    pub fn new(binding: PedalBinding, debounce: Duration) -> Self {
        Self {
            binding,
            debounce,
            last_fired: HashMap::new(),
            gamepad_pressed: [false; 2],
        }
    }

    pub fn binding(&self) -> PedalBinding {
        self.binding
    }

    /// Replace the pedal keys (config reload)
    pub fn set_binding(&mut self, binding: PedalBinding) {
        self.binding = binding;
    }

    pub fn set_debounce(&mut self, debounce: Duration) {
        self.debounce = debounce;
    }

    /// Key-down event
    pub fn key_down(&mut self, code: KeyCode) -> Option<LogicalAction> {
        self.key_down_at(code, Instant::now())
    }

    pub fn key_down_at(&mut self, code: KeyCode, now: Instant) -> Option<LogicalAction> {
        let action = self.binding.action_for(code)?;
        self.accept(InputSource::Keyboard, action, now)
    }

    /// One gamepad poll. `pressed[i]` is the state of button `i`; only
    /// buttons 0 and 1 are used. Fires on press transitions only.
    pub fn gamepad_poll(&mut self, pressed: &[bool], now: Instant) -> Vec<LogicalAction> {
        let mut fired = Vec::new();
        for (button, action) in GAMEPAD_BUTTONS {
            let down = pressed.get(button).copied().unwrap_or(false);
            let was_down = std::mem::replace(&mut self.gamepad_pressed[button], down);
            if down && !was_down {
                if let Some(action) = self.accept(InputSource::Gamepad, action, now) {
                    fired.push(action);
                }
            }
        }
        fired
    }

    /// Forget held gamepad buttons (controller disconnected)
    pub fn gamepad_disconnected(&mut self) {
        self.gamepad_pressed = [false; 2];
    }

    /// Direct UI invocation; never debounced
    pub fn ui(&self, action: LogicalAction) -> LogicalAction {
        action
    }

    fn accept(&mut self, source: InputSource, action: LogicalAction, now: Instant) -> Option<LogicalAction> {
        if let Some(last) = self.last_fired.get(&(source, action)) {
            if now.saturating_duration_since(*last) < self.debounce {
                return None;
            }
        }
        self.last_fired.insert((source, action), now);
        Some(action)
    }
}

impl Default for InputDispatcher {
    fn default() -> Self {
        Self::new(PedalBinding::default(), Duration::from_millis(150))
    }
}
