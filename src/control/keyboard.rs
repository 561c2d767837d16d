// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Keyboard shortcut handling.
//!
//! Pedal keys are resolved by the input dispatcher first; everything else
//! (metronome, volume, capture housekeeping) is looked up here.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crossterm::event::{KeyCode, KeyModifiers};

use super::ControlAction;

const NONE: KeyModifiers = KeyModifiers::NONE;
const SHIFT: KeyModifiers = KeyModifiers::SHIFT;
const CTRL: KeyModifiers = KeyModifiers::CONTROL;

/// Built-in bindings: help group, key, modifiers, action, label
const DEFAULT_BINDINGS: &[(&str, KeyCode, KeyModifiers, ControlAction, &str)] = &[
    ("Metronome", KeyCode::Char(' '), NONE, ControlAction::ToggleMetronome, "Start/Stop Metronome"),
    ("Metronome", KeyCode::Char('a'), NONE, ControlAction::ToggleAccent, "Toggle Accent"),
    ("Metronome", KeyCode::Char('m'), NONE, ControlAction::CycleTimeSignature, "Next Time Signature"),
    ("Metronome", KeyCode::Char('c'), NONE, ControlAction::ToggleRecordClick, "Record Click Into Take"),
    ("Tempo", KeyCode::Up, NONE, ControlAction::AdjustTempo(1.0), "Tempo +1 BPM"),
    ("Tempo", KeyCode::Down, NONE, ControlAction::AdjustTempo(-1.0), "Tempo -1 BPM"),
    ("Tempo", KeyCode::Up, SHIFT, ControlAction::AdjustTempo(10.0), "Tempo +10 BPM"),
    ("Tempo", KeyCode::Down, SHIFT, ControlAction::AdjustTempo(-10.0), "Tempo -10 BPM"),
    ("Tempo", KeyCode::Char('t'), NONE, ControlAction::TapTempo, "Tap Tempo"),
    ("Tempo", KeyCode::Char('s'), NONE, ControlAction::SaveTempoDefault, "Save Tempo As Default"),
    ("Volume", KeyCode::Char('+'), NONE, ControlAction::AdjustVolume(0.05), "Volume Up"),
    ("Volume", KeyCode::Char('='), NONE, ControlAction::AdjustVolume(0.05), "Volume Up"),
    ("Volume", KeyCode::Char('-'), NONE, ControlAction::AdjustVolume(-0.05), "Volume Down"),
    ("Capture", KeyCode::Char('v'), NONE, ControlAction::ToggleCaptureMode, "Audio/Video Mode"),
    ("Capture", KeyCode::Char('x'), NONE, ControlAction::ReleaseStream, "Release Device"),
    ("UI", KeyCode::Char('?'), NONE, ControlAction::ToggleHelp, "Toggle Help"),
    ("UI", KeyCode::Char('h'), NONE, ControlAction::ToggleHelp, "Toggle Help"),
    ("UI", KeyCode::Char('q'), NONE, ControlAction::Quit, "Quit"),
    ("UI", KeyCode::Char('c'), CTRL, ControlAction::Quit, "Quit"),
];

/// A key plus the modifiers that must be held with it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyChord {
    pub code: KeyCode,
    pub modifiers: KeyModifiers,
}

impl KeyChord {
    pub fn new(code: KeyCode, modifiers: KeyModifiers) -> Self {
        Self { code, modifiers }
    }

    pub fn plain(code: KeyCode) -> Self {
        Self::new(code, NONE)
    }

    pub fn ctrl(code: KeyCode) -> Self {
        Self::new(code, CTRL)
    }

    pub fn shift(code: KeyCode) -> Self {
        Self::new(code, SHIFT)
    }
}

impl fmt::Display for KeyChord {
    /// `Ctrl+C`, `Shift+Up`, `Space`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (flag, name) in [(CTRL, "Ctrl+"), (KeyModifiers::ALT, "Alt+"), (SHIFT, "Shift+")] {
            if self.modifiers.contains(flag) {
                f.write_str(name)?;
            }
        }
        f.write_str(&key_name(self.code))
    }
}

/// One shortcut and what it does
#[derive(Debug, Clone)]
pub struct Binding {
    pub chord: KeyChord,
    pub action: ControlAction,
    /// Shown in the help overlay
    pub label: String,
    /// Help overlay section
    pub group: String,
}

/// Non-pedal keyboard shortcuts
pub struct KeyboardController {
    bindings: HashMap<KeyChord, Binding>,
}

impl KeyboardController {
    /// No shortcuts at all
    pub fn empty() -> Self {
        Self {
            bindings: HashMap::new(),
        }
    }

    pub fn with_defaults() -> Self {
        let mut controller = Self::empty();
        for (group, code, modifiers, action, label) in DEFAULT_BINDINGS {
            controller.bind(group, KeyChord::new(*code, *modifiers), action.clone(), label);
        }
        controller
    }

    /// Bind `chord`, replacing whatever it did before
    pub fn bind(&mut self, group: &str, chord: KeyChord, action: ControlAction, label: &str) {
        self.bindings.insert(
            chord,
            Binding {
                chord,
                action,
                label: label.to_string(),
                group: group.to_string(),
            },
        );
    }

    pub fn unbind(&mut self, chord: KeyChord) -> Option<Binding> {
        self.bindings.remove(&chord)
    }

    /// Action for a key press.
    ///
    /// Terminals disagree on whether shifted punctuation carries SHIFT, so
    /// an unmatched shifted character is retried without it.
    pub fn resolve(&self, code: KeyCode, modifiers: KeyModifiers) -> Option<ControlAction> {
        let exact = self.bindings.get(&KeyChord::new(code, modifiers));
        let fallback = || match code {
            KeyCode::Char(_) if modifiers.contains(SHIFT) => self.bindings.get(&KeyChord::new(code, modifiers - SHIFT)),
            _ => None,
        };
        exact.or_else(fallback).map(|b| b.action.clone())
    }

    /// Bindings by help group, groups in name order and rows by label
    pub fn groups(&self) -> BTreeMap<&str, Vec<&Binding>> {
        let mut grouped: BTreeMap<&str, Vec<&Binding>> = BTreeMap::new();
        for binding in self.bindings.values() {
            grouped.entry(binding.group.as_str()).or_default().push(binding);
        }
        for rows in grouped.values_mut() {
            rows.sort_by(|a, b| a.label.cmp(&b.label).then_with(|| a.chord.to_string().cmp(&b.chord.to_string())));
        }
        grouped
    }
}

impl Default for KeyboardController {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Display name of a key; the inverse of [`parse_key_code`]
pub fn key_name(code: KeyCode) -> String {
    match code {
        KeyCode::Char(' ') => "Space".to_string(),
        KeyCode::Char(c) => c.to_uppercase().to_string(),
        KeyCode::F(n) => format!("F{}", n),
        KeyCode::Up => "Up".to_string(),
        KeyCode::Down => "Down".to_string(),
        KeyCode::Left => "Left".to_string(),
        KeyCode::Right => "Right".to_string(),
        KeyCode::Enter => "Enter".to_string(),
        KeyCode::Esc => "Esc".to_string(),
        KeyCode::Tab => "Tab".to_string(),
        KeyCode::BackTab => "BackTab".to_string(),
        KeyCode::Backspace => "Backspace".to_string(),
        KeyCode::Delete => "Delete".to_string(),
        KeyCode::Insert => "Insert".to_string(),
        KeyCode::Home => "Home".to_string(),
        KeyCode::End => "End".to_string(),
        KeyCode::PageUp => "PageUp".to_string(),
        KeyCode::PageDown => "PageDown".to_string(),
        _ => "?".to_string(),
    }
}

/// Parse a key name as written in the config file.
///
/// Accepts named keys (case-insensitive), `F1`..`F24`, and single characters.
pub fn parse_key_code(name: &str) -> Option<KeyCode> {
    let trimmed = name.trim();
    let mut chars = trimmed.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        return Some(KeyCode::Char(c));
    }

    let lower = trimmed.to_ascii_lowercase();
    let code = match lower.as_str() {
        "space" => KeyCode::Char(' '),
        "up" => KeyCode::Up,
        "down" => KeyCode::Down,
        "left" => KeyCode::Left,
        "right" => KeyCode::Right,
        "enter" | "return" => KeyCode::Enter,
        "esc" | "escape" => KeyCode::Esc,
        "tab" => KeyCode::Tab,
        "backtab" => KeyCode::BackTab,
        "backspace" => KeyCode::Backspace,
        "delete" | "del" => KeyCode::Delete,
        "insert" | "ins" => KeyCode::Insert,
        "home" => KeyCode::Home,
        "end" => KeyCode::End,
        "pageup" | "page_up" | "pgup" => KeyCode::PageUp,
        "pagedown" | "page_down" | "pgdn" => KeyCode::PageDown,
        _ => {
            let n: u8 = lower.strip_prefix('f')?.parse().ok()?;
            if (1..=24).contains(&n) {
                KeyCode::F(n)
            } else {
                return None;
            }
        }
    };
    Some(code)
}
