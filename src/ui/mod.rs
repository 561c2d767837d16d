// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Terminal UI.
//!
//! Provides a ratatui-based view of the studio: metronome panel, capture
//! panel with pedal hints, a short event log and a help overlay.

mod capture;
mod metronome;

pub use capture::{format_elapsed, pedal_hints, CaptureWidget};
pub use metronome::{beat_dots, MetronomeWidget};

use std::collections::VecDeque;
use std::io::{self, Stdout};
use std::time::{Duration, Instant};

use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
    Frame, Terminal,
};

use crate::capture::{CaptureMode, CaptureState};
use crate::control::{key_name, KeyboardController};
use crate::metronome::BeatEvent;
use crate::studio::{Studio, StudioEvent};

/// How long the current beat stays lit
const BEAT_FLASH: Duration = Duration::from_millis(120);
/// Status messages disappear after this
const STATUS_TIMEOUT: Duration = Duration::from_secs(3);
const MAX_LOG_LINES: usize = 50;

/// Metronome state for display
#[derive(Debug, Clone)]
pub struct MetronomeView {
    pub running: bool,
    pub tempo: f64,
    pub signature: String,
    pub beats_per_measure: u32,
    pub accent: bool,
    pub volume: f32,
    pub record_click: bool,
    /// Index of the last beat that sounded
    pub beat_index: Option<u32>,
    pub beat_at: Option<Instant>,
}

impl Default for MetronomeView {
    fn default() -> Self {
        Self {
            running: false,
            tempo: 100.0,
            signature: "4/4".to_string(),
            beats_per_measure: 4,
            accent: true,
            volume: 0.8,
            record_click: false,
            beat_index: None,
            beat_at: None,
        }
    }
}

impl MetronomeView {
    pub fn on_beat(&mut self, event: &BeatEvent, now: Instant) {
        self.beat_index = Some(event.beat_index);
        self.beat_at = Some(now);
    }

    /// Whether the last beat is recent enough to show
    pub fn is_flashing(&self, now: Instant) -> bool {
        self.beat_at
            .is_some_and(|at| now.saturating_duration_since(at) < BEAT_FLASH)
    }
}

/// Capture state for display
#[derive(Debug, Clone)]
pub struct CaptureView {
    pub state: CaptureState,
    pub mode: CaptureMode,
    pub elapsed: Duration,
    pub finalizing: bool,
    pub target: Option<String>,
    pub left_key: String,
    pub right_key: String,
}

impl Default for CaptureView {
    fn default() -> Self {
        Self {
            state: CaptureState::Idle,
            mode: CaptureMode::Audio,
            elapsed: Duration::ZERO,
            finalizing: false,
            target: None,
            left_key: "PageUp".to_string(),
            right_key: "PageDown".to_string(),
        }
    }
}

/// One line of the event log
#[derive(Debug, Clone)]
pub struct LogLine {
    pub text: String,
    pub is_error: bool,
    pub time: Instant,
}

/// Everything the UI draws
#[derive(Debug, Clone)]
pub struct UiState {
    pub metronome: MetronomeView,
    pub capture: CaptureView,
    pub log: VecDeque<LogLine>,
    /// Help overlay sections: category and (shortcut, description) rows
    pub help: Vec<(String, Vec<(String, String)>)>,
    pub show_help: bool,
    pub status_message: Option<String>,
    pub status_time: Option<Instant>,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            metronome: MetronomeView::default(),
            capture: CaptureView::default(),
            log: VecDeque::with_capacity(MAX_LOG_LINES),
            help: Vec::new(),
            show_help: false,
            status_message: None,
            status_time: None,
        }
    }
}

impl UiState {
    /// Set a status message that will be displayed temporarily
    pub fn set_status(&mut self, message: impl Into<String>) {
        self.status_message = Some(message.into());
        self.status_time = Some(Instant::now());
    }

    /// Clear expired status message
    pub fn clear_expired_status(&mut self) {
        if let Some(time) = self.status_time {
            if time.elapsed() > STATUS_TIMEOUT {
                self.status_message = None;
                self.status_time = None;
            }
        }
    }

    pub fn push_log(&mut self, text: impl Into<String>, is_error: bool) {
        if self.log.len() == MAX_LOG_LINES {
            self.log.pop_front();
        }
        self.log.push_back(LogLine {
            text: text.into(),
            is_error,
            time: Instant::now(),
        });
    }

    /// Build the help overlay from the keyboard bindings
    pub fn set_help(&mut self, keyboard: &KeyboardController) {
        self.help = keyboard
            .groups()
            .into_iter()
            .map(|(group, bindings)| {
                let rows = bindings.iter().map(|b| (b.chord.to_string(), b.label.clone())).collect();
                (group.to_string(), rows)
            })
            .collect();
    }

    /// Pull current values from the studio
    pub fn refresh(&mut self, studio: &Studio) {
        let settings = studio.settings();
        let m = &mut self.metronome;
        m.running = studio.is_metronome_running();
        m.tempo = settings.tempo.bpm();
        m.signature = settings.time_signature.to_string();
        m.beats_per_measure = settings.time_signature.beats_per_measure();
        m.accent = settings.accent_first_beat;
        m.volume = studio.volume();
        m.record_click = studio.record_into_take();
        if !m.running {
            m.beat_index = None;
        }

        let snapshot = studio.capture().snapshot();
        let pedals = studio.pedal_binding();
        let c = &mut self.capture;
        c.state = snapshot.state;
        c.mode = snapshot.mode;
        c.elapsed = snapshot.elapsed(tokio::time::Instant::now());
        c.finalizing = snapshot.finalizing;
        c.target = snapshot.target.map(|t| t.0);
        c.left_key = key_name(pedals.left);
        c.right_key = key_name(pedals.right);
    }

    /// Record a studio event
    pub fn on_event(&mut self, event: &StudioEvent) {
        match event {
            StudioEvent::Beat(beat) => self.metronome.on_beat(beat, Instant::now()),
            StudioEvent::CaptureStateChanged(state) => self.push_log(format!("capture: {}", state), false),
            StudioEvent::Error { kind, message } => {
                self.push_log(format!("{:?}: {}", kind, message), true);
                self.set_status(message.clone());
            }
            StudioEvent::Saved { take, duration } => {
                let text = format!("saved {} ({})", take.0, format_elapsed(*duration));
                self.push_log(text.clone(), false);
                self.set_status(text);
            }
        }
    }
}

/// Terminal UI application
pub struct App {
    terminal: Terminal<CrosstermBackend<Stdout>>,
}

impl App {
    /// Enter raw mode and the alternate screen
    pub fn new() -> io::Result<Self> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let terminal = Terminal::new(backend)?;
        Ok(Self { terminal })
    }

    /// Draw the UI
    pub fn draw(&mut self, state: &UiState) -> io::Result<()> {
        let now = Instant::now();
        self.terminal.draw(|frame| {
            let area = frame.area();

            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([
                    Constraint::Length(4), // Metronome
                    Constraint::Length(4), // Capture
                    Constraint::Min(3),    // Log
                    Constraint::Length(1), // Status bar
                ])
                .split(area);

            frame.render_widget(
                MetronomeWidget::new(&state.metronome)
                    .flash(state.metronome.is_flashing(now))
                    .block(Block::default().borders(Borders::ALL).title(" Metronome ")),
                chunks[0],
            );
            frame.render_widget(
                CaptureWidget::new(&state.capture)
                    .block(Block::default().borders(Borders::ALL).title(" Take ")),
                chunks[1],
            );
            render_log(frame, chunks[2], state);
            render_status_bar(frame, chunks[3], state);

            if state.show_help {
                render_help_overlay(frame, area, state);
            }
        })?;
        Ok(())
    }

    fn cleanup(&mut self) -> io::Result<()> {
        disable_raw_mode()?;
        execute!(self.terminal.backend_mut(), LeaveAlternateScreen)?;
        self.terminal.show_cursor()?;
        Ok(())
    }
}

impl Drop for App {
    fn drop(&mut self) {
        let _ = self.cleanup();
    }
}

fn render_log(frame: &mut Frame, area: Rect, state: &UiState) {
    let block = Block::default().borders(Borders::ALL).title(" Events ");
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let lines: Vec<Line> = state
        .log
        .iter()
        .rev()
        .take(inner.height as usize)
        .rev()
        .map(|line| {
            let style = if line.is_error {
                Style::default().fg(Color::Red)
            } else if line.time.elapsed() < Duration::from_secs(2) {
                Style::default().fg(Color::White)
            } else {
                Style::default().fg(Color::Gray)
            };
            Line::from(Span::styled(line.text.clone(), style))
        })
        .collect();
    frame.render_widget(Paragraph::new(lines), inner);
}

fn render_status_bar(frame: &mut Frame, area: Rect, state: &UiState) {
    let text = match &state.status_message {
        Some(msg) => Span::styled(msg.clone(), Style::default().fg(Color::Yellow)),
        None => Span::styled(
            " Space: Metronome | Up/Down: Tempo | t: Tap | c: Click→Take | h: Help | q: Quit",
            Style::default().fg(Color::DarkGray),
        ),
    };
    frame.render_widget(Paragraph::new(text), area);
}

fn render_help_overlay(frame: &mut Frame, area: Rect, state: &UiState) {
    let rows: usize = state.help.iter().map(|(_, r)| r.len() + 2).sum();
    let width = 48.min(area.width.saturating_sub(4));
    let height = (rows as u16 + 2).min(area.height.saturating_sub(2));
    let help_area = Rect::new(
        area.x + (area.width.saturating_sub(width)) / 2,
        area.y + (area.height.saturating_sub(height)) / 2,
        width,
        height,
    );

    frame.render_widget(Clear, help_area);
    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Help ")
        .style(Style::default().bg(Color::Black));
    let inner = block.inner(help_area);
    frame.render_widget(block, help_area);

    let mut lines = Vec::with_capacity(rows);
    for (category, bindings) in &state.help {
        lines.push(Line::from(Span::styled(
            category.clone(),
            Style::default().add_modifier(Modifier::BOLD),
        )));
        for (shortcut, description) in bindings {
            lines.push(Line::from(format!("  {:<12} {}", shortcut, description)));
        }
        lines.push(Line::from(""));
    }
    frame.render_widget(Paragraph::new(lines), inner);
}
