// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Capture panel.

use std::time::Duration;

use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Paragraph, Widget},
};

use super::CaptureView;
use crate::capture::CaptureState;

/// What the left and right pedal do in `state`
pub fn pedal_hints(state: CaptureState) -> (&'static str, &'static str) {
    match state {
        CaptureState::Idle => ("acquire", "-"),
        CaptureState::Ready | CaptureState::Saved => ("record", "-"),
        CaptureState::Recording => ("discard", "stop"),
        CaptureState::Stopped => ("discard", "save"),
    }
}

/// `mm:ss.t`
pub fn format_elapsed(elapsed: Duration) -> String {
    let tenths = elapsed.as_millis() / 100;
    format!("{:02}:{:02}.{}", tenths / 600, (tenths / 10) % 60, tenths % 10)
}

fn state_style(state: CaptureState) -> (&'static str, Style) {
    match state {
        CaptureState::Idle => ("○ IDLE", Style::default().fg(Color::DarkGray)),
        CaptureState::Ready => ("◎ READY", Style::default().fg(Color::Green)),
        CaptureState::Recording => ("● REC", Style::default().fg(Color::Red).add_modifier(Modifier::BOLD)),
        CaptureState::Stopped => ("■ STOPPED", Style::default().fg(Color::Yellow)),
        CaptureState::Saved => ("✓ SAVED", Style::default().fg(Color::Cyan)),
    }
}

/// Capture widget: state, take length and what the pedals do next
pub struct CaptureWidget<'a> {
    view: &'a CaptureView,
    block: Option<Block<'a>>,
}

impl<'a> CaptureWidget<'a> {
    pub fn new(view: &'a CaptureView) -> Self {
        Self { view, block: None }
    }

    pub fn block(mut self, block: Block<'a>) -> Self {
        self.block = Some(block);
        self
    }
}

impl Widget for CaptureWidget<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let area = if let Some(block) = self.block {
            let inner = block.inner(area);
            block.render(area, buf);
            inner
        } else {
            area
        };

        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(1), Constraint::Length(1), Constraint::Min(0)])
            .split(area);

        let view = self.view;
        let (label, style) = state_style(view.state);
        let mut spans = vec![
            Span::styled(format!("{:<10}", label), style),
            Span::styled(
                format_elapsed(view.elapsed),
                Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
            ),
            Span::raw("  "),
            Span::styled(view.mode.to_string(), Style::default().fg(Color::Cyan)),
            Span::raw("  "),
            Span::styled(
                view.target.clone().unwrap_or_else(|| "incognito".to_string()),
                Style::default().fg(Color::Gray),
            ),
        ];
        if view.finalizing {
            spans.push(Span::styled("  finalizing…", Style::default().fg(Color::Yellow)));
        }
        Paragraph::new(Line::from(spans)).render(rows[0], buf);

        let (left, right) = pedal_hints(view.state);
        let hints = Line::from(vec![
            Span::styled(format!("{}: ", view.left_key), Style::default().fg(Color::DarkGray)),
            Span::styled(left, Style::default().fg(Color::White)),
            Span::raw("   "),
            Span::styled(format!("{}: ", view.right_key), Style::default().fg(Color::DarkGray)),
            Span::styled(right, Style::default().fg(Color::White)),
        ]);
        Paragraph::new(hints).render(rows[1], buf);
    }
}
