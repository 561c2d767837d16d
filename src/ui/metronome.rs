// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Metronome panel.

use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Paragraph, Widget},
};

use super::MetronomeView;

/// Beat row, e.g. `○ ● ○ ○` for the second beat of 4/4
pub fn beat_dots(beats: u32, current: Option<u32>) -> String {
    (0..beats)
        .map(|i| if Some(i) == current { "●" } else { "○" })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Metronome widget: run state, tempo, meter, volume and a visual beat
pub struct MetronomeWidget<'a> {
    view: &'a MetronomeView,
    flash: bool,
    block: Option<Block<'a>>,
}

impl<'a> MetronomeWidget<'a> {
    pub fn new(view: &'a MetronomeView) -> Self {
        Self {
            view,
            flash: false,
            block: None,
        }
    }

    /// Highlight the current beat
    pub fn flash(mut self, flash: bool) -> Self {
        self.flash = flash;
        self
    }

    pub fn block(mut self, block: Block<'a>) -> Self {
        self.block = Some(block);
        self
    }
}

impl Widget for MetronomeWidget<'_> {
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
        let (indicator, indicator_style) = if view.running {
            ("▶ ON ", Style::default().fg(Color::Green).add_modifier(Modifier::BOLD))
        } else {
            ("■ OFF", Style::default().fg(Color::Yellow))
        };

        let mut spans = vec![
            Span::styled(indicator, indicator_style),
            Span::raw("  "),
            Span::styled(
                format!("{:.0} BPM", view.tempo),
                Style::default().fg(Color::Magenta).add_modifier(Modifier::BOLD),
            ),
            Span::raw("  "),
            Span::styled(view.signature.clone(), Style::default().fg(Color::White)),
            Span::raw("  "),
            Span::styled(format!("vol {:>3.0}%", view.volume * 100.0), Style::default().fg(Color::Cyan)),
        ];
        if view.accent {
            spans.push(Span::styled("  accent", Style::default().fg(Color::Gray)));
        }
        if view.record_click {
            spans.push(Span::styled("  click→take", Style::default().fg(Color::Red)));
        }
        Paragraph::new(Line::from(spans)).render(rows[0], buf);

        let current = if view.running && self.flash { view.beat_index } else { None };
        let dot_style = match current {
            Some(0) if view.accent => Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            Some(_) => Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
            None => Style::default().fg(Color::DarkGray),
        };
        Paragraph::new(beat_dots(view.beats_per_measure, current))
            .style(dot_style)
            .render(rows[1], buf);
    }
}
