//! Terminal drawing.
//!
//! The top row holds the status line, a prompt, or an error message; the
//! rest of the screen shows the last rendered tables. Every draw repaints
//! the whole frame, so the screen keeps the last body around for prompts
//! and messages drawn while the dashboard is paused.

use ratatui::backend::Backend;
use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::text::Span;
use ratatui::widgets::Paragraph;
use ratatui::{Frame, Terminal};
use unicode_width::UnicodeWidthStr;

use super::editor::LineEditor;
use super::theme::Theme;
use crate::data::MonitoringState;
use crate::error::IotopError;

/// Status line shown above the tables.
pub fn status_line(state: &MonitoringState) -> String {
    let sampling = match state.sample_period {
        Some(period) if period != state.interval => {
            format!(" (sampled every {:.1}s)", period.as_secs_f64())
        }
        _ => String::new(),
    };
    format!(
        " interval: {:.1}s{} | mode: {} | show: {} | d:interval c:mode u:filter q:quit",
        state.interval.as_secs_f64(),
        sampling,
        state.mode.label(),
        state.visibility,
    )
}

/// A terminal plus the content last drawn to it.
pub struct Screen<B: Backend> {
    terminal: Terminal<B>,
    theme: Theme,
    body: String,
}

impl<B: Backend> Screen<B> {
    pub fn new(terminal: Terminal<B>, theme: Theme) -> Self {
        Self {
            terminal,
            theme,
            body: String::new(),
        }
    }

    pub fn terminal(&self) -> &Terminal<B> {
        &self.terminal
    }

    pub fn terminal_mut(&mut self) -> &mut Terminal<B> {
        &mut self.terminal
    }

    /// Draw the status line and fresh table text.
    pub fn draw_dashboard(&mut self, state: &MonitoringState, body: String) -> Result<(), IotopError> {
        self.body = body;
        let status = status_line(state);
        let (theme, body) = (&self.theme, &self.body);
        self.terminal
            .draw(|frame| {
                let (top, rest) = split(frame);
                frame.render_widget(Paragraph::new(status.as_str()).style(theme.header), top);
                frame.render_widget(Paragraph::new(body.as_str()).style(theme.body), rest);
            })
            .map_err(IotopError::Terminal)?;
        Ok(())
    }

    /// Draw `prompt` followed by the editor line, with the cursor shown.
    pub fn draw_prompt(&mut self, prompt: &str, editor: &mut LineEditor) -> Result<(), IotopError> {
        let (theme, body) = (&self.theme, &self.body);
        self.terminal
            .draw(|frame| {
                let (top, rest) = split(frame);
                frame.render_widget(Paragraph::new(body.as_str()).style(theme.body), rest);

                let label = (prompt.width() as u16).min(top.width);
                frame.render_widget(
                    Paragraph::new(Span::styled(prompt, theme.prompt)),
                    Rect { width: label, ..top },
                );

                let input = Rect {
                    x: top.x + label,
                    width: top.width - label,
                    ..top
                };
                editor.adjust_voffset(input.width as usize);
                editor.render(input, frame.buffer_mut());
                if input.width > 0 {
                    let x = editor.cursor_x().min(input.width - 1);
                    frame.set_cursor_position((input.x + x, input.y));
                }
            })
            .map_err(IotopError::Terminal)?;
        Ok(())
    }

    /// Draw an error message on the top row.
    pub fn draw_message(&mut self, message: &str) -> Result<(), IotopError> {
        let (theme, body) = (&self.theme, &self.body);
        self.terminal
            .draw(|frame| {
                let (top, rest) = split(frame);
                frame.render_widget(Paragraph::new(message).style(theme.error), top);
                frame.render_widget(Paragraph::new(body.as_str()).style(theme.body), rest);
            })
            .map_err(IotopError::Terminal)?;
        Ok(())
    }
}

fn split(frame: &Frame) -> (Rect, Rect) {
    let [top, rest] =
        Layout::vertical([Constraint::Length(1), Constraint::Min(0)]).areas(frame.area());
    (top, rest)
}
