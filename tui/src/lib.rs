//! TUI rendering and input mapping for Syntest using ratatui.
//!
//! Screens are pure functions of controller state plus a small
//! [`ScreenState`] owned by the host (last pointer position, spinner tick,
//! transient notice).

mod consistency;
mod input;
mod layout;
mod speed;
mod theme;
mod widgets;

pub use consistency::{draw_consistency, summary_lines};
pub use input::{InputMapper, InputPump, PointerTracker, UiCommand, map_key};
pub use layout::{
    ConsistencyLayout, SpeedLayout, cell_at, option_at, option_slots, surface_point,
};
pub use speed::{accuracy_lines, draw_speed};
pub use theme::{
    Glyphs, Palette, UiOptions, contrast_text, glyphs, palette, rgb_color, spinner_frame, styles,
};
pub use widgets::{ColorPlane, Swatch};

use ratatui::Frame;
use ratatui::layout::Rect;
use ratatui::style::Style;
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;
use syntest_engine::{SubmissionFailure, SurfacePoint};

/// Host-owned presentation state.
#[derive(Debug, Clone, Default)]
pub struct ScreenState {
    pub options: UiOptions,
    /// Advances once per frame; drives spinners.
    pub tick: usize,
    /// Last pointer position on the active surface.
    pub pointer: Option<SurfacePoint>,
    /// One-shot message shown in the status bar (e.g. a rejected command).
    pub notice: Option<String>,
}

impl ScreenState {
    #[must_use]
    pub fn new(options: UiOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }
}

/// `key action` pairs rendered as a hint bar.
#[must_use]
pub fn key_hints(hints: &[(&str, &str)], palette: &Palette) -> Line<'static> {
    let mut spans = Vec::with_capacity(hints.len() * 2);
    for (i, (key, action)) in hints.iter().enumerate() {
        let sep = if i + 1 == hints.len() { "" } else { "   " };
        spans.push(Span::styled((*key).to_string(), styles::key_hint(palette)));
        spans.push(Span::styled(format!(" {action}{sep}"), styles::muted(palette)));
    }
    Line::from(spans)
}

/// Status line for an outstanding or failed submission, if any.
#[must_use]
pub fn submission_status(
    failure: Option<&SubmissionFailure>,
    waiting: bool,
    state: &ScreenState,
    palette: &Palette,
    glyphs: &Glyphs,
) -> Option<Line<'static>> {
    if let Some(failure) = failure {
        let mut line = Line::from(Span::styled(
            format!(
                "Save failed after {} attempt(s): {}   ",
                failure.attempts, failure.error
            ),
            Style::default().fg(palette.error),
        ));
        line.spans.extend(
            key_hints(&[("r", "retry"), ("s", "skip and queue")], palette).spans,
        );
        return Some(line);
    }
    if waiting {
        let mut line = Line::from(Span::styled(
            format!(
                "{} saving {} ",
                spinner_frame(state.tick, state.options),
                glyphs.separator
            ),
            styles::muted(palette),
        ));
        line.spans
            .extend(key_hints(&[("c", "cancel")], palette).spans);
        return Some(line);
    }
    None
}

fn draw_status_line(frame: &mut Frame, area: Rect, line: Line<'_>, palette: &Palette) {
    frame.render_widget(
        Paragraph::new(line).style(Style::default().bg(palette.bg_panel)),
        area,
    );
}
