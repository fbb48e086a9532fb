//! Consistency session screens: intro, trial, and results.

use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, BorderType, Borders, Padding, Paragraph, Wrap};
use syntest_engine::{CaptureMode, DraftAnswer, SurfacePoint, TrialController};
use syntest_types::{ConsistencySummary, SessionPhase, StimulusDomain};

use crate::layout::ConsistencyLayout;
use crate::theme::{Glyphs, Palette, glyphs, palette, rgb_color, styles};
use crate::widgets::{ColorPlane, Swatch};
use crate::{ScreenState, draw_status_line, key_hints, submission_status};

pub fn draw_consistency(frame: &mut Frame, controller: &TrialController, state: &ScreenState) {
    let palette = palette(state.options);
    let glyphs = glyphs(state.options);
    let bg = Block::default().style(Style::default().bg(palette.bg_dark));
    frame.render_widget(bg, frame.area());

    match controller.phase() {
        SessionPhase::Intro => draw_intro(frame, controller, &palette),
        SessionPhase::Practice | SessionPhase::Testing => {
            draw_trial(frame, controller, state, &palette, &glyphs);
        }
        SessionPhase::Done => draw_results(frame, controller, state, &palette, &glyphs),
    }
}

fn draw_intro(frame: &mut Frame, controller: &TrialController, palette: &Palette) {
    let area = centered(frame.area(), 70, 16);
    let mut lines = vec![
        Line::from(Span::styled(controller.title(), styles::title(palette))),
        Line::from(""),
    ];
    if let Some(intro) = controller.intro() {
        lines.extend(
            intro
                .lines()
                .map(|l| Line::from(Span::styled(l, Style::default().fg(palette.text_primary)))),
        );
        lines.push(Line::from(""));
    }
    lines.push(Line::from(vec![
        Span::styled("Enter", styles::key_hint(palette)),
        Span::styled(" begin   ", styles::muted(palette)),
        Span::styled("q", styles::key_hint(palette)),
        Span::styled(" quit", styles::muted(palette)),
    ]));
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(styles::border(palette))
        .padding(Padding::horizontal(2));
    frame.render_widget(
        Paragraph::new(lines).block(block).wrap(Wrap { trim: false }),
        area,
    );
}

fn draw_trial(
    frame: &mut Frame,
    controller: &TrialController,
    state: &ScreenState,
    palette: &Palette,
    glyphs: &Glyphs,
) {
    let layout = ConsistencyLayout::compute(frame.area());
    draw_header(frame, controller, layout.header, palette, glyphs);
    draw_stimulus(frame, controller, layout.stimulus, palette, glyphs);
    draw_swatch(frame, controller, layout.swatch, palette);

    let plane_frame = Rect {
        x: layout.plane.x.saturating_sub(1),
        y: layout.plane.y.saturating_sub(1),
        width: layout.plane.width + 2,
        height: layout.plane.height + 2,
    };
    let border = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(styles::border(palette))
        .title(Span::styled(" hue / lightness ", styles::muted(palette)));
    frame.render_widget(border, plane_frame);

    let sampler = |point: SurfacePoint| controller.sample(point);
    let marker = (controller.capture_mode() == CaptureMode::Frozen)
        .then_some(state.pointer)
        .flatten();
    frame.render_widget(
        ColorPlane::new(&sampler).marker(marker, glyphs.marker),
        layout.plane,
    );

    let status = status_line(controller, state, palette, glyphs);
    draw_status_line(frame, layout.status, status, palette);
}

fn draw_header(
    frame: &mut Frame,
    controller: &TrialController,
    area: Rect,
    palette: &Palette,
    glyphs: &Glyphs,
) {
    let mut spans = vec![
        Span::styled(controller.title(), styles::title(palette)),
        Span::styled(format!(" {} ", glyphs.separator), styles::muted(palette)),
        Span::styled(
            controller.phase().as_str(),
            Style::default().fg(palette.text_secondary),
        ),
    ];
    if let Some((index, total)) = controller.progress() {
        let shown = (index + 1).min(total);
        spans.push(Span::styled(
            format!(" {} trial {shown}/{total}", glyphs.separator),
            styles::muted(palette),
        ));
    }
    if let Some(step) = controller.current_step() {
        spans.push(Span::styled(
            format!(
                " {} block {}/{}",
                glyphs.separator,
                step.block_index + 1,
                controller.block_count()
            ),
            styles::muted(palette),
        ));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn draw_stimulus(
    frame: &mut Frame,
    controller: &TrialController,
    area: Rect,
    palette: &Palette,
    glyphs: &Glyphs,
) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(styles::border(palette));
    let Some(step) = controller.current_step() else {
        frame.render_widget(block, area);
        return;
    };
    let label = match step.domain {
        StimulusDomain::Tone => format!("{} {}", glyphs.tone, step.label),
        _ => step.label.to_string(),
    };
    let lines = vec![
        Line::from(""),
        Line::from(Span::styled(
            label,
            styles::stimulus(palette).add_modifier(Modifier::UNDERLINED),
        )),
    ];
    frame.render_widget(
        Paragraph::new(lines)
            .alignment(Alignment::Center)
            .block(block),
        area,
    );
}

fn draw_swatch(frame: &mut Frame, controller: &TrialController, area: Rect, palette: &Palette) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(styles::border(palette));
    let inner = block.inner(area);
    frame.render_widget(block, area);
    match controller.draft() {
        DraftAnswer::Live(color) => {
            frame.render_widget(Swatch::new(color).caption("live"), inner);
        }
        DraftAnswer::Locked(color) => {
            frame.render_widget(Swatch::new(color).caption(&color.hex()), inner);
        }
        DraftAnswer::NoColor => frame.render_widget(
            Paragraph::new("no color")
                .alignment(Alignment::Center)
                .style(Style::default().fg(palette.warning)),
            inner,
        ),
        DraftAnswer::Empty => frame.render_widget(
            Paragraph::new("pick a color")
                .alignment(Alignment::Center)
                .style(styles::muted(palette)),
            inner,
        ),
    }
}

fn status_line<'a>(
    controller: &'a TrialController,
    state: &'a ScreenState,
    palette: &Palette,
    glyphs: &Glyphs,
) -> Line<'a> {
    if let Some(line) = submission_status(
        controller.failure(),
        controller.is_waiting(),
        state,
        palette,
        glyphs,
    ) {
        return line;
    }
    if let Some(notice) = state.notice.as_deref() {
        return Line::from(Span::styled(notice, Style::default().fg(palette.warning)));
    }
    let mut hints = vec![("Enter", "commit"), ("n", "no color"), ("f", "freeze")];
    if controller.dev_navigation() {
        hints.push(("[", "previous block"));
    }
    hints.push(("q", "quit"));
    key_hints(&hints, palette)
}

fn draw_results(
    frame: &mut Frame,
    controller: &TrialController,
    state: &ScreenState,
    palette: &Palette,
    glyphs: &Glyphs,
) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(1)])
        .split(frame.area());

    let mut lines = vec![
        Line::from(Span::styled(controller.title(), styles::title(palette))),
        Line::from(""),
    ];
    match controller.summary() {
        Some(summary) => lines.extend(summary_lines(summary, palette, glyphs)),
        None => lines.push(Line::from(Span::styled(
            "No testing responses were recorded.",
            styles::muted(palette),
        ))),
    }
    let queued = controller.pending().len();
    if queued > 0 {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            format!("{queued} submission(s) queued locally; run `syntest resync` to send them."),
            Style::default().fg(palette.warning),
        )));
    }
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(styles::border(palette))
        .padding(Padding::horizontal(1));
    frame.render_widget(
        Paragraph::new(lines).block(block).wrap(Wrap { trim: false }),
        rows[0],
    );

    let status = submission_status(
        controller.failure(),
        controller.is_waiting(),
        state,
        palette,
        glyphs,
    )
    .unwrap_or_else(|| key_hints(&[("Enter", "finish"), ("q", "quit")], palette));
    draw_status_line(frame, rows[1], status, palette);
}

/// Verdict, aggregate statistics, and one row per stimulus.
#[must_use]
pub fn summary_lines(
    summary: &ConsistencySummary,
    palette: &Palette,
    glyphs: &Glyphs,
) -> Vec<Line<'static>> {
    let verdict = if summary.pass {
        Span::styled(
            glyphs.pass,
            Style::default()
                .fg(palette.success)
                .add_modifier(Modifier::BOLD),
        )
    } else {
        Span::styled(
            glyphs.fail,
            Style::default()
                .fg(palette.error)
                .add_modifier(Modifier::BOLD),
        )
    };
    let stat = |name: &str, value: String| {
        Line::from(vec![
            Span::styled(format!("{name:<22}"), styles::muted(palette)),
            Span::styled(value, Style::default().fg(palette.text_primary)),
        ])
    };
    let mut lines = vec![
        Line::from(vec![
            verdict,
            Span::styled(
                format!("  (cutoff {:.1})", summary.cutoff),
                styles::muted(palette),
            ),
        ]),
        Line::from(""),
        stat("Mean distance", format!("{:.2}", summary.overall_mean)),
        stat("Standard deviation", format!("{:.2}", summary.overall_sd)),
        stat("Median distance", format!("{:.2}", summary.median_distance)),
        stat("Distance pairs", summary.pair_count.to_string()),
        stat(
            "Consistency score",
            summary
                .consistency_score()
                .map_or_else(|| "n/a".to_string(), |s| format!("{s:.2}")),
        ),
        stat(
            "No-color responses",
            format!("{:.0}%", summary.none_fraction * 100.0),
        ),
        stat(
            "Mean reaction time",
            format!("{:.0} ms", summary.mean_reaction_time_ms),
        ),
        stat(
            "Items with associations",
            format!("{}/{}", summary.valid_item_count(), summary.per_item.len()),
        ),
        Line::from(""),
    ];
    for item in &summary.per_item {
        let mut spans = vec![Span::styled(
            format!("{:<12}", item.label.as_str()),
            Style::default().fg(palette.text_primary),
        )];
        match item.mean_color {
            Some(color) => spans.push(Span::styled("    ", Style::default().bg(rgb_color(color)))),
            None => spans.push(Span::raw("    ")),
        }
        let detail = match item.mean_distance {
            Some(d) => format!("  mean {d:>6.1}  ({} valid)", item.valid_responses),
            None => format!("  insufficient ({} valid)", item.valid_responses),
        };
        let style = if item.is_insufficient() {
            Style::default().fg(palette.warning)
        } else {
            styles::muted(palette)
        };
        spans.push(Span::styled(detail, style));
        lines.push(Line::from(spans));
    }
    lines
}

/// A `width` x `height` rectangle centered in `area`, clamped to fit.
fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}
