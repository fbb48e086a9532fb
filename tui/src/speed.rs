//! Forced-choice (speed-congruency) screen.

use ratatui::Frame;
use ratatui::layout::{Alignment, Rect};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, BorderType, Borders, Paragraph, Wrap};
use syntest_engine::{AccuracyReport, ChoiceOption, SpeedSession, SpeedView};

use crate::layout::{SpeedLayout, option_slots};
use crate::theme::{Glyphs, Palette, glyphs, palette, spinner_frame, styles};
use crate::widgets::Swatch;
use crate::{ScreenState, draw_status_line, key_hints, submission_status};

pub fn draw_speed(frame: &mut Frame, session: &SpeedSession, state: &ScreenState) {
    let palette = palette(state.options);
    let glyphs = glyphs(state.options);
    let bg = Block::default().style(Style::default().bg(palette.bg_dark));
    frame.render_widget(bg, frame.area());

    let layout = SpeedLayout::compute(frame.area());
    let view = session.view();

    let mut header = vec![Span::styled("Speed test", styles::title(&palette))];
    if let SpeedView::Countdown { trial, .. } | SpeedView::Revealed { trial } = view {
        header.push(Span::styled(
            format!(
                " {} trial {}/{}",
                glyphs.separator,
                trial.trial_index() + 1,
                trial.total_trials()
            ),
            styles::muted(&palette),
        ));
    }
    frame.render_widget(Paragraph::new(Line::from(header)), layout.header);

    let body = body_lines(session, view, state, &palette, &glyphs);
    frame.render_widget(
        Paragraph::new(body)
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: false }),
        layout.body,
    );

    let options_frame = Rect {
        x: layout.options.x.saturating_sub(1),
        y: layout.options.y.saturating_sub(1),
        width: layout.options.width + 2,
        height: layout.options.height + 2,
    };
    frame.render_widget(
        Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(styles::border(&palette)),
        options_frame,
    );
    if let SpeedView::Revealed { trial } = view {
        draw_options(frame, trial.options(), layout.options);
    }

    let waiting = matches!(view, SpeedView::Submitting);
    let status = submission_status(session.failure(), waiting, state, &palette, &glyphs)
        .unwrap_or_else(|| status_hints(view, &palette));
    draw_status_line(frame, layout.status, status, &palette);
}

fn body_lines<'a>(
    session: &'a SpeedSession,
    view: SpeedView<'a>,
    state: &ScreenState,
    palette: &Palette,
    glyphs: &Glyphs,
) -> Vec<Line<'a>> {
    let big = |text: String| {
        Line::from(Span::styled(
            text,
            styles::stimulus(palette).add_modifier(Modifier::UNDERLINED),
        ))
    };
    match view {
        SpeedView::Idle => vec![Line::from("")],
        SpeedView::Loading { index } => vec![
            Line::from(""),
            Line::from(Span::styled(
                format!(
                    "{} loading trial {}",
                    spinner_frame(state.tick, state.options),
                    index + 1
                ),
                styles::muted(palette),
            )),
        ],
        SpeedView::LoadFailed { error } => vec![
            Line::from(""),
            Line::from(Span::styled(
                format!("Could not load the next trial: {error}"),
                Style::default().fg(palette.error),
            )),
        ],
        SpeedView::Countdown { trial, remaining } => vec![
            big(trial.trigger().to_string()),
            Line::from(""),
            Line::from(Span::styled(
                remaining.to_string(),
                Style::default()
                    .fg(palette.accent)
                    .add_modifier(Modifier::BOLD),
            )),
        ],
        SpeedView::Revealed { trial } => vec![
            big(trial.trigger().to_string()),
            Line::from(""),
            Line::from(Span::styled(
                "Which color goes with it?",
                styles::muted(palette),
            )),
        ],
        SpeedView::Submitting => vec![
            Line::from(""),
            Line::from(Span::styled(
                format!("{} saving", spinner_frame(state.tick, state.options)),
                styles::muted(palette),
            )),
        ],
        SpeedView::Finished => accuracy_lines(&session.accuracy(), palette, glyphs),
    }
}

fn draw_options(frame: &mut Frame, options: &[ChoiceOption], area: Rect) {
    for (slot, (option, rect)) in options
        .iter()
        .zip(option_slots(area, options.len()))
        .enumerate()
    {
        let caption = (slot + 1).to_string();
        let inset = Rect {
            x: rect.x + u16::from(rect.width > 2),
            width: rect.width.saturating_sub(2),
            ..rect
        };
        frame.render_widget(Swatch::new(option.color).caption(&caption), inset);
    }
}

fn status_hints(view: SpeedView<'_>, palette: &Palette) -> Line<'static> {
    match view {
        SpeedView::Revealed { trial } => {
            let last = trial.options().len().min(9);
            let mut spans = vec![
                Span::styled(format!("1-{last}"), styles::key_hint(palette)),
                Span::styled(" choose (or click)   ", styles::muted(palette)),
            ];
            spans.extend(key_hints(&[("q", "quit")], palette).spans);
            Line::from(spans)
        }
        SpeedView::LoadFailed { .. } => key_hints(&[("r", "retry"), ("q", "quit")], palette),
        SpeedView::Loading { .. } => key_hints(&[("c", "cancel"), ("q", "quit")], palette),
        _ => key_hints(&[("q", "quit")], palette),
    }
}

#[must_use]
pub fn accuracy_lines(
    report: &AccuracyReport,
    palette: &Palette,
    glyphs: &Glyphs,
) -> Vec<Line<'static>> {
    let rt = report
        .mean_correct_reaction_time_ms
        .map_or_else(|| "n/a".to_string(), |ms| format!("{ms:.0} ms"));
    vec![
        Line::from(Span::styled("Speed test complete", styles::title(palette))),
        Line::from(""),
        Line::from(Span::styled(
            format!(
                "{} correct of {} {} {:.0}% accuracy",
                report.correct,
                report.trials,
                glyphs.separator,
                report.accuracy * 100.0
            ),
            Style::default().fg(palette.text_primary),
        )),
        Line::from(Span::styled(
            format!("Mean reaction time (correct trials): {rt}"),
            styles::muted(palette),
        )),
    ]
}
