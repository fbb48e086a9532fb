//! Event loops driving the controllers against the terminal.
//!
//! ```text
//!   InputPump ──events──> UiCommand ──> controller ──effects──> EffectRunner
//!       ^                                   ^                       │
//!       └──── redraw every turn ────────────┴──── HostEvent ────────┘
//! ```
//! Each turn handles exactly one input event, host event, or frame tick,
//! then drains the controller's effects into the runner.

use std::io::Write;
use std::time::Duration;

use anyhow::Result;
use ratatui::Terminal;
use ratatui::layout::Rect;
use ratatui::prelude::Backend;
use syntest_engine::{
    Effect, EffectRunner, HostEvent, OptionId, PendingQueue, PointerEvent, SpeedSession,
    SpeedView, SurfacePoint, TransitionError, TrialController,
};
use syntest_tui::{
    ConsistencyLayout, InputMapper, InputPump, ScreenState, SpeedLayout, UiCommand,
    draw_consistency, draw_speed, option_at,
};
use syntest_types::{ConsistencySummary, SessionPhase};
use tokio::sync::mpsc::UnboundedReceiver;

const FRAME_DURATION: Duration = Duration::from_millis(100);

/// How a consistency run ended.
#[derive(Debug)]
pub struct ConsistencyOutcome {
    pub session_id: String,
    pub summary: Option<ConsistencySummary>,
    pub completed: bool,
    pub pending: PendingQueue,
}

/// How a speed run ended.
#[derive(Debug)]
pub struct SpeedOutcome {
    pub completed: bool,
    pub pending: PendingQueue,
}

enum Flow {
    Continue,
    Finish,
    Quit,
}

fn area<B: Backend>(terminal: &Terminal<B>) -> Result<Rect>
where
    B::Error: Send + Sync + 'static,
{
    let size = terminal.size()?;
    Ok(Rect::new(0, 0, size.width, size.height))
}

/// Hand I/O effects to the runner; the rest only need logging in a terminal host.
fn dispatch(runner: &mut EffectRunner, effects: Vec<Effect>) {
    for effect in runner.apply_all(effects) {
        match effect {
            Effect::StartPlayback(step) => {
                tracing::debug!(label = %step.label, "Tone playback is not available in the terminal");
            }
            Effect::PhaseChanged(phase) => tracing::info!(phase = phase.as_str(), "Phase changed"),
            other => tracing::trace!(?other, "UI effect"),
        }
    }
}

fn remember_pointer(state: &mut ScreenState, event: PointerEvent) {
    match event {
        PointerEvent::Down(p) | PointerEvent::Move(p) | PointerEvent::Click(p) => {
            state.pointer = Some(p);
        }
        PointerEvent::Up => {}
    }
}

fn note(state: &mut ScreenState, result: Result<(), TransitionError>) {
    state.notice = result.err().map(|err| err.to_string());
}

pub async fn run_consistency<B>(
    terminal: &mut Terminal<B>,
    mut controller: TrialController,
    runner: &mut EffectRunner,
    events: &mut UnboundedReceiver<HostEvent>,
    state: &mut ScreenState,
) -> Result<ConsistencyOutcome>
where
    B: Backend + Write,
    B::Error: Send + Sync + 'static,
{
    let mut input = InputPump::new();
    let mut mapper = InputMapper::new();
    let mut frames = tokio::time::interval(FRAME_DURATION);
    frames.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    controller.start();
    dispatch(runner, controller.drain_effects());

    let result: Result<Flow> = loop {
        if let Err(e) = terminal.draw(|frame| draw_consistency(frame, &controller, state)) {
            break Err(e.into());
        }

        tokio::select! {
            ev = input.next() => {
                let ev = match ev {
                    Ok(ev) => ev,
                    Err(e) => break Err(e),
                };
                let plane = match area(terminal) {
                    Ok(area) => ConsistencyLayout::compute(area).plane,
                    Err(e) => break Err(e),
                };
                let mut flow = Flow::Continue;
                for command in mapper.translate(&ev, plane) {
                    flow = consistency_command(&mut controller, state, command);
                    if !matches!(flow, Flow::Continue) {
                        break;
                    }
                }
                if !matches!(flow, Flow::Continue) {
                    break Ok(flow);
                }
            }
            Some(event) = events.recv() => {
                if let HostEvent::SubmissionFinished { ticket, result } = event {
                    controller.on_submission_result(ticket, result);
                }
            }
            _ = frames.tick() => {
                state.tick = state.tick.wrapping_add(1);
            }
        }
        dispatch(runner, controller.drain_effects());
    };

    input.shutdown().await;
    let flow = result?;
    let session_id = controller.session_id().to_string();
    let summary = controller.summary().cloned();
    let teardown = controller.teardown();
    dispatch(runner, teardown.effects);
    Ok(ConsistencyOutcome {
        session_id,
        summary,
        completed: matches!(flow, Flow::Finish),
        pending: teardown.pending,
    })
}

fn consistency_command(
    controller: &mut TrialController,
    state: &mut ScreenState,
    command: UiCommand,
) -> Flow {
    let phase = controller.phase();
    match command {
        UiCommand::Quit => return Flow::Quit,
        UiCommand::Confirm => {
            if phase == SessionPhase::Done {
                if controller.failure().is_none() && !controller.is_waiting() {
                    return Flow::Finish;
                }
                state.notice = Some("Retry or skip the failed submission first".into());
            } else if phase == SessionPhase::Intro {
                note(state, controller.acknowledge_intro());
            } else {
                note(state, controller.commit());
            }
        }
        UiCommand::ToggleNoColor => note(state, controller.toggle_no_color()),
        UiCommand::ToggleFreeze => note(state, controller.toggle_freeze()),
        UiCommand::Retry => note(state, controller.retry_submission()),
        UiCommand::Skip => note(state, controller.skip_submission()),
        UiCommand::Cancel => note(state, controller.cancel_submission()),
        UiCommand::PrevBlock => {
            let Some(current) = controller.current_step().map(|s| s.block_index) else {
                return Flow::Continue;
            };
            note(state, controller.jump_to_block(current.saturating_sub(1)));
        }
        UiCommand::Pointer(event) => {
            remember_pointer(state, event);
            if controller.pointer(event) {
                state.notice = None;
            }
        }
        UiCommand::Choose(_) | UiCommand::Redraw => {}
    }
    Flow::Continue
}

pub async fn run_speed<B>(
    terminal: &mut Terminal<B>,
    mut session: SpeedSession,
    runner: &mut EffectRunner,
    events: &mut UnboundedReceiver<HostEvent>,
    state: &mut ScreenState,
) -> Result<SpeedOutcome>
where
    B: Backend + Write,
    B::Error: Send + Sync + 'static,
{
    let mut input = InputPump::new();
    let mut mapper = InputMapper::new();
    let mut frames = tokio::time::interval(FRAME_DURATION);
    frames.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    note(state, session.start());
    dispatch(runner, session.drain_effects());

    let result: Result<Flow> = loop {
        if let Err(e) = terminal.draw(|frame| draw_speed(frame, &session, state)) {
            break Err(e.into());
        }

        tokio::select! {
            ev = input.next() => {
                let ev = match ev {
                    Ok(ev) => ev,
                    Err(e) => break Err(e),
                };
                let options = match area(terminal) {
                    Ok(area) => SpeedLayout::compute(area).options,
                    Err(e) => break Err(e),
                };
                let mut flow = Flow::Continue;
                for command in mapper.translate(&ev, options) {
                    flow = speed_command(&mut session, state, command);
                    if !matches!(flow, Flow::Continue) {
                        break;
                    }
                }
                if !matches!(flow, Flow::Continue) {
                    break Ok(flow);
                }
            }
            Some(event) = events.recv() => match event {
                HostEvent::SubmissionFinished { ticket, result } => {
                    session.on_submission_result(ticket, result);
                }
                HostEvent::TrialLoaded { ticket, result } => {
                    session.on_trial_loaded(ticket, result);
                }
                HostEvent::CountdownTick { generation } => {
                    session.tick(generation);
                }
            },
            _ = frames.tick() => {
                state.tick = state.tick.wrapping_add(1);
            }
        }
        dispatch(runner, session.drain_effects());
    };

    input.shutdown().await;
    let flow = result?;
    let teardown = session.teardown();
    dispatch(runner, teardown.effects);
    Ok(SpeedOutcome {
        completed: matches!(flow, Flow::Finish),
        pending: teardown.pending,
    })
}

fn speed_command(session: &mut SpeedSession, state: &mut ScreenState, command: UiCommand) -> Flow {
    match command {
        UiCommand::Quit => return Flow::Quit,
        UiCommand::Confirm if session.is_finished() && session.failure().is_none() => {
            return Flow::Finish;
        }
        UiCommand::Choose(slot) => choose(session, state, slot),
        UiCommand::Pointer(PointerEvent::Click(point)) => choose_at(session, state, point),
        UiCommand::Retry => {
            let result = if session.failure().is_some() {
                session.retry_submission()
            } else {
                session.retry_load()
            };
            note(state, result);
        }
        UiCommand::Skip => note(state, session.skip_submission()),
        UiCommand::Cancel => note(state, session.cancel_pending()),
        _ => {}
    }
    Flow::Continue
}

fn revealed_option(session: &SpeedSession, slot: usize) -> Option<OptionId> {
    match session.view() {
        SpeedView::Revealed { trial } => trial.options().get(slot).map(|o| o.id.clone()),
        _ => None,
    }
}

fn choose(session: &mut SpeedSession, state: &mut ScreenState, slot: usize) {
    let Some(id) = revealed_option(session, slot) else {
        return;
    };
    match session.select(&id) {
        Ok(correct) => {
            tracing::debug!(slot, correct, "Option selected");
            state.notice = None;
        }
        Err(err) => state.notice = Some(err.to_string()),
    }
}

fn choose_at(session: &mut SpeedSession, state: &mut ScreenState, point: SurfacePoint) {
    let count = match session.view() {
        SpeedView::Revealed { trial } => trial.options().len(),
        _ => return,
    };
    if let Some(slot) = option_at(point, count) {
        choose(session, state, slot);
    }
}
