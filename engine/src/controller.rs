//! Consistency session state machine.
//!
//! # Phases
//! ```text
//!   ┌───────┐ acknowledge ┌──────────┐ deck done ┌─────────┐ summary sent ┌──────┐
//!   │ Intro │ ──────────> │ Practice │ ────────> │ Testing │ ───────────> │ Done │
//!   └───────┘             └──────────┘           └─────────┘              └──────┘
//!       │    (no practice)                            ^
//!       └─────────────────────────────────────────────┘
//! ```
//! Intro appears only when intro text is configured; Practice only when a
//! practice catalog is configured.
//!
//! # Steps
//! ```text
//!   Presented(draft) ── commit ──> Captured ── delivered / skipped ──> next Presented
//!                                     │                                  or phase end
//!                                     └── failed ──> (host: retry | skip)
//! ```
//! Commit requires a locked color or an explicit no-color flag. While a
//! submission is outstanding or failed, only retry, skip and cancel are
//! accepted. The deck index advances by exactly one per completed step.

use std::sync::Arc;

use chrono::Utc;
use rand::SeedableRng;
use rand::rngs::StdRng;
use syntest_types::{
    Answer, ConsistencySummary, Rgb, SessionPhase, StimulusCatalog, Submission, SummaryPayload,
    TrialKind, TrialPayload, TrialResponse, TrialStep,
};
use uuid::Uuid;

use crate::capture::{AnalogCapture, CaptureMode, CaptureUpdate, ColorSurface, PointerEvent};
use crate::scoring::{ScoringConfig, score};
use crate::submission::{
    Completion, Decided, FailureDecision, PendingQueue, RequestTicket, SubmissionError,
    SubmissionFailure, SubmissionGateway,
};
use crate::{
    Clock, Deck, Effect, EngineError, ReactionTimer, SurfacePoint, Teardown, TransitionError,
};

#[derive(Debug, Clone)]
pub struct PhasePlan {
    pub catalog: StimulusCatalog,
    pub repeats: usize,
}

#[derive(Debug, Clone)]
pub struct SessionPlan {
    pub title: String,
    pub intro: Option<String>,
    pub practice: Option<PhasePlan>,
    pub testing: PhasePlan,
}

#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub scoring: ScoringConfig,
    /// Also submit practice trials (tagged `practice`).
    pub submit_practice: bool,
    /// Allow block navigation.
    pub dev_navigation: bool,
    pub seed: Option<u64>,
}

/// The response being formed for the open step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DraftAnswer {
    #[default]
    Empty,
    /// Tracking the pointer; not yet committable.
    Live(Rgb),
    Locked(Rgb),
    NoColor,
}

impl DraftAnswer {
    fn committable(self) -> Option<Answer> {
        match self {
            DraftAnswer::Locked(color) => Some(Answer::Color(color)),
            DraftAnswer::NoColor => Some(Answer::NoColor),
            DraftAnswer::Empty | DraftAnswer::Live(_) => None,
        }
    }

    #[must_use]
    pub fn color(self) -> Option<Rgb> {
        match self {
            DraftAnswer::Live(c) | DraftAnswer::Locked(c) => Some(c),
            DraftAnswer::Empty | DraftAnswer::NoColor => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AfterSubmit {
    Advance,
    Finish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepState {
    Presented(DraftAnswer),
    Captured(AfterSubmit),
}

#[derive(Debug)]
struct DeckRun {
    kind: TrialKind,
    deck: Deck,
    index: usize,
    responses: Vec<TrialResponse>,
    step: StepState,
}

impl DeckRun {
    fn new(kind: TrialKind, deck: Deck) -> Self {
        Self {
            kind,
            deck,
            index: 0,
            responses: Vec::new(),
            step: StepState::Presented(DraftAnswer::Empty),
        }
    }

    fn current(&self) -> Option<&TrialStep> {
        self.deck.step(self.index)
    }
}

#[derive(Debug)]
pub struct TrialController {
    session_id: String,
    title: String,
    intro: Option<String>,
    settings: ControllerSettings,
    phase: SessionPhase,
    started: bool,
    practice_deck: Option<Deck>,
    testing_deck: Option<Deck>,
    run: Option<DeckRun>,
    practice_responses: Vec<TrialResponse>,
    summary: Option<ConsistencySummary>,
    capture: AnalogCapture,
    timer: ReactionTimer,
    gateway: SubmissionGateway,
    pending: PendingQueue,
    playing: bool,
    outbox: Vec<Effect>,
}

impl TrialController {
    pub fn new(
        plan: SessionPlan,
        settings: ControllerSettings,
        surface: Box<dyn ColorSurface>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, EngineError> {
        let mut rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let practice_deck = plan
            .practice
            .as_ref()
            .map(|p| Deck::build(&p.catalog, p.repeats, &mut rng))
            .transpose()?;
        let testing_deck = Deck::build(&plan.testing.catalog, plan.testing.repeats, &mut rng)?;

        let intro = plan.intro.filter(|text| !text.trim().is_empty());
        let session_id = Uuid::new_v4().to_string();
        tracing::info!(
            session_id = %session_id,
            title = %plan.title,
            practice = practice_deck.as_ref().map_or(0, Deck::len),
            testing = testing_deck.len(),
            "Created consistency session"
        );

        Ok(Self {
            session_id,
            title: plan.title,
            intro,
            settings,
            phase: SessionPhase::Intro,
            started: false,
            practice_deck,
            testing_deck: Some(testing_deck),
            run: None,
            practice_responses: Vec::new(),
            summary: None,
            capture: AnalogCapture::new(surface),
            timer: ReactionTimer::new(clock),
            gateway: SubmissionGateway::new(),
            pending: PendingQueue::new(),
            playing: false,
            outbox: Vec::new(),
        })
    }

    /// Enter the first phase. Idempotent.
    pub fn start(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        if self.intro.is_some() {
            self.outbox.push(Effect::PhaseChanged(SessionPhase::Intro));
        } else {
            self.enter_first_deck();
        }
    }

    pub fn acknowledge_intro(&mut self) -> Result<(), TransitionError> {
        if !self.started || self.phase != SessionPhase::Intro || self.intro.is_none() {
            return Err(TransitionError::WrongStage("intro is not showing"));
        }
        self.enter_first_deck();
        Ok(())
    }

    fn enter_first_deck(&mut self) {
        if let Some(deck) = self.practice_deck.take() {
            self.enter_deck(SessionPhase::Practice, TrialKind::Practice, deck);
        } else {
            self.enter_testing();
        }
    }

    fn enter_testing(&mut self) {
        match self.testing_deck.take() {
            Some(deck) => self.enter_deck(SessionPhase::Testing, TrialKind::Consistency, deck),
            None => self.set_phase(SessionPhase::Done),
        }
    }

    fn enter_deck(&mut self, phase: SessionPhase, kind: TrialKind, deck: Deck) {
        self.run = Some(DeckRun::new(kind, deck));
        self.set_phase(phase);
        self.present();
    }

    fn set_phase(&mut self, phase: SessionPhase) {
        tracing::info!(from = self.phase.as_str(), to = phase.as_str(), "Phase changed");
        self.phase = phase;
        self.outbox.push(Effect::PhaseChanged(phase));
    }

    fn present(&mut self) {
        self.stop_playback();
        self.capture.reset();
        let Some(run) = self.run.as_mut() else { return };
        run.step = StepState::Presented(DraftAnswer::Empty);
        let total = run.deck.len();
        let index = run.index;
        let Some(step) = run.current().cloned() else {
            return;
        };
        self.timer.start();
        tracing::debug!(index, total, label = %step.label, "Presenting step");
        self.outbox.push(Effect::StepPresented {
            index,
            total,
            step: step.clone(),
        });
        if step.domain.needs_playback() {
            self.playing = true;
            self.outbox.push(Effect::StartPlayback(step));
        }
    }

    fn stop_playback(&mut self) {
        if self.playing {
            self.playing = false;
            self.outbox.push(Effect::StopPlayback);
        }
    }

    fn draft_mut(&mut self) -> Result<&mut DraftAnswer, TransitionError> {
        let phase = self.phase;
        if !phase.has_deck() {
            return Err(TransitionError::NoOpenTrial { phase });
        }
        if self.gateway.is_busy() {
            return Err(TransitionError::Busy("waiting on a submission"));
        }
        match self.run.as_mut().map(|run| &mut run.step) {
            Some(StepState::Presented(draft)) => Ok(draft),
            Some(StepState::Captured(_)) => Err(TransitionError::Busy("waiting on a submission")),
            None => Err(TransitionError::NoOpenTrial { phase }),
        }
    }

    /// Feed a pointer event into the capture. Returns true when the draft changed.
    pub fn pointer(&mut self, event: PointerEvent) -> bool {
        if self.draft_mut().is_err() {
            return false;
        }
        let Some(update) = self.capture.handle(event) else {
            return false;
        };
        let next = match update {
            CaptureUpdate::Live(color) => DraftAnswer::Live(color),
            CaptureUpdate::Locked(color) => DraftAnswer::Locked(color),
        };
        if let Ok(draft) = self.draft_mut() {
            *draft = next;
        }
        true
    }

    /// Flag the open trial as "no color". Clears any captured color.
    pub fn set_no_color(&mut self) -> Result<(), TransitionError> {
        self.draft_mut()?;
        self.capture.reset();
        *self.draft_mut()? = DraftAnswer::NoColor;
        Ok(())
    }

    pub fn toggle_no_color(&mut self) -> Result<(), TransitionError> {
        if *self.draft_mut()? == DraftAnswer::NoColor {
            *self.draft_mut()? = DraftAnswer::Empty;
            Ok(())
        } else {
            self.set_no_color()
        }
    }

    /// Keyboard equivalent of a click at the last pointer position.
    pub fn toggle_freeze(&mut self) -> Result<(), TransitionError> {
        self.draft_mut()?;
        let next = match self.capture.mode() {
            CaptureMode::Live => match self.capture.freeze() {
                Some(update) => DraftAnswer::Locked(update.color()),
                None => return Ok(()),
            },
            CaptureMode::Frozen => {
                self.capture.unfreeze();
                self.capture.color().map_or(DraftAnswer::Empty, DraftAnswer::Live)
            }
        };
        *self.draft_mut()? = next;
        Ok(())
    }

    pub fn commit(&mut self) -> Result<(), TransitionError> {
        let answer = self
            .draft_mut()?
            .committable()
            .ok_or(TransitionError::MissingAnswer)?;
        let reaction_time_ms = self.timer.elapsed_ms();
        self.timer.stop();
        self.stop_playback();

        let submit_practice = self.settings.submit_practice;
        let Some(run) = self.run.as_mut() else {
            return Err(TransitionError::NoOpenTrial { phase: self.phase });
        };
        let Some(step) = run.current().cloned() else {
            return Err(TransitionError::NoOpenTrial { phase: self.phase });
        };
        let response = TrialResponse {
            step,
            answer,
            reaction_time_ms,
        };
        tracing::debug!(
            index = run.index,
            label = %response.step.label,
            reaction_time_ms,
            none = response.is_none(),
            "Committed response"
        );
        let kind = run.kind;
        let payload = TrialPayload::from_response(&self.session_id, kind, &response, Utc::now());
        run.responses.push(response);

        let submit = kind == TrialKind::Consistency || submit_practice;
        if submit {
            run.step = StepState::Captured(AfterSubmit::Advance);
            self.submit(Submission::Trial(payload));
        } else {
            self.advance();
        }
        Ok(())
    }

    fn submit(&mut self, payload: Submission) {
        match self.gateway.begin(payload) {
            Ok(request) => self.outbox.push(Effect::Submit(request)),
            Err(err) => tracing::warn!(%err, "Submission gateway refused payload"),
        }
    }

    fn advance(&mut self) {
        let Some(run) = self.run.as_mut() else { return };
        run.index += 1;
        if run.index < run.deck.len() {
            self.present();
            return;
        }
        let kind = run.kind;
        match kind {
            TrialKind::Practice => {
                if let Some(run) = self.run.take() {
                    self.practice_responses = run.responses;
                }
                self.enter_testing();
            }
            _ => self.finish_testing(),
        }
    }

    fn finish_testing(&mut self) {
        let Some(run) = self.run.as_mut() else { return };
        let summary = score(&run.responses, &self.settings.scoring);
        tracing::info!(
            mean = summary.overall_mean,
            sd = summary.overall_sd,
            pass = summary.pass,
            "Testing deck complete"
        );
        run.step = StepState::Captured(AfterSubmit::Finish);
        let payload =
            SummaryPayload::from_summary(&self.session_id, &self.title, &summary, Utc::now());
        self.summary = Some(summary);
        self.submit(Submission::Summary(payload));
    }

    fn after_delivery(&mut self) {
        let after = match self.run.as_ref().map(|run| run.step) {
            Some(StepState::Captured(after)) => after,
            _ => return,
        };
        match after {
            AfterSubmit::Advance => self.advance(),
            AfterSubmit::Finish => self.set_phase(SessionPhase::Done),
        }
    }

    pub fn on_submission_result(
        &mut self,
        ticket: RequestTicket,
        result: Result<(), SubmissionError>,
    ) -> Completion {
        let completion = self.gateway.complete(ticket, result);
        if matches!(completion, Completion::Delivered(_)) {
            self.after_delivery();
        }
        completion
    }

    pub fn retry_submission(&mut self) -> Result<(), TransitionError> {
        match self
            .gateway
            .decide(FailureDecision::Retry, &mut self.pending)?
        {
            Decided::Resubmit(request) => self.outbox.push(Effect::Submit(request)),
            Decided::Queued => {}
        }
        Ok(())
    }

    /// Park the failed payload in the pending queue and move on.
    pub fn skip_submission(&mut self) -> Result<(), TransitionError> {
        self.gateway
            .decide(FailureDecision::SkipAndQueue, &mut self.pending)?;
        self.after_delivery();
        Ok(())
    }

    /// Abandon the in-flight request; it becomes a failure awaiting retry or skip.
    pub fn cancel_submission(&mut self) -> Result<(), TransitionError> {
        self.gateway.cancel()
    }

    /// Jump back to the first step of `block`, dropping every buffered response
    /// at or after that position. Blocks ahead of the current trial are refused.
    pub fn jump_to_block(&mut self, block: usize) -> Result<(), TransitionError> {
        if !self.settings.dev_navigation {
            return Err(TransitionError::NavigationDisabled);
        }
        self.draft_mut()?;
        let Some(run) = self.run.as_mut() else {
            return Err(TransitionError::NoOpenTrial { phase: self.phase });
        };
        let blocks = run.deck.block_count();
        let target = run
            .deck
            .block_start(block)
            .ok_or(TransitionError::BlockOutOfRange { block, blocks })?;
        if target > run.index {
            return Err(TransitionError::ForwardJump { block });
        }
        let deck = &run.deck;
        let before = run.responses.len();
        run.responses.retain(|r| deck.index_of(&r.step) < target);
        tracing::debug!(
            block,
            target,
            dropped = before - run.responses.len(),
            "Jumped to block"
        );
        run.index = target;
        self.timer.stop();
        self.present();
        Ok(())
    }

    /// Leave the session mid-way: stop timers and playback, discard the open
    /// trial, and queue any submission that was failed or still in flight.
    #[must_use]
    pub fn teardown(mut self) -> Teardown {
        self.timer.stop();
        self.stop_playback();
        let parked = self.gateway.abandon_into(&mut self.pending);
        let discarded = matches!(
            self.run.as_ref().map(|run| run.step),
            Some(StepState::Presented(_))
        );
        tracing::info!(
            session_id = %self.session_id,
            phase = self.phase.as_str(),
            discarded,
            parked,
            pending = self.pending.len(),
            "Session torn down"
        );
        Teardown {
            effects: std::mem::take(&mut self.outbox),
            pending: std::mem::take(&mut self.pending),
        }
    }

    pub fn drain_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.outbox)
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn intro(&self) -> Option<&str> {
        self.intro.as_deref()
    }

    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    #[must_use]
    pub fn current_step(&self) -> Option<&TrialStep> {
        if !self.phase.has_deck() {
            return None;
        }
        self.run.as_ref().and_then(DeckRun::current)
    }

    /// `(index, total)` within the current deck.
    #[must_use]
    pub fn progress(&self) -> Option<(usize, usize)> {
        self.run.as_ref().map(|run| (run.index, run.deck.len()))
    }

    #[must_use]
    pub fn block_count(&self) -> usize {
        self.run.as_ref().map_or(0, |run| run.deck.block_count())
    }

    #[must_use]
    pub fn draft(&self) -> DraftAnswer {
        match self.run.as_ref().map(|run| run.step) {
            Some(StepState::Presented(draft)) => draft,
            _ => DraftAnswer::Empty,
        }
    }

    #[must_use]
    pub fn capture_mode(&self) -> CaptureMode {
        self.capture.mode()
    }

    /// Color of the capture surface at `point`, for renderers.
    #[must_use]
    pub fn sample(&self, point: SurfacePoint) -> Option<Rgb> {
        self.capture.sample(point)
    }

    /// Responses of the current deck.
    #[must_use]
    pub fn responses(&self) -> &[TrialResponse] {
        self.run.as_ref().map_or(&[][..], |run| run.responses.as_slice())
    }

    #[must_use]
    pub fn practice_responses(&self) -> &[TrialResponse] {
        &self.practice_responses
    }

    #[must_use]
    pub fn summary(&self) -> Option<&ConsistencySummary> {
        self.summary.as_ref()
    }

    #[must_use]
    pub fn is_waiting(&self) -> bool {
        self.gateway.is_in_flight()
    }

    #[must_use]
    pub fn failure(&self) -> Option<&SubmissionFailure> {
        self.gateway.failure()
    }

    #[must_use]
    pub fn pending(&self) -> &PendingQueue {
        &self.pending
    }

    #[must_use]
    pub fn dev_navigation(&self) -> bool {
        self.settings.dev_navigation
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use syntest_types::{Answer, Rgb, SessionPhase, StimulusCatalog, StimulusDomain};

    use super::{ControllerSettings, DraftAnswer, PhasePlan, SessionPlan, TrialController};
    use crate::{
        Effect, HueLightnessPlane, ManualClock, PointerEvent, ScoringConfig, SurfacePoint,
        TransitionError,
    };

    fn controller(intro: Option<&str>, practice: bool, clock: &ManualClock) -> TrialController {
        let catalog = StimulusCatalog::from_labels(["A", "B"], None).unwrap();
        let plan = SessionPlan {
            title: "Letters".into(),
            intro: intro.map(str::to_string),
            practice: practice.then(|| PhasePlan {
                catalog: StimulusCatalog::from_labels(["X"], None).unwrap(),
                repeats: 1,
            }),
            testing: PhasePlan {
                catalog,
                repeats: 2,
            },
        };
        let settings = ControllerSettings {
            scoring: ScoringConfig::new(100.0).unwrap(),
            submit_practice: false,
            dev_navigation: true,
            seed: Some(5),
        };
        TrialController::new(
            plan,
            settings,
            Box::new(HueLightnessPlane::new(1.0).unwrap()),
            Arc::new(clock.clone()),
        )
        .unwrap()
    }

    #[test]
    fn intro_only_when_configured() {
        let clock = ManualClock::new();
        let mut with_intro = controller(Some("Welcome"), false, &clock);
        with_intro.start();
        assert_eq!(with_intro.phase(), SessionPhase::Intro);
        with_intro.acknowledge_intro().unwrap();
        assert_eq!(with_intro.phase(), SessionPhase::Testing);

        let mut without = controller(None, false, &clock);
        without.start();
        assert_eq!(without.phase(), SessionPhase::Testing);
        assert!(without.acknowledge_intro().is_err());
    }

    #[test]
    fn commit_requires_locked_color_or_none() {
        let clock = ManualClock::new();
        let mut c = controller(None, false, &clock);
        c.start();
        assert_eq!(c.commit(), Err(TransitionError::MissingAnswer));

        c.pointer(PointerEvent::Down(SurfacePoint::new(0.0, 0.5)));
        assert_eq!(c.draft(), DraftAnswer::Live(Rgb::new(255, 0, 0)));
        assert_eq!(c.commit(), Err(TransitionError::MissingAnswer));

        c.toggle_freeze().unwrap();
        assert_eq!(c.draft(), DraftAnswer::Locked(Rgb::new(255, 0, 0)));

        c.set_no_color().unwrap();
        assert_eq!(c.draft(), DraftAnswer::NoColor);
        c.pointer(PointerEvent::Click(SurfacePoint::new(0.0, 0.5)));
        assert_eq!(c.draft(), DraftAnswer::Locked(Rgb::new(255, 0, 0)));

        clock.advance(Duration::from_millis(420));
        c.commit().unwrap();
        assert_eq!(c.responses().len(), 1);
        assert_eq!(c.responses()[0].reaction_time_ms, 420);
        assert_eq!(c.responses()[0].answer, Answer::Color(Rgb::new(255, 0, 0)));
    }

    #[test]
    fn practice_is_not_submitted_and_feeds_into_testing() {
        let clock = ManualClock::new();
        let mut c = controller(None, true, &clock);
        c.start();
        assert_eq!(c.phase(), SessionPhase::Practice);
        c.set_no_color().unwrap();
        c.commit().unwrap();
        assert_eq!(c.phase(), SessionPhase::Testing);
        assert_eq!(c.practice_responses().len(), 1);
        assert!(c.responses().is_empty());
        assert!(
            !c.drain_effects()
                .iter()
                .any(|e| matches!(e, Effect::Submit(_)))
        );
    }

    #[test]
    fn input_is_rejected_while_submitting() {
        let clock = ManualClock::new();
        let mut c = controller(None, false, &clock);
        c.start();
        c.set_no_color().unwrap();
        c.commit().unwrap();
        assert!(c.is_waiting());
        assert!(!c.pointer(PointerEvent::Click(SurfacePoint::new(0.2, 0.5))));
        assert!(matches!(c.set_no_color(), Err(TransitionError::Busy(_))));
        assert!(matches!(c.commit(), Err(TransitionError::Busy(_))));
        assert!(matches!(c.jump_to_block(0), Err(TransitionError::Busy(_))));
        assert_eq!(c.progress(), Some((0, 4)));
    }

    #[test]
    fn tone_steps_own_playback() {
        let clock = ManualClock::new();
        let plan = SessionPlan {
            title: "Tones".into(),
            intro: None,
            practice: None,
            testing: PhasePlan {
                catalog: StimulusCatalog::from_labels(["C4"], Some(StimulusDomain::Tone)).unwrap(),
                repeats: 1,
            },
        };
        let settings = ControllerSettings {
            scoring: ScoringConfig::new(100.0).unwrap(),
            submit_practice: false,
            dev_navigation: false,
            seed: Some(1),
        };
        let mut c = TrialController::new(
            plan,
            settings,
            Box::new(HueLightnessPlane::new(1.0).unwrap()),
            Arc::new(clock),
        )
        .unwrap();
        c.start();
        let effects = c.drain_effects();
        assert!(effects.iter().any(|e| matches!(e, Effect::StartPlayback(_))));

        c.set_no_color().unwrap();
        c.commit().unwrap();
        let effects = c.drain_effects();
        assert!(matches!(effects.first(), Some(Effect::StopPlayback)));
        assert_eq!(c.jump_to_block(0), Err(TransitionError::NavigationDisabled));
    }
}
