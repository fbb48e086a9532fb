//! Speed-congruency session: timed forced-choice trials from a trial source.
//!
//! ```text
//!   Idle ─start─> Loading(i) ──loaded──> Countdown ──ticks──> Revealed ──select──> Captured
//!                   │  ^   └──done──> Finished                                       │
//!                   │  └─────────────────────── delivered / skipped (i + 1) ─────────┘
//!                   └─failed/cancel─> LoadFailed ─retry_load─> Loading(i)
//! ```
//! Countdown ticks carry a generation; ticks from an older countdown are
//! ignored. Reaction time runs from the reveal, not from stimulus onset.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use syntest_types::{ForcedChoicePayload, Rgb, Submission, TrialKind};
use uuid::Uuid;

use crate::forced_choice::{ForcedChoiceTrial, NextTrial, OptionId};
use crate::submission::{
    Completion, Decided, FailureDecision, PendingQueue, RequestTicket, SourceError,
    SubmissionError, SubmissionFailure, SubmissionGateway,
};
use crate::{Clock, Effect, ReactionTimer, Teardown, TransitionError};

/// One answered forced-choice trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForcedChoiceRecord {
    pub trial_id: String,
    pub trial_index: usize,
    pub trigger: String,
    pub selected: OptionId,
    pub selected_color: Rgb,
    pub expected_color: Rgb,
    pub correct: bool,
    pub reaction_time_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccuracyReport {
    pub trials: usize,
    pub correct: usize,
    pub accuracy: f64,
    /// Mean reaction time over correct trials only.
    pub mean_correct_reaction_time_ms: Option<f64>,
}

impl AccuracyReport {
    #[must_use]
    pub fn from_records(records: &[ForcedChoiceRecord]) -> Self {
        let trials = records.len();
        let correct_times: Vec<u64> = records
            .iter()
            .filter(|r| r.correct)
            .map(|r| r.reaction_time_ms)
            .collect();
        let correct = correct_times.len();
        let accuracy = if trials == 0 {
            0.0
        } else {
            correct as f64 / trials as f64
        };
        let mean_correct_reaction_time_ms = (!correct_times.is_empty())
            .then(|| correct_times.iter().sum::<u64>() as f64 / correct as f64);
        Self {
            trials,
            correct,
            accuracy,
            mean_correct_reaction_time_ms,
        }
    }
}

#[derive(Debug)]
enum Stage {
    Idle,
    Loading {
        index: usize,
        ticket: RequestTicket,
    },
    LoadFailed {
        index: usize,
        error: SourceError,
    },
    Countdown {
        index: usize,
        trial: ForcedChoiceTrial,
        remaining: u32,
        generation: u64,
    },
    Revealed {
        index: usize,
        trial: ForcedChoiceTrial,
    },
    Captured {
        next_index: usize,
    },
    Finished,
}

/// Read-only snapshot for renderers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpeedView<'a> {
    Idle,
    Loading { index: usize },
    LoadFailed { error: &'a SourceError },
    Countdown { trial: &'a ForcedChoiceTrial, remaining: u32 },
    Revealed { trial: &'a ForcedChoiceTrial },
    Submitting,
    Finished,
}

#[derive(Debug)]
pub struct SpeedSession {
    session_id: String,
    countdown_seconds: u32,
    min_distance: f64,
    stage: Stage,
    timer: ReactionTimer,
    gateway: SubmissionGateway,
    pending: PendingQueue,
    records: Vec<ForcedChoiceRecord>,
    next_ticket: u64,
    generation: u64,
    outbox: Vec<Effect>,
}

impl SpeedSession {
    #[must_use]
    pub fn new(session_id: Option<String>, countdown_seconds: u32, clock: Arc<dyn Clock>) -> Self {
        Self {
            session_id: session_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            countdown_seconds,
            min_distance: 0.0,
            stage: Stage::Idle,
            timer: ReactionTimer::new(clock),
            gateway: SubmissionGateway::new(),
            pending: PendingQueue::new(),
            records: Vec::new(),
            next_ticket: 1,
            generation: 0,
            outbox: Vec::new(),
        }
    }

    /// Flag loaded trials whose options are not more than `min_distance` apart.
    #[must_use]
    pub fn with_min_distance(mut self, min_distance: f64) -> Self {
        self.min_distance = min_distance;
        self
    }

    pub fn start(&mut self) -> Result<(), TransitionError> {
        if !matches!(self.stage, Stage::Idle) {
            return Err(TransitionError::WrongStage("session already started"));
        }
        tracing::info!(session_id = %self.session_id, "Speed-congruency session started");
        self.request(0);
        Ok(())
    }

    fn request(&mut self, index: usize) {
        let ticket = RequestTicket::new(self.next_ticket);
        self.next_ticket += 1;
        tracing::debug!(index, ticket = ticket.value(), "Fetching forced-choice trial");
        self.stage = Stage::Loading { index, ticket };
        self.outbox.push(Effect::FetchTrial { index, ticket });
    }

    /// Returns false when the completion was stale and ignored.
    pub fn on_trial_loaded(
        &mut self,
        ticket: RequestTicket,
        result: Result<NextTrial, SourceError>,
    ) -> bool {
        let index = match self.stage {
            Stage::Loading {
                index,
                ticket: current,
            } if current == ticket => index,
            _ => {
                tracing::debug!(ticket = ticket.value(), "Ignoring stale trial load");
                return false;
            }
        };
        let loaded = result.and_then(|next| match next {
            NextTrial::Trial(descriptor) => {
                ForcedChoiceTrial::from_descriptor(descriptor, self.min_distance).map(Some)
            }
            NextTrial::Done => Ok(None),
        });
        match loaded {
            Ok(Some(trial)) => self.begin_countdown(index, trial),
            Ok(None) => self.finish(),
            Err(error) => {
                tracing::warn!(index, %error, "Failed to load forced-choice trial");
                self.stage = Stage::LoadFailed { index, error };
            }
        }
        true
    }

    fn begin_countdown(&mut self, index: usize, trial: ForcedChoiceTrial) {
        if self.countdown_seconds == 0 {
            self.reveal(index, trial);
            return;
        }
        self.generation += 1;
        self.outbox.push(Effect::StartCountdown {
            generation: self.generation,
            seconds: self.countdown_seconds,
        });
        self.stage = Stage::Countdown {
            index,
            trial,
            remaining: self.countdown_seconds,
            generation: self.generation,
        };
    }

    /// One countdown second elapsed. Returns false for stale ticks.
    pub fn tick(&mut self, generation: u64) -> bool {
        let Stage::Countdown {
            remaining,
            generation: current,
            ..
        } = &mut self.stage
        else {
            return false;
        };
        if *current != generation {
            return false;
        }
        *remaining = remaining.saturating_sub(1);
        if *remaining > 0 {
            return true;
        }
        self.outbox.push(Effect::CancelCountdown);
        if let Stage::Countdown { index, trial, .. } =
            std::mem::replace(&mut self.stage, Stage::Idle)
        {
            self.reveal(index, trial);
        }
        true
    }

    fn reveal(&mut self, index: usize, mut trial: ForcedChoiceTrial) {
        let at = self.timer.start();
        trial.mark_revealed(at);
        tracing::debug!(index, trial_id = trial.id(), "Options revealed");
        self.outbox.push(Effect::OptionsRevealed {
            trial_index: trial.trial_index(),
            options: trial.options().to_vec(),
        });
        self.stage = Stage::Revealed { index, trial };
    }

    pub fn select(&mut self, option: &OptionId) -> Result<bool, TransitionError> {
        let (index, trial) = match &self.stage {
            Stage::Revealed { index, trial } => (*index, trial),
            Stage::Loading { .. } | Stage::Captured { .. } => {
                return Err(TransitionError::Busy("waiting on the network"));
            }
            _ => return Err(TransitionError::WrongStage("options are not showing")),
        };
        let chosen = trial
            .option(option)
            .ok_or_else(|| TransitionError::UnknownOption(option.to_string()))?;
        let reaction_time_ms = self.timer.elapsed_ms();
        let correct = trial.is_correct(option);
        let record = ForcedChoiceRecord {
            trial_id: trial.id().to_string(),
            trial_index: trial.trial_index(),
            trigger: trial.trigger().to_string(),
            selected: chosen.id.clone(),
            selected_color: chosen.color,
            expected_color: trial.expected_color(),
            correct,
            reaction_time_ms,
        };
        self.timer.stop();
        tracing::debug!(
            index,
            correct,
            reaction_time_ms,
            "Forced-choice selection recorded"
        );

        let payload = Submission::ForcedChoice(ForcedChoicePayload {
            session_id: self.session_id.clone(),
            trial_type: TrialKind::ForcedChoice,
            trial_index: record.trial_index,
            trial_id: record.trial_id.clone(),
            stimulus_label: record.trigger.clone(),
            selected_option_id: record.selected.to_string(),
            selected_color: record.selected_color,
            expected_color: record.expected_color,
            correct,
            reaction_time_ms,
            completed_at: Utc::now(),
        });
        self.records.push(record);
        self.stage = Stage::Captured {
            next_index: index + 1,
        };
        match self.gateway.begin(payload) {
            Ok(request) => self.outbox.push(Effect::Submit(request)),
            Err(err) => tracing::warn!(%err, "Submission gateway refused payload"),
        }
        Ok(correct)
    }

    fn continue_after_submit(&mut self) {
        if let Stage::Captured { next_index } = self.stage {
            self.request(next_index);
        }
    }

    fn finish(&mut self) {
        let report = self.accuracy();
        tracing::info!(
            trials = report.trials,
            correct = report.correct,
            accuracy = report.accuracy,
            "Speed-congruency session finished"
        );
        self.stage = Stage::Finished;
        self.outbox.push(Effect::SpeedFinished);
    }

    pub fn on_submission_result(
        &mut self,
        ticket: RequestTicket,
        result: Result<(), SubmissionError>,
    ) -> Completion {
        let completion = self.gateway.complete(ticket, result);
        if matches!(completion, Completion::Delivered(_)) {
            self.continue_after_submit();
        }
        completion
    }

    pub fn retry_submission(&mut self) -> Result<(), TransitionError> {
        if let Decided::Resubmit(request) = self
            .gateway
            .decide(FailureDecision::Retry, &mut self.pending)?
        {
            self.outbox.push(Effect::Submit(request));
        }
        Ok(())
    }

    pub fn skip_submission(&mut self) -> Result<(), TransitionError> {
        self.gateway
            .decide(FailureDecision::SkipAndQueue, &mut self.pending)?;
        self.continue_after_submit();
        Ok(())
    }

    pub fn retry_load(&mut self) -> Result<(), TransitionError> {
        match self.stage {
            Stage::LoadFailed { index, .. } => {
                self.request(index);
                Ok(())
            }
            _ => Err(TransitionError::NoFailure),
        }
    }

    /// Cancel whatever request is outstanding: a trial fetch or a submission.
    pub fn cancel_pending(&mut self) -> Result<(), TransitionError> {
        if let Stage::Loading { index, .. } = self.stage {
            tracing::info!(index, "Trial fetch cancelled");
            self.stage = Stage::LoadFailed {
                index,
                error: SourceError::Cancelled,
            };
            return Ok(());
        }
        self.gateway.cancel()
    }

    /// Stop the countdown and timer; a failed or in-flight submission is
    /// queued in the returned [`Teardown`].
    #[must_use]
    pub fn teardown(mut self) -> Teardown {
        if matches!(self.stage, Stage::Countdown { .. }) {
            self.outbox.push(Effect::CancelCountdown);
        }
        self.timer.stop();
        let parked = self.gateway.abandon_into(&mut self.pending);
        tracing::info!(
            session_id = %self.session_id,
            parked,
            pending = self.pending.len(),
            "Speed-congruency session torn down"
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
    pub fn view(&self) -> SpeedView<'_> {
        match &self.stage {
            Stage::Idle => SpeedView::Idle,
            Stage::Loading { index, .. } => SpeedView::Loading { index: *index },
            Stage::LoadFailed { error, .. } => SpeedView::LoadFailed { error },
            Stage::Countdown {
                trial, remaining, ..
            } => SpeedView::Countdown {
                trial,
                remaining: *remaining,
            },
            Stage::Revealed { trial, .. } => SpeedView::Revealed { trial },
            Stage::Captured { .. } => SpeedView::Submitting,
            Stage::Finished => SpeedView::Finished,
        }
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        matches!(self.stage, Stage::Finished)
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    #[must_use]
    pub fn records(&self) -> &[ForcedChoiceRecord] {
        &self.records
    }

    #[must_use]
    pub fn accuracy(&self) -> AccuracyReport {
        AccuracyReport::from_records(&self.records)
    }

    #[must_use]
    pub fn failure(&self) -> Option<&SubmissionFailure> {
        self.gateway.failure()
    }

    #[must_use]
    pub fn pending(&self) -> &PendingQueue {
        &self.pending
    }
}
