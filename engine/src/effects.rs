//! Side effects requested by the controllers.
//!
//! Controllers never perform IO. Each transition appends effects to an outbox;
//! the host drains it and executes them (see [`crate::EffectRunner`]).

use syntest_types::{SessionPhase, TrialStep};

use crate::{ChoiceOption, PendingQueue, RequestTicket, SubmitRequest};

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    PhaseChanged(SessionPhase),
    StepPresented {
        index: usize,
        total: usize,
        step: TrialStep,
    },
    /// Audio or graphics owned by the presented step.
    StartPlayback(TrialStep),
    StopPlayback,
    Submit(SubmitRequest),
    FetchTrial {
        index: usize,
        ticket: RequestTicket,
    },
    /// Begin one-second ticks tagged with `generation`.
    StartCountdown {
        generation: u64,
        seconds: u32,
    },
    CancelCountdown,
    OptionsRevealed {
        trial_index: usize,
        options: Vec<ChoiceOption>,
    },
    SpeedFinished,
}

impl Effect {
    /// Effects the effect runner executes itself rather than handing to the UI.
    #[must_use]
    pub fn is_io(&self) -> bool {
        matches!(
            self,
            Effect::Submit(_)
                | Effect::FetchTrial { .. }
                | Effect::StartCountdown { .. }
                | Effect::CancelCountdown
        )
    }
}

/// What a torn-down session leaves behind: final effects to run and every
/// payload that never reached the submitter.
#[derive(Debug)]
pub struct Teardown {
    pub effects: Vec<Effect>,
    pub pending: PendingQueue,
}
