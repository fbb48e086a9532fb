//! Trial engine for Syntest - decks, capture, scoring and the session state machines.
//!
//! Controllers are synchronous and renderer-agnostic: hosts feed them input
//! events and completions, and drain [`Effect`]s to execute. IO lives behind
//! the [`Submitter`] and [`TrialSource`] traits and runs in [`EffectRunner`].

mod capture;
mod controller;
mod deck;
mod effects;
mod error;
mod forced_choice;
mod pool;
mod remote;
mod runtime;
mod scoring;
mod speed;
mod submission;
mod timer;

pub use capture::{
    AnalogCapture, CaptureMode, CaptureUpdate, ColorSurface, HueLightnessPlane, PointerEvent,
    SurfacePoint,
};
pub use controller::{ControllerSettings, DraftAnswer, PhasePlan, SessionPlan, TrialController};
pub use deck::Deck;
pub use effects::{Effect, Teardown};
pub use error::{EngineError, TransitionError};
pub use forced_choice::{
    ChoiceOption, ChoiceQuality, ChoiceSet, ForcedChoiceConfig, ForcedChoiceGenerator,
    ForcedChoiceTrial, NextTrial, OptionId, TrialDescriptor, min_pairwise_distance,
};
pub use pool::AssociationPool;
pub use remote::{HttpSubmitter, HttpTrialSource};
pub use runtime::{
    EffectRunner, FanoutSubmitter, HostEvent, JsonlSubmitter, SubmitFut, Submitter, TrialFut,
    TrialSource, resync_pending,
};
pub use scoring::{InsufficientItemPolicy, ScoringConfig, score};
pub use speed::{AccuracyReport, ForcedChoiceRecord, SpeedSession, SpeedView};
pub use submission::{
    Completion, Decided, FailureDecision, PendingQueue, PendingSubmission, QueueStoreError,
    RequestTicket, SourceError, SubmissionError, SubmissionFailure, SubmissionGateway,
    SubmitRequest,
};
pub use timer::{Clock, ManualClock, MonotonicClock, ReactionTimer};
