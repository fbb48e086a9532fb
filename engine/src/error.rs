//! Engine error types.
//!
//! `EngineError` is fatal and only produced at construction: the engine refuses
//! to start. `TransitionError` is a rejected host request; the session state is
//! unchanged and the host may carry on.

use syntest_types::{CatalogError, SessionPhase};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("invalid configuration: {reason}")]
    InvalidConfiguration { reason: String },
    #[error("invalid configuration: {0}")]
    Catalog(#[from] CatalogError),
}

impl EngineError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        EngineError::InvalidConfiguration {
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("no trial is open (phase: {})", phase.as_str())]
    NoOpenTrial { phase: SessionPhase },
    #[error("the current trial has neither a locked color nor a no-color flag")]
    MissingAnswer,
    #[error("busy: {0}")]
    Busy(&'static str),
    #[error("no failed request is awaiting a decision")]
    NoFailure,
    #[error("nothing is in flight")]
    NothingInFlight,
    #[error("block {block} is out of range (deck has {blocks} blocks)")]
    BlockOutOfRange { block: usize, blocks: usize },
    #[error("block {block} is ahead of the current trial")]
    ForwardJump { block: usize },
    #[error("block navigation is disabled")]
    NavigationDisabled,
    #[error("option {0:?} is not part of the current trial")]
    UnknownOption(String),
    #[error("not allowed in the current stage: {0}")]
    WrongStage(&'static str),
}
