//! Core domain types for Syntest.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from any layer of the application.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory

mod color;
mod payload;
mod proofs;
mod stimulus;
mod summary;
mod trial;

pub use color::{ColorParseError, Hsl, MAX_RGB_DISTANCE, Rgb};
pub use payload::{ForcedChoicePayload, Submission, SummaryPayload, TrialKind, TrialPayload};
pub use proofs::{EmptyStringError, NonEmptyString};
pub use stimulus::{CatalogError, StimulusCatalog, StimulusDomain, StimulusId, StimulusItem};
pub use summary::{ConsistencySummary, ItemConsistency};
pub use trial::{Answer, SessionPhase, TrialResponse, TrialStep};
