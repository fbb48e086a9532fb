//! Submission gateway and pending queue.
//!
//! The gateway tracks at most one outstanding request.
//!
//! ```text
//!            begin                 complete(Ok)
//!   ┌──────┐ ─────> ┌──────────┐ ─────────────────> Idle
//!   │ Idle │        │ InFlight │
//!   └──────┘        └──────────┘ ── complete(Err) / cancel ──> ┌────────┐
//!      ^                 ^                                     │ Failed │
//!      │                 └──────────── decide(Retry) ───────── └────────┘
//!      └────────────────────────────── decide(SkipAndQueue) ───────┘
//! ```
//! A failure never resolves itself: the payload stays in `Failed` until the
//! host chooses. Completions carrying an old ticket are ignored.

use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use syntest_types::Submission;
use thiserror::Error;

use crate::TransitionError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmissionError {
    #[error("submission rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("submission timed out")]
    Timeout,
    #[error("submission cancelled")]
    Cancelled,
    #[error("local write failed: {0}")]
    Io(String),
}

impl From<io::Error> for SubmissionError {
    fn from(err: io::Error) -> Self {
        SubmissionError::Io(err.to_string())
    }
}

/// Errors from a forced-choice trial source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("trial source rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("invalid trial: {0}")]
    InvalidTrial(String),
    #[error("trial request cancelled")]
    Cancelled,
    #[error("trial source unavailable: {0}")]
    Unavailable(String),
}

/// Identifies one request so late completions can be told apart from current ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestTicket(u64);

impl RequestTicket {
    pub(crate) fn new(value: u64) -> Self {
        Self(value)
    }

    #[must_use]
    pub fn value(self) -> u64 {
        self.0
    }
}

/// Hand-off from the engine to whoever performs the actual submission.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitRequest {
    pub ticket: RequestTicket,
    pub payload: Submission,
}

/// A failed submission awaiting the host's decision. Carries the original payload.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionFailure {
    pub payload: Submission,
    pub attempts: u32,
    pub error: SubmissionError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDecision {
    Retry,
    SkipAndQueue,
}

/// What a completion meant to the gateway.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    /// Ticket did not match the outstanding request.
    Stale,
    Delivered(Submission),
    Failed,
}

/// What a host decision produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Decided {
    Resubmit(SubmitRequest),
    Queued,
}

#[derive(Debug, Clone, PartialEq)]
enum GatewayState {
    Idle,
    InFlight {
        ticket: RequestTicket,
        payload: Submission,
        attempts: u32,
    },
    Failed(SubmissionFailure),
}

#[derive(Debug)]
pub struct SubmissionGateway {
    state: GatewayState,
    next_ticket: u64,
}

impl Default for SubmissionGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl SubmissionGateway {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: GatewayState::Idle,
            next_ticket: 1,
        }
    }

    fn issue(&mut self) -> RequestTicket {
        let ticket = RequestTicket(self.next_ticket);
        self.next_ticket += 1;
        ticket
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        !matches!(self.state, GatewayState::Idle)
    }

    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        matches!(self.state, GatewayState::InFlight { .. })
    }

    #[must_use]
    pub fn failure(&self) -> Option<&SubmissionFailure> {
        match &self.state {
            GatewayState::Failed(failure) => Some(failure),
            _ => None,
        }
    }

    #[must_use]
    pub fn in_flight_ticket(&self) -> Option<RequestTicket> {
        match &self.state {
            GatewayState::InFlight { ticket, .. } => Some(*ticket),
            _ => None,
        }
    }

    pub fn begin(&mut self, payload: Submission) -> Result<SubmitRequest, TransitionError> {
        if self.is_busy() {
            return Err(TransitionError::Busy("a submission is already outstanding"));
        }
        let ticket = self.issue();
        tracing::debug!(ticket = ticket.0, kind = payload.kind(), "Submitting payload");
        self.state = GatewayState::InFlight {
            ticket,
            payload: payload.clone(),
            attempts: 1,
        };
        Ok(SubmitRequest { ticket, payload })
    }

    pub fn complete(
        &mut self,
        ticket: RequestTicket,
        result: Result<(), SubmissionError>,
    ) -> Completion {
        let GatewayState::InFlight {
            ticket: current, ..
        } = &self.state
        else {
            tracing::debug!(ticket = ticket.0, "Ignoring completion with nothing in flight");
            return Completion::Stale;
        };
        if *current != ticket {
            tracing::debug!(ticket = ticket.0, "Ignoring stale completion");
            return Completion::Stale;
        }
        let GatewayState::InFlight {
            payload, attempts, ..
        } = std::mem::replace(&mut self.state, GatewayState::Idle)
        else {
            return Completion::Stale;
        };
        match result {
            Ok(()) => {
                tracing::info!(kind = payload.kind(), attempts, "Submission delivered");
                Completion::Delivered(payload)
            }
            Err(error) => {
                tracing::warn!(kind = payload.kind(), attempts, %error, "Submission failed");
                self.state = GatewayState::Failed(SubmissionFailure {
                    payload,
                    attempts,
                    error,
                });
                Completion::Failed
            }
        }
    }

    /// Abandon the outstanding request. The payload moves to `Failed` so it is never lost.
    pub fn cancel(&mut self) -> Result<(), TransitionError> {
        match std::mem::replace(&mut self.state, GatewayState::Idle) {
            GatewayState::InFlight {
                payload, attempts, ..
            } => {
                tracing::info!(kind = payload.kind(), "Submission cancelled");
                self.state = GatewayState::Failed(SubmissionFailure {
                    payload,
                    attempts,
                    error: SubmissionError::Cancelled,
                });
                Ok(())
            }
            other => {
                self.state = other;
                Err(TransitionError::NothingInFlight)
            }
        }
    }

    pub fn decide(
        &mut self,
        decision: FailureDecision,
        queue: &mut PendingQueue,
    ) -> Result<Decided, TransitionError> {
        if !matches!(self.state, GatewayState::Failed(_)) {
            return Err(TransitionError::NoFailure);
        }
        let GatewayState::Failed(failure) = std::mem::replace(&mut self.state, GatewayState::Idle)
        else {
            return Err(TransitionError::NoFailure);
        };
        match decision {
            FailureDecision::Retry => {
                let ticket = self.issue();
                let attempts = failure.attempts + 1;
                tracing::info!(kind = failure.payload.kind(), attempts, "Retrying submission");
                self.state = GatewayState::InFlight {
                    ticket,
                    payload: failure.payload.clone(),
                    attempts,
                };
                Ok(Decided::Resubmit(SubmitRequest {
                    ticket,
                    payload: failure.payload,
                }))
            }
            FailureDecision::SkipAndQueue => {
                tracing::info!(kind = failure.payload.kind(), "Queued failed submission");
                queue.push(PendingSubmission {
                    payload: failure.payload,
                    attempts: failure.attempts,
                });
                Ok(Decided::Queued)
            }
        }
    }

    /// Forget the outstanding request and park its payload in `queue`, whether
    /// it failed or is still in flight. Late completions become stale.
    pub fn abandon_into(&mut self, queue: &mut PendingQueue) -> bool {
        let entry = match std::mem::replace(&mut self.state, GatewayState::Idle) {
            GatewayState::Idle => return false,
            GatewayState::InFlight {
                payload, attempts, ..
            } => PendingSubmission { payload, attempts },
            GatewayState::Failed(failure) => PendingSubmission {
                payload: failure.payload,
                attempts: failure.attempts,
            },
        };
        tracing::info!(
            kind = entry.payload.kind(),
            attempts = entry.attempts,
            "Queued outstanding submission on teardown"
        );
        queue.push(entry);
        true
    }
}

/// A payload parked for out-of-band resync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingSubmission {
    pub payload: Submission,
    pub attempts: u32,
}

#[derive(Debug, Error)]
pub enum QueueStoreError {
    #[error("failed to read pending queue {path}: {source}")]
    Read { path: String, source: io::Error },
    #[error("failed to parse pending queue {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
    #[error("failed to write pending queue {path}: {source}")]
    Write { path: String, source: io::Error },
    #[error("failed to serialize pending queue: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Ordered list of failed payloads, persisted as a JSON array.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PendingQueue {
    entries: Vec<PendingSubmission>,
}

impl PendingQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Missing files load as an empty queue.
    pub fn load(path: &Path) -> Result<Self, QueueStoreError> {
        syntest_utils::recover_bak_file(path);
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(source) => {
                return Err(QueueStoreError::Read {
                    path: path.display().to_string(),
                    source,
                });
            }
        };
        if raw.trim().is_empty() {
            return Ok(Self::new());
        }
        serde_json::from_str(&raw).map_err(|source| QueueStoreError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), QueueStoreError> {
        let bytes = serde_json::to_vec_pretty(self)?;
        syntest_utils::atomic_write(path, &bytes).map_err(|source| QueueStoreError::Write {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn push(&mut self, entry: PendingSubmission) {
        self.entries.push(entry);
    }

    /// Merge another queue's entries after this one's.
    pub fn extend(&mut self, other: PendingQueue) {
        self.entries.extend(other.entries);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingSubmission> + '_ {
        self.entries.iter()
    }

    #[must_use]
    pub fn payloads(&self) -> Vec<Submission> {
        self.entries.iter().map(|e| e.payload.clone()).collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use syntest_types::{Submission, SummaryPayload};
    use tempfile::tempdir;

    use super::{
        Completion, Decided, FailureDecision, PendingQueue, PendingSubmission, SubmissionError,
        SubmissionGateway,
    };
    use crate::TransitionError;

    fn payload(title: &str) -> Submission {
        Submission::Summary(SummaryPayload {
            session_id: "s".into(),
            title: title.into(),
            mean_distance: 1.0,
            std_deviation: 0.5,
            median_distance: 1.0,
            pair_count: 3,
            valid_items: 1,
            none_fraction: 0.0,
            mean_reaction_time_ms: 100.0,
            consistency_score: Some(0.5),
            cutoff: 100.0,
            pass: true,
            completed_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        })
    }

    #[test]
    fn success_returns_to_idle() {
        let mut gateway = SubmissionGateway::new();
        let request = gateway.begin(payload("a")).unwrap();
        assert!(gateway.is_busy());
        assert_eq!(
            gateway.begin(payload("b")),
            Err(TransitionError::Busy("a submission is already outstanding"))
        );
        let done = gateway.complete(request.ticket, Ok(()));
        assert_eq!(done, Completion::Delivered(payload("a")));
        assert!(!gateway.is_busy());
    }

    #[test]
    fn abandon_parks_failed_and_in_flight_payloads() {
        let mut gateway = SubmissionGateway::new();
        let mut queue = PendingQueue::new();
        assert!(!gateway.abandon_into(&mut queue));

        let request = gateway.begin(payload("a")).unwrap();
        gateway.complete(request.ticket, Err(SubmissionError::Timeout));
        assert!(gateway.abandon_into(&mut queue));
        assert!(gateway.failure().is_none());

        let late = gateway.begin(payload("b")).unwrap();
        assert!(gateway.abandon_into(&mut queue));
        assert_eq!(gateway.complete(late.ticket, Ok(())), Completion::Stale);

        let parked: Vec<_> = queue.iter().map(|e| (e.payload.clone(), e.attempts)).collect();
        assert_eq!(parked, vec![(payload("a"), 1), (payload("b"), 1)]);
    }

    #[test]
    fn failure_keeps_payload_until_decision() {
        let mut gateway = SubmissionGateway::new();
        let mut queue = PendingQueue::new();
        let request = gateway.begin(payload("a")).unwrap();
        gateway.complete(request.ticket, Err(SubmissionError::Timeout));

        let failure = gateway.failure().unwrap();
        assert_eq!(failure.payload, payload("a"));
        assert_eq!(failure.error, SubmissionError::Timeout);
        assert!(gateway.begin(payload("b")).is_err());

        let Decided::Resubmit(retry) = gateway.decide(FailureDecision::Retry, &mut queue).unwrap()
        else {
            panic!("expected resubmit");
        };
        assert_eq!(retry.payload, payload("a"));
        assert_ne!(retry.ticket, request.ticket);

        assert_eq!(gateway.complete(request.ticket, Ok(())), Completion::Stale);
        gateway.complete(retry.ticket, Err(SubmissionError::Transport("down".into())));
        assert_eq!(gateway.failure().unwrap().attempts, 2);

        assert_eq!(
            gateway.decide(FailureDecision::SkipAndQueue, &mut queue),
            Ok(Decided::Queued)
        );
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.iter().next().unwrap().attempts, 2);
        assert!(!gateway.is_busy());
    }

    #[test]
    fn cancel_moves_in_flight_to_failed() {
        let mut gateway = SubmissionGateway::new();
        let request = gateway.begin(payload("a")).unwrap();
        gateway.cancel().unwrap();
        assert_eq!(gateway.failure().unwrap().error, SubmissionError::Cancelled);
        assert_eq!(gateway.complete(request.ticket, Ok(())), Completion::Stale);
        assert_eq!(gateway.cancel(), Err(TransitionError::NothingInFlight));
    }

    #[test]
    fn decide_without_failure_is_rejected() {
        let mut gateway = SubmissionGateway::new();
        let mut queue = PendingQueue::new();
        assert_eq!(
            gateway.decide(FailureDecision::Retry, &mut queue),
            Err(TransitionError::NoFailure)
        );
    }

    #[test]
    fn queue_persists_across_loads() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pending.json");
        assert!(PendingQueue::load(&path).unwrap().is_empty());

        let mut queue = PendingQueue::new();
        queue.push(PendingSubmission {
            payload: payload("a"),
            attempts: 1,
        });
        queue.save(&path).unwrap();

        let loaded = PendingQueue::load(&path).unwrap();
        assert_eq!(loaded, queue);
    }

    #[test]
    fn corrupt_queue_reports_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pending.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(PendingQueue::load(&path).is_err());
    }
}
