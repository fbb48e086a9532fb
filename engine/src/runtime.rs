//! Async execution of controller effects.
//!
//! The controllers stay synchronous. `EffectRunner` performs their IO on
//! tokio tasks and reports completions back as [`HostEvent`]s over an
//! unbounded channel, so the host loop handles them one at a time like any
//! other input event.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{AbortHandle, Abortable};
use syntest_types::Submission;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

use crate::forced_choice::NextTrial;
use crate::submission::{PendingQueue, RequestTicket, SourceError, SubmissionError};
use crate::Effect;

pub type SubmitFut<'a> = Pin<Box<dyn Future<Output = Result<(), SubmissionError>> + Send + 'a>>;
pub type TrialFut<'a> = Pin<Box<dyn Future<Output = Result<NextTrial, SourceError>> + Send + 'a>>;

/// Persistence collaborator. Accepts one or many payloads.
pub trait Submitter: Send + Sync {
    fn submit<'a>(&'a self, batch: &'a [Submission]) -> SubmitFut<'a>;
}

/// Forced-choice trial collaborator.
pub trait TrialSource: Send + Sync {
    fn next_trial(&self, index: usize) -> TrialFut<'_>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    SubmissionFinished {
        ticket: RequestTicket,
        result: Result<(), SubmissionError>,
    },
    TrialLoaded {
        ticket: RequestTicket,
        result: Result<NextTrial, SourceError>,
    },
    CountdownTick {
        generation: u64,
    },
}

/// Owns the background tasks spawned for effects.
///
/// The countdown ticker is aborted when a new countdown starts, on
/// `CancelCountdown`, and when the runner is dropped.
pub struct EffectRunner {
    submitter: Arc<dyn Submitter>,
    source: Option<Arc<dyn TrialSource>>,
    events: mpsc::UnboundedSender<HostEvent>,
    countdown: Option<AbortHandle>,
    tick_interval: Duration,
}

impl std::fmt::Debug for EffectRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectRunner")
            .field("has_source", &self.source.is_some())
            .field("countdown_active", &self.countdown.is_some())
            .finish_non_exhaustive()
    }
}

impl EffectRunner {
    #[must_use]
    pub fn new(
        submitter: Arc<dyn Submitter>,
        source: Option<Arc<dyn TrialSource>>,
    ) -> (Self, mpsc::UnboundedReceiver<HostEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                submitter,
                source,
                events: tx,
                countdown: None,
                tick_interval: Duration::from_secs(1),
            },
            rx,
        )
    }

    /// Shorten the countdown interval (tests).
    #[must_use]
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub fn set_source(&mut self, source: Arc<dyn TrialSource>) {
        self.source = Some(source);
    }

    /// Execute `effect`. Effects meant for the UI are handed back untouched.
    pub fn apply(&mut self, effect: Effect) -> Option<Effect> {
        match effect {
            Effect::Submit(request) => {
                let submitter = Arc::clone(&self.submitter);
                let tx = self.events.clone();
                tokio::spawn(async move {
                    let result = submitter
                        .submit(std::slice::from_ref(&request.payload))
                        .await;
                    let _ = tx.send(HostEvent::SubmissionFinished {
                        ticket: request.ticket,
                        result,
                    });
                });
                None
            }
            Effect::FetchTrial { index, ticket } => {
                let tx = self.events.clone();
                match self.source.clone() {
                    Some(source) => {
                        tokio::spawn(async move {
                            let result = source.next_trial(index).await;
                            let _ = tx.send(HostEvent::TrialLoaded { ticket, result });
                        });
                    }
                    None => {
                        let _ = tx.send(HostEvent::TrialLoaded {
                            ticket,
                            result: Err(SourceError::Unavailable(
                                "no trial source configured".to_string(),
                            )),
                        });
                    }
                }
                None
            }
            Effect::StartCountdown {
                generation,
                seconds,
            } => {
                self.start_countdown(generation, seconds);
                None
            }
            Effect::CancelCountdown => {
                self.cancel_countdown();
                None
            }
            other => Some(other),
        }
    }

    /// Apply every effect in order, returning the ones meant for the UI.
    pub fn apply_all(&mut self, effects: Vec<Effect>) -> Vec<Effect> {
        effects.into_iter().filter_map(|e| self.apply(e)).collect()
    }

    fn start_countdown(&mut self, generation: u64, seconds: u32) {
        self.cancel_countdown();
        let (handle, registration) = AbortHandle::new_pair();
        let tx = self.events.clone();
        let period = self.tick_interval;
        let ticker = async move {
            let mut interval =
                tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            for _ in 0..seconds {
                interval.tick().await;
                if tx.send(HostEvent::CountdownTick { generation }).is_err() {
                    break;
                }
            }
        };
        tokio::spawn(async move {
            let _ = Abortable::new(ticker, registration).await;
        });
        self.countdown = Some(handle);
    }

    fn cancel_countdown(&mut self) {
        if let Some(handle) = self.countdown.take() {
            handle.abort();
        }
    }

    #[must_use]
    pub fn countdown_active(&self) -> bool {
        self.countdown.is_some()
    }
}

impl Drop for EffectRunner {
    fn drop(&mut self) {
        self.cancel_countdown();
    }
}

/// Submit every queued payload in one batch. The queue is cleared only on success.
pub async fn resync_pending(
    queue: &mut PendingQueue,
    submitter: &dyn Submitter,
) -> Result<usize, SubmissionError> {
    if queue.is_empty() {
        return Ok(0);
    }
    let batch = queue.payloads();
    submitter.submit(&batch).await?;
    let sent = batch.len();
    queue.clear();
    tracing::info!(sent, "Resynced pending submissions");
    Ok(sent)
}

/// Appends each payload as one JSON line to a local file.
#[derive(Debug, Clone)]
pub struct JsonlSubmitter {
    path: PathBuf,
}

impl JsonlSubmitter {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    async fn append(&self, batch: &[Submission]) -> Result<(), SubmissionError> {
        let mut buf = Vec::new();
        for payload in batch {
            serde_json::to_writer(&mut buf, payload)
                .map_err(|e| SubmissionError::Io(e.to_string()))?;
            buf.push(b'\n');
        }
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&buf).await?;
        file.flush().await?;
        Ok(())
    }
}

impl Submitter for JsonlSubmitter {
    fn submit<'a>(&'a self, batch: &'a [Submission]) -> SubmitFut<'a> {
        Box::pin(self.append(batch))
    }
}

/// Fans one submission out to several collaborators; fails if any of them fails.
pub struct FanoutSubmitter {
    targets: Vec<Arc<dyn Submitter>>,
}

impl FanoutSubmitter {
    #[must_use]
    pub fn new(targets: Vec<Arc<dyn Submitter>>) -> Self {
        Self { targets }
    }
}

impl Submitter for FanoutSubmitter {
    fn submit<'a>(&'a self, batch: &'a [Submission]) -> SubmitFut<'a> {
        Box::pin(async move {
            for target in &self.targets {
                target.submit(batch).await?;
            }
            Ok(())
        })
    }
}
