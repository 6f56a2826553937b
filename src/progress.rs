//! Bridge from raw extractor progress to throttled status updates.
//!
//! Extractors report through a [`ProgressSink`], which only pushes onto an
//! unbounded channel and may be used from any thread. A single pump task on
//! the runtime drains the channel and throttles per job. It never talks to the
//! [`Messenger`] itself: each job with a status message gets its own forwarder
//! task, so a slow update for one job never holds back another. Job
//! registration and removal travel through the same channel as the events, so
//! events reported before [`ProgressReporter::end`] are always sent before it
//! returns.

use crate::extractor::Metadata;
use crate::job::JobId;
use crate::messaging::{Messenger, StatusHandle};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Minimum percentage-point advance before another update is forwarded.
pub const PERCENT_STEP: f32 = 10.0;
/// Updates at or above this percentage always pass the step check.
pub const NEAR_COMPLETE: f32 = 99.0;

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Downloading { percent: f32, rate: Option<String> },
    Finished,
    /// A new attempt configuration is starting after a failure
    Retrying { attempt: String },
    /// Probe passed the policy checks
    Probed(Metadata),
}

impl ProgressEvent {
    pub fn render(&self) -> String {
        match self {
            ProgressEvent::Downloading { percent, rate } => match rate {
                Some(rate) => format!("Downloading... {:.1}% at {}", percent, rate),
                None => format!("Downloading... {:.1}%", percent),
            },
            ProgressEvent::Finished => "Upload in progress...".to_string(),
            ProgressEvent::Retrying { attempt } => {
                format!("Retrying with alternative method ({})...", attempt)
            }
            ProgressEvent::Probed(metadata) => metadata.summary(),
        }
    }
}

/// Per-job throttling state.
#[derive(Debug, Default)]
pub struct ProgressThrottle {
    last_percent: f32,
    finished: bool,
}

impl ProgressThrottle {
    /// Returns whether `event` should be forwarded, updating state if so.
    pub fn admit(&mut self, event: &ProgressEvent) -> bool {
        match event {
            ProgressEvent::Downloading { percent, .. } => {
                let percent = *percent;
                let advanced = percent - self.last_percent;
                if advanced > 0.0 && (advanced >= PERCENT_STEP || percent >= NEAR_COMPLETE) {
                    self.last_percent = percent;
                    true
                } else {
                    false
                }
            }
            ProgressEvent::Finished => !std::mem::replace(&mut self.finished, true),
            ProgressEvent::Retrying { .. } | ProgressEvent::Probed(_) => true,
        }
    }

    pub fn last_percent(&self) -> f32 {
        self.last_percent
    }
}

enum Command {
    Begin {
        job: JobId,
        handle: Option<StatusHandle>,
    },
    Event {
        job: JobId,
        event: ProgressEvent,
    },
    End {
        job: JobId,
        done: oneshot::Sender<()>,
    },
}

/// Cloneable, non-blocking handle an extractor reports progress through.
#[derive(Clone)]
pub struct ProgressSink {
    job: JobId,
    tx: mpsc::UnboundedSender<Command>,
}

impl ProgressSink {
    pub fn job(&self) -> JobId {
        self.job
    }

    pub fn report(&self, event: ProgressEvent) {
        // the pump only goes away at shutdown; late events are irrelevant then
        let _ = self.tx.send(Command::Event {
            job: self.job,
            event,
        });
    }
}

struct Tracked {
    throttle: ProgressThrottle,
    forwarder: Option<Forwarder>,
}

/// Rendered updates for one status message, sent in order.
struct Forwarder {
    texts: mpsc::UnboundedSender<String>,
    task: JoinHandle<()>,
}

impl Forwarder {
    fn spawn(job: JobId, handle: StatusHandle, messenger: Arc<dyn Messenger>) -> Self {
        let (texts, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(forward(job, handle, rx, messenger));
        Self { texts, task }
    }
}

async fn forward(
    job: JobId,
    handle: StatusHandle,
    rx: mpsc::UnboundedReceiver<String>,
    messenger: Arc<dyn Messenger>,
) {
    let mut texts = UnboundedReceiverStream::new(rx);
    while let Some(text) = texts.next().await {
        if let Err(e) = messenger.update(&handle, &text).await {
            log::warn!("Progress update for job {} failed: {}", job, e);
        }
    }
}

pub struct ProgressReporter {
    tx: mpsc::UnboundedSender<Command>,
    tracked: Arc<AtomicUsize>,
}

impl ProgressReporter {
    /// Starts the pump task. Must be called from within a tokio runtime.
    pub fn spawn(messenger: Arc<dyn Messenger>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let tracked = Arc::new(AtomicUsize::new(0));
        tokio::spawn(pump(rx, messenger, tracked.clone()));
        Self { tx, tracked }
    }

    pub fn begin(&self, job: JobId, handle: Option<StatusHandle>) {
        let _ = self.tx.send(Command::Begin { job, handle });
    }

    pub fn sink(&self, job: JobId) -> ProgressSink {
        ProgressSink {
            job,
            tx: self.tx.clone(),
        }
    }

    /// Drops the job's state once everything it reported so far is sent.
    /// Waits on this job's own pending updates only.
    pub async fn end(&self, job: JobId) {
        let (done, applied) = oneshot::channel();
        if self.tx.send(Command::End { job, done }).is_ok() {
            let _ = applied.await;
        }
    }

    /// Number of jobs currently holding progress state.
    pub fn tracked(&self) -> usize {
        self.tracked.load(Ordering::SeqCst)
    }
}

async fn pump(
    rx: mpsc::UnboundedReceiver<Command>,
    messenger: Arc<dyn Messenger>,
    tracked: Arc<AtomicUsize>,
) {
    let mut jobs: HashMap<JobId, Tracked> = HashMap::new();
    let mut commands = UnboundedReceiverStream::new(rx);

    while let Some(command) = commands.next().await {
        match command {
            Command::Begin { job, handle } => {
                let forwarder =
                    handle.map(|handle| Forwarder::spawn(job, handle, messenger.clone()));
                jobs.insert(
                    job,
                    Tracked {
                        throttle: ProgressThrottle::default(),
                        forwarder,
                    },
                );
                tracked.store(jobs.len(), Ordering::SeqCst);
            }
            Command::Event { job, event } => {
                let Some(entry) = jobs.get_mut(&job) else {
                    log::debug!("Dropping progress for untracked job {}", job);
                    continue;
                };
                if !entry.throttle.admit(&event) {
                    continue;
                }
                if let Some(forwarder) = &entry.forwarder {
                    let _ = forwarder.texts.send(event.render());
                }
            }
            Command::End { job, done } => {
                let forwarder = jobs.remove(&job).and_then(|entry| entry.forwarder);
                tracked.store(jobs.len(), Ordering::SeqCst);
                match forwarder {
                    Some(Forwarder { texts, task }) => {
                        // closing the channel lets the forwarder finish its backlog
                        drop(texts);
                        tokio::spawn(async move {
                            if let Err(e) = task.await {
                                log::warn!("Progress forwarder for job {} died: {}", job, e);
                            }
                            let _ = done.send(());
                        });
                    }
                    None => {
                        let _ = done.send(());
                    }
                }
            }
        }
    }

    log::debug!("Progress pump stopped");
}
