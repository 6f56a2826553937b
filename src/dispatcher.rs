use crate::classify;
use crate::engine::Engine;
use crate::error::Result;
use crate::extractor::{ArtifactLocation, Metadata};
use crate::job::{Job, JobId, RequesterId};
use crate::messaging::StatusHandle;
use crate::strategy::Outcome;
use std::sync::Arc;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    Idle,
    Running,
    /// Finishing whatever is still queued, then stopping
    Draining,
    /// Finishing in-flight jobs only
    Stopping,
    Stopped,
}

/// Runs a fixed number of worker loops that pull jobs off the engine's queue.
pub struct Dispatcher {
    engine: Arc<Engine>,
    workers: usize,
    state: watch::Sender<DispatcherState>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Dispatcher {
    /// One worker loop per pool slot.
    pub fn new(engine: Arc<Engine>) -> Self {
        let workers = engine.pool.max();
        let (state, _) = watch::channel(DispatcherState::Idle);
        Self {
            engine,
            workers,
            state,
            handles: Mutex::new(Vec::new()),
        }
    }

    pub async fn start(&self) {
        if self.state() != DispatcherState::Idle {
            return;
        }
        self.set_state(DispatcherState::Running);

        let mut handles = self.handles.lock().await;
        for index in 0..self.workers {
            let engine = self.engine.clone();
            let state = self.state.subscribe();
            handles.push(tokio::spawn(worker_loop(index, engine, state)));
        }
        log::info!("Dispatcher started with {} workers", self.workers);
    }

    pub fn state(&self) -> DispatcherState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<DispatcherState> {
        self.state.subscribe()
    }

    /// Stops the worker loops. In-flight jobs always run to completion; with
    /// `drain` the queued jobs are executed too. Flushes analytics and closes
    /// the messenger afterwards.
    pub async fn shutdown(&self, drain: bool) -> Result<()> {
        let target = if drain {
            DispatcherState::Draining
        } else {
            DispatcherState::Stopping
        };
        log::info!(
            "Dispatcher {} ({} queued)",
            if drain { "draining" } else { "stopping" },
            self.engine.queue.size()
        );
        self.set_state(target);

        let handles = std::mem::take(&mut *self.handles.lock().await);
        for handle in handles {
            if let Err(e) = handle.await {
                log::error!("Worker loop ended abnormally: {}", e);
            }
        }
        self.set_state(DispatcherState::Stopped);

        self.engine.analytics.flush().await?;
        self.engine.messenger.close().await?;
        log::info!("Dispatcher stopped");
        Ok(())
    }

    fn set_state(&self, state: DispatcherState) {
        self.state.send_replace(state);
    }
}

async fn worker_loop(
    index: usize,
    engine: Arc<Engine>,
    mut state: watch::Receiver<DispatcherState>,
) {
    log::debug!("Worker {} started", index);

    loop {
        let current = *state.borrow_and_update();
        let job = match current {
            DispatcherState::Stopping | DispatcherState::Stopped => break,
            DispatcherState::Draining => match engine.queue.try_dequeue() {
                Some(job) => job,
                None => break,
            },
            DispatcherState::Idle | DispatcherState::Running => tokio::select! {
                biased;
                changed = state.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                job = engine.queue.dequeue() => job,
            },
        };

        let slot = match engine.pool.acquire().await {
            Ok(slot) => slot,
            Err(e) => {
                log::error!("Worker {} cannot claim a slot for job {}: {}", index, job.id, e);
                break;
            }
        };

        let job_id = job.id;
        let requester = job.requester_id;
        let platform = job.platform;
        let handle = open_status(&engine, &job).await;
        let runner = engine.clone();
        let execution = tokio::spawn(async move {
            let _slot = slot;
            execute_job(&runner, job, handle).await;
        });

        if let Err(e) = execution.await {
            log::error!("Worker {} job {} aborted: {}", index, job_id, e);
            engine.progress.end(job_id).await;
            engine.analytics.record_error(platform.tag()).await;
            say(
                &engine,
                requester,
                handle.as_ref(),
                "Download failed: internal error...",
            )
            .await;
            close_status(&engine, job_id, handle).await;
        }
    }

    log::debug!("Worker {} stopped", index);
}

/// Runs one job to its terminal outcome: one analytics record and at most
/// one negative message for the requester.
async fn execute_job(engine: &Engine, job: Job, handle: Option<StatusHandle>) {
    engine.progress.begin(job.id, handle);
    let sink = engine.progress.sink(job.id);
    let execution = engine.strategy.execute(&job, &sink).await;
    engine.progress.end(job.id).await;

    for failure in &execution.retried {
        log::debug!("Job {} retried after {}: {}", job.id, failure.attempt, failure.error);
    }

    let tag = job.platform.tag();
    match execution.outcome {
        Outcome::Delivered {
            artifact,
            metadata,
            attempt,
        } => {
            let caption = caption(&job, &metadata, &artifact).await;
            match engine
                .messenger
                .deliver(job.requester_id, &artifact, &caption)
                .await
            {
                Ok(()) => {
                    log::info!("Job {} delivered via {}", job.id, attempt);
                    if metadata.private {
                        engine
                            .analytics
                            .record_private_success(job.requester_id, tag)
                            .await;
                    } else {
                        engine.analytics.record_success(job.requester_id, tag).await;
                    }
                }
                Err(e) => {
                    log::error!("Job {} delivery failed: {}", job.id, e);
                    let text = classify::delivery_message(&e.to_string());
                    say(engine, job.requester_id, handle.as_ref(), &text).await;
                    engine.analytics.record_error(tag).await;
                }
            }

            if engine.cleanup_artifacts {
                if let Err(e) = tokio::fs::remove_file(&artifact.path).await {
                    log::warn!("Could not remove {}: {}", artifact.path.display(), e);
                }
            }
        }
        Outcome::Rejected(rejection) => {
            say(engine, job.requester_id, handle.as_ref(), &rejection.to_string()).await;
            engine.analytics.record_error(tag).await;
        }
        Outcome::Failed(failure) => {
            let text = classify::user_message(&failure.error.raw());
            say(engine, job.requester_id, handle.as_ref(), &text).await;
            engine.analytics.record_error(tag).await;
        }
    }

    close_status(engine, job.id, handle).await;
}

/// Opens the status message the job's progress is rendered into.
async fn open_status(engine: &Engine, job: &Job) -> Option<StatusHandle> {
    match engine
        .messenger
        .notify(job.requester_id, "Preparing download...")
        .await
    {
        Ok(handle) => Some(handle),
        Err(e) => {
            log::warn!("Status message for job {} failed: {}", job.id, e);
            None
        }
    }
}

async fn close_status(engine: &Engine, job: JobId, handle: Option<StatusHandle>) {
    if let Some(handle) = handle {
        if let Err(e) = engine.messenger.release(&handle).await {
            log::debug!("Releasing status of job {} failed: {}", job, e);
        }
    }
}

/// Puts `text` in the job's status message, or sends a fresh one when there
/// is no status message to edit.
async fn say(engine: &Engine, requester: RequesterId, handle: Option<&StatusHandle>, text: &str) {
    let result = match handle {
        Some(handle) => match engine.messenger.update(handle, text).await {
            Ok(()) => Ok(()),
            Err(_) => engine.messenger.notify(requester, text).await.map(|_| ()),
        },
        None => engine.messenger.notify(requester, text).await.map(|_| ()),
    };
    if let Err(e) = result {
        log::warn!("Could not reach requester {}: {}", requester, e);
    }
}

async fn caption(job: &Job, metadata: &Metadata, artifact: &ArtifactLocation) -> String {
    let size = match tokio::fs::metadata(&artifact.path).await {
        Ok(meta) => Some(meta.len()),
        Err(_) => metadata.estimated_size,
    };

    let mut caption = format!(
        "Downloaded from {}\nBy: {}",
        job.platform,
        metadata.uploader.as_deref().unwrap_or("Unknown")
    );
    if let Some(bytes) = size {
        caption.push_str(&format!("\nSize: {:.1}MB", bytes as f64 / (1024.0 * 1024.0)));
    }
    caption.push_str(if metadata.private {
        "\nPrivate content"
    } else {
        "\nPublic content"
    });
    caption
}
