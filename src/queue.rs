use crate::job::Job;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::Notify;

/// Unbounded FIFO between the ingress path and the worker loops.
#[derive(Default)]
pub struct JobQueue {
    jobs: Mutex<VecDeque<Job>>,
    available: Notify,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&self, job: Job) {
        self.lock().push_back(job);
        self.available.notify_one();
    }

    /// Waits until a job is available and returns the oldest one.
    ///
    /// Cancel safe: a job is only removed from the queue in the same poll
    /// that returns it.
    pub async fn dequeue(&self) -> Job {
        loop {
            let notified = self.available.notified();
            if let Some(job) = self.try_dequeue() {
                return job;
            }
            notified.await;
        }
    }

    pub fn try_dequeue(&self) -> Option<Job> {
        let mut jobs = self.lock();
        let job = jobs.pop_front();
        if job.is_some() && !jobs.is_empty() {
            // pass the wake-up along so a second idle worker picks up the rest
            self.available.notify_one();
        }
        job
    }

    /// Instantaneous depth, for status reporting only.
    pub fn size(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Job>> {
        self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
