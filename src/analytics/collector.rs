use super::{AnalyticsPersistence, AnalyticsSnapshot};
use crate::error::Result;
use crate::job::RequesterId;
use chrono::{Local, NaiveDate, Utc};
use std::sync::Mutex;

struct Counters {
    snapshot: AnalyticsSnapshot,
    /// Bumped on every mutation; orders concurrent saves
    revision: u64,
}

/// Process-wide outcome counters, saved after every mutation.
///
/// Counters live behind a short synchronous lock. Saving happens after that
/// lock is released, under a separate async lock that also remembers the
/// last revision written, so an older snapshot never replaces a newer one.
pub struct AnalyticsStore {
    counters: Mutex<Counters>,
    persistence: Box<dyn AnalyticsPersistence>,
    persisted: tokio::sync::Mutex<u64>,
}

impl AnalyticsStore {
    /// Loads the stored counters. A missing or unreadable store starts from
    /// zero instead of failing.
    pub async fn open(persistence: Box<dyn AnalyticsPersistence>) -> Self {
        let snapshot = match persistence.load().await {
            Ok(Some(snapshot)) => {
                log::info!(
                    "Loaded analytics from {} ({} completed)",
                    persistence.describe(),
                    snapshot.total_completed
                );
                snapshot
            }
            Ok(None) => {
                log::info!(
                    "No analytics at {}, starting from zero",
                    persistence.describe()
                );
                AnalyticsSnapshot::empty(Utc::now())
            }
            Err(e) => {
                log::error!(
                    "Failed to load analytics from {}: {}. Starting from zero",
                    persistence.describe(),
                    e
                );
                AnalyticsSnapshot::empty(Utc::now())
            }
        };

        Self {
            counters: Mutex::new(Counters {
                snapshot,
                revision: 0,
            }),
            persistence,
            persisted: tokio::sync::Mutex::new(0),
        }
    }

    pub async fn record_success(&self, requester: RequesterId, platform: &str) {
        self.record_success_on(requester, platform, Local::now().date_naive(), false)
            .await;
    }

    /// Same as [`record_success`](Self::record_success), also counting the
    /// artifact as private content.
    pub async fn record_private_success(&self, requester: RequesterId, platform: &str) {
        self.record_success_on(requester, platform, Local::now().date_naive(), true)
            .await;
    }

    pub async fn record_success_on(
        &self,
        requester: RequesterId,
        platform: &str,
        day: NaiveDate,
        private: bool,
    ) {
        let day = day.format("%Y-%m-%d").to_string();
        let (snapshot, revision) = self.mutate(|counters| {
            counters.total_completed += 1;
            *counters.completed_by_day.entry(day).or_insert(0) += 1;
            *counters
                .completed_by_platform
                .entry(platform.to_string())
                .or_insert(0) += 1;
            *counters.completed_by_requester.entry(requester).or_insert(0) += 1;
            if private {
                *counters
                    .private_by_platform
                    .entry(platform.to_string())
                    .or_insert(0) += 1;
            }
        });
        self.persist(snapshot, revision).await;
    }

    pub async fn record_error(&self, platform: &str) {
        let (snapshot, revision) = self.mutate(|counters| {
            *counters
                .errors_by_platform
                .entry(platform.to_string())
                .or_insert(0) += 1;
        });
        self.persist(snapshot, revision).await;
    }

    pub fn snapshot(&self) -> AnalyticsSnapshot {
        self.lock().snapshot.clone()
    }

    /// Writes the current counters regardless of what was saved before.
    pub async fn flush(&self) -> Result<()> {
        let mut persisted = self.persisted.lock().await;
        let (snapshot, revision) = {
            let counters = self.lock();
            (counters.snapshot.clone(), counters.revision)
        };
        self.persistence.save(&snapshot).await?;
        *persisted = (*persisted).max(revision);
        log::info!("Analytics flushed to {}", self.persistence.describe());
        Ok(())
    }

    fn mutate(&self, update: impl FnOnce(&mut AnalyticsSnapshot)) -> (AnalyticsSnapshot, u64) {
        let mut counters = self.lock();
        update(&mut counters.snapshot);
        counters.revision += 1;
        (counters.snapshot.clone(), counters.revision)
    }

    async fn persist(&self, snapshot: AnalyticsSnapshot, revision: u64) {
        let mut persisted = self.persisted.lock().await;
        if *persisted >= revision {
            return;
        }
        match self.persistence.save(&snapshot).await {
            Ok(()) => *persisted = revision,
            Err(e) => log::error!(
                "Failed to save analytics to {}: {}",
                self.persistence.describe(),
                e
            ),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Counters> {
        self.counters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
