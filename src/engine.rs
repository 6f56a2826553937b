use crate::analytics::{AnalyticsSnapshot, AnalyticsStore};
use crate::config::EngineConfig;
use crate::extractor::Extractor;
use crate::job::{Job, JobId, RequesterId};
use crate::limiter::{Admission, RateLimiter};
use crate::messaging::Messenger;
use crate::platform::{Platform, ProfileTable};
use crate::pool::WorkerPool;
use crate::progress::ProgressReporter;
use crate::queue::JobQueue;
use crate::strategy::{AttemptStrategy, Policy};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Result of handing a URL to [`Engine::submit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Accepted {
        job_id: JobId,
        /// 1-based position at the time of enqueue
        queue_position: usize,
        /// Admissions left in the current window
        remaining: usize,
    },
    RateLimited {
        retry_after_seconds: u64,
    },
    UnsupportedSource,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub queue_depth: usize,
    pub active_workers: usize,
    pub max_workers: usize,
    pub remaining_quota: usize,
    pub max_requests: usize,
    pub window_seconds: u64,
    pub requester_completed: u64,
    pub uptime_secs: u64,
    pub analytics: AnalyticsSnapshot,
}

/// Aggregate load figures, published periodically by [`Engine::watch_load`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadSnapshot {
    pub queue_depth: usize,
    pub active_workers: usize,
    pub max_workers: usize,
    pub total_completed: u64,
    pub total_errors: u64,
    pub uptime_secs: u64,
}

/// Owns every piece of shared state: admission, queueing, slots, progress
/// and analytics. Shared as `Arc<Engine>` between ingress and the dispatcher.
pub struct Engine {
    pub(crate) limiter: RateLimiter,
    pub(crate) queue: JobQueue,
    pub(crate) pool: WorkerPool,
    pub(crate) analytics: Arc<AnalyticsStore>,
    pub(crate) strategy: AttemptStrategy,
    pub(crate) messenger: Arc<dyn Messenger>,
    pub(crate) progress: ProgressReporter,
    pub(crate) cleanup_artifacts: bool,
    started: Instant,
    next_id: AtomicU64,
}

impl Engine {
    /// Must be called from within a tokio runtime.
    pub fn new(
        config: &EngineConfig,
        extractor: Arc<dyn Extractor>,
        messenger: Arc<dyn Messenger>,
        analytics: AnalyticsStore,
    ) -> Self {
        let profiles = ProfileTable {
            download_dir: PathBuf::from(&config.download_dir),
            instagram_cookies: config.cookies.instagram.as_ref().map(PathBuf::from),
            tiktok_cookies: config.cookies.tiktok.as_ref().map(PathBuf::from),
        };
        let policy = Policy {
            max_duration_secs: config.max_duration_secs,
            max_size_bytes: config.max_file_size_bytes,
        };
        let strategy = AttemptStrategy::new(
            extractor,
            profiles,
            policy,
            Duration::from_millis(config.attempt_backoff_ms),
            Duration::from_secs(config.attempt_timeout_secs),
        );

        log::info!(
            "Engine ready: {} requests per {}s, {} workers",
            config.rate_limit.max_requests,
            config.rate_limit.window_seconds,
            config.max_concurrency
        );

        Self {
            limiter: RateLimiter::new(
                config.rate_limit.max_requests,
                config.rate_limit.window_seconds,
            ),
            queue: JobQueue::new(),
            pool: WorkerPool::new(config.max_concurrency),
            analytics: Arc::new(analytics),
            strategy,
            progress: ProgressReporter::spawn(messenger.clone()),
            messenger,
            cleanup_artifacts: config.cleanup_artifacts,
            started: Instant::now(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn submit(&self, requester: RequesterId, url: &str) -> SubmitOutcome {
        self.submit_at(requester, url, Utc::now())
    }

    /// Admission runs before platform recognition, so an unsupported link
    /// still uses up quota.
    pub fn submit_at(&self, requester: RequesterId, url: &str, now: DateTime<Utc>) -> SubmitOutcome {
        if let Admission::Denied { retry_after } = self.limiter.admit(requester, now) {
            let wait_ms = (retry_after - now).num_milliseconds().max(0) as u64;
            log::info!("Requester {} rate limited for {}ms", requester, wait_ms);
            return SubmitOutcome::RateLimited {
                retry_after_seconds: wait_ms.div_ceil(1000),
            };
        }

        let Some(platform) = Platform::from_url(url) else {
            log::info!("Requester {} sent unsupported link {}", requester, url);
            return SubmitOutcome::UnsupportedSource;
        };

        let job_id = JobId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.queue
            .enqueue(Job::new(job_id, requester, url.trim(), platform, now));
        let queue_position = self.queue.size().max(1);
        log::info!(
            "Job {} queued for requester {} ({}), position {}",
            job_id,
            requester,
            platform,
            queue_position
        );

        SubmitOutcome::Accepted {
            job_id,
            queue_position,
            remaining: self.limiter.remaining(requester, now),
        }
    }

    pub fn status(&self, requester: RequesterId) -> StatusReport {
        let analytics = self.analytics.snapshot();
        StatusReport {
            queue_depth: self.queue.size(),
            active_workers: self.pool.active(),
            max_workers: self.pool.max(),
            remaining_quota: self.limiter.remaining(requester, Utc::now()),
            max_requests: self.limiter.max_requests(),
            window_seconds: self.limiter.window_seconds(),
            requester_completed: analytics.completed_for(requester),
            uptime_secs: self.uptime().as_secs(),
            analytics,
        }
    }

    pub fn load(&self) -> LoadSnapshot {
        let analytics = self.analytics.snapshot();
        LoadSnapshot {
            queue_depth: self.queue.size(),
            active_workers: self.pool.active(),
            max_workers: self.pool.max(),
            total_completed: analytics.total_completed,
            total_errors: analytics.total_errors(),
            uptime_secs: self.uptime().as_secs(),
        }
    }

    pub fn watch_load(self: &Arc<Self>) -> watch::Receiver<LoadSnapshot> {
        let (tx, rx) = watch::channel(self.load());
        let engine = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(500));
            loop {
                interval.tick().await;
                let Some(engine) = engine.upgrade() else {
                    break;
                };
                if tx.send(engine.load()).is_err() {
                    break;
                }
            }
        });
        rx
    }

    pub fn analytics(&self) -> &AnalyticsStore {
        &self.analytics
    }

    pub fn queue_depth(&self) -> usize {
        self.queue.size()
    }

    /// Highest number of simultaneously running jobs so far.
    pub fn peak_active(&self) -> usize {
        self.pool.peak()
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }
}
