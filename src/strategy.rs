//! Ordered multi-attempt execution of a single job.

use crate::extractor::{ArtifactLocation, Extractor, Metadata};
use crate::job::Job;
use crate::platform::{AttemptConfig, AttemptProfile, ProfileTable};
use crate::progress::{ProgressEvent, ProgressSink};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Probe,
    Transfer,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Probe => write!(f, "metadata probe"),
            Phase::Transfer => write!(f, "transfer"),
        }
    }
}

/// Why a single attempt failed. Always retryable under the next configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("metadata probe failed: {0}")]
    Probe(String),

    #[error("transfer failed: {0}")]
    Transfer(String),

    #[error("{phase} timed out after {secs}s")]
    Timeout { phase: Phase, secs: u64 },
}

impl FetchError {
    /// The collaborator's own description, used for classification.
    pub fn raw(&self) -> String {
        match self {
            FetchError::Probe(raw) | FetchError::Transfer(raw) => raw.clone(),
            FetchError::Timeout { secs, .. } => format!("timed out after {}s", secs),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptFailure {
    pub attempt: &'static str,
    pub error: FetchError,
}

/// Structural limits. Exceeding one ends the job without further attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Duration { actual_secs: u64, limit_secs: u64 },
    Size { actual_bytes: u64, limit_bytes: u64 },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Duration {
                actual_secs,
                limit_secs,
            } => write!(
                f,
                "Video too long ({}m {}s). Maximum allowed: {} minutes.",
                actual_secs / 60,
                actual_secs % 60,
                limit_secs / 60
            ),
            Rejection::Size {
                actual_bytes,
                limit_bytes,
            } => write!(
                f,
                "Video too large ({:.1}MB). Maximum allowed: {}MB.",
                *actual_bytes as f64 / (1024.0 * 1024.0),
                limit_bytes / 1024 / 1024
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    pub max_duration_secs: u64,
    pub max_size_bytes: u64,
}

impl Policy {
    /// Unknown duration or size passes.
    pub fn check(&self, metadata: &Metadata) -> Option<Rejection> {
        if let Some(actual) = metadata.duration_secs {
            if actual > self.max_duration_secs {
                return Some(Rejection::Duration {
                    actual_secs: actual,
                    limit_secs: self.max_duration_secs,
                });
            }
        }
        if let Some(actual) = metadata.estimated_size {
            if actual > self.max_size_bytes {
                return Some(Rejection::Size {
                    actual_bytes: actual,
                    limit_bytes: self.max_size_bytes,
                });
            }
        }
        None
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Delivered {
        artifact: ArtifactLocation,
        metadata: Metadata,
        attempt: &'static str,
    },
    Rejected(Rejection),
    Failed(AttemptFailure),
}

/// Terminal outcome plus the failures of attempts that were retried.
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    pub outcome: Outcome,
    pub retried: Vec<AttemptFailure>,
}

enum AttemptResult {
    Delivered(ArtifactLocation, Metadata),
    Rejected(Rejection),
}

pub struct AttemptStrategy {
    extractor: Arc<dyn Extractor>,
    profiles: ProfileTable,
    attempts: Vec<AttemptConfig>,
    policy: Policy,
    backoff: Duration,
    attempt_timeout: Duration,
}

impl AttemptStrategy {
    pub fn new(
        extractor: Arc<dyn Extractor>,
        profiles: ProfileTable,
        policy: Policy,
        backoff: Duration,
        attempt_timeout: Duration,
    ) -> Self {
        Self {
            extractor,
            profiles,
            attempts: vec![AttemptConfig::ENHANCED, AttemptConfig::FALLBACK],
            policy,
            backoff,
            attempt_timeout,
        }
    }

    pub fn with_attempts(mut self, attempts: Vec<AttemptConfig>) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn attempts(&self) -> &[AttemptConfig] {
        &self.attempts
    }

    pub async fn execute(&self, job: &Job, progress: &ProgressSink) -> Execution {
        let mut retried = Vec::new();
        let last = self.attempts.len().saturating_sub(1);

        for (index, attempt) in self.attempts.iter().enumerate() {
            if index > 0 {
                progress.report(ProgressEvent::Retrying {
                    attempt: attempt.label.to_string(),
                });
                tokio::time::sleep(self.backoff).await;
            }

            let profile = self.profiles.resolve(job.platform, attempt);
            match self.attempt(job, &profile, progress).await {
                Ok(AttemptResult::Delivered(artifact, metadata)) => {
                    return Execution {
                        outcome: Outcome::Delivered {
                            artifact,
                            metadata,
                            attempt: attempt.label,
                        },
                        retried,
                    };
                }
                Ok(AttemptResult::Rejected(rejection)) => {
                    log::info!("Job {} rejected: {}", job.id, rejection);
                    return Execution {
                        outcome: Outcome::Rejected(rejection),
                        retried,
                    };
                }
                Err(error) => {
                    let failure = AttemptFailure {
                        attempt: attempt.label,
                        error,
                    };
                    if index == last {
                        log::error!(
                            "Job {} failed on its last attempt ({}): {}",
                            job.id,
                            failure.attempt,
                            failure.error
                        );
                        return Execution {
                            outcome: Outcome::Failed(failure),
                            retried,
                        };
                    }
                    log::warn!(
                        "Job {} attempt {} ({}) failed: {}",
                        job.id,
                        index + 1,
                        failure.attempt,
                        failure.error
                    );
                    retried.push(failure);
                }
            }
        }

        Execution {
            outcome: Outcome::Failed(AttemptFailure {
                attempt: "none",
                error: FetchError::Probe("no attempt configurations".to_string()),
            }),
            retried,
        }
    }

    async fn attempt(
        &self,
        job: &Job,
        profile: &AttemptProfile,
        progress: &ProgressSink,
    ) -> Result<AttemptResult, FetchError> {
        let metadata = self
            .bounded(Phase::Probe, self.extractor.probe(&job.url, profile))
            .await?
            .map_err(|e| FetchError::Probe(e.to_string()))?;

        if let Some(rejection) = self.policy.check(&metadata) {
            return Ok(AttemptResult::Rejected(rejection));
        }
        progress.report(ProgressEvent::Probed(metadata.clone()));

        let artifact = self
            .bounded(
                Phase::Transfer,
                self.extractor.fetch(&job.url, profile, progress.clone()),
            )
            .await?
            .map_err(|e| FetchError::Transfer(e.to_string()))?;

        Ok(AttemptResult::Delivered(artifact, metadata))
    }

    async fn bounded<T>(&self, phase: Phase, call: impl Future<Output = T>) -> Result<T, FetchError> {
        tokio::time::timeout(self.attempt_timeout, call)
            .await
            .map_err(|_| FetchError::Timeout {
                phase,
                secs: self.attempt_timeout.as_secs(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_passes_unknown_values() {
        let policy = Policy {
            max_duration_secs: 900,
            max_size_bytes: 100 * 1024 * 1024,
        };
        assert_eq!(policy.check(&Metadata::default()), None);
        assert_eq!(
            policy.check(&Metadata {
                duration_secs: Some(900),
                estimated_size: Some(100 * 1024 * 1024),
                ..Default::default()
            }),
            None
        );
    }

    #[test]
    fn duration_is_checked_before_size() {
        let policy = Policy {
            max_duration_secs: 60,
            max_size_bytes: 10,
        };
        let rejection = policy.check(&Metadata {
            duration_secs: Some(61),
            estimated_size: Some(11),
            ..Default::default()
        });
        assert_eq!(
            rejection,
            Some(Rejection::Duration {
                actual_secs: 61,
                limit_secs: 60
            })
        );
    }

    #[test]
    fn rejection_messages_state_the_limit() {
        let duration = Rejection::Duration {
            actual_secs: 1000,
            limit_secs: 900,
        };
        assert_eq!(
            duration.to_string(),
            "Video too long (16m 40s). Maximum allowed: 15 minutes."
        );

        let size = Rejection::Size {
            actual_bytes: 150 * 1024 * 1024,
            limit_bytes: 100 * 1024 * 1024,
        };
        assert_eq!(
            size.to_string(),
            "Video too large (150.0MB). Maximum allowed: 100MB."
        );
    }

    #[test]
    fn timeout_raw_text_classifies_as_timeout() {
        let error = FetchError::Timeout {
            phase: Phase::Transfer,
            secs: 30,
        };
        assert_eq!(error.to_string(), "transfer timed out after 30s");
        assert_eq!(
            crate::classify::classify(&error.raw()),
            crate::classify::FailureCategory::Timeout
        );
    }
}
