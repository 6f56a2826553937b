use crate::platform::Platform;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of whoever submitted a request (a chat user id, for instance).
pub type RequesterId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One admitted request. Never mutated after submit; the queue owns it until
/// a worker claims it.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub requester_id: RequesterId,
    pub url: String,
    pub platform: Platform,
    pub enqueued_at: DateTime<Utc>,
}

impl Job {
    pub fn new(
        id: JobId,
        requester_id: RequesterId,
        url: impl Into<String>,
        platform: Platform,
        enqueued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            requester_id,
            url: url.into(),
            platform,
            enqueued_at,
        }
    }
}
