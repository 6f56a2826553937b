use crate::job::RequesterId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The persisted counter set. Every field round-trips through both stores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyticsSnapshot {
    #[serde(default)]
    pub total_completed: u64,
    /// Keyed by local calendar date, `YYYY-MM-DD`
    #[serde(default)]
    pub completed_by_day: BTreeMap<String, u64>,
    #[serde(default)]
    pub completed_by_platform: BTreeMap<String, u64>,
    #[serde(default)]
    pub completed_by_requester: BTreeMap<RequesterId, u64>,
    #[serde(default)]
    pub errors_by_platform: BTreeMap<String, u64>,
    #[serde(default)]
    pub private_by_platform: BTreeMap<String, u64>,
    pub start_time: DateTime<Utc>,
}

impl AnalyticsSnapshot {
    pub fn empty(start_time: DateTime<Utc>) -> Self {
        Self {
            total_completed: 0,
            completed_by_day: BTreeMap::new(),
            completed_by_platform: BTreeMap::new(),
            completed_by_requester: BTreeMap::new(),
            errors_by_platform: BTreeMap::new(),
            private_by_platform: BTreeMap::new(),
            start_time,
        }
    }

    pub fn completed_for(&self, requester: RequesterId) -> u64 {
        self.completed_by_requester
            .get(&requester)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_errors(&self) -> u64 {
        self.errors_by_platform.values().sum()
    }
}
