use crate::config::StoreConfig;
use crate::error::Result;
use async_trait::async_trait;
use std::path::PathBuf;

pub mod collector;
pub mod json;
pub mod snapshot;
pub mod sqlite;

pub use collector::AnalyticsStore;
pub use snapshot::AnalyticsSnapshot;

/// Durable home of the analytics counters.
#[async_trait]
pub trait AnalyticsPersistence: Send + Sync {
    /// `Ok(None)` when nothing has been stored yet.
    async fn load(&self) -> Result<Option<AnalyticsSnapshot>>;

    async fn save(&self, snapshot: &AnalyticsSnapshot) -> Result<()>;

    /// Human-readable location, for log lines.
    fn describe(&self) -> String;
}

/// Keeps the last saved snapshot in memory. Used when persistence is
/// disabled and in tests.
#[derive(Default)]
pub struct MemoryStore {
    saved: std::sync::Mutex<Option<AnalyticsSnapshot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn saved(&self) -> Option<AnalyticsSnapshot> {
        self.saved
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl AnalyticsPersistence for MemoryStore {
    async fn load(&self) -> Result<Option<AnalyticsSnapshot>> {
        Ok(self.saved())
    }

    async fn save(&self, snapshot: &AnalyticsSnapshot) -> Result<()> {
        *self
            .saved
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(snapshot.clone());
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

#[async_trait]
impl<T: AnalyticsPersistence + ?Sized> AnalyticsPersistence for std::sync::Arc<T> {
    async fn load(&self) -> Result<Option<AnalyticsSnapshot>> {
        (**self).load().await
    }

    async fn save(&self, snapshot: &AnalyticsSnapshot) -> Result<()> {
        (**self).save(snapshot).await
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

pub fn open_persistence(config: &StoreConfig) -> Result<Box<dyn AnalyticsPersistence>> {
    let persistence: Box<dyn AnalyticsPersistence> = match config {
        StoreConfig::Json { path } => Box::new(json::JsonFileStore::new(PathBuf::from(path))),
        StoreConfig::Sqlite { path, table } => {
            Box::new(sqlite::SqliteStore::new(PathBuf::from(path), table.clone())?)
        }
        StoreConfig::Memory => Box::new(MemoryStore::new()),
    };
    Ok(persistence)
}
