use crate::error::Result;
use crate::platform::AttemptProfile;
use crate::progress::ProgressSink;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub mod ytdlp;

pub use ytdlp::YtDlpExtractor;

/// What a metadata-only probe reports about a remote resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub title: Option<String>,
    pub uploader: Option<String>,
    pub duration_secs: Option<u64>,
    /// Exact or approximate size in bytes
    pub estimated_size: Option<u64>,
    /// Source reports restricted availability
    #[serde(default)]
    pub private: bool,
}

impl Metadata {
    pub fn duration_label(&self) -> String {
        match self.duration_secs {
            Some(secs) if secs > 0 => format!("{}m {}s", secs / 60, secs % 60),
            _ => "Unknown".to_string(),
        }
    }

    pub fn summary(&self) -> String {
        let title: String = self
            .title
            .as_deref()
            .unwrap_or("Unknown")
            .chars()
            .take(50)
            .collect();
        format!(
            "{}\nBy: {}\nDuration: {}\nAccess: {}\nStarting download...",
            title,
            self.uploader.as_deref().unwrap_or("Unknown"),
            self.duration_label(),
            if self.private { "private" } else { "public" },
        )
    }
}

/// Where a completed transfer left the artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactLocation {
    pub path: PathBuf,
}

/// Resolves URLs into media and writes it to storage.
#[async_trait]
pub trait Extractor: Send + Sync {
    fn name(&self) -> &'static str;

    /// Metadata-only lookup; must not transfer the artifact.
    async fn probe(&self, url: &str, profile: &AttemptProfile) -> Result<Metadata>;

    /// Full transfer. Progress may be reported from any thread or task.
    async fn fetch(
        &self,
        url: &str,
        profile: &AttemptProfile,
        progress: ProgressSink,
    ) -> Result<ArtifactLocation>;
}
