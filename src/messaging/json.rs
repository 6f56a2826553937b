use super::{MessageEvent, Messenger, StatusHandle};
use crate::error::Result;
use crate::extractor::ArtifactLocation;
use crate::job::RequesterId;
use async_trait::async_trait;
use chrono::Utc;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

/// Appends every outward message to a JSON-lines transcript.
pub struct TranscriptMessenger {
    file: Mutex<File>,
    next_handle: AtomicU64,
}

impl TranscriptMessenger {
    pub fn new(path: PathBuf) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            file: Mutex::new(file),
            next_handle: AtomicU64::new(1),
        })
    }

    async fn append(&self, event: &MessageEvent) -> Result<()> {
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');

        let mut file = self.file.lock().await;
        file.write_all(&line)?;
        Ok(())
    }
}

#[async_trait]
impl Messenger for TranscriptMessenger {
    async fn notify(&self, requester: RequesterId, text: &str) -> Result<StatusHandle> {
        let handle = StatusHandle(self.next_handle.fetch_add(1, Ordering::SeqCst));
        self.append(&MessageEvent::Notify {
            requester,
            handle,
            text: text.to_string(),
            at: Utc::now(),
        })
        .await?;
        Ok(handle)
    }

    async fn update(&self, handle: &StatusHandle, text: &str) -> Result<()> {
        self.append(&MessageEvent::Update {
            handle: *handle,
            text: text.to_string(),
            at: Utc::now(),
        })
        .await
    }

    async fn deliver(
        &self,
        requester: RequesterId,
        artifact: &ArtifactLocation,
        caption: &str,
    ) -> Result<()> {
        self.append(&MessageEvent::Deliver {
            requester,
            path: artifact.path.clone(),
            caption: caption.to_string(),
            at: Utc::now(),
        })
        .await
    }

    async fn close(&self) -> Result<()> {
        self.file.lock().await.flush()?;
        Ok(())
    }
}
