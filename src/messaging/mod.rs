use crate::config::MessengerConfig;
use crate::error::Result;
use crate::extractor::ArtifactLocation;
use crate::job::RequesterId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

pub mod console;
pub mod json;
pub mod webhook;

/// Opaque identity of a status message, handed out by [`Messenger::notify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatusHandle(pub u64);

/// The user-facing surface: renders text and hands over artifacts.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Sends a new message and returns a handle that can be edited later.
    async fn notify(&self, requester: RequesterId, text: &str) -> Result<StatusHandle>;

    async fn update(&self, handle: &StatusHandle, text: &str) -> Result<()>;

    async fn deliver(
        &self,
        requester: RequesterId,
        artifact: &ArtifactLocation,
        caption: &str,
    ) -> Result<()>;

    /// The core will not touch `handle` again.
    async fn release(&self, _handle: &StatusHandle) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Wire shape shared by the transcript and webhook messengers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MessageEvent {
    Notify {
        requester: RequesterId,
        handle: StatusHandle,
        text: String,
        at: DateTime<Utc>,
    },
    Update {
        handle: StatusHandle,
        text: String,
        at: DateTime<Utc>,
    },
    Deliver {
        requester: RequesterId,
        path: PathBuf,
        caption: String,
        at: DateTime<Utc>,
    },
}

pub fn build(
    config: &MessengerConfig,
    multi: Option<Arc<indicatif::MultiProgress>>,
) -> Result<Arc<dyn Messenger>> {
    let messenger: Arc<dyn Messenger> = match config {
        MessengerConfig::Console => Arc::new(console::ConsoleMessenger::new(multi)),
        MessengerConfig::Json { path } => {
            Arc::new(json::TranscriptMessenger::new(PathBuf::from(path))?)
        }
        MessengerConfig::Webhook { url, timeout_secs } => {
            Arc::new(webhook::WebhookMessenger::new(url, *timeout_secs)?)
        }
    };
    Ok(messenger)
}
