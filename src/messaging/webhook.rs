use super::{MessageEvent, Messenger, StatusHandle};
use crate::error::{Error, Result};
use crate::extractor::ArtifactLocation;
use crate::job::RequesterId;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Posts every outward message as JSON to an HTTP endpoint that owns the
/// actual chat front end.
pub struct WebhookMessenger {
    client: Client,
    url: String,
    next_handle: AtomicU64,
}

impl WebhookMessenger {
    pub fn new(url: &str, timeout_secs: u64) -> Result<Self> {
        url::Url::parse(url).map_err(|e| Error::Config(format!("webhook url {}: {}", url, e)))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent("grabber/0.1")
            .build()?;

        Ok(Self {
            client,
            url: url.to_string(),
            next_handle: AtomicU64::new(1),
        })
    }

    async fn post(&self, event: &MessageEvent) -> Result<()> {
        // the endpoint url usually embeds a token; keep it out of error text
        self.client
            .post(&self.url)
            .json(event)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| e.without_url())?;
        Ok(())
    }
}

#[async_trait]
impl Messenger for WebhookMessenger {
    async fn notify(&self, requester: RequesterId, text: &str) -> Result<StatusHandle> {
        let handle = StatusHandle(self.next_handle.fetch_add(1, Ordering::SeqCst));
        self.post(&MessageEvent::Notify {
            requester,
            handle,
            text: text.to_string(),
            at: Utc::now(),
        })
        .await?;
        Ok(handle)
    }

    async fn update(&self, handle: &StatusHandle, text: &str) -> Result<()> {
        self.post(&MessageEvent::Update {
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
        self.post(&MessageEvent::Deliver {
            requester,
            path: artifact.path.clone(),
            caption: caption.to_string(),
            at: Utc::now(),
        })
        .await
    }
}
