use super::{Messenger, StatusHandle};
use crate::error::{Error, Result};
use crate::extractor::ArtifactLocation;
use crate::job::RequesterId;
use async_trait::async_trait;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Renders status messages as spinner lines on the terminal.
pub struct ConsoleMessenger {
    multi: Option<std::sync::Arc<MultiProgress>>,
    bars: Mutex<HashMap<StatusHandle, ProgressBar>>,
    next_handle: AtomicU64,
}

impl ConsoleMessenger {
    pub fn new(multi: Option<std::sync::Arc<MultiProgress>>) -> Self {
        Self {
            multi,
            bars: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
        }
    }

    fn println(&self, line: &str) -> Result<()> {
        if let Some(multi) = &self.multi {
            multi
                .println(line)
                .map_err(|e| Error::Messaging(e.to_string()))?;
        } else {
            println!("{}", line);
        }
        Ok(())
    }

    fn bars(&self) -> std::sync::MutexGuard<'_, HashMap<StatusHandle, ProgressBar>> {
        self.bars.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for ConsoleMessenger {
    fn default() -> Self {
        Self::new(None)
    }
}

fn one_line(text: &str) -> String {
    text.lines().collect::<Vec<_>>().join(" | ")
}

#[async_trait]
impl Messenger for ConsoleMessenger {
    async fn notify(&self, requester: RequesterId, text: &str) -> Result<StatusHandle> {
        let handle = StatusHandle(self.next_handle.fetch_add(1, Ordering::SeqCst));

        match &self.multi {
            Some(multi) => {
                let bar = multi.add(ProgressBar::new_spinner());
                bar.set_style(
                    ProgressStyle::default_spinner()
                        .template("{spinner:.green} [{prefix}] {msg}")
                        .map_err(|e| Error::Messaging(e.to_string()))?,
                );
                bar.set_prefix(requester.to_string());
                bar.set_message(one_line(text));
                bar.enable_steady_tick(Duration::from_millis(120));
                self.bars().insert(handle, bar);
            }
            None => self.println(&format!("[{}] {}", requester, one_line(text)))?,
        }

        Ok(handle)
    }

    async fn update(&self, handle: &StatusHandle, text: &str) -> Result<()> {
        if let Some(bar) = self.bars().get(handle) {
            bar.set_message(one_line(text));
            return Ok(());
        }
        self.println(&format!("[status {}] {}", handle.0, one_line(text)))
    }

    async fn deliver(
        &self,
        requester: RequesterId,
        artifact: &ArtifactLocation,
        caption: &str,
    ) -> Result<()> {
        self.println(&format!(
            "[{}] delivered {} ({})",
            requester,
            artifact.path.display(),
            one_line(caption)
        ))
    }

    async fn release(&self, handle: &StatusHandle) -> Result<()> {
        if let Some(bar) = self.bars().remove(handle) {
            bar.finish();
        }
        Ok(())
    }
}
