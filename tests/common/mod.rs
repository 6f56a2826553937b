#![allow(dead_code)]

use async_trait::async_trait;
use grabber::analytics::{AnalyticsStore, MemoryStore};
use grabber::config::{EngineConfig, StoreConfig};
use grabber::extractor::{ArtifactLocation, Extractor, Metadata};
use grabber::job::RequesterId;
use grabber::messaging::{Messenger, StatusHandle};
use grabber::platform::AttemptProfile;
use grabber::progress::{ProgressEvent, ProgressSink};
use grabber::{Dispatcher, Engine, Error, Result};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What the scripted extractor does on its next call for a URL.
#[derive(Debug, Clone)]
pub enum Step {
    ProbeFails(&'static str),
    FetchFails(&'static str),
    /// Probe reports this metadata, then the transfer fails
    ProbeThenFetchFails(Metadata, &'static str),
    Succeed(Metadata),
    /// Probe stalls for this long, then succeeds
    ProbeHangs(Duration),
    Panic,
}

pub fn clip(duration_secs: u64) -> Metadata {
    Metadata {
        title: Some("clip".to_string()),
        uploader: Some("someone".to_string()),
        duration_secs: Some(duration_secs),
        estimated_size: Some(1024),
        private: false,
    }
}

/// Plays back per-URL scripts. URLs without a script succeed with a short clip.
pub struct ScriptedExtractor {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    transfer_delay: Duration,
    progress: Vec<f32>,
    probed: Mutex<Vec<(String, &'static str)>>,
    fetches: AtomicUsize,
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedExtractor {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            transfer_delay: Duration::ZERO,
            progress: Vec::new(),
            probed: Mutex::new(Vec::new()),
            fetches: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.transfer_delay = delay;
        self
    }

    /// Percentages reported during every successful transfer.
    pub fn with_progress(mut self, steps: &[f32]) -> Self {
        self.progress = steps.to_vec();
        self
    }

    pub fn script(self, url: &str, steps: Vec<Step>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(url.to_string(), steps.into());
        self
    }

    /// URLs in probe order, with the attempt label used.
    pub fn probed(&self) -> Vec<(String, &'static str)> {
        self.probed.lock().unwrap().clone()
    }

    pub fn probed_urls(&self) -> Vec<String> {
        self.probed().into_iter().map(|(url, _)| url).collect()
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn front(&self, url: &str) -> Option<Step> {
        self.scripts
            .lock()
            .unwrap()
            .get(url)
            .and_then(|steps| steps.front().cloned())
    }

    fn pop(&self, url: &str) -> Option<Step> {
        self.scripts
            .lock()
            .unwrap()
            .get_mut(url)
            .and_then(|steps| steps.pop_front())
    }
}

#[async_trait]
impl Extractor for ScriptedExtractor {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn probe(&self, url: &str, profile: &AttemptProfile) -> Result<Metadata> {
        self.probed
            .lock()
            .unwrap()
            .push((url.to_string(), profile.label));

        match self.front(url) {
            Some(Step::ProbeFails(raw)) => {
                self.pop(url);
                Err(Error::Extraction(raw.to_string()))
            }
            Some(Step::Panic) => {
                self.pop(url);
                panic!("extractor blew up on {}", url);
            }
            Some(Step::ProbeHangs(stall)) => {
                self.pop(url);
                tokio::time::sleep(stall).await;
                Ok(clip(30))
            }
            Some(Step::Succeed(metadata)) | Some(Step::ProbeThenFetchFails(metadata, _)) => {
                Ok(metadata)
            }
            Some(Step::FetchFails(_)) | None => Ok(clip(30)),
        }
    }

    async fn fetch(
        &self,
        url: &str,
        profile: &AttemptProfile,
        progress: ProgressSink,
    ) -> Result<ArtifactLocation> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let now_running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now_running, Ordering::SeqCst);

        for percent in &self.progress {
            progress.report(ProgressEvent::Downloading {
                percent: *percent,
                rate: None,
            });
        }
        tokio::time::sleep(self.transfer_delay).await;
        self.running.fetch_sub(1, Ordering::SeqCst);

        match self.pop(url) {
            Some(Step::FetchFails(raw)) | Some(Step::ProbeThenFetchFails(_, raw)) => {
                return Err(Error::Extraction(raw.to_string()));
            }
            _ => {}
        }

        std::fs::create_dir_all(&profile.output_dir)?;
        let path = profile
            .output_dir
            .join(format!("{}.mp4", progress.job().0));
        std::fs::write(&path, vec![0u8; 2048])?;
        progress.report(ProgressEvent::Finished);
        Ok(ArtifactLocation { path })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Notify {
        requester: RequesterId,
        handle: StatusHandle,
        text: String,
    },
    Update {
        handle: StatusHandle,
        text: String,
    },
    Deliver {
        requester: RequesterId,
        path: PathBuf,
        caption: String,
    },
    Release {
        handle: StatusHandle,
    },
}

/// Remembers everything sent to requesters.
#[derive(Default)]
pub struct RecordingMessenger {
    sent: Mutex<Vec<Sent>>,
    owners: Mutex<HashMap<StatusHandle, RequesterId>>,
    next_handle: AtomicU64,
    delivery_error: Option<String>,
}

impl RecordingMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_delivery() -> Self {
        Self::failing_delivery_with("file too big for the chat")
    }

    /// Every `deliver` fails with `Messaging(error)`.
    pub fn failing_delivery_with(error: &str) -> Self {
        Self {
            delivery_error: Some(error.to_string()),
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    /// Every notify and update text that reached `requester`, in order.
    pub fn texts_for(&self, requester: RequesterId) -> Vec<String> {
        let owners = self.owners.lock().unwrap().clone();
        self.sent()
            .into_iter()
            .filter_map(|sent| match sent {
                Sent::Notify {
                    requester: r, text, ..
                } if r == requester => Some(text),
                Sent::Update { handle, text } if owners.get(&handle) == Some(&requester) => {
                    Some(text)
                }
                _ => None,
            })
            .collect()
    }

    pub fn deliveries(&self) -> Vec<(RequesterId, PathBuf)> {
        self.sent()
            .into_iter()
            .filter_map(|sent| match sent {
                Sent::Deliver {
                    requester, path, ..
                } => Some((requester, path)),
                _ => None,
            })
            .collect()
    }

    pub fn releases(&self) -> usize {
        self.sent()
            .iter()
            .filter(|sent| matches!(sent, Sent::Release { .. }))
            .count()
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn notify(&self, requester: RequesterId, text: &str) -> Result<StatusHandle> {
        let handle = StatusHandle(self.next_handle.fetch_add(1, Ordering::SeqCst) + 1);
        self.owners.lock().unwrap().insert(handle, requester);
        self.sent.lock().unwrap().push(Sent::Notify {
            requester,
            handle,
            text: text.to_string(),
        });
        Ok(handle)
    }

    async fn update(&self, handle: &StatusHandle, text: &str) -> Result<()> {
        self.sent.lock().unwrap().push(Sent::Update {
            handle: *handle,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn deliver(
        &self,
        requester: RequesterId,
        artifact: &ArtifactLocation,
        caption: &str,
    ) -> Result<()> {
        if let Some(error) = &self.delivery_error {
            return Err(Error::Messaging(error.clone()));
        }
        self.sent.lock().unwrap().push(Sent::Deliver {
            requester,
            path: artifact.path.clone(),
            caption: caption.to_string(),
        });
        Ok(())
    }

    async fn release(&self, handle: &StatusHandle) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push(Sent::Release { handle: *handle });
        Ok(())
    }
}

pub fn test_config(download_dir: &Path, max_concurrency: usize) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.max_concurrency = max_concurrency;
    config.attempt_backoff_ms = 0;
    config.attempt_timeout_secs = 5;
    config.download_dir = download_dir.display().to_string();
    config.analytics = StoreConfig::Memory;
    config
}

pub struct Harness {
    pub engine: Arc<Engine>,
    pub dispatcher: Dispatcher,
    pub extractor: Arc<ScriptedExtractor>,
    pub messenger: Arc<RecordingMessenger>,
    pub store: Arc<MemoryStore>,
    pub dir: tempfile::TempDir,
}

impl Harness {
    pub async fn new(
        extractor: ScriptedExtractor,
        messenger: RecordingMessenger,
        configure: impl FnOnce(&mut EngineConfig),
    ) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path(), 2);
        configure(&mut config);

        let extractor = Arc::new(extractor);
        let messenger = Arc::new(messenger);
        let store = Arc::new(MemoryStore::new());
        let analytics = AnalyticsStore::open(Box::new(store.clone())).await;

        let engine = Arc::new(Engine::new(
            &config,
            extractor.clone(),
            messenger.clone(),
            analytics,
        ));
        let dispatcher = Dispatcher::new(engine.clone());

        Self {
            engine,
            dispatcher,
            extractor,
            messenger,
            store,
            dir,
        }
    }

    /// Starts the workers, waits for the queue to drain and stops them.
    pub async fn run_to_completion(&self) {
        self.dispatcher.start().await;
        self.dispatcher.shutdown(true).await.unwrap();
    }
}
