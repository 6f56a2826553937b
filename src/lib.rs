pub mod analytics;
pub mod classify;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod extractor;
pub mod job;
pub mod limiter;
pub mod messaging;
pub mod platform;
pub mod pool;
pub mod progress;
pub mod queue;
pub mod strategy;

pub use analytics::{AnalyticsSnapshot, AnalyticsStore};
pub use dispatcher::{Dispatcher, DispatcherState};
pub use engine::{Engine, LoadSnapshot, StatusReport, SubmitOutcome};
pub use error::{Error, Result};
pub use extractor::Extractor;
pub use messaging::Messenger;
