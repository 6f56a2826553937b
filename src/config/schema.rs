use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct EngineConfig {
    #[serde(default)]
    #[validate]
    pub rate_limit: RateLimitConfig,

    #[serde(default = "default_concurrency")]
    #[validate(range(min = 1, max = 64))]
    pub max_concurrency: usize,

    #[serde(default = "default_max_duration")]
    #[validate(range(min = 1))]
    pub max_duration_secs: u64,

    #[serde(default = "default_max_file_size")]
    #[validate(range(min = 1))]
    pub max_file_size_bytes: u64,

    /// Pause before each fallback attempt
    #[serde(default = "default_backoff")]
    pub attempt_backoff_ms: u64,

    /// Wall-clock bound on each probe and each transfer
    #[serde(default = "default_attempt_timeout")]
    #[validate(range(min = 1))]
    pub attempt_timeout_secs: u64,

    #[serde(default = "default_download_dir")]
    #[validate(length(min = 1))]
    pub download_dir: String,

    #[serde(default)]
    pub cookies: CookieConfig,

    #[serde(default = "default_extractor_binary")]
    #[validate(length(min = 1))]
    pub extractor_binary: String,

    /// Remove artifacts once the delivery attempt is over
    #[serde(default = "default_cleanup")]
    pub cleanup_artifacts: bool,

    #[serde(default)]
    pub analytics: StoreConfig,

    #[serde(default)]
    pub messenger: MessengerConfig,

    /// Optional path to a parent configuration file to inherit from
    #[serde(default)]
    pub extends: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rate_limit: RateLimitConfig::default(),
            max_concurrency: default_concurrency(),
            max_duration_secs: default_max_duration(),
            max_file_size_bytes: default_max_file_size(),
            attempt_backoff_ms: default_backoff(),
            attempt_timeout_secs: default_attempt_timeout(),
            download_dir: default_download_dir(),
            cookies: CookieConfig::default(),
            extractor_binary: default_extractor_binary(),
            cleanup_artifacts: default_cleanup(),
            analytics: StoreConfig::default(),
            messenger: MessengerConfig::default(),
            extends: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct RateLimitConfig {
    #[serde(default = "default_max_requests")]
    #[validate(range(min = 1))]
    pub max_requests: usize,

    #[serde(default = "default_window")]
    #[validate(range(min = 1))]
    pub window_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_seconds: default_window(),
        }
    }
}

/// Netscape-format cookie files presented on the enhanced attempt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CookieConfig {
    #[serde(default)]
    pub instagram: Option<String>,
    #[serde(default)]
    pub tiktok: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoreConfig {
    Json {
        path: String,
    },
    Sqlite {
        path: String,
        #[serde(default = "default_table_name")]
        table: String,
    },
    Memory,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::Json {
            path: "analytics.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessengerConfig {
    #[default]
    Console,
    Json {
        path: String,
    },
    Webhook {
        url: String,
        #[serde(default = "default_webhook_timeout")]
        timeout_secs: u64,
    },
}

fn default_concurrency() -> usize {
    2
}

fn default_max_requests() -> usize {
    3
}

fn default_window() -> u64 {
    300
}

fn default_max_duration() -> u64 {
    900
}

fn default_max_file_size() -> u64 {
    100 * 1024 * 1024
}

fn default_backoff() -> u64 {
    2000
}

fn default_attempt_timeout() -> u64 {
    600
}

fn default_download_dir() -> String {
    "downloads".to_string()
}

fn default_extractor_binary() -> String {
    "yt-dlp".to_string()
}

fn default_cleanup() -> bool {
    true
}

fn default_table_name() -> String {
    "analytics".to_string()
}

fn default_webhook_timeout() -> u64 {
    10
}
