use crate::config::schema::EngineConfig;
use crate::error::{Error, Result};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use validator::Validate;

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<EngineConfig> {
        let path = path.as_ref();
        let mut visited = HashSet::new();
        Self::load_with_inheritance(path, &mut visited, false)
    }

    fn load_with_inheritance(
        path: &Path,
        visited: &mut HashSet<PathBuf>,
        is_parent_load: bool,
    ) -> Result<EngineConfig> {
        let path = fs::canonicalize(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;

        if !visited.insert(path.clone()) {
            return Err(Error::Config(format!(
                "Circular inheritance detected involving {}",
                path.display()
            )));
        }

        let config = Self::load_file(&path)?;

        let final_config = if let Some(parent_path_str) = &config.extends {
            let parent_path = path
                .parent()
                .ok_or_else(|| {
                    Error::Config(format!(
                        "Cannot determine parent directory for {}",
                        path.display()
                    ))
                })?
                .join(parent_path_str);

            let parent_config = Self::load_with_inheritance(&parent_path, visited, true)?;
            Self::merge_configs(parent_config, config)
        } else {
            config
        };

        if !is_parent_load {
            final_config.validate()?;
        }

        Ok(final_config)
    }

    fn load_file(path: &Path) -> Result<EngineConfig> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Ok(serde_json::from_str(&content)?),
            Some("yaml") | Some("yml") => Ok(serde_yaml::from_str(&content)?),
            Some("toml") => Ok(toml::from_str(&content)?),
            _ => Err(Error::Config(format!(
                "Unsupported file extension: {}",
                path.display()
            ))),
        }
    }

    /// Child values win wherever they differ from the built-in defaults.
    fn merge_configs(mut parent: EngineConfig, child: EngineConfig) -> EngineConfig {
        let defaults = EngineConfig::default();

        if child.rate_limit.max_requests != defaults.rate_limit.max_requests {
            parent.rate_limit.max_requests = child.rate_limit.max_requests;
        }
        if child.rate_limit.window_seconds != defaults.rate_limit.window_seconds {
            parent.rate_limit.window_seconds = child.rate_limit.window_seconds;
        }
        if child.max_concurrency != defaults.max_concurrency {
            parent.max_concurrency = child.max_concurrency;
        }
        if child.max_duration_secs != defaults.max_duration_secs {
            parent.max_duration_secs = child.max_duration_secs;
        }
        if child.max_file_size_bytes != defaults.max_file_size_bytes {
            parent.max_file_size_bytes = child.max_file_size_bytes;
        }
        if child.attempt_backoff_ms != defaults.attempt_backoff_ms {
            parent.attempt_backoff_ms = child.attempt_backoff_ms;
        }
        if child.attempt_timeout_secs != defaults.attempt_timeout_secs {
            parent.attempt_timeout_secs = child.attempt_timeout_secs;
        }
        if child.download_dir != defaults.download_dir {
            parent.download_dir = child.download_dir;
        }
        if child.cookies.instagram.is_some() {
            parent.cookies.instagram = child.cookies.instagram;
        }
        if child.cookies.tiktok.is_some() {
            parent.cookies.tiktok = child.cookies.tiktok;
        }
        if child.extractor_binary != defaults.extractor_binary {
            parent.extractor_binary = child.extractor_binary;
        }
        if child.cleanup_artifacts != defaults.cleanup_artifacts {
            parent.cleanup_artifacts = child.cleanup_artifacts;
        }
        if child.analytics != defaults.analytics {
            parent.analytics = child.analytics;
        }
        if child.messenger != defaults.messenger {
            parent.messenger = child.messenger;
        }

        parent.extends = None;
        parent
    }
}
