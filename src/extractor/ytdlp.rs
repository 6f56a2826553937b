use super::{ArtifactLocation, Extractor, Metadata};
use crate::error::{Error, Result};
use crate::platform::AttemptProfile;
use crate::progress::{ProgressEvent, ProgressSink};
use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;

const OUTPUT_TEMPLATE: &str = "%(id)s_%(uploader)s.%(ext)s";

lazy_static::lazy_static! {
    static ref PROGRESS_RE: Regex = Regex::new(
        r"\[download\]\s+(\d+(?:\.\d+)?)%(?:\s+of\s+~?\s*\S+)?(?:\s+at\s+(\S+/s))?"
    ).unwrap();
}

/// Drives the `yt-dlp` binary.
pub struct YtDlpExtractor {
    binary: String,
}

impl YtDlpExtractor {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn command(&self, profile: &AttemptProfile) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(["--no-playlist", "--no-warnings", "-f", profile.format]);
        if let Some(cookies) = &profile.cookie_file {
            cmd.arg("--cookies").arg(cookies);
        }
        for (name, value) in profile.headers {
            cmd.arg("--add-header").arg(format!("{}:{}", name, value));
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl Extractor for YtDlpExtractor {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn probe(&self, url: &str, profile: &AttemptProfile) -> Result<Metadata> {
        let output = self
            .command(profile)
            .args(["--dump-json", "--skip-download"])
            .arg(url)
            .output()
            .await
            .map_err(|e| Error::Extraction(format!("failed to run {}: {}", self.binary, e)))?;

        if !output.status.success() {
            return Err(Error::Extraction(failure_text(&output.stderr)));
        }
        parse_metadata(&output.stdout)
    }

    async fn fetch(
        &self,
        url: &str,
        profile: &AttemptProfile,
        progress: ProgressSink,
    ) -> Result<ArtifactLocation> {
        tokio::fs::create_dir_all(&profile.output_dir).await?;

        let mut child = self
            .command(profile)
            .args([
                "--newline",
                "--progress",
                "--retries",
                "3",
                "--fragment-retries",
                "3",
                "--skip-unavailable-fragments",
                "--print",
                "after_move:filepath",
                "-o",
            ])
            .arg(profile.output_dir.join(OUTPUT_TEMPLATE))
            .arg(url)
            .spawn()
            .map_err(|e| Error::Extraction(format!("failed to run {}: {}", self.binary, e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Internal("yt-dlp stdout not captured".into()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Internal("yt-dlp stderr not captured".into()))?;

        let sink = progress.clone();
        let reader = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            let mut filepath = None;
            while let Ok(Some(line)) = lines.next_line().await {
                match parse_progress(&line) {
                    Some(event) => sink.report(event),
                    None if !line.trim().is_empty() && !line.starts_with('[') => {
                        filepath = Some(PathBuf::from(line.trim()));
                    }
                    None => {}
                }
            }
            filepath
        });
        let errors = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stderr.read_to_end(&mut buf).await;
            buf
        });

        let status = child.wait().await?;
        let filepath = reader
            .await
            .map_err(|e| Error::Internal(format!("yt-dlp output reader failed: {}", e)))?;
        let stderr = errors.await.unwrap_or_default();

        if !status.success() {
            return Err(Error::Extraction(failure_text(&stderr)));
        }
        let path = filepath
            .ok_or_else(|| Error::Extraction("yt-dlp did not report an output file".into()))?;

        progress.report(ProgressEvent::Finished);
        Ok(ArtifactLocation { path })
    }
}

fn failure_text(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    lines
        .iter()
        .rev()
        .find(|l| l.starts_with("ERROR"))
        .or(lines.last())
        .map(|l| l.trim().to_string())
        .unwrap_or_else(|| "yt-dlp exited without output".to_string())
}

fn parse_metadata(stdout: &[u8]) -> Result<Metadata> {
    let json: Value = serde_json::from_slice(stdout)?;

    let private = json["availability"].as_str() == Some("private")
        || json["description"]
            .as_str()
            .map(|d| d.to_lowercase().contains("private"))
            .unwrap_or(false);

    Ok(Metadata {
        title: json["title"].as_str().map(str::to_string),
        uploader: json["uploader"].as_str().map(str::to_string),
        duration_secs: json["duration"].as_f64().map(|d| d.round() as u64),
        estimated_size: json["filesize"]
            .as_u64()
            .or_else(|| json["filesize_approx"].as_f64().map(|s| s as u64)),
        private,
    })
}

/// Parses a `--newline` progress line such as
/// `[download]  42.0% of ~ 10.00MiB at  1.20MiB/s ETA 00:05`.
fn parse_progress(line: &str) -> Option<ProgressEvent> {
    let caps = PROGRESS_RE.captures(line)?;
    let percent: f32 = caps.get(1)?.as_str().parse().ok()?;
    Some(ProgressEvent::Downloading {
        percent,
        rate: caps.get(2).map(|m| m.as_str().to_string()),
    })
}
