//! Maps raw extractor failure text to a user-facing category.
//!
//! Presentation only: nothing here influences retries or outcomes.

use serde::{Deserialize, Serialize};

/// Characters of the raw error kept in the generic message.
const EXCERPT_LEN: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    Private,
    Unavailable,
    NotFound,
    GeoBlocked,
    AuthRequired,
    Network,
    Timeout,
    UnsupportedFormat,
    CredentialIssue,
    Unknown,
}

struct Rule {
    category: FailureCategory,
    /// Any of these substrings matches
    any: &'static [&'static str],
    /// ...unless one of these is also present
    unless: &'static [&'static str],
}

/// Evaluated in order; the first match wins.
const RULES: &[Rule] = &[
    Rule {
        category: FailureCategory::Private,
        any: &["private"],
        unless: &["cookie"],
    },
    Rule {
        category: FailureCategory::Unavailable,
        any: &["unavailable"],
        unless: &[],
    },
    Rule {
        category: FailureCategory::NotFound,
        any: &["not found", "404"],
        unless: &[],
    },
    Rule {
        category: FailureCategory::GeoBlocked,
        any: &["geo", "region"],
        unless: &[],
    },
    Rule {
        category: FailureCategory::AuthRequired,
        any: &["login", "authentication"],
        unless: &[],
    },
    Rule {
        category: FailureCategory::Network,
        any: &["network", "connection"],
        unless: &[],
    },
    Rule {
        category: FailureCategory::Timeout,
        any: &["timeout", "timed out"],
        unless: &[],
    },
    Rule {
        category: FailureCategory::UnsupportedFormat,
        any: &["format"],
        unless: &[],
    },
    Rule {
        category: FailureCategory::CredentialIssue,
        any: &["cookie"],
        unless: &[],
    },
];

pub fn classify(raw: &str) -> FailureCategory {
    let normalized = raw.to_lowercase();
    RULES
        .iter()
        .find(|rule| {
            rule.any.iter().any(|needle| normalized.contains(needle))
                && !rule.unless.iter().any(|needle| normalized.contains(needle))
        })
        .map(|rule| rule.category)
        .unwrap_or(FailureCategory::Unknown)
}

impl FailureCategory {
    /// Fixed text for every category except `Unknown`.
    pub fn message(&self) -> Option<&'static str> {
        let text = match self {
            FailureCategory::Private => {
                "This appears to be a private video and could not be accessed."
            }
            FailureCategory::Unavailable => {
                "This video is unavailable. It might have been deleted or restricted."
            }
            FailureCategory::NotFound => {
                "Video not found. The link might be broken or the video was deleted."
            }
            FailureCategory::GeoBlocked => "This video is blocked in this region.",
            FailureCategory::AuthRequired => "This video requires authentication.",
            FailureCategory::Network => "Network error. Please try again in a moment.",
            FailureCategory::Timeout => {
                "Download timed out. The video might be too large or the server is slow."
            }
            FailureCategory::UnsupportedFormat => {
                "Video format not supported or no suitable format found."
            }
            FailureCategory::CredentialIssue => "Authentication issue with the stored credentials.",
            FailureCategory::Unknown => return None,
        };
        Some(text)
    }
}

/// One-line message for the requester derived from the last raw failure.
pub fn user_message(raw: &str) -> String {
    match classify(raw).message() {
        Some(text) => text.to_string(),
        None => {
            let excerpt: String = raw.chars().take(EXCERPT_LEN).collect();
            format!("Download failed: {}...", excerpt)
        }
    }
}

/// Message for a finished transfer the messenger could not hand over. The raw
/// text comes from our own outbound transport and is never quoted.
pub fn delivery_message(raw: &str) -> String {
    match classify(raw).message() {
        Some(text) => format!("Failed to send video: {}", text),
        None => "Failed to send video. Please try again later.".to_string(),
    }
}
