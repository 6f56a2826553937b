use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use url::Url;

const DESKTOP_CHROME_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Sources the engine knows how to fetch from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    TikTok,
    Instagram,
    Twitter,
    Facebook,
}

/// Per-platform extraction settings.
#[derive(Debug)]
pub struct PlatformProfile {
    /// yt-dlp style format selector
    pub format: &'static str,
    pub headers: &'static [(&'static str, &'static str)],
    /// Whether the enhanced attempt should present a cookie file
    pub cookie_access: bool,
}

static TIKTOK: PlatformProfile = PlatformProfile {
    format: "mp4/best[height<=1080]/best",
    headers: &[
        ("User-Agent", DESKTOP_CHROME_UA),
        (
            "Accept",
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
        ),
        ("Accept-Language", "en-US,en;q=0.9"),
        ("Accept-Encoding", "gzip, deflate, br"),
        ("Connection", "keep-alive"),
        ("Sec-Fetch-Dest", "document"),
        ("Sec-Fetch-Mode", "navigate"),
        ("Sec-Fetch-Site", "none"),
    ],
    cookie_access: true,
};

static INSTAGRAM: PlatformProfile = PlatformProfile {
    format: "mp4/best[height<=1080]/best",
    headers: &[
        (
            "User-Agent",
            "Mozilla/5.0 (iPhone; CPU iPhone OS 14_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/14.0 Mobile/15E148 Safari/604.1",
        ),
        (
            "Accept",
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
        ),
        ("Accept-Language", "en-US,en;q=0.5"),
        ("Accept-Encoding", "gzip, deflate"),
        ("Connection", "keep-alive"),
    ],
    cookie_access: true,
};

static TWITTER: PlatformProfile = PlatformProfile {
    format: "mp4/best[height<=720]/best",
    headers: &[("User-Agent", DESKTOP_CHROME_UA)],
    cookie_access: false,
};

static FACEBOOK: PlatformProfile = PlatformProfile {
    format: "mp4/best[height<=720]/best",
    headers: &[("User-Agent", DESKTOP_CHROME_UA)],
    cookie_access: false,
};

impl Platform {
    pub const ALL: [Platform; 4] = [
        Platform::TikTok,
        Platform::Instagram,
        Platform::Twitter,
        Platform::Facebook,
    ];

    /// Recognise the platform from the URL host. Subdomains (`www.`, `m.`,
    /// `vm.`) match their parent domain.
    pub fn from_url(url: &str) -> Option<Self> {
        let parsed = Url::parse(url.trim()).ok()?;
        let host = parsed.host_str()?.to_ascii_lowercase();

        Self::ALL.into_iter().find(|platform| {
            platform
                .domains()
                .iter()
                .any(|domain| host == *domain || host.ends_with(&format!(".{}", domain)))
        })
    }

    pub fn domains(&self) -> &'static [&'static str] {
        match self {
            Platform::TikTok => &["tiktok.com"],
            Platform::Instagram => &["instagram.com"],
            Platform::Twitter => &["twitter.com", "x.com"],
            Platform::Facebook => &["facebook.com", "fb.watch"],
        }
    }

    /// Stable tag used as the analytics bucket key.
    pub fn tag(&self) -> &'static str {
        match self {
            Platform::TikTok => "TikTok",
            Platform::Instagram => "Instagram",
            Platform::Twitter => "Twitter/X",
            Platform::Facebook => "Facebook",
        }
    }

    pub fn profile(&self) -> &'static PlatformProfile {
        match self {
            Platform::TikTok => &TIKTOK,
            Platform::Instagram => &INSTAGRAM,
            Platform::Twitter => &TWITTER,
            Platform::Facebook => &FACEBOOK,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialMode {
    /// Present the platform's cookie file when one is configured
    Enhanced,
    /// Anonymous access
    Default,
}

/// One named variant of credentials/headers used for a single attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptConfig {
    pub label: &'static str,
    pub credentials: CredentialMode,
}

impl AttemptConfig {
    pub const ENHANCED: AttemptConfig = AttemptConfig {
        label: "enhanced access",
        credentials: CredentialMode::Enhanced,
    };

    pub const FALLBACK: AttemptConfig = AttemptConfig {
        label: "fallback access",
        credentials: CredentialMode::Default,
    };
}

/// Everything the extractor needs to know for one attempt.
#[derive(Debug, Clone)]
pub struct AttemptProfile {
    pub label: &'static str,
    pub platform: Platform,
    pub cookie_file: Option<PathBuf>,
    pub format: &'static str,
    pub headers: &'static [(&'static str, &'static str)],
    pub output_dir: PathBuf,
}

/// Resolves attempt configurations into concrete profiles using the
/// deployment's cookie files and download directory.
#[derive(Debug, Clone, Default)]
pub struct ProfileTable {
    pub download_dir: PathBuf,
    pub instagram_cookies: Option<PathBuf>,
    pub tiktok_cookies: Option<PathBuf>,
}

impl ProfileTable {
    pub fn cookie_file(&self, platform: Platform) -> Option<&Path> {
        match platform {
            Platform::Instagram => self.instagram_cookies.as_deref(),
            Platform::TikTok => self.tiktok_cookies.as_deref(),
            _ => None,
        }
    }

    pub fn resolve(&self, platform: Platform, attempt: &AttemptConfig) -> AttemptProfile {
        let profile = platform.profile();

        let cookie_file = match attempt.credentials {
            CredentialMode::Enhanced if profile.cookie_access => self
                .cookie_file(platform)
                .filter(|path| path.exists())
                .map(Path::to_path_buf),
            _ => None,
        };

        if cookie_file.is_some() {
            log::info!("Using {} cookies for enhanced access", platform);
        }

        AttemptProfile {
            label: attempt.label,
            platform,
            cookie_file,
            format: profile.format,
            headers: profile.headers,
            output_dir: self.download_dir.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_hosts_and_subdomains() {
        assert_eq!(
            Platform::from_url("https://www.tiktok.com/@a/video/1"),
            Some(Platform::TikTok)
        );
        assert_eq!(
            Platform::from_url("https://vm.tiktok.com/ZM123/"),
            Some(Platform::TikTok)
        );
        assert_eq!(
            Platform::from_url("https://x.com/user/status/1"),
            Some(Platform::Twitter)
        );
        assert_eq!(
            Platform::from_url("https://fb.watch/abc/"),
            Some(Platform::Facebook)
        );
        assert_eq!(
            Platform::from_url("  https://instagram.com/reel/xyz  "),
            Some(Platform::Instagram)
        );
    }

    #[test]
    fn rejects_lookalike_and_unknown_hosts() {
        assert_eq!(Platform::from_url("https://netflix.com/title/1"), None);
        assert_eq!(Platform::from_url("https://youtube.com/watch?v=1"), None);
        assert_eq!(Platform::from_url("not a url"), None);
    }

    #[test]
    fn fallback_attempt_never_uses_cookies() {
        let dir = tempfile::tempdir().unwrap();
        let cookies = dir.path().join("instagram.txt");
        std::fs::write(&cookies, "# Netscape HTTP Cookie File").unwrap();

        let table = ProfileTable {
            download_dir: dir.path().to_path_buf(),
            instagram_cookies: Some(cookies.clone()),
            tiktok_cookies: None,
        };

        let enhanced = table.resolve(Platform::Instagram, &AttemptConfig::ENHANCED);
        assert_eq!(enhanced.cookie_file.as_deref(), Some(cookies.as_path()));

        let fallback = table.resolve(Platform::Instagram, &AttemptConfig::FALLBACK);
        assert!(fallback.cookie_file.is_none());
    }

    #[test]
    fn missing_cookie_file_is_ignored() {
        let table = ProfileTable {
            download_dir: PathBuf::from("downloads"),
            instagram_cookies: None,
            tiktok_cookies: Some(PathBuf::from("/nonexistent/tiktok.txt")),
        };

        let profile = table.resolve(Platform::TikTok, &AttemptConfig::ENHANCED);
        assert!(profile.cookie_file.is_none());
        assert_eq!(profile.format, "mp4/best[height<=1080]/best");
    }
}
