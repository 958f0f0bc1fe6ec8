use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Upper bound for `max_concurrent_downloads`.
pub const MAX_CONCURRENT_LIMIT: usize = 10;

/// Retry policy parameters (optional section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries allowed after the first attempt (a job runs at most `max_retries + 1` times).
    pub max_retries: u32,
    /// Base delay in seconds for exponential backoff (1.0 = 1s, 2s, 4s, ...).
    pub base_delay_secs: f64,
    /// Maximum backoff delay in seconds.
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_secs: 1.0,
            max_delay_secs: 300,
        }
    }
}

/// Candidate filtering knobs (`[matching]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchConfig {
    /// Candidates with a known bitrate below this (kbps) are discarded.
    pub min_bitrate: u32,
    /// Accepted file extensions, best first.
    pub preferred_formats: Vec<String>,
    /// Case-insensitive substrings that mark a file as the wrong recording.
    pub exclusion_keywords: Vec<String>,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            min_bitrate: 256,
            preferred_formats: ["flac", "alac", "wav", "aiff", "mp3", "m4a", "aac", "ogg", "opus"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            exclusion_keywords: [
                "live",
                "remix",
                "cover",
                "karaoke",
                "instrumental",
                "acoustic",
                "demo",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

/// Peer network API endpoint (`[peer]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerConfig {
    /// Base URL of the peer API daemon, e.g. `http://localhost:5030`.
    pub base_url: String,
    /// Value sent as `X-API-Key`, if the daemon requires one.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Upper bound for one search request, in seconds.
    pub search_timeout_secs: u64,
    /// Interval between transfer progress polls, in milliseconds.
    pub poll_interval_ms: u64,
    /// A transfer that neither starts nor advances for this long is abandoned
    /// and retried, in seconds.
    #[serde(default = "default_stall_timeout_secs")]
    pub stall_timeout_secs: u64,
}

fn default_stall_timeout_secs() -> u64 {
    300
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5030".to_string(),
            api_key: None,
            search_timeout_secs: 15,
            poll_interval_ms: 1000,
            stall_timeout_secs: default_stall_timeout_secs(),
        }
    }
}

impl PeerConfig {
    pub fn search_timeout(&self) -> Duration {
        Duration::from_secs(self.search_timeout_secs.max(1))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(10))
    }

    pub fn stall_timeout(&self) -> Duration {
        Duration::from_secs(self.stall_timeout_secs.max(1))
    }
}

/// Global configuration loaded from `~/.config/trackfetch/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackfetchConfig {
    /// Number of downloads processed at once (1..=10).
    pub max_concurrent_downloads: usize,
    /// Optional retry policy; if missing, built-in defaults are used.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
    #[serde(default)]
    pub matching: MatchConfig,
    #[serde(default)]
    pub peer: PeerConfig,
}

impl Default for TrackfetchConfig {
    fn default() -> Self {
        Self {
            max_concurrent_downloads: 3,
            retry: None,
            matching: MatchConfig::default(),
            peer: PeerConfig::default(),
        }
    }
}

impl TrackfetchConfig {
    /// Retry section, or the built-in defaults.
    pub fn retry_or_default(&self) -> RetryConfig {
        self.retry.clone().unwrap_or_default()
    }

    /// Reject values the scheduler cannot honour.
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_CONCURRENT_LIMIT).contains(&self.max_concurrent_downloads) {
            anyhow::bail!(
                "max_concurrent_downloads must be between 1 and {}, got {}",
                MAX_CONCURRENT_LIMIT,
                self.max_concurrent_downloads
            );
        }
        if self.matching.preferred_formats.is_empty() {
            anyhow::bail!("matching.preferred_formats must list at least one format");
        }
        let retry = self.retry_or_default();
        if !(retry.base_delay_secs > 0.0) || !retry.base_delay_secs.is_finite() {
            anyhow::bail!(
                "retry.base_delay_secs must be a positive number, got {}",
                retry.base_delay_secs
            );
        }
        Ok(())
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("trackfetch")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<TrackfetchConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = TrackfetchConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: TrackfetchConfig = toml::from_str(&data)?;
    cfg.validate()?;
    Ok(cfg)
}
