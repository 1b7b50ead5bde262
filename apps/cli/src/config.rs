//! Client configuration.
//!
//! Configuration is stored as TOML:
//! - Linux: `~/.config/chunklift/client.toml`
//! - Windows: `%APPDATA%/chunklift/client.toml`

use std::path::{Path, PathBuf};
use std::time::Duration;

use chunklift_protocol::constants::REQUEST_TIMEOUT;
use chunklift_protocol::{DEFAULT_CHUNK_SIZE, DEFAULT_CONCURRENCY};
use chunklift_transfer::HashAlgorithm;
use chunklift_upload::{RetryPolicy, UploadOptions};
use serde::{Deserialize, Serialize};

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the remote store.
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// Simultaneous chunk uploads.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Chunk size in bytes.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,

    /// Retries per chunk before it counts as failed.
    #[serde(default)]
    pub max_retries: u32,

    #[serde(default)]
    pub hash_algorithm: HashAlgorithm,

    /// JSON file holding confirmed chunks between runs. Unset disables
    /// resuming across restarts.
    #[serde(default)]
    pub resume_state: Option<PathBuf>,

    /// Timeout for probe and merge requests.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_server_url() -> String {
    "http://127.0.0.1:3000".into()
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_chunk_size() -> u64 {
    DEFAULT_CHUNK_SIZE
}

fn default_request_timeout() -> u64 {
    REQUEST_TIMEOUT.as_secs()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            concurrency: default_concurrency(),
            chunk_size: default_chunk_size(),
            max_retries: 0,
            hash_algorithm: HashAlgorithm::default(),
            resume_state: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Config {
    /// Loads the default configuration file, creating it if not found.
    pub fn load() -> anyhow::Result<Self> {
        let path = config_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            let config = Config::default();
            config.save_to(&path)?;
            Ok(config)
        }
    }

    /// Loads an explicit configuration file, which must exist.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Library options for one upload of `file_name` (or the file's own
    /// name when `None`).
    pub fn upload_options(&self, file_name: Option<String>) -> UploadOptions {
        UploadOptions {
            concurrency: self.concurrency,
            chunk_size: self.chunk_size,
            file_name,
            retry: RetryPolicy::with_retries(self.max_retries),
        }
    }
}

/// Returns the platform-specific configuration file path.
pub fn config_path() -> anyhow::Result<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        Ok(PathBuf::from(home)
            .join(".config")
            .join("chunklift")
            .join("client.toml"))
    }

    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        Ok(PathBuf::from(appdata).join("chunklift").join("client.toml"))
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        Ok(PathBuf::from("/tmp/chunklift/client.toml"))
    }
}
