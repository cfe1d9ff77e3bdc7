//! Configuration for a mirror run.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::Ini;
use reqwest::Url;

use crate::error::{MirrorError, MirrorResult};

/// Default number of simultaneous package transfers.
pub const DEFAULT_DOWNLOAD_WORKERS: usize = 20;

/// Default HTTP request timeout (5 minutes; packages can be large).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Default interval between progress reports.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_millis(250);

/// INI section holding mirror settings.
const INI_SECTION: &str = "mirror";

/// Default local-check worker count: two per logical core.
pub fn default_check_workers() -> usize {
    num_cpus::get().saturating_mul(2).max(1)
}

/// Default location of the configuration file.
///
/// `<config_dir>/repomirror/config.ini`, or `None` on platforms without a
/// per-user configuration directory.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("repomirror").join("config.ini"))
}

/// Configuration for the mirror engine.
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    /// Base URL of the remote repository (http or https).
    pub repo_url: String,

    /// Root of the local mirror tree.
    pub base_dir: PathBuf,

    /// Maximum number of simultaneous package transfers.
    pub download_workers: usize,

    /// Number of threads auditing local files.
    pub check_workers: usize,

    /// HTTP request timeout.
    pub timeout: Duration,

    /// How often progress callbacks fire.
    pub progress_interval: Duration,

    /// Verify size and digest of every transferred package before it replaces
    /// the local copy.
    pub verify_transfers: bool,

    /// Treat metadata size/checksum mismatches as fatal instead of warnings.
    pub strict_metadata: bool,

    /// User-Agent sent with every request.
    pub user_agent: String,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            repo_url: String::new(),
            base_dir: PathBuf::from("."),
            download_workers: DEFAULT_DOWNLOAD_WORKERS,
            check_workers: default_check_workers(),
            timeout: DEFAULT_TIMEOUT,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            verify_transfers: true,
            strict_metadata: false,
            user_agent: concat!("repomirror/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl MirrorConfig {
    /// Create a configuration for mirroring `repo_url` into `base_dir`.
    pub fn new(repo_url: impl Into<String>, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo_url: repo_url.into(),
            base_dir: base_dir.into(),
            ..Default::default()
        }
    }

    /// Set the maximum number of simultaneous transfers.
    pub fn with_download_workers(mut self, workers: usize) -> Self {
        self.download_workers = workers;
        self
    }

    /// Set the number of local-check threads.
    pub fn with_check_workers(mut self, workers: usize) -> Self {
        self.check_workers = workers;
        self
    }

    /// Set the HTTP timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the progress reporting interval.
    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Enable or disable post-transfer verification.
    pub fn with_verify_transfers(mut self, verify: bool) -> Self {
        self.verify_transfers = verify;
        self
    }

    /// Enable or disable strict metadata verification.
    pub fn with_strict_metadata(mut self, strict: bool) -> Self {
        self.strict_metadata = strict;
        self
    }

    /// Check the configuration and return the normalized base URL.
    ///
    /// The returned URL always ends in `/` so relative repository paths join
    /// beneath it rather than replacing its last segment.
    pub fn validate(&self) -> MirrorResult<Url> {
        if self.repo_url.trim().is_empty() {
            return Err(MirrorError::InvalidConfig(
                "no repository URL configured".to_string(),
            ));
        }
        if self.base_dir.as_os_str().is_empty() {
            return Err(MirrorError::InvalidConfig(
                "no local base directory configured".to_string(),
            ));
        }
        if self.download_workers == 0 {
            return Err(MirrorError::InvalidConfig(
                "download workers must be at least 1".to_string(),
            ));
        }
        if self.check_workers == 0 {
            return Err(MirrorError::InvalidConfig(
                "check workers must be at least 1".to_string(),
            ));
        }
        normalize_base_url(&self.repo_url)
    }

    /// Load settings from the `[mirror]` section of an INI file.
    ///
    /// Keys that are absent keep their default value.
    pub fn from_ini_file(path: &Path) -> MirrorResult<Self> {
        let ini = Ini::load_from_file(path).map_err(|e| {
            MirrorError::InvalidConfig(format!("cannot load {}: {}", path.display(), e))
        })?;
        Self::from_ini(&ini)
    }

    /// Load settings from already-parsed INI content.
    pub fn from_ini(ini: &Ini) -> MirrorResult<Self> {
        let mut config = Self::default();
        let Some(section) = ini.section(Some(INI_SECTION)) else {
            return Ok(config);
        };

        if let Some(url) = section.get("repo_url") {
            config.repo_url = url.to_string();
        }
        if let Some(dir) = section.get("base_dir") {
            config.base_dir = PathBuf::from(dir);
        }
        if let Some(value) = section.get("download_threads") {
            config.download_workers = parse_key("download_threads", value)?;
        }
        if let Some(value) = section.get("check_threads") {
            config.check_workers = parse_key("check_threads", value)?;
        }
        if let Some(value) = section.get("timeout_secs") {
            config.timeout = Duration::from_secs(parse_key("timeout_secs", value)?);
        }
        if let Some(value) = section.get("verify_transfers") {
            config.verify_transfers = parse_bool("verify_transfers", value)?;
        }
        if let Some(value) = section.get("strict_metadata") {
            config.strict_metadata = parse_bool("strict_metadata", value)?;
        }

        Ok(config)
    }
}

/// Parse a repository URL, require http(s) and a trailing slash.
pub fn normalize_base_url(raw: &str) -> MirrorResult<Url> {
    let mut url = Url::parse(raw.trim()).map_err(|e| {
        MirrorError::InvalidConfig(format!("invalid repository URL '{}': {}", raw, e))
    })?;

    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(MirrorError::InvalidConfig(format!(
                "repository URL must be http or https, got '{}'",
                other
            )))
        }
    }

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }

    Ok(url)
}

fn parse_key<T: FromStr>(key: &str, value: &str) -> MirrorResult<T> {
    value.trim().parse().map_err(|_| {
        MirrorError::InvalidConfig(format!("invalid value '{}' for {}", value, key))
    })
}

fn parse_bool(key: &str, value: &str) -> MirrorResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(MirrorError::InvalidConfig(format!(
            "invalid value '{}' for {}",
            value, key
        ))),
    }
}
