use crate::Error;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_PROFILE: &str = "LIBBY_CHROME_PROFILE";
pub const ENV_DATA_DIR: &str = "LIBBY_DATA_DIR";
pub const ENV_CONCURRENCY: &str = "LIBBY_CONCURRENCY";
pub const ENV_HEADLESS: &str = "LIBBY_HEADLESS";
pub const ENV_CONFIG: &str = "LIBBY_CONFIG";

pub const DEFAULT_CONFIG_FILE: &str = "config.json";
pub const DEFAULT_BOOKS_DIR: &str = "books";
pub const DEFAULT_TIMELINE_FILE: &str = "libbytimeline-activities.json";
pub const DEFAULT_PROGRESS_FILE: &str = "downloaded-title-ids.txt";
pub const DEFAULT_EXPORT_LOG_FILE: &str = "export_log.txt";
pub const DEFAULT_MAX_CONCURRENT: usize = 5;

/// Timing and retry knobs for one export flow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportPolicy {
    pub navigation_timeout: Duration,
    pub element_timeout: Duration,
    /// Pause after each click for client-side state to settle
    pub settle_pause: Duration,
    /// Wait before the single in-place click retry
    pub recovery_wait: Duration,
    pub redirect_timeout: Duration,
    pub max_attempts: u32,
    /// Delay before retry `n` is `retry_base_delay * n`
    pub retry_base_delay: Duration,
}

impl Default for ExportPolicy {
    fn default() -> Self {
        Self {
            navigation_timeout: Duration::from_secs(30),
            element_timeout: Duration::from_secs(10),
            settle_pause: Duration::from_millis(500),
            recovery_wait: Duration::from_secs(3),
            redirect_timeout: Duration::from_secs(15),
            max_attempts: 3,
            retry_base_delay: Duration::from_secs(2),
        }
    }
}

impl ExportPolicy {
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        self.retry_base_delay * attempt
    }
}

/// Optional on-disk settings, `config.json`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileConfig {
    pub chrome_profile_path: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
    pub books_dir: Option<String>,
    pub timeline_file: Option<String>,
    pub progress_file: Option<String>,
    pub export_log_file: Option<String>,
    pub max_concurrent: Option<usize>,
    pub headless: Option<bool>,
}

impl FileConfig {
    /// Read `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, Error> {
        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content)
                .map_err(|e| Error::Config(format!("{}: {e}", path.display()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Resolved settings for a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub profile_path: PathBuf,
    pub data_dir: PathBuf,
    pub books_dir: String,
    pub timeline_file: String,
    pub progress_file: String,
    pub export_log_file: String,
    pub max_concurrent: usize,
    pub headless: bool,
    pub policy: ExportPolicy,
}

impl Config {
    pub fn new(profile_path: impl Into<PathBuf>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            profile_path: profile_path.into(),
            data_dir: data_dir.into(),
            books_dir: DEFAULT_BOOKS_DIR.to_string(),
            timeline_file: DEFAULT_TIMELINE_FILE.to_string(),
            progress_file: DEFAULT_PROGRESS_FILE.to_string(),
            export_log_file: DEFAULT_EXPORT_LOG_FILE.to_string(),
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            headless: false,
            policy: ExportPolicy::default(),
        }
    }

    /// Merge the config file with environment overrides.
    ///
    /// `root` is the fallback data directory. Fails when no profile path is
    /// configured or a value does not parse.
    pub fn resolve(
        file: FileConfig,
        env: &HashMap<String, String>,
        root: &Path,
    ) -> Result<Self, Error> {
        let var = |name: &str| env.get(name).map(|v| v.trim()).filter(|v| !v.is_empty());

        let profile_path = var(ENV_PROFILE)
            .map(PathBuf::from)
            .or(file.chrome_profile_path)
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| {
                Error::Config(format!(
                    "Chrome profile path not configured. Set {ENV_PROFILE} or chromeProfilePath in {DEFAULT_CONFIG_FILE}"
                ))
            })?;

        let data_dir = var(ENV_DATA_DIR)
            .map(PathBuf::from)
            .or(file.data_dir)
            .unwrap_or_else(|| root.to_path_buf());

        let max_concurrent = match var(ENV_CONCURRENCY) {
            Some(raw) => raw
                .parse::<usize>()
                .map_err(|e| Error::Config(format!("{ENV_CONCURRENCY}={raw}: {e}")))?,
            None => file.max_concurrent.unwrap_or(DEFAULT_MAX_CONCURRENT),
        };

        let headless = match var(ENV_HEADLESS) {
            Some(raw) => parse_flag(raw)
                .ok_or_else(|| Error::Config(format!("{ENV_HEADLESS}={raw}: expected a boolean")))?,
            None => file.headless.unwrap_or(false),
        };

        let mut config = Self::new(profile_path, data_dir);
        config.max_concurrent = max_concurrent;
        config.headless = headless;
        if let Some(books_dir) = file.books_dir {
            config.books_dir = books_dir;
        }
        if let Some(timeline_file) = file.timeline_file {
            config.timeline_file = timeline_file;
        }
        if let Some(progress_file) = file.progress_file {
            config.progress_file = progress_file;
        }
        if let Some(export_log_file) = file.export_log_file {
            config.export_log_file = export_log_file;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.max_concurrent == 0 {
            return Err(Error::Config(
                "concurrency limit must be at least 1".to_string(),
            ));
        }
        if self.policy.max_attempts == 0 {
            return Err(Error::Config("max attempts must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn books_path(&self) -> PathBuf {
        self.data_dir.join(&self.books_dir)
    }

    pub fn timeline_path(&self) -> PathBuf {
        self.data_dir.join(&self.timeline_file)
    }

    pub fn progress_path(&self) -> PathBuf {
        self.data_dir.join(&self.progress_file)
    }

    pub fn export_log_path(&self) -> PathBuf {
        self.data_dir.join(&self.export_log_file)
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
