//! Settings loading and typed lookups.

use std::{
    fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::{bail, Context, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

/// Directory under the user's config dir holding `config.toml`.
pub const CONFIG_DIR: &str = "sbm";
/// Environment prefix for overrides (e.g. `SBM_SAVE_NAME`).
pub const ENV_PREFIX: &str = "SBM";
/// Runfile identifiers the backup layout is known for.
pub const SUPPORTED_RUNFILES: &[&str] = &["Stationeers", "StationeersNewTerrain"];

const DEFAULT_CONFIG: &str = r#"# Stationeers backup manager settings.
save_name = "MySave"
runfile_identifier = "Stationeers"
root_dir = "."
settle_delay_secs = 20
readiness_timeout_secs = 5400
poll_interval_ms = 2500
log_level = "info"

[retention]
keep_last = 2000
keep_weekly_days = 28
keep_monthly_days = 180
cleanup_interval_secs = 86400
"#;

/// Failure of a single settings lookup.
#[derive(Error, Debug)]
pub enum SettingsError {
    /// The key is absent from every source.
    #[error("setting '{0}' not found")]
    NotFound(String),
    /// The key exists but holds a value of another type.
    #[error("setting '{key}' has the wrong type: {message}")]
    WrongType {
        /// Requested key.
        key: String,
        /// Conversion failure reported by the source.
        message: String,
    },
    /// Any other failure from the underlying source.
    #[error("setting '{key}' could not be read: {message}")]
    Other {
        /// Requested key.
        key: String,
        /// Failure reported by the source.
        message: String,
    },
}

/// Key/value settings backed by a config file layered with environment overrides.
#[derive(Debug, Clone)]
pub struct SettingsSource {
    inner: ::config::Config,
}

impl SettingsSource {
    /// Load settings from `path` (optional) and `SBM_*` environment variables.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let inner = ::config::Config::builder()
            .add_source(::config::File::from(path).required(false))
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("failed to load settings from {}", path.display()))?;
        Ok(Self { inner })
    }

    /// Build settings from an inline TOML document.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let inner = ::config::Config::builder()
            .add_source(::config::File::from_str(contents, ::config::FileFormat::Toml))
            .build()
            .context("failed to parse inline settings")?;
        Ok(Self { inner })
    }

    /// Look up `key` as a `T`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T, SettingsError> {
        self.inner.get::<T>(key).map_err(|err| match err {
            ::config::ConfigError::NotFound(_) => SettingsError::NotFound(key.to_string()),
            ::config::ConfigError::Type { .. } | ::config::ConfigError::Message(_) => {
                SettingsError::WrongType {
                    key: key.to_string(),
                    message: err.to_string(),
                }
            }
            other => SettingsError::Other {
                key: key.to_string(),
                message: other.to_string(),
            },
        })
    }

    /// Look up `key`, falling back to `default` only when it is absent.
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> Result<T, SettingsError> {
        match self.get(key) {
            Err(SettingsError::NotFound(_)) => Ok(default),
            other => other,
        }
    }
}

/// Severity levels accepted by the log sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Verbose diagnostics.
    Debug,
    /// Normal operation.
    #[default]
    Info,
    /// Recoverable problems.
    Warn,
    /// Failures.
    Error,
}

/// Raised when a log level name is not one of the known severities.
#[derive(Error, Debug, PartialEq, Eq)]
#[error("invalid log level '{0}', expected one of debug, info, warn, error")]
pub struct InvalidLogLevel(pub String);

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`.
    pub fn as_directive(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = InvalidLogLevel;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(InvalidLogLevel(value.to_string())),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_directive())
    }
}

/// Retention settings as written in the settings file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionSettings {
    /// Number of most recent backups to keep.
    pub keep_last: usize,
    /// Days for which one backup per week is kept.
    pub keep_weekly_days: u64,
    /// Days for which one backup per month is kept.
    pub keep_monthly_days: u64,
    /// Seconds between cleanup passes.
    pub cleanup_interval_secs: u64,
}

impl Default for RetentionSettings {
    fn default() -> Self {
        Self {
            keep_last: 2000,
            keep_weekly_days: 28,
            keep_monthly_days: 180,
            cleanup_interval_secs: 24 * 60 * 60,
        }
    }
}

/// Application configuration resolved from [`SettingsSource`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Name of the world save being protected.
    pub save_name: String,
    /// Runfile identifier of the game server (selects the directory layout).
    pub runfile_identifier: String,
    /// Directory the game server's runfile folders live in.
    pub root_dir: PathBuf,
    /// Settle delay in seconds; `0` selects the manager default.
    pub settle_delay_secs: u64,
    /// Upper bound for waiting on the save directory.
    pub readiness_timeout_secs: u64,
    /// Interval between save directory existence checks.
    pub poll_interval_ms: u64,
    /// Default log level when `RUST_LOG` is unset.
    pub log_level: LogLevel,
    /// Retention policy (recorded, not yet enforced).
    pub retention: RetentionSettings,
}

impl AppConfig {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self> {
        let settings = SettingsSource::load(config_path())?;
        Self::from_settings(&settings)
    }

    /// Resolve configuration from an already loaded settings source.
    pub fn from_settings(settings: &SettingsSource) -> Result<Self> {
        let save_name: String = settings
            .get("save_name")
            .context("failed to get save name from settings")?;
        let runfile_identifier: String = settings
            .get("runfile_identifier")
            .context("failed to get runfile identifier from settings")?;

        if runfile_identifier.trim().is_empty() {
            bail!("runfile identifier is empty");
        }
        if !SUPPORTED_RUNFILES.contains(&runfile_identifier.as_str()) {
            bail!(
                "runfile identifier '{runfile_identifier}' is not one of {}",
                SUPPORTED_RUNFILES.join(", ")
            );
        }

        let level: String = settings.get_or("log_level", "info".to_string())?;
        let log_level = level.parse::<LogLevel>()?;

        Ok(Self {
            save_name,
            runfile_identifier,
            root_dir: settings.get_or("root_dir", PathBuf::from("."))?,
            settle_delay_secs: settings.get_or("settle_delay_secs", 20)?,
            readiness_timeout_secs: settings.get_or("readiness_timeout_secs", 90 * 60)?,
            poll_interval_ms: settings.get_or("poll_interval_ms", 2500)?,
            log_level,
            retention: settings.get_or("retention", RetentionSettings::default())?,
        })
    }

    /// Folder holding every save of this world.
    pub fn save_root(&self) -> PathBuf {
        self.root_dir
            .join(&self.runfile_identifier)
            .join("saves")
            .join(&self.save_name)
    }
}

/// Location of the settings file.
pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR)
        .join("config.toml")
}

/// Write the default settings file if none exists yet, returning its path.
pub fn ensure_default_config() -> Result<PathBuf> {
    let path = config_path();
    write_default_config(&path)?;
    Ok(path)
}

fn write_default_config(path: &Path) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create config directory {}", parent.display()))?;
    }
    fs::write(path, DEFAULT_CONFIG)
        .with_context(|| format!("failed to write default config {}", path.display()))
}
