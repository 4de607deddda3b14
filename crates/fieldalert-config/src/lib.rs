//! Configuration for the FieldAlert engine.
//!
//! All values are read-only and externally supplied; every field has a
//! default so a partial YAML file is valid.
//!
//! ```no_run
//! use fieldalert_config::AlertConfig;
//!
//! let config = AlertConfig::load("fieldalert.yaml")?;
//! println!("reminder every {} min", config.reminder_interval_mins);
//! # Ok::<(), fieldalert_core::AlertError>(())
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use fieldalert_core::{AlertError, AlertKind, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default poll timer period in seconds.
pub const DEFAULT_TICK_SECS: u64 = 60;

/// Default staggering divisor for regular operators.
pub const DEFAULT_REGULAR_DIVISOR: u32 = 10;

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Poll timer and staggering
    pub poll: PollConfig,

    /// Repeat Notifier period in minutes
    pub reminder_interval_mins: u64,

    /// `alertTime` direction inside each kind's partition of the queue
    pub order: SortDirection,

    /// LongStop operator preferences
    pub long_stop: KindSettings,

    /// SOS operator preferences
    pub sos: KindSettings,

    /// Alert store layout
    pub storage: StorageConfig,

    /// Root of the local acknowledgement markers (a leading `~` is expanded)
    pub ack_dir: PathBuf,

    /// Button-press operation log
    pub operation_log: OperationLogConfig,
}

impl Default for AlertConfig {
    fn default() -> Self {
        let base = base_dir();
        Self {
            poll: PollConfig::default(),
            reminder_interval_mins: 1,
            order: SortDirection::Ascending,
            long_stop: KindSettings::default(),
            sos: KindSettings::default(),
            storage: StorageConfig::default(),
            ack_dir: base.join("acks"),
            operation_log: OperationLogConfig::default(),
        }
    }
}

/// Poll timer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Underlying timer period in seconds
    pub tick_secs: u64,

    /// Staggering divisor for regular operators
    pub regular_divisor: u32,

    /// Staggering divisor for managers (1 = every tick)
    pub manager_divisor: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            tick_secs: DEFAULT_TICK_SECS,
            regular_divisor: DEFAULT_REGULAR_DIVISOR,
            manager_divisor: 1,
        }
    }
}

impl PollConfig {
    /// Timer period as a [`Duration`].
    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_secs)
    }

    /// Staggering divisor for an operator.
    pub fn divisor(&self, is_manager: bool) -> u32 {
        if is_manager {
            self.manager_divisor
        } else {
            self.regular_divisor
        }
    }
}

/// Queue sort direction within a kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    /// Oldest alert first
    #[default]
    Ascending,
    /// Newest alert first
    Descending,
}

/// When to vibrate on an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VibrationMode {
    /// Vibrate on every alert
    #[default]
    Always,
    /// Vibrate only when the media volume is muted
    SoundOffOnly,
    /// Never vibrate
    Never,
}

/// Per-kind operator preferences.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KindSettings {
    /// Re-alert when a dialog or notification for this kind is already up
    pub repetition: bool,

    /// How long the alert sound plays
    pub sound_duration_secs: u32,

    /// Vibration policy
    pub vibration: VibrationMode,
}

impl Default for KindSettings {
    fn default() -> Self {
        Self {
            repetition: true,
            sound_duration_secs: 5,
            vibration: VibrationMode::Always,
        }
    }
}

/// Alert store layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage directory of LongStop records
    pub long_stop_prefix: String,

    /// Storage directory of SOS records
    pub sos_prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            long_stop_prefix: "longTimeStopAlert".to_string(),
            sos_prefix: "sosNoticeAlert".to_string(),
        }
    }
}

impl StorageConfig {
    /// Storage directory for a kind.
    pub fn prefix(&self, kind: AlertKind) -> &str {
        match kind {
            AlertKind::LongStop => &self.long_stop_prefix,
            AlertKind::Sos => &self.sos_prefix,
        }
    }
}

/// Operation log configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OperationLogConfig {
    /// Whether button presses are recorded
    pub enabled: bool,

    /// JSON-lines output file
    pub path: PathBuf,
}

impl Default for OperationLogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: base_dir().join("operations.jsonl"),
        }
    }
}

impl AlertConfig {
    /// Load and validate a YAML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AlertError::ConfigNotFound {
                    path: path.to_path_buf(),
                    source: Some(e),
                }
            } else {
                AlertError::io("reading config", path, e)
            }
        })?;

        let mut config: Self = serde_yaml::from_str(&contents).map_err(|e| AlertError::ConfigInvalid {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        config.expand_paths();
        config.validate()?;

        debug!(path = %path.display(), "loaded alert config");
        Ok(config)
    }

    /// Parse and validate configuration from a YAML string.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let mut config: Self = serde_yaml::from_str(yaml).map_err(|e| AlertError::ConfigInvalid {
            path: PathBuf::from("<inline>"),
            message: e.to_string(),
        })?;
        config.expand_paths();
        config.validate()?;
        Ok(config)
    }

    /// Resolve a leading `~` in the configured paths against `$HOME`.
    fn expand_paths(&mut self) {
        self.ack_dir = expand_home(&self.ack_dir);
        self.operation_log.path = expand_home(&self.operation_log.path);
    }

    /// Check invariants serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.poll.tick_secs == 0 {
            return Err(AlertError::config_validation("poll.tick_secs must be positive"));
        }
        if self.poll.regular_divisor == 0 || self.poll.manager_divisor == 0 {
            return Err(AlertError::config_validation("poll divisors must be positive"));
        }
        if self.reminder_interval_mins == 0 {
            return Err(AlertError::config_validation("reminder_interval_mins must be positive"));
        }
        for kind in AlertKind::ALL {
            if self.storage.prefix(kind).trim().is_empty() {
                return Err(AlertError::config_validation(format!(
                    "storage prefix for {kind} must not be empty"
                )));
            }
        }
        if self.operation_log.enabled && self.operation_log.path.as_os_str().is_empty() {
            return Err(AlertError::config_validation(
                "operation_log.path is required when the log is enabled",
            ));
        }
        Ok(())
    }

    /// Preferences for one alert kind.
    pub fn kind(&self, kind: AlertKind) -> &KindSettings {
        match kind {
            AlertKind::LongStop => &self.long_stop,
            AlertKind::Sos => &self.sos,
        }
    }

    /// Repeat Notifier period.
    pub fn reminder_interval(&self) -> Duration {
        Duration::from_secs(self.reminder_interval_mins * 60)
    }

    /// Override the acknowledgement directory.
    pub fn with_ack_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.ack_dir = dir.into();
        self
    }

    /// Disable the operation log.
    pub fn without_operation_log(mut self) -> Self {
        self.operation_log.enabled = false;
        self
    }
}

fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .ok()
        .filter(|home| !home.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn base_dir() -> PathBuf {
    home_dir().join(".fieldalert")
}

fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => home_dir().join(rest),
        Err(_) => path.to_path_buf(),
    }
}
