//! Operation log of dialog button presses.
//!
//! One JSON object per line, appended as the operator closes each alert.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use fieldalert_config::OperationLogConfig;
use fieldalert_core::{AlertError, AlertKind, ButtonChoice, Result};
use serde::{Deserialize, Serialize};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Version recorded with every entry.
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// One recorded button press.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationEntry {
    pub timestamp: DateTime<Utc>,

    /// Operator who pressed the button
    pub user_id: String,

    pub kind: AlertKind,

    /// Button id, e.g. `btnSosNoticeAlertClose`
    pub button: String,

    /// File identifier of the acknowledged alert
    pub file: String,

    pub app_version: String,
}

impl OperationEntry {
    /// Create an entry stamped with the current time.
    pub fn new(user_id: impl Into<String>, kind: AlertKind, choice: ButtonChoice, file: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            user_id: user_id.into(),
            kind,
            button: kind.button_id(choice).to_string(),
            file: file.into(),
            app_version: APP_VERSION.to_string(),
        }
    }
}

/// Appends [`OperationEntry`] lines to the configured file.
pub struct OperationLogger {
    path: Option<PathBuf>,
    file: Option<Mutex<File>>,
}

impl OperationLogger {
    /// Open the log for appending, creating parent directories.
    pub async fn new(config: &OperationLogConfig) -> Result<Self> {
        if !config.enabled {
            return Ok(Self::disabled());
        }

        if let Some(parent) = config.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AlertError::DirectoryCreation {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.path)
            .await
            .map_err(|e| AlertError::io("opening operation log", &config.path, e))?;

        Ok(Self {
            path: Some(config.path.clone()),
            file: Some(Mutex::new(file)),
        })
    }

    /// A logger that records nothing.
    pub fn disabled() -> Self {
        Self { path: None, file: None }
    }

    pub async fn record(&self, entry: &OperationEntry) -> Result<()> {
        let (Some(file), Some(path)) = (&self.file, &self.path) else {
            return Ok(());
        };

        let json = serde_json::to_string(entry).map_err(|e| AlertError::json_parse("operation entry", e))?;
        let line = format!("{json}\n");

        let mut file = file.lock().await;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| AlertError::io("writing operation log", path, e))?;
        file.flush()
            .await
            .map_err(|e| AlertError::io("flushing operation log", path, e))?;

        Ok(())
    }

    /// Log file path, when enabled.
    pub fn path(&self) -> Option<&PathBuf> {
        self.path.as_ref()
    }

    pub fn is_enabled(&self) -> bool {
        self.file.is_some()
    }
}
