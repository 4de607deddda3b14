//! Shared type definitions used across FieldAlert crates.
//!
//! Records arrive from the alert store as loosely typed [`AlertRecord`]s. They
//! are validated once into [`AlertItem`]s, the unit the engine queues,
//! dispatches and acknowledges.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::{AlertError, Result};

/// `chrono` format of an alert timestamp (`yyyyMMddHHmm`).
pub const ALERT_TIME_FORMAT: &str = "%Y%m%d%H%M";

/// `chrono` format of the per-day scope used by acknowledgements and prefixes.
pub const DATE_KEY_FORMAT: &str = "%Y%m%d";

/// The two kinds of safety alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// Emergency/distress notification
    Sos,
    /// Device stationary beyond the configured duration
    LongStop,
}

impl AlertKind {
    /// Both kinds, highest priority first.
    pub const ALL: [AlertKind; 2] = [AlertKind::Sos, AlertKind::LongStop];

    /// Priority rank; lower ranks take the dialog slot first.
    pub fn rank(&self) -> u8 {
        match self {
            AlertKind::Sos => 0,
            AlertKind::LongStop => 1,
        }
    }

    /// Human-readable name used in dialog titles.
    pub fn title(&self) -> &'static str {
        match self {
            AlertKind::Sos => "SOS Alert",
            AlertKind::LongStop => "Long Stop Alert",
        }
    }

    /// Operation-log identifier of a dialog button for this kind.
    pub fn button_id(&self, choice: ButtonChoice) -> &'static str {
        match (self, choice) {
            (AlertKind::Sos, ButtonChoice::Close) => "btnSosNoticeAlertClose",
            (AlertKind::Sos, ButtonChoice::OpenAdminTool) => "btnSosNoticeAlertGoAdminTool",
            (AlertKind::LongStop, ButtonChoice::Close) => "btnLongTimeStopAlertClose",
            (AlertKind::LongStop, ButtonChoice::OpenAdminTool) => "btnLongTimeStopAlertGoAdminTool",
        }
    }
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertKind::Sos => write!(f, "sos"),
            AlertKind::LongStop => write!(f, "long_stop"),
        }
    }
}

/// Button pressed by the operator on an alert dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonChoice {
    /// Plain acknowledgement
    Close,
    /// Acknowledgement plus navigation to the admin tool
    OpenAdminTool,
}

/// Fixed-width sortable alert timestamp (`yyyyMMddHHmm`).
///
/// Lexicographic order of the inner string equals chronological order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct AlertTime(String);

impl AlertTime {
    /// Parse a store timestamp.
    ///
    /// Accepts `yyyyMMddHHmm`; a trailing seconds field (`yyyyMMddHHmmss`) is
    /// truncated to the minute. Returns `None` for anything else.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if !(raw.len() == 12 || raw.len() == 14) || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let minute = &raw[..12];
        NaiveDateTime::parse_from_str(minute, ALERT_TIME_FORMAT).ok()?;
        Some(Self(minute.to_string()))
    }

    /// Format a local date-time as an alert timestamp.
    pub fn from_datetime(datetime: NaiveDateTime) -> Self {
        Self(datetime.format(ALERT_TIME_FORMAT).to_string())
    }

    /// The raw `yyyyMMddHHmm` string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `HH:mm` portion for display.
    pub fn clock(&self) -> String {
        format!("{}:{}", &self.0[8..10], &self.0[10..12])
    }
}

impl std::fmt::Display for AlertTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Format a date as the `yyyyMMdd` key used for acknowledgement scoping.
pub fn date_key(date: NaiveDate) -> String {
    date.format(DATE_KEY_FORMAT).to_string()
}

/// Raw alert record as listed by the alert store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AlertRecord {
    /// Stable file identifier (dedup and acknowledgement key)
    pub file_identifier: String,
    /// When the condition was detected (`yyyyMMddHHmm`)
    pub occurrence_time: String,
    /// When the condition started (`yyyyMMddHHmm`)
    pub start_time: String,
    /// Name of the operator the alert concerns
    pub operator_name: String,
    pub department_code: String,
    pub department_name: String,
    pub team_code: String,
    pub team_name: String,
}

/// Validated kind-specific payload of an [`AlertItem`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertPayload {
    pub file_identifier: String,
    pub occurrence_time: AlertTime,
    pub start_time: AlertTime,
    pub operator_name: String,
    pub department_code: String,
    pub department_name: String,
    pub team_code: String,
    pub team_name: String,
}

/// Queue dedup key. File identifiers are namespaced per kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DedupKey {
    pub kind: AlertKind,
    pub file: String,
}

impl std::fmt::Display for DedupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.file)
    }
}

/// The unit of the alert queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertItem {
    /// Event occurrence time used for ordering
    pub alert_time: AlertTime,
    pub kind: AlertKind,
    pub payload: AlertPayload,
}

impl AlertItem {
    /// Validate a store record into a queue item.
    ///
    /// LongStop alerts are ordered by occurrence time, SOS alerts by the time
    /// the distress call started.
    pub fn from_record(kind: AlertKind, record: AlertRecord) -> Result<Self> {
        let file = record.file_identifier;
        validate_file_identifier(&file)?;

        let occurrence_time = AlertTime::parse(&record.occurrence_time).ok_or_else(|| {
            AlertError::malformed(&file, format!("bad occurrence time {:?}", record.occurrence_time))
        })?;
        let start_time = AlertTime::parse(&record.start_time).ok_or_else(|| {
            AlertError::malformed(&file, format!("bad start time {:?}", record.start_time))
        })?;

        let alert_time = match kind {
            AlertKind::LongStop => occurrence_time.clone(),
            AlertKind::Sos => start_time.clone(),
        };

        Ok(Self {
            alert_time,
            kind,
            payload: AlertPayload {
                file_identifier: file,
                occurrence_time,
                start_time,
                operator_name: record.operator_name,
                department_code: record.department_code,
                department_name: record.department_name,
                team_code: record.team_code,
                team_name: record.team_name,
            },
        })
    }

    /// File identifier of the underlying record.
    pub fn file(&self) -> &str {
        &self.payload.file_identifier
    }

    /// Queue dedup key.
    pub fn key(&self) -> DedupKey {
        DedupKey {
            kind: self.kind,
            file: self.payload.file_identifier.clone(),
        }
    }
}

/// Reject identifiers that cannot safely name a local marker file.
pub fn validate_file_identifier(file: &str) -> Result<()> {
    if file.trim().is_empty() {
        return Err(AlertError::malformed(file, "empty file identifier"));
    }
    if file == "." || file == ".." || file.contains(['/', '\\']) {
        return Err(AlertError::malformed(file, "file identifier contains a path component"));
    }
    Ok(())
}

/// The logged-in operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorProfile {
    pub user_id: String,
    /// Managers poll every tick and see their whole office
    pub is_manager: bool,
    pub office_code: String,
    pub department_code: String,
    pub team_code: String,
}

/// Store listing prefix for one kind and operator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopePrefix {
    /// Kind storage directory (e.g. `sosNoticeAlert`)
    pub dir: String,
    /// Required file-name prefix inside `dir`
    pub file_prefix: String,
}

impl ScopePrefix {
    /// Derive the prefix for an operator on a given day.
    ///
    /// Managers see every alert of their office; regular operators see only
    /// their own department and team for today.
    pub fn for_operator(dir: impl Into<String>, operator: &OperatorProfile, today: NaiveDate) -> Self {
        let mut file_prefix = format!("{}_", operator.office_code);
        if !operator.is_manager {
            file_prefix.push_str(&format!(
                "{}_{}_{}",
                operator.department_code,
                operator.team_code,
                date_key(today)
            ));
        }
        Self {
            dir: dir.into(),
            file_prefix,
        }
    }
}

impl std::fmt::Display for ScopePrefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.dir, self.file_prefix)
    }
}

/// Navigation payload emitted when the operator chooses "open admin tool".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdminNavigation {
    pub kind: AlertKind,
    pub department_code: String,
    pub department_name: String,
    pub team_code: String,
    pub team_name: String,
    /// Operator who pressed the button
    pub user_id: String,
    /// Original alert timestamp
    pub alert_time: AlertTime,
}

impl AdminNavigation {
    /// Build the navigation payload for an acknowledged item.
    pub fn for_item(item: &AlertItem, user_id: impl Into<String>) -> Self {
        Self {
            kind: item.kind,
            department_code: item.payload.department_code.clone(),
            department_name: item.payload.department_name.clone(),
            team_code: item.payload.team_code.clone(),
            team_name: item.payload.team_name.clone(),
            user_id: user_id.into(),
            alert_time: item.alert_time.clone(),
        }
    }
}
