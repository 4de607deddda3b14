//! Collaborator seams injected into the engine.
//!
//! The engine owns no I/O of its own: the alert store, the acknowledgement
//! store, the UI and the sound/vibration hardware all sit behind these
//! traits and are passed in as `Arc<dyn Trait>`.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use tokio::sync::watch;

use fieldalert_core::{AlertKind, AlertRecord, ButtonChoice, Result, ScopePrefix};

/// Identifier of one dialog session.
pub type SessionId = u64;

/// Remote alert-file store.
#[async_trait]
pub trait AlertSource: Send + Sync {
    /// List the pending records of one kind under a scope prefix.
    async fn fetch(&self, kind: AlertKind, scope: &ScopePrefix) -> Result<Vec<AlertRecord>>;
}

/// Local store of alerts already shown and closed, per operator and day.
pub trait Acknowledger: Send + Sync {
    /// Whether `file` was acknowledged by `user_id` on `date`.
    fn exists(&self, user_id: &str, date: NaiveDate, file: &str) -> Result<bool>;

    /// Record that `user_id` acknowledged `file` on `date`.
    fn write(&self, user_id: &str, date: NaiveDate, file: &str) -> Result<()>;
}

/// A rendered alert dialog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogRequest {
    pub session: SessionId,
    pub kind: AlertKind,
    pub title: String,
    pub body: String,
    /// Label of the plain acknowledgement button
    pub primary_label: String,
    /// Label of the "open admin tool" button
    pub secondary_label: String,
}

/// UI layer of the hosting application.
#[async_trait]
pub trait Presenter: Send + Sync {
    /// Show a modal dialog and resolve with the operator's choice.
    ///
    /// The future is dropped if the engine withdraws the dialog first.
    async fn show_dialog(&self, request: DialogRequest) -> Result<ButtonChoice>;

    /// Withdraw a dialog without an operator choice.
    fn dismiss_dialog(&self, session: SessionId);

    /// Create or update the background notification for a kind.
    fn show_passive_notification(&self, kind: AlertKind);

    /// Whether a background notification for `kind` is currently posted.
    fn notification_active(&self, kind: AlertKind) -> bool;

    /// Whether the application is in the foreground.
    fn is_foreground(&self) -> bool;

    /// Subscribe to foreground transitions.
    ///
    /// `Ok(None)` means the host offers no such broadcast; an error means
    /// registration was refused. Either way the engine keeps polling.
    fn foreground_changes(&self) -> Result<Option<watch::Receiver<bool>>> {
        Ok(None)
    }
}

/// Vibration patterns the actuator understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VibrationPattern {
    Short,
}

/// Audio/vibration hardware.
pub trait Actuator: Send + Sync {
    fn play_sound(&self, duration_secs: u32);

    fn vibrate(&self, pattern: VibrationPattern);

    /// Whether the media stream volume is zero.
    fn is_muted(&self) -> bool;
}

/// Source of local wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// [`Clock`] backed by the system's local time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }
}
