//! In-memory collaborators for tests and embedding hosts.
//!
//! Every mock records what the engine asked of it and exposes knobs to
//! script the next answer.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use tokio::sync::{Notify, oneshot, watch};

use fieldalert_core::{AlertError, AlertKind, AlertRecord, ButtonChoice, Result, ScopePrefix};

use crate::traits::{
    Acknowledger, Actuator, AlertSource, Clock, DialogRequest, Presenter, SessionId, VibrationPattern,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Scripted [`AlertSource`].
#[derive(Default)]
pub struct MockAlertSource {
    records: Mutex<HashMap<AlertKind, Vec<AlertRecord>>>,
    failing: Mutex<HashSet<AlertKind>>,
    calls: Mutex<HashMap<AlertKind, usize>>,
    scopes: Mutex<Vec<ScopePrefix>>,
}

impl MockAlertSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records returned by every following fetch of `kind`.
    pub fn set_records(&self, kind: AlertKind, records: Vec<AlertRecord>) {
        lock(&self.records).insert(kind, records);
    }

    /// Make fetches of `kind` fail with `FetchFailure`.
    pub fn fail(&self, kind: AlertKind, failing: bool) {
        let mut set = lock(&self.failing);
        if failing {
            set.insert(kind);
        } else {
            set.remove(&kind);
        }
    }

    /// Number of fetches of `kind` so far, failed ones included.
    pub fn calls(&self, kind: AlertKind) -> usize {
        lock(&self.calls).get(&kind).copied().unwrap_or(0)
    }

    /// Every scope fetched, in order.
    pub fn scopes(&self) -> Vec<ScopePrefix> {
        lock(&self.scopes).clone()
    }
}

#[async_trait]
impl AlertSource for MockAlertSource {
    async fn fetch(&self, kind: AlertKind, scope: &ScopePrefix) -> Result<Vec<AlertRecord>> {
        *lock(&self.calls).entry(kind).or_insert(0) += 1;
        lock(&self.scopes).push(scope.clone());
        if lock(&self.failing).contains(&kind) {
            return Err(AlertError::fetch(kind, "store unreachable"));
        }
        Ok(lock(&self.records).get(&kind).cloned().unwrap_or_default())
    }
}

/// [`Acknowledger`] backed by a set.
#[derive(Default)]
pub struct MemoryAckStore {
    markers: Mutex<HashSet<(String, NaiveDate, String)>>,
    fail_writes: AtomicBool,
}

impl MemoryAckStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        lock(&self.markers).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make every following write fail.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl Acknowledger for MemoryAckStore {
    fn exists(&self, user_id: &str, date: NaiveDate, file: &str) -> Result<bool> {
        Ok(lock(&self.markers).contains(&(user_id.to_string(), date, file.to_string())))
    }

    fn write(&self, user_id: &str, date: NaiveDate, file: &str) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AlertError::internal("acknowledgement store is read-only"));
        }
        lock(&self.markers).insert((user_id.to_string(), date, file.to_string()));
        Ok(())
    }
}

/// Scripted [`Presenter`].
///
/// Dialogs stay open until [`MockPresenter::press`] answers them or the engine
/// dismisses them.
pub struct MockPresenter {
    shown: Mutex<Vec<DialogRequest>>,
    pending: Mutex<HashMap<SessionId, oneshot::Sender<Result<ButtonChoice>>>>,
    dismissed: Mutex<Vec<SessionId>>,
    notifications: Mutex<Vec<AlertKind>>,
    active: Mutex<HashSet<AlertKind>>,
    foreground: watch::Sender<bool>,
    deny_listener: AtomicBool,
    fail_dialogs: AtomicBool,
    shown_changed: Notify,
}

impl Default for MockPresenter {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPresenter {
    /// A foregrounded presenter.
    pub fn new() -> Self {
        let (foreground, _) = watch::channel(true);
        Self {
            shown: Mutex::new(Vec::new()),
            pending: Mutex::new(HashMap::new()),
            dismissed: Mutex::new(Vec::new()),
            notifications: Mutex::new(Vec::new()),
            active: Mutex::new(HashSet::new()),
            foreground,
            deny_listener: AtomicBool::new(false),
            fail_dialogs: AtomicBool::new(false),
            shown_changed: Notify::new(),
        }
    }

    /// Answer an open dialog. Returns false if it is not open.
    pub fn press(&self, session: SessionId, choice: ButtonChoice) -> bool {
        match lock(&self.pending).remove(&session) {
            Some(answer) => answer.send(Ok(choice)).is_ok(),
            None => false,
        }
    }

    /// Sessions still awaiting an answer, oldest first.
    pub fn open_sessions(&self) -> Vec<SessionId> {
        let mut sessions: Vec<SessionId> = lock(&self.pending).keys().copied().collect();
        sessions.sort_unstable();
        sessions
    }

    /// Every dialog requested so far.
    pub fn shown(&self) -> Vec<DialogRequest> {
        lock(&self.shown).clone()
    }

    pub fn dismissed(&self) -> Vec<SessionId> {
        lock(&self.dismissed).clone()
    }

    /// Every passive notification posted so far.
    pub fn notifications(&self) -> Vec<AlertKind> {
        lock(&self.notifications).clone()
    }

    /// Simulate the operator swiping a notification away.
    pub fn clear_notification(&self, kind: AlertKind) {
        lock(&self.active).remove(&kind);
    }

    pub fn set_foreground(&self, foreground: bool) {
        self.foreground.send_replace(foreground);
    }

    /// Refuse foreground listener registration.
    pub fn deny_listener(&self) {
        self.deny_listener.store(true, Ordering::SeqCst);
    }

    /// Make `show_dialog` fail immediately.
    pub fn fail_dialogs(&self, fail: bool) {
        self.fail_dialogs.store(fail, Ordering::SeqCst);
    }

    /// Wait until at least `count` dialogs have been requested.
    pub async fn wait_for_dialogs(&self, count: usize) {
        loop {
            let changed = self.shown_changed.notified();
            if lock(&self.shown).len() >= count {
                return;
            }
            changed.await;
        }
    }
}

#[async_trait]
impl Presenter for MockPresenter {
    async fn show_dialog(&self, request: DialogRequest) -> Result<ButtonChoice> {
        let session = request.session;
        lock(&self.shown).push(request);
        self.shown_changed.notify_waiters();

        if self.fail_dialogs.load(Ordering::SeqCst) {
            return Err(AlertError::internal("window token invalid"));
        }

        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(session, tx);
        rx.await
            .unwrap_or_else(|_| Err(AlertError::internal("dialog dismissed without an answer")))
    }

    fn dismiss_dialog(&self, session: SessionId) {
        lock(&self.pending).remove(&session);
        lock(&self.dismissed).push(session);
    }

    fn show_passive_notification(&self, kind: AlertKind) {
        lock(&self.notifications).push(kind);
        lock(&self.active).insert(kind);
    }

    fn notification_active(&self, kind: AlertKind) -> bool {
        lock(&self.active).contains(&kind)
    }

    fn is_foreground(&self) -> bool {
        *self.foreground.borrow()
    }

    fn foreground_changes(&self) -> Result<Option<watch::Receiver<bool>>> {
        if self.deny_listener.load(Ordering::SeqCst) {
            return Err(AlertError::permission("foreground listener", "registration refused"));
        }
        Ok(Some(self.foreground.subscribe()))
    }
}

/// [`Actuator`] that records every call.
#[derive(Default)]
pub struct MockActuator {
    sounds: Mutex<Vec<u32>>,
    vibrations: AtomicUsize,
    muted: AtomicBool,
}

impl MockActuator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::SeqCst);
    }

    /// Duration of every sound played, in order.
    pub fn sounds(&self) -> Vec<u32> {
        lock(&self.sounds).clone()
    }

    pub fn vibrations(&self) -> usize {
        self.vibrations.load(Ordering::SeqCst)
    }
}

impl Actuator for MockActuator {
    fn play_sound(&self, duration_secs: u32) {
        lock(&self.sounds).push(duration_secs);
    }

    fn vibrate(&self, _pattern: VibrationPattern) {
        self.vibrations.fetch_add(1, Ordering::SeqCst);
    }

    fn is_muted(&self) -> bool {
        self.muted.load(Ordering::SeqCst)
    }
}

/// Settable [`Clock`].
pub struct ManualClock {
    now: Mutex<NaiveDateTime>,
}

impl ManualClock {
    pub fn new(now: NaiveDateTime) -> Self {
        Self { now: Mutex::new(now) }
    }

    /// Clock at a local date and minute; an invalid date falls back to the epoch.
    pub fn at(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> Self {
        let now = NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|date| date.and_hms_opt(hour, minute, 0))
            .unwrap_or_default();
        Self::new(now)
    }

    pub fn set(&self, now: NaiveDateTime) {
        *lock(&self.now) = now;
    }

    pub fn advance_minutes(&self, minutes: i64) {
        *lock(&self.now) += Duration::minutes(minutes);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *lock(&self.now)
    }
}
