//! The alert engine and its main context.
//!
//! A single task (the main context) owns the [`AlertQueue`], the
//! [`DialogCoordinator`] and the [`RepeatNotifier`]. Everything else talks to
//! it through [`Command`]s: pollers post merges, dialog waiters post operator
//! choices, the reminder timer posts reminders. Commands are handled one at a
//! time, so no reader ever sees a half-merged queue and the dialog slot has a
//! single writer.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use fieldalert_config::AlertConfig;
//! use fieldalert_core::OperatorProfile;
//! use fieldalert_engine::{AlertEngine, Collaborators, DirectoryAlertSource, FileAckStore};
//! use fieldalert_engine::mock::{MockActuator, MockPresenter};
//!
//! # async fn example() -> fieldalert_core::Result<()> {
//! let config = AlertConfig::default();
//! let operator = OperatorProfile {
//!     user_id: "13".into(),
//!     is_manager: false,
//!     office_code: "100".into(),
//!     department_code: "02".into(),
//!     team_code: "03".into(),
//! };
//! let collaborators = Collaborators::new(
//!     Arc::new(DirectoryAlertSource::new("/srv/alerts")),
//!     Arc::new(FileAckStore::new(&config.ack_dir)),
//!     Arc::new(MockPresenter::new()),
//!     Arc::new(MockActuator::new()),
//! );
//!
//! let mut engine = AlertEngine::start(operator, config, collaborators)?;
//! let mut events = engine.subscribe();
//! while let Ok(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! engine.shutdown().await?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use fieldalert_config::AlertConfig;
use fieldalert_core::{
    AdminNavigation, AlertError, AlertItem, AlertKind, ButtonChoice, OperatorProfile, Result, log_alert_event,
};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::alerter::Alerter;
use crate::coordinator::DialogCoordinator;
use crate::dispatcher::{Decision, Dispatcher, UiState};
use crate::oplog::{OperationEntry, OperationLogger};
use crate::poller::{Poller, PollerHandle};
use crate::queue::{AlertQueue, MergeOutcome};
use crate::repeat::RepeatNotifier;
use crate::traits::{Acknowledger, Actuator, AlertSource, Clock, Presenter, SessionId, SystemClock};

/// Capacity of the event broadcast.
const EVENT_CAPACITY: usize = 64;

/// Message to the main context.
#[derive(Debug)]
pub enum Command {
    /// A poller's filtered fetch of one kind
    Merge { kind: AlertKind, items: Vec<AlertItem> },
    /// The presenter resolved a dialog
    DialogResult {
        session: SessionId,
        result: Result<ButtonChoice>,
    },
    /// The reminder timer fired
    Reminder { session: SessionId },
    /// The application returned to the foreground
    Foregrounded { kind: AlertKind },
    Snapshot(oneshot::Sender<EngineSnapshot>),
    Shutdown(oneshot::Sender<()>),
}

/// Engine events for the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AlertEvent {
    QueueChanged { len: usize },
    DialogShown { kind: AlertKind, file: String },
    DialogClosed {
        kind: AlertKind,
        file: String,
        choice: ButtonChoice,
    },
    /// Withdrawn without acknowledgement; the item stays queued
    DialogPreempted { kind: AlertKind, file: String },
    NotificationRaised { kind: AlertKind },
    /// The operator asked to open the admin tool for an alert
    OpenAdminTool(AdminNavigation),
}

/// Point-in-time view of the main context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EngineSnapshot {
    /// Queue contents in dispatch order
    pub items: Vec<AlertItem>,
    pub open_dialog: Option<AlertItem>,
    pub reminder_armed: bool,
}

/// Injected collaborators.
#[derive(Clone)]
pub struct Collaborators {
    pub source: Arc<dyn AlertSource>,
    pub acks: Arc<dyn Acknowledger>,
    pub presenter: Arc<dyn Presenter>,
    pub actuator: Arc<dyn Actuator>,
    pub clock: Arc<dyn Clock>,
    pub oplog: Arc<OperationLogger>,
}

impl Collaborators {
    /// System clock, operation log disabled.
    pub fn new(
        source: Arc<dyn AlertSource>,
        acks: Arc<dyn Acknowledger>,
        presenter: Arc<dyn Presenter>,
        actuator: Arc<dyn Actuator>,
    ) -> Self {
        Self {
            source,
            acks,
            presenter,
            actuator,
            clock: Arc::new(SystemClock),
            oplog: Arc::new(OperationLogger::disabled()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_oplog(mut self, oplog: OperationLogger) -> Self {
        self.oplog = Arc::new(oplog);
        self
    }
}

/// Builder for [`AlertEngine`].
pub struct EngineBuilder {
    operator: OperatorProfile,
    config: AlertConfig,
    collaborators: Collaborators,
    autostart: bool,
}

impl EngineBuilder {
    pub fn new(operator: OperatorProfile, config: AlertConfig, collaborators: Collaborators) -> Self {
        Self {
            operator,
            config,
            collaborators,
            autostart: true,
        }
    }

    /// Whether both pollers start with the engine (default true).
    pub fn autostart(mut self, autostart: bool) -> Self {
        self.autostart = autostart;
        self
    }

    /// Spawn the main context and, with autostart, both pollers.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn start(self) -> Result<AlertEngine> {
        self.config.validate()?;
        let config = Arc::new(self.config);
        let collaborators = self.collaborators;

        let (tx, rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let pollers = AlertKind::ALL
            .into_iter()
            .map(|kind| {
                let poller = Poller::new(
                    kind,
                    self.operator.clone(),
                    config.storage.prefix(kind),
                    config.poll.divisor(self.operator.is_manager),
                    Arc::clone(&collaborators.source),
                    Arc::clone(&collaborators.acks),
                    Arc::clone(&collaborators.clock),
                    tx.clone(),
                );
                (kind, poller)
            })
            .collect();

        let context = MainContext {
            operator: self.operator.clone(),
            queue: AlertQueue::new(config.order),
            dispatcher: Dispatcher::new(Arc::clone(&config)),
            coordinator: DialogCoordinator::new(
                self.operator.clone(),
                Arc::clone(&collaborators.presenter),
                Arc::clone(&collaborators.acks),
                Arc::clone(&collaborators.clock),
                config.order,
            ),
            repeat: RepeatNotifier::new(config.reminder_interval()),
            alerter: Alerter::new(Arc::clone(&collaborators.actuator), Arc::clone(&config)),
            presenter: Arc::clone(&collaborators.presenter),
            oplog: Arc::clone(&collaborators.oplog),
            events: events.clone(),
            tx: tx.clone(),
        };
        let main = tokio::spawn(context.run(rx));

        info!(
            user_id = %self.operator.user_id,
            manager = self.operator.is_manager,
            "alert engine started"
        );

        let mut engine = AlertEngine {
            tx,
            events,
            pollers,
            handles: HashMap::new(),
            presenter: collaborators.presenter,
            period: config.poll.tick(),
            main: Some(main),
        };
        if self.autostart {
            for kind in AlertKind::ALL {
                engine.start_polling(kind);
            }
        }
        Ok(engine)
    }
}

/// Handle to a running engine. Created on login, shut down on logout.
pub struct AlertEngine {
    tx: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<AlertEvent>,
    pollers: HashMap<AlertKind, Poller>,
    handles: HashMap<AlertKind, PollerHandle>,
    presenter: Arc<dyn Presenter>,
    period: Duration,
    main: Option<JoinHandle<()>>,
}

impl AlertEngine {
    /// Start the engine with both pollers running.
    pub fn start(operator: OperatorProfile, config: AlertConfig, collaborators: Collaborators) -> Result<Self> {
        EngineBuilder::new(operator, config, collaborators).start()
    }

    /// Start polling one kind. Returns false if it is already polling.
    pub fn start_polling(&mut self, kind: AlertKind) -> bool {
        if self.main.is_none() || self.handles.contains_key(&kind) {
            return false;
        }
        let Some(poller) = self.pollers.get(&kind) else {
            return false;
        };
        let handle = poller.clone().spawn(self.period, self.presenter.as_ref());
        self.handles.insert(kind, handle);
        true
    }

    /// Stop polling one kind and unregister its foreground listener.
    ///
    /// Already-queued items of the kind stay queued.
    pub fn stop_polling(&mut self, kind: AlertKind) -> bool {
        match self.handles.remove(&kind) {
            Some(handle) => {
                handle.stop();
                info!(%kind, "polling stopped");
                true
            }
            None => false,
        }
    }

    pub fn is_polling(&self, kind: AlertKind) -> bool {
        self.handles.contains_key(&kind)
    }

    /// Run one poll cycle of `kind` now, ignoring the stagger.
    pub async fn poll_now(&self, kind: AlertKind) -> Result<usize> {
        let poller = self
            .pollers
            .get(&kind)
            .ok_or_else(|| AlertError::internal(format!("no poller for {kind}")))?;
        poller.run_cycle().await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AlertEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> Result<EngineSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Snapshot(reply))
            .map_err(|_| AlertError::EngineStopped)?;
        rx.await.map_err(|_| AlertError::EngineStopped)
    }

    /// Tear the engine down: pollers, listeners, reminder and open dialog.
    ///
    /// Nothing is acknowledged. Later calls return `EngineStopped`.
    pub async fn shutdown(&mut self) -> Result<()> {
        let Some(main) = self.main.take() else {
            return Err(AlertError::EngineStopped);
        };
        for (_, handle) in self.handles.drain() {
            handle.stop();
        }

        let (reply, rx) = oneshot::channel();
        if self.tx.send(Command::Shutdown(reply)).is_ok() {
            let _ = rx.await;
        }
        if let Err(e) = main.await
            && !e.is_cancelled()
        {
            return Err(AlertError::internal(format!("main context failed: {e}")));
        }

        info!("alert engine stopped");
        Ok(())
    }
}

impl Drop for AlertEngine {
    fn drop(&mut self) {
        self.handles.clear();
        if let Some(main) = self.main.take() {
            main.abort();
        }
    }
}

struct MainContext {
    operator: OperatorProfile,
    queue: AlertQueue,
    dispatcher: Dispatcher,
    coordinator: DialogCoordinator,
    repeat: RepeatNotifier,
    alerter: Alerter,
    presenter: Arc<dyn Presenter>,
    oplog: Arc<OperationLogger>,
    events: broadcast::Sender<AlertEvent>,
    tx: mpsc::UnboundedSender<Command>,
}

impl MainContext {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = rx.recv().await {
            match command {
                Command::Merge { kind, items } => self.on_merge(kind, items),
                Command::DialogResult { session, result } => self.on_dialog_result(session, result).await,
                Command::Reminder { session } => self.on_reminder(session),
                Command::Foregrounded { kind } => self.on_foregrounded(kind),
                Command::Snapshot(reply) => {
                    let _ = reply.send(self.snapshot());
                }
                Command::Shutdown(reply) => {
                    self.teardown();
                    let _ = reply.send(());
                    return;
                }
            }
        }
        self.teardown();
    }

    fn emit(&self, event: AlertEvent) {
        let _ = self.events.send(event);
    }

    fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            items: self.queue.iter().cloned().collect(),
            open_dialog: self.coordinator.open_item().cloned(),
            reminder_armed: self.repeat.is_armed(),
        }
    }

    fn on_merge(&mut self, kind: AlertKind, items: Vec<AlertItem>) {
        let items: Vec<AlertItem> = items
            .into_iter()
            .filter(|item| !self.coordinator.was_consumed(&item.key()))
            .collect();

        match self.queue.merge_kind(kind, items) {
            MergeOutcome::Unchanged { queued, fetched } => {
                debug!(%kind, queued, fetched, "no new alerts");
                if self.presenter.is_foreground() && !self.head_on_screen() {
                    debug!(%kind, "head not on screen, dispatching again");
                    self.dispatch();
                }
            }
            MergeOutcome::Replaced { previous, current } => {
                info!(%kind, previous, current, queued = self.queue.len(), "alerts merged");
                self.emit(AlertEvent::QueueChanged { len: self.queue.len() });
                self.dispatch();
            }
        }
    }

    fn dispatch(&mut self) {
        let head = self.queue.peek();
        let ui = UiState {
            foreground: self.presenter.is_foreground(),
            notification_active: head.is_some_and(|head| self.presenter.notification_active(head.kind)),
            open_dialog: self.coordinator.open_key(),
        };

        match self.dispatcher.decide(head, &ui) {
            Decision::Idle => {}
            Decision::Notify { kind, re_alert, post } => {
                if re_alert {
                    self.alerter.alert(kind);
                }
                if post {
                    self.presenter.show_passive_notification(kind);
                    log_alert_event!(kind, "notification_raised");
                    self.emit(AlertEvent::NotificationRaised { kind });
                }
            }
            Decision::KeepDialog { kind, re_alert } => {
                if re_alert {
                    self.alerter.alert(kind);
                }
            }
            Decision::OpenDialog { item, preempt } => {
                if preempt.is_some() {
                    self.preempt_dialog();
                }
                self.alerter.alert(item.kind);
                self.open_dialog(item);
            }
        }
    }

    fn open_dialog(&mut self, item: AlertItem) {
        let kind = item.kind;
        let file = item.file().to_string();
        let session = self.coordinator.show(item, self.tx.clone());
        self.repeat.disarm();
        self.repeat.arm(session, kind, self.tx.clone());

        log_alert_event!(kind, "dialog_shown", session, file = %file);
        self.emit(AlertEvent::DialogShown { kind, file });
    }

    fn preempt_dialog(&mut self) {
        self.repeat.disarm();
        if let Some(item) = self.coordinator.close() {
            log_alert_event!(item.kind, "dialog_preempted", file = %item.file());
            self.emit(AlertEvent::DialogPreempted {
                kind: item.kind,
                file: item.file().to_string(),
            });
        }
    }

    async fn on_dialog_result(&mut self, session: SessionId, result: Result<ButtonChoice>) {
        if !self.coordinator.is_current(session) {
            debug!(session, "late answer for a withdrawn dialog");
            return;
        }

        let choice = match result {
            Ok(choice) => choice,
            Err(e) => {
                warn!(session, error = %e, "dialog failed, item stays queued");
                self.repeat.disarm();
                self.coordinator.close();
                return;
            }
        };

        self.repeat.disarm();
        let Some(acked) = self.coordinator.acknowledge(session, choice, &mut self.queue) else {
            return;
        };
        let kind = acked.item.kind;
        let file = acked.item.file().to_string();

        let entry = OperationEntry::new(&self.operator.user_id, kind, choice, &file);
        if let Err(e) = self.oplog.record(&entry).await {
            warn!(%kind, file = %file, error = %e, "failed to record operation");
        }

        log_alert_event!(kind, "acknowledged", session, file = %file, button = entry.button.as_str());
        self.emit(AlertEvent::DialogClosed {
            kind,
            file,
            choice,
        });
        if let Some(navigation) = acked.navigation {
            self.emit(AlertEvent::OpenAdminTool(navigation));
        }

        self.drop_stale_heads();
        self.emit(AlertEvent::QueueChanged { len: self.queue.len() });
        self.dispatch();
    }

    fn drop_stale_heads(&mut self) {
        while let Some(head) = self.queue.peek() {
            if self.coordinator.is_fresh(head) {
                break;
            }
            if let Some(stale) = self.queue.poll() {
                debug!(kind = %stale.kind, file = %stale.file(), "dropping stale head");
            }
        }
    }

    fn on_reminder(&mut self, session: SessionId) {
        if self.coordinator.is_current(session) {
            if let Some(kind) = self.coordinator.open_item().map(|item| item.kind) {
                debug!(session, %kind, "reminder");
                self.alerter.alert(kind);
            }
        } else if self.repeat.armed_session() == Some(session) {
            self.repeat.disarm();
        }
    }

    /// Whether the queue head is the item in the dialog slot.
    ///
    /// An empty queue counts as on screen: there is nothing to show.
    fn head_on_screen(&self) -> bool {
        match self.queue.peek() {
            Some(head) => self.coordinator.open_key() == Some(head.key()),
            None => true,
        }
    }

    // Both pollers report the same return; the second finds the head on screen.
    fn on_foregrounded(&mut self, kind: AlertKind) {
        if self.head_on_screen() {
            return;
        }
        debug!(%kind, "foregrounded with pending alert");
        self.dispatch();
    }

    fn teardown(&mut self) {
        self.repeat.disarm();
        self.coordinator.close();
        self.queue.clear();
        debug!("main context torn down");
    }
}
