//! Owner of the single dialog slot.
//!
//! Only the [`DialogCoordinator`] opens, withdraws or acknowledges a dialog.
//! Each dialog is a session: a waiter task awaits the presenter and posts the
//! operator's choice back to the main context tagged with the session id, so a
//! late answer for a withdrawn dialog is recognised and ignored.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use fieldalert_config::SortDirection;
use fieldalert_core::{
    AdminNavigation, AlertItem, AlertKind, AlertTime, ButtonChoice, DedupKey, OperatorProfile,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::engine::Command;
use crate::queue::AlertQueue;
use crate::traits::{Acknowledger, Clock, DialogRequest, Presenter, SessionId};

/// Label of the plain acknowledgement button.
pub const CLOSE_LABEL: &str = "Close";

/// Label of the navigation button.
pub const ADMIN_TOOL_LABEL: &str = "Open Admin Tool";

struct DialogSession {
    id: SessionId,
    item: AlertItem,
    waiter: JoinHandle<()>,
}

/// Outcome of an operator acknowledging the open dialog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acknowledged {
    pub item: AlertItem,
    pub choice: ButtonChoice,
    /// Present for [`ButtonChoice::OpenAdminTool`]
    pub navigation: Option<AdminNavigation>,
}

/// Render the dialog for an item.
pub fn render(session: SessionId, item: &AlertItem) -> DialogRequest {
    let payload = &item.payload;
    let (title, body) = match item.kind {
        AlertKind::Sos => (
            format!("{} {}", item.kind.title(), payload.start_time.clock()),
            format!(
                "{} / {}\n{} sent an SOS at {}.",
                payload.department_name,
                payload.team_name,
                payload.operator_name,
                payload.start_time.clock()
            ),
        ),
        AlertKind::LongStop => (
            format!("{} {}", item.kind.title(), payload.occurrence_time.clock()),
            format!(
                "{} / {}\n{} has not moved since {}.",
                payload.department_name,
                payload.team_name,
                payload.operator_name,
                payload.start_time.clock()
            ),
        ),
    };

    DialogRequest {
        session,
        kind: item.kind,
        title,
        body,
        primary_label: CLOSE_LABEL.to_string(),
        secondary_label: ADMIN_TOOL_LABEL.to_string(),
    }
}

pub struct DialogCoordinator {
    operator: OperatorProfile,
    presenter: Arc<dyn Presenter>,
    acks: Arc<dyn Acknowledger>,
    clock: Arc<dyn Clock>,
    order: SortDirection,
    session: Option<DialogSession>,
    next_session: SessionId,
    /// Items acknowledged during this login
    consumed: HashSet<DedupKey>,
    /// Newest acknowledged alert time per kind
    watermarks: HashMap<AlertKind, AlertTime>,
}

impl DialogCoordinator {
    pub fn new(
        operator: OperatorProfile,
        presenter: Arc<dyn Presenter>,
        acks: Arc<dyn Acknowledger>,
        clock: Arc<dyn Clock>,
        order: SortDirection,
    ) -> Self {
        Self {
            operator,
            presenter,
            acks,
            clock,
            order,
            session: None,
            next_session: 1,
            consumed: HashSet::new(),
            watermarks: HashMap::new(),
        }
    }

    /// Show a dialog for `item` and return its session id.
    ///
    /// Any dialog still open is withdrawn first so the slot never holds two.
    pub fn show(&mut self, item: AlertItem, tx: mpsc::UnboundedSender<Command>) -> SessionId {
        if let Some(previous) = self.close() {
            warn!(file = %previous.file(), "dialog slot was still occupied, withdrawing");
        }

        let id = self.next_session;
        self.next_session += 1;

        let request = render(id, &item);
        let presenter = Arc::clone(&self.presenter);
        let waiter = tokio::spawn(async move {
            let result = presenter.show_dialog(request).await;
            let _ = tx.send(Command::DialogResult { session: id, result });
        });

        debug!(session = id, kind = %item.kind, file = %item.file(), "dialog shown");
        self.session = Some(DialogSession { id, item, waiter });
        id
    }

    /// Withdraw the open dialog without acknowledging it.
    ///
    /// The item stays queued. Returns the withdrawn item.
    pub fn close(&mut self) -> Option<AlertItem> {
        let session = self.session.take()?;
        session.waiter.abort();
        self.presenter.dismiss_dialog(session.id);
        debug!(session = session.id, file = %session.item.file(), "dialog withdrawn");
        Some(session.item)
    }

    /// Acknowledge the open dialog with the operator's choice.
    ///
    /// Persists the acknowledgement marker and dequeues the item. Returns
    /// `None` when `session` is not the open one.
    pub fn acknowledge(
        &mut self,
        session: SessionId,
        choice: ButtonChoice,
        queue: &mut AlertQueue,
    ) -> Option<Acknowledged> {
        if !self.is_current(session) {
            debug!(session, "ignoring answer for a withdrawn dialog");
            return None;
        }
        let DialogSession { item, waiter, .. } = self.session.take()?;
        waiter.abort();

        let today = self.clock.now().date();
        if let Err(e) = self.acks.write(&self.operator.user_id, today, item.file()) {
            warn!(file = %item.file(), error = %e, "failed to persist acknowledgement");
        }

        let key = item.key();
        if queue.peek().is_some_and(|head| head.key() == key) {
            queue.poll();
        } else {
            queue.remove(&key);
        }

        let newest = match self.watermarks.get(&item.kind) {
            Some(mark) if *mark >= item.alert_time => mark.clone(),
            _ => item.alert_time.clone(),
        };
        self.watermarks.insert(item.kind, newest);
        self.consumed.insert(key);

        let navigation = match choice {
            ButtonChoice::OpenAdminTool => Some(AdminNavigation::for_item(&item, &self.operator.user_id)),
            ButtonChoice::Close => None,
        };

        Some(Acknowledged {
            item,
            choice,
            navigation,
        })
    }

    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    pub fn is_current(&self, session: SessionId) -> bool {
        self.session.as_ref().is_some_and(|open| open.id == session)
    }

    /// Key of the item on screen.
    pub fn open_key(&self) -> Option<DedupKey> {
        self.session.as_ref().map(|open| open.item.key())
    }

    pub fn open_item(&self) -> Option<&AlertItem> {
        self.session.as_ref().map(|open| &open.item)
    }

    pub fn open_session(&self) -> Option<SessionId> {
        self.session.as_ref().map(|open| open.id)
    }

    pub fn was_consumed(&self, key: &DedupKey) -> bool {
        self.consumed.contains(key)
    }

    /// Whether `item` is still worth showing.
    ///
    /// Items acknowledged this login are stale. In ascending order, so is an
    /// item older than the newest one already acknowledged for its kind.
    pub fn is_fresh(&self, item: &AlertItem) -> bool {
        if self.consumed.contains(&item.key()) {
            return false;
        }
        match (self.order, self.watermarks.get(&item.kind)) {
            (SortDirection::Ascending, Some(mark)) => item.alert_time >= *mark,
            _ => true,
        }
    }
}

impl Drop for DialogCoordinator {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            session.waiter.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{ManualClock, MemoryAckStore, MockPresenter};
    use crate::queue::tests::item;
    use chrono::NaiveDate;

    fn operator() -> OperatorProfile {
        OperatorProfile {
            user_id: "13".to_string(),
            is_manager: false,
            office_code: "100".to_string(),
            department_code: "02".to_string(),
            team_code: "03".to_string(),
        }
    }

    fn coordinator(
        order: SortDirection,
    ) -> (DialogCoordinator, Arc<MockPresenter>, Arc<MemoryAckStore>) {
        let presenter = Arc::new(MockPresenter::new());
        let acks = Arc::new(MemoryAckStore::new());
        let clock = Arc::new(ManualClock::at(2024, 1, 1, 12, 13));
        let coordinator = DialogCoordinator::new(operator(), presenter.clone(), acks.clone(), clock, order);
        (coordinator, presenter, acks)
    }

    #[test]
    fn test_render_sos() {
        let request = render(4, &item(AlertKind::Sos, "s.json", "202401010905"));
        assert_eq!(request.session, 4);
        assert_eq!(request.title, "SOS Alert 09:05");
        assert!(request.body.contains("Delivery / North"));
        assert!(request.body.contains("Sato sent an SOS at 09:05"));
        assert_eq!(request.primary_label, CLOSE_LABEL);
        assert_eq!(request.secondary_label, ADMIN_TOOL_LABEL);
    }

    #[test]
    fn test_render_long_stop() {
        let request = render(1, &item(AlertKind::LongStop, "l.json", "202401011430"));
        assert_eq!(request.kind, AlertKind::LongStop);
        assert_eq!(request.title, "Long Stop Alert 14:30");
        assert!(request.body.contains("has not moved since 14:30"));
    }

    #[tokio::test]
    async fn test_acknowledge_persists_and_dequeues() {
        let (mut coordinator, presenter, acks) = coordinator(SortDirection::Ascending);
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut queue = AlertQueue::default();
        let sos = item(AlertKind::Sos, "x", "202401011200");
        queue.offer(sos.clone());
        queue.offer(item(AlertKind::LongStop, "y", "202401011100"));

        let session = coordinator.show(sos.clone(), tx);
        assert!(coordinator.is_open());
        presenter.wait_for_dialogs(1).await;

        let acked = coordinator.acknowledge(session, ButtonChoice::Close, &mut queue).unwrap();
        assert_eq!(acked.item, sos);
        assert!(acked.navigation.is_none());
        assert!(!coordinator.is_open());
        assert!(coordinator.was_consumed(&sos.key()));

        let today = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert!(acks.exists("13", today, "x").unwrap());
        assert_eq!(queue.peek().unwrap().file(), "y");
    }

    #[tokio::test]
    async fn test_admin_tool_carries_navigation() {
        let (mut coordinator, _presenter, _acks) = coordinator(SortDirection::Ascending);
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut queue = AlertQueue::default();
        let long_stop = item(AlertKind::LongStop, "y", "202401011100");
        queue.offer(long_stop.clone());

        let session = coordinator.show(long_stop, tx);
        let acked = coordinator
            .acknowledge(session, ButtonChoice::OpenAdminTool, &mut queue)
            .unwrap();
        let navigation = acked.navigation.unwrap();
        assert_eq!(navigation.user_id, "13");
        assert_eq!(navigation.team_name, "North");
        assert_eq!(navigation.alert_time.as_str(), "202401011100");
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_close_keeps_item_queued() {
        let (mut coordinator, presenter, acks) = coordinator(SortDirection::Ascending);
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut queue = AlertQueue::default();
        let long_stop = item(AlertKind::LongStop, "y", "202401011100");
        queue.offer(long_stop.clone());

        let session = coordinator.show(long_stop.clone(), tx);
        assert_eq!(coordinator.close(), Some(long_stop));
        assert_eq!(presenter.dismissed(), vec![session]);
        assert!(coordinator.acknowledge(session, ButtonChoice::Close, &mut queue).is_none());
        assert_eq!(queue.len(), 1);
        assert_eq!(acks.len(), 0);
    }

    #[tokio::test]
    async fn test_show_replaces_open_dialog() {
        let (mut coordinator, presenter, _acks) = coordinator(SortDirection::Ascending);
        let (tx, _rx) = mpsc::unbounded_channel();
        let first = coordinator.show(item(AlertKind::LongStop, "y", "202401011100"), tx.clone());
        let second = coordinator.show(item(AlertKind::Sos, "x", "202401011200"), tx);

        assert_ne!(first, second);
        assert_eq!(presenter.dismissed(), vec![first]);
        assert_eq!(coordinator.open_session(), Some(second));
        assert_eq!(coordinator.open_item().unwrap().kind, AlertKind::Sos);
    }

    #[tokio::test]
    async fn test_freshness_watermark() {
        let (mut coordinator, _presenter, _acks) = coordinator(SortDirection::Ascending);
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut queue = AlertQueue::default();
        let consumed = item(AlertKind::LongStop, "b", "202401011200");
        queue.offer(consumed.clone());

        let session = coordinator.show(consumed.clone(), tx);
        coordinator.acknowledge(session, ButtonChoice::Close, &mut queue);

        assert!(!coordinator.is_fresh(&consumed));
        assert!(!coordinator.is_fresh(&item(AlertKind::LongStop, "a", "202401011100")));
        assert!(coordinator.is_fresh(&item(AlertKind::LongStop, "c", "202401011300")));
        assert!(coordinator.is_fresh(&item(AlertKind::Sos, "a", "202401010800")));
    }

    #[tokio::test]
    async fn test_descending_order_has_no_watermark() {
        let (mut coordinator, _presenter, _acks) = coordinator(SortDirection::Descending);
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut queue = AlertQueue::new(SortDirection::Descending);
        let consumed = item(AlertKind::LongStop, "b", "202401011200");
        queue.offer(consumed.clone());

        let session = coordinator.show(consumed, tx);
        coordinator.acknowledge(session, ButtonChoice::Close, &mut queue);
        assert!(coordinator.is_fresh(&item(AlertKind::LongStop, "a", "202401011100")));
    }
}
