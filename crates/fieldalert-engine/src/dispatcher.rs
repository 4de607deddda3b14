//! Dispatch decisions for the queue head.
//!
//! [`Dispatcher::decide`] is pure: it looks at the head and the current UI
//! state and returns what the main context should do. Because SOS items sort
//! ahead of every LongStop item, "open a dialog for the head" is also the
//! priority rule: an open LongStop dialog is preempted as soon as an SOS item
//! reaches the head, and an open SOS dialog is never replaced by a LongStop
//! item.

use std::sync::Arc;

use fieldalert_config::AlertConfig;
use fieldalert_core::{AlertItem, AlertKind, DedupKey};

/// UI facts the dispatcher decides on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UiState {
    pub foreground: bool,
    /// Passive notification already posted for the head's kind
    pub notification_active: bool,
    /// Item currently shown in the dialog slot
    pub open_dialog: Option<DedupKey>,
}

/// What to do about the queue head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Queue empty
    Idle,
    /// Backgrounded; `post` when no notification for the kind is up yet
    Notify {
        kind: AlertKind,
        re_alert: bool,
        post: bool,
    },
    /// The head is already on screen
    KeepDialog { kind: AlertKind, re_alert: bool },
    /// Re-alert once and show the head, closing `preempt` first
    OpenDialog {
        item: AlertItem,
        preempt: Option<DedupKey>,
    },
}

#[derive(Clone)]
pub struct Dispatcher {
    config: Arc<AlertConfig>,
}

impl Dispatcher {
    pub fn new(config: Arc<AlertConfig>) -> Self {
        Self { config }
    }

    fn repetition(&self, kind: AlertKind) -> bool {
        self.config.kind(kind).repetition
    }

    pub fn decide(&self, head: Option<&AlertItem>, ui: &UiState) -> Decision {
        let Some(head) = head else {
            return Decision::Idle;
        };

        if !ui.foreground {
            let re_alert = if ui.notification_active {
                self.repetition(head.kind)
            } else {
                true
            };
            return Decision::Notify {
                kind: head.kind,
                re_alert,
                post: !ui.notification_active,
            };
        }

        match &ui.open_dialog {
            Some(open) if *open == head.key() => Decision::KeepDialog {
                kind: head.kind,
                re_alert: self.repetition(head.kind),
            },
            open => Decision::OpenDialog {
                item: head.clone(),
                preempt: open.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::AlertQueue;
    use crate::queue::tests::item;

    fn dispatcher(repetition: bool) -> Dispatcher {
        let mut config = AlertConfig::default();
        config.sos.repetition = repetition;
        config.long_stop.repetition = repetition;
        Dispatcher::new(Arc::new(config))
    }

    fn foreground(open: Option<DedupKey>) -> UiState {
        UiState {
            foreground: true,
            notification_active: false,
            open_dialog: open,
        }
    }

    #[test]
    fn test_empty_queue_is_idle() {
        let ui = foreground(Some(item(AlertKind::Sos, "x", "202401011200").key()));
        assert_eq!(dispatcher(true).decide(None, &ui), Decision::Idle);
    }

    #[test]
    fn test_background_without_notification_always_alerts() {
        let head = item(AlertKind::LongStop, "l1", "202401011200");
        let ui = UiState::default();
        assert_eq!(
            dispatcher(false).decide(Some(&head), &ui),
            Decision::Notify {
                kind: AlertKind::LongStop,
                re_alert: true,
                post: true
            }
        );
    }

    #[test]
    fn test_background_with_notification_follows_repetition() {
        let head = item(AlertKind::Sos, "s1", "202401011200");
        let ui = UiState {
            notification_active: true,
            ..UiState::default()
        };
        assert_eq!(
            dispatcher(false).decide(Some(&head), &ui),
            Decision::Notify {
                kind: AlertKind::Sos,
                re_alert: false,
                post: false
            }
        );
        assert_eq!(
            dispatcher(true).decide(Some(&head), &ui),
            Decision::Notify {
                kind: AlertKind::Sos,
                re_alert: true,
                post: false
            }
        );
    }

    #[test]
    fn test_foreground_opens_dialog() {
        let head = item(AlertKind::Sos, "s1", "202401011200");
        assert_eq!(
            dispatcher(true).decide(Some(&head), &foreground(None)),
            Decision::OpenDialog {
                item: head.clone(),
                preempt: None
            }
        );
    }

    #[test]
    fn test_dialog_already_open_for_head() {
        let head = item(AlertKind::Sos, "s1", "202401011200");
        let ui = foreground(Some(head.key()));
        assert_eq!(
            dispatcher(false).decide(Some(&head), &ui),
            Decision::KeepDialog {
                kind: AlertKind::Sos,
                re_alert: false
            }
        );
    }

    #[test]
    fn test_open_sos_dialog_survives_long_stop_arrival() {
        let mut queue = AlertQueue::default();
        let sos = item(AlertKind::Sos, "x", "202401011200");
        queue.offer(sos.clone());
        queue.offer(item(AlertKind::LongStop, "y", "202401010800"));

        let decision = dispatcher(true).decide(queue.peek(), &foreground(Some(sos.key())));
        assert!(matches!(decision, Decision::KeepDialog { kind: AlertKind::Sos, .. }));
    }

    #[test]
    fn test_sos_preempts_open_long_stop_dialog() {
        let mut queue = AlertQueue::default();
        let long_stop = item(AlertKind::LongStop, "y", "202401010800");
        let sos = item(AlertKind::Sos, "x", "202401011200");
        queue.offer(long_stop.clone());
        queue.offer(sos.clone());

        let decision = dispatcher(true).decide(queue.peek(), &foreground(Some(long_stop.key())));
        assert_eq!(
            decision,
            Decision::OpenDialog {
                item: sos,
                preempt: Some(long_stop.key())
            }
        );
    }
}
