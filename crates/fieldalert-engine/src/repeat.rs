//! Reminder timer for an unacknowledged dialog.
//!
//! `Idle -> Armed` when a dialog opens, `Armed -> Idle` when it closes. While
//! armed, a background task posts [`Command::Reminder`] to the main context
//! every interval; the main context re-alerts only if the session is still the
//! open one and disarms otherwise.

use std::time::Duration;

use fieldalert_core::AlertKind;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

use crate::engine::Command;
use crate::traits::SessionId;

struct Armed {
    session: SessionId,
    kind: AlertKind,
    task: JoinHandle<()>,
}

/// At most one armed reminder timer.
pub struct RepeatNotifier {
    interval: Duration,
    armed: Option<Armed>,
}

impl RepeatNotifier {
    pub fn new(interval: Duration) -> Self {
        Self { interval, armed: None }
    }

    /// Start reminding for `session`.
    ///
    /// A no-op returning `false` while already armed.
    pub fn arm(&mut self, session: SessionId, kind: AlertKind, tx: mpsc::UnboundedSender<Command>) -> bool {
        if self.armed.is_some() {
            debug!(session, "reminder already armed");
            return false;
        }

        let period = self.interval;
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if tx.send(Command::Reminder { session }).is_err() {
                    break;
                }
            }
        });

        debug!(session, %kind, interval_secs = period.as_secs(), "reminder armed");
        self.armed = Some(Armed { session, kind, task });
        true
    }

    /// Stop the timer. Returns whether it was armed.
    pub fn disarm(&mut self) -> bool {
        match self.armed.take() {
            Some(armed) => {
                armed.task.abort();
                debug!(session = armed.session, kind = %armed.kind, "reminder disarmed");
                true
            }
            None => false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    pub fn armed_session(&self) -> Option<SessionId> {
        self.armed.as_ref().map(|armed| armed.session)
    }
}

impl Drop for RepeatNotifier {
    fn drop(&mut self) {
        self.disarm();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn drain(rx: &mut mpsc::UnboundedReceiver<Command>) -> Vec<SessionId> {
        tokio::task::yield_now().await;
        let mut fired = Vec::new();
        while let Ok(command) = rx.try_recv() {
            if let Command::Reminder { session } = command {
                fired.push(session);
            }
        }
        fired
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_every_interval() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut notifier = RepeatNotifier::new(Duration::from_secs(60));
        assert!(notifier.arm(1, AlertKind::Sos, tx));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(drain(&mut rx).await.is_empty());

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(drain(&mut rx).await, vec![1]);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(drain(&mut rx).await, vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_arm_keeps_one_timer() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut notifier = RepeatNotifier::new(Duration::from_secs(60));
        assert!(notifier.arm(1, AlertKind::Sos, tx.clone()));
        assert!(!notifier.arm(2, AlertKind::LongStop, tx));
        assert_eq!(notifier.armed_session(), Some(1));

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(drain(&mut rx).await, vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disarm_stops_fires() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut notifier = RepeatNotifier::new(Duration::from_secs(60));
        notifier.arm(1, AlertKind::Sos, tx.clone());
        assert!(notifier.disarm());
        assert!(!notifier.disarm());
        assert!(!notifier.is_armed());

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert!(drain(&mut rx).await.is_empty());

        assert!(notifier.arm(2, AlertKind::LongStop, tx));
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(drain(&mut rx).await, vec![2]);
    }
}
