//! Per-kind poller.
//!
//! Every tick the poller checks its [`Stagger`] bucket; when due it lists the
//! operator's scope in the alert store, validates the records, drops the ones
//! already acknowledged today and hands the result to the main context as a
//! [`Command::Merge`]. Fetch and filter run on the poller's own task; only the
//! merge touches the queue.

use std::sync::Arc;
use std::time::Duration;

use chrono::Timelike;
use fieldalert_core::{AlertError, AlertItem, AlertKind, OperatorProfile, Result, ScopePrefix};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::engine::Command;
use crate::traits::{Acknowledger, AlertSource, Clock, Presenter};

/// Minute bucket of one operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stagger {
    interval: u32,
    exec_timer: u32,
}

impl Stagger {
    /// Bucket `user_id` into one of `divisor` minutes.
    ///
    /// Numeric ids are used directly; anything else is hashed.
    pub fn for_operator(user_id: &str, divisor: u32) -> Self {
        let interval = divisor.max(1);
        let exec_timer = (operator_hash(user_id) % u64::from(interval)) as u32;
        Self { interval, exec_timer }
    }

    pub fn interval(&self) -> u32 {
        self.interval
    }

    pub fn exec_timer(&self) -> u32 {
        self.exec_timer
    }

    /// Whether a tick at `minute` performs a fetch.
    pub fn fires_at(&self, minute: u32) -> bool {
        minute % self.interval == self.exec_timer
    }
}

fn operator_hash(user_id: &str) -> u64 {
    let trimmed = user_id.trim();
    trimmed.parse::<u64>().unwrap_or_else(|_| {
        // FNV-1a
        trimmed.bytes().fold(0xcbf2_9ce4_8422_2325_u64, |hash, byte| {
            (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
        })
    })
}

/// Fetches one alert kind for the logged-in operator.
#[derive(Clone)]
pub struct Poller {
    kind: AlertKind,
    operator: OperatorProfile,
    storage_dir: String,
    stagger: Stagger,
    source: Arc<dyn AlertSource>,
    acks: Arc<dyn Acknowledger>,
    clock: Arc<dyn Clock>,
    tx: mpsc::UnboundedSender<Command>,
}

impl Poller {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        kind: AlertKind,
        operator: OperatorProfile,
        storage_dir: impl Into<String>,
        divisor: u32,
        source: Arc<dyn AlertSource>,
        acks: Arc<dyn Acknowledger>,
        clock: Arc<dyn Clock>,
        tx: mpsc::UnboundedSender<Command>,
    ) -> Self {
        let stagger = Stagger::for_operator(&operator.user_id, divisor);
        Self {
            kind,
            operator,
            storage_dir: storage_dir.into(),
            stagger,
            source,
            acks,
            clock,
            tx,
        }
    }

    pub fn kind(&self) -> AlertKind {
        self.kind
    }

    pub fn stagger(&self) -> Stagger {
        self.stagger
    }

    /// Listing prefix for today.
    pub fn scope(&self) -> ScopePrefix {
        ScopePrefix::for_operator(&self.storage_dir, &self.operator, self.clock.now().date())
    }

    /// Fetch, validate and acknowledgement-filter the kind's records.
    ///
    /// Malformed records are dropped; the rest of the batch is kept. A failed
    /// acknowledgement lookup keeps the record.
    pub async fn collect(&self) -> Result<Vec<AlertItem>> {
        let scope = self.scope();
        let records = self.source.fetch(self.kind, &scope).await?;
        let fetched = records.len();
        let today = self.clock.now().date();

        let mut items = Vec::with_capacity(fetched);
        for record in records {
            let item = match AlertItem::from_record(self.kind, record) {
                Ok(item) => item,
                Err(e) => {
                    debug!(kind = %self.kind, error = %e, "dropping malformed record");
                    continue;
                }
            };
            match self.acks.exists(&self.operator.user_id, today, item.file()) {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => {
                    warn!(kind = %self.kind, file = %item.file(), error = %e, "acknowledgement lookup failed");
                }
            }
            items.push(item);
        }

        debug!(kind = %self.kind, scope = %scope, fetched, pending = items.len(), "poll collected");
        Ok(items)
    }

    /// Collect and hand the result to the main context.
    pub async fn run_cycle(&self) -> Result<usize> {
        let items = self.collect().await?;
        let count = items.len();
        self.tx
            .send(Command::Merge {
                kind: self.kind,
                items,
            })
            .map_err(|_| AlertError::EngineStopped)?;
        Ok(count)
    }

    /// Run a cycle if the current minute is this operator's bucket.
    ///
    /// Returns `Ok(None)` when the tick is not due.
    pub async fn tick(&self) -> Result<Option<usize>> {
        let minute = self.clock.now().minute();
        if !self.stagger.fires_at(minute) {
            return Ok(None);
        }
        self.run_cycle().await.map(Some)
    }

    /// Start the polling loop and the foreground listener.
    ///
    /// The first cycle runs at once regardless of the stagger bucket.
    pub fn spawn(self, period: Duration, presenter: &dyn Presenter) -> PollerHandle {
        let kind = self.kind;
        let listener = self.listen(presenter);

        info!(
            %kind,
            period_secs = period.as_secs(),
            interval = self.stagger.interval,
            exec_timer = self.stagger.exec_timer,
            "starting poller"
        );

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            ticker.tick().await;
            let mut outcome = self.run_cycle().await.map(Some);
            loop {
                match outcome {
                    Err(AlertError::EngineStopped) => break,
                    Err(e) => warn!(%kind, error = %e, "poll cycle failed, retrying next tick"),
                    Ok(_) => {}
                }
                ticker.tick().await;
                outcome = self.tick().await;
            }
            debug!(%kind, "poller stopped");
        });

        PollerHandle { kind, task, listener }
    }

    fn listen(&self, presenter: &dyn Presenter) -> Option<JoinHandle<()>> {
        let kind = self.kind;
        let mut changes = match presenter.foreground_changes() {
            Ok(Some(changes)) => changes,
            Ok(None) => {
                debug!(%kind, "no foreground broadcast, polling only");
                return None;
            }
            Err(e) => {
                warn!(%kind, error = %e, "foreground listener refused, polling only");
                return None;
            }
        };

        let tx = self.tx.clone();
        Some(tokio::spawn(async move {
            while changes.changed().await.is_ok() {
                let foreground = *changes.borrow_and_update();
                if foreground && tx.send(Command::Foregrounded { kind }).is_err() {
                    break;
                }
            }
        }))
    }
}

/// Running poller; stopping or dropping it cancels the loop and listener.
pub struct PollerHandle {
    kind: AlertKind,
    task: JoinHandle<()>,
    listener: Option<JoinHandle<()>>,
}

impl PollerHandle {
    pub fn kind(&self) -> AlertKind {
        self.kind
    }

    pub fn has_listener(&self) -> bool {
        self.listener.is_some()
    }

    pub fn stop(mut self) {
        self.abort();
    }

    fn abort(&mut self) {
        self.task.abort();
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.abort();
    }
}
