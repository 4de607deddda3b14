//! # fieldalert-engine
//!
//! Dispatch engine for LongStop and SOS safety alerts.
//!
//! Two staggered [`Poller`]s fetch pending alerts from an [`AlertSource`],
//! drop what the operator already acknowledged and merge the rest into one
//! shared [`AlertQueue`] in which SOS always sorts ahead of LongStop. The
//! [`Dispatcher`] decides per queue head whether to re-alert, post a passive
//! notification or open a dialog; the [`DialogCoordinator`] owns the single
//! dialog slot and persists acknowledgements; the [`RepeatNotifier`] keeps
//! alerting while a dialog stays unanswered.
//!
//! All queue and dialog state lives on one main-context task driven by
//! [`AlertEngine`]. Hosts plug in their UI, hardware and storage through the
//! traits in [`traits`]; [`mock`] provides in-memory versions.

pub mod ack_store;
pub mod alerter;
pub mod coordinator;
pub mod dispatcher;
pub mod engine;
pub mod mock;
pub mod oplog;
pub mod poller;
pub mod queue;
pub mod repeat;
pub mod source;
pub mod traits;

pub use ack_store::FileAckStore;
pub use alerter::Alerter;
pub use coordinator::{Acknowledged, DialogCoordinator};
pub use dispatcher::{Decision, Dispatcher, UiState};
pub use engine::{AlertEngine, AlertEvent, Collaborators, Command, EngineBuilder, EngineSnapshot};
pub use oplog::{OperationEntry, OperationLogger};
pub use poller::{Poller, PollerHandle, Stagger};
pub use queue::{AlertQueue, MergeOutcome};
pub use repeat::RepeatNotifier;
pub use source::DirectoryAlertSource;
pub use traits::{
    Acknowledger, Actuator, AlertSource, Clock, DialogRequest, Presenter, SessionId, SystemClock,
    VibrationPattern,
};
