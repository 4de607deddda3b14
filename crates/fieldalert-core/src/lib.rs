//! # fieldalert-core
//!
//! Core types, errors, and logging for the FieldAlert dispatch engine.
//!
//! This crate provides:
//! - [`AlertError`] - Error type shared by every FieldAlert crate
//! - [`logging`] - Tracing setup
//! - [`types`] - Alert kinds, records, queue items and operator profile
//!
//! ## Example
//!
//! ```no_run
//! use fieldalert_core::{AlertItem, AlertKind, AlertRecord, logging};
//!
//! fn main() -> fieldalert_core::Result<()> {
//!     let _guard = logging::init_logging(None, false)?;
//!
//!     let record = AlertRecord {
//!         file_identifier: "100_02_03_202401011200.json".into(),
//!         occurrence_time: "202401011230".into(),
//!         start_time: "202401011200".into(),
//!         ..Default::default()
//!     };
//!     let item = AlertItem::from_record(AlertKind::LongStop, record)?;
//!     tracing::info!(key = %item.key(), "validated");
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;
pub mod types;

pub use error::{AlertError, Result};
pub use logging::{LogGuard, init_logging};
pub use types::{
    AdminNavigation, AlertItem, AlertKind, AlertPayload, AlertRecord, AlertTime, ButtonChoice,
    DedupKey, OperatorProfile, ScopePrefix,
};
