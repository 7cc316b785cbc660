//! Core of busysync: mirrors busy time between a primary and a secondary calendar.
//!
//! - `event` and `ics` hold the backend-agnostic event model and its text form
//! - `sanitize` and `fingerprint` are the pure transforms a pass is built on
//! - `backend` is the port every calendar adapter implements; `calendar` is the
//!   directory-of-`.ics` adapter
//! - `store` persists tracked pairs; `sync` runs passes over them

pub mod backend;
pub mod calendar;
pub mod config;
pub mod error;
pub mod event;
pub mod fingerprint;
pub mod ics;
pub mod preflight;
pub mod sanitize;
pub mod settings;
pub mod store;
pub mod sync;

#[cfg(test)]
mod testing;

pub use backend::{CalendarBackend, CalendarInfo};
pub use calendar::DirectoryBackend;
pub use config::{Direction, SyncConfig};
pub use error::{SyncError, SyncResult};
pub use event::{Event, EventKey, RecurrenceKey};
pub use preflight::PreflightCheck;
pub use settings::Settings;
pub use store::{Authority, MigrateResult, MigrateScope, PairId, PairStatus, StateStore};
pub use sync::{ClearResult, Engine, PassOutcome, PassResult, VerifyReport, migrate, status};
