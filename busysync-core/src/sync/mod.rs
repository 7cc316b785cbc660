//! The reconciliation engine.
//!
//! A pass lists both calendars, plans every change against the state store,
//! then applies the plan one event at a time, committing after each event.

mod apply;
mod orphan;
mod plan;
mod skip;

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::backend::CalendarBackend;
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::event::{Event, EventKey};
use crate::fingerprint::source_digest;
use crate::preflight::{PreflightCheck, all_passed, run_checks};
use crate::sanitize::{is_managed, source_marker_digest};
use crate::store::{Authority, MigrateResult, MigrateScope, PairId, PairStatus, StateStore, SyncRecord};

pub use apply::title_mode;
pub use orphan::OrphanIndex;
pub use plan::{CalendarView, ChangeKind, Plan, Planner, SyncAction};
pub use skip::{SkipPolicy, SkipReason};

use apply::Applier;

/// How a pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PassOutcome {
    Clean,
    CompletedWithErrors,
    /// A backend or the store failed mid-pass; earlier commits stand.
    Interrupted,
}

/// Counters of one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassResult {
    pub added: usize,
    pub modified: usize,
    pub deleted: usize,
    pub errors: usize,
    pub skipped: usize,
    pub dry_run: bool,
    /// One line per failed event
    pub failures: Vec<String>,
    pub interrupted: Option<String>,
}

impl PassResult {
    fn count(&mut self, kind: ChangeKind) {
        match kind {
            ChangeKind::Added => self.added += 1,
            ChangeKind::Modified => self.modified += 1,
            ChangeKind::Deleted => self.deleted += 1,
        }
    }

    pub fn changes(&self) -> usize {
        self.added + self.modified + self.deleted
    }

    pub fn outcome(&self) -> PassOutcome {
        if self.interrupted.is_some() {
            PassOutcome::Interrupted
        } else if self.errors > 0 {
            PassOutcome::CompletedWithErrors
        } else {
            PassOutcome::Clean
        }
    }
}

impl fmt::Display for PassResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Added: {}, Modified: {}, Deleted: {}, Errors: {}",
            self.added, self.modified, self.deleted, self.errors
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearResult {
    pub primary_deleted: usize,
    pub secondary_deleted: usize,
    pub errors: usize,
    pub records_removed: usize,
    pub dry_run: bool,
}

impl ClearResult {
    pub fn events_deleted(&self) -> usize {
        self.primary_deleted + self.secondary_deleted
    }
}

/// Agreement between the store and the two calendars after a pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyReport {
    pub healthy: usize,
    pub missing_source: usize,
    pub missing_mirror: usize,
    /// Managed events with no record on either side
    pub untracked_managed: usize,
}

impl VerifyReport {
    pub fn is_consistent(&self) -> bool {
        self.missing_source == 0 && self.missing_mirror == 0 && self.untracked_managed == 0
    }
}

/// Reconciles one calendar pair. Both sides may be served by the same backend.
pub struct Engine<'a> {
    config: SyncConfig,
    primary: &'a dyn CalendarBackend,
    secondary: &'a dyn CalendarBackend,
}

impl<'a> Engine<'a> {
    pub fn new(
        config: SyncConfig,
        primary: &'a dyn CalendarBackend,
        secondary: &'a dyn CalendarBackend,
    ) -> Self {
        Engine {
            config,
            primary,
            secondary,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn preflight(&self) -> Vec<PreflightCheck> {
        run_checks(&self.config, self.primary, self.secondary)
    }

    /// Validate, run preflight, and open the store. Nothing is written before this succeeds.
    fn ensure_ready(&self) -> SyncResult<StateStore> {
        self.config.validate()?;

        let checks = self.preflight();
        if !all_passed(&checks) {
            return Err(SyncError::Aborted(checks));
        }

        StateStore::open(&self.config.state_db)
    }

    #[tracing::instrument(skip(self), fields(pair = %self.config.pair(), direction = %self.config.direction, dry_run = self.config.dry_run))]
    pub fn run_pass(&self) -> SyncResult<PassResult> {
        let mut store = self.ensure_ready()?;
        let snapshot = self.snapshot(&store)?;
        Ok(self.pass(&mut store, snapshot))
    }

    /// Clear the pair, then run a pass from scratch.
    ///
    /// The pass plans against what the clear left behind, so a dry run counts
    /// the same changes a real refresh makes.
    #[tracing::instrument(skip(self), fields(pair = %self.config.pair(), dry_run = self.config.dry_run))]
    pub fn refresh(&self) -> SyncResult<PassResult> {
        let mut store = self.ensure_ready()?;
        let mut snapshot = self.snapshot(&store)?;
        let cleared = self.clear_with(&store, &mut snapshot)?;
        let mut result = self.pass(&mut store, snapshot);
        result.errors += cleared.errors;
        Ok(result)
    }

    /// Delete the pair's mirrors in the calendars this direction writes to and
    /// forget every record of the pair. Mirrors of other pairs are left alone.
    pub fn clear(&self) -> SyncResult<ClearResult> {
        let store = self.ensure_ready()?;
        let mut snapshot = self.snapshot(&store)?;
        self.clear_with(&store, &mut snapshot)
    }

    /// Compare the store with what is actually in both calendars. Read-only.
    pub fn verify(&self) -> SyncResult<VerifyReport> {
        self.config.validate()?;
        let store = StateStore::open(&self.config.state_db)?;
        let Snapshot {
            primary: primary_events,
            secondary: secondary_events,
            records,
        } = self.snapshot(&store)?;

        let primary_keys: HashSet<EventKey> = primary_events.iter().map(|e| e.key()).collect();
        let secondary_keys: HashSet<EventKey> = secondary_events.iter().map(|e| e.key()).collect();

        let mut report = VerifyReport::default();
        let mut tracked_primary = HashSet::new();
        let mut tracked_secondary = HashSet::new();

        for record in &records {
            let primary_key = EventKey::parse(&record.primary_key);
            let secondary_key = EventKey::parse(&record.secondary_key);
            let primary_present = primary_keys.contains(&primary_key);
            let secondary_present = secondary_keys.contains(&secondary_key);
            tracked_primary.insert(primary_key);
            tracked_secondary.insert(secondary_key);

            let (source_present, mirror_present) = match record.authority {
                Authority::Primary => (primary_present, secondary_present),
                Authority::Secondary => (secondary_present, primary_present),
            };

            if !source_present {
                warn!(source = %record.source_key(), "tracked source is missing");
                report.missing_source += 1;
            }
            if !mirror_present {
                warn!(mirror = %record.mirror_key(), "tracked mirror is missing");
                report.missing_mirror += 1;
            }
            if source_present && mirror_present {
                report.healthy += 1;
            }
        }

        report.untracked_managed = primary_events
            .iter()
            .filter(|e| is_managed(e) && !tracked_primary.contains(&e.key()))
            .chain(
                secondary_events
                    .iter()
                    .filter(|e| is_managed(e) && !tracked_secondary.contains(&e.key())),
            )
            .count();

        info!(
            healthy = report.healthy,
            missing_source = report.missing_source,
            missing_mirror = report.missing_mirror,
            untracked = report.untracked_managed,
            "verified {}",
            self.config.pair()
        );
        Ok(report)
    }

    fn snapshot(&self, store: &StateStore) -> SyncResult<Snapshot> {
        let snapshot = Snapshot {
            primary: self.primary.list(&self.config.primary_calendar)?,
            secondary: self.secondary.list(&self.config.secondary_calendar)?,
            records: store.list_for_pair(&self.config.pair())?,
        };
        debug!(
            primary = snapshot.primary.len(),
            secondary = snapshot.secondary.len(),
            records = snapshot.records.len(),
            "loaded calendars"
        );
        Ok(snapshot)
    }

    fn pass(&self, store: &mut StateStore, snapshot: Snapshot) -> PassResult {
        let Snapshot {
            primary: primary_events,
            secondary: secondary_events,
            records,
        } = snapshot;

        let planner = Planner::new(
            &self.config,
            &primary_events,
            &secondary_events,
            &records,
            self.primary,
            self.secondary,
        );
        let plan = planner.plan(&records);
        debug!(actions = plan.actions.len(), skipped = plan.skipped, "planned");

        let mut result = PassResult {
            skipped: plan.skipped,
            dry_run: self.config.dry_run,
            ..PassResult::default()
        };
        Applier::new(&self.config, store, self.primary, self.secondary).apply(plan.actions, &mut result);

        match result.outcome() {
            PassOutcome::Interrupted => error!(%result, "pass interrupted"),
            PassOutcome::CompletedWithErrors => warn!(%result, "pass completed with errors"),
            PassOutcome::Clean => info!(%result, skipped = result.skipped, "pass complete"),
        }
        result
    }

    /// Delete this pair's mirrors and records, pruning `snapshot` to match.
    ///
    /// In a dry run nothing is written but the snapshot is pruned all the
    /// same, so whatever is planned against it afterwards sees the cleared state.
    fn clear_with(&self, store: &StateStore, snapshot: &mut Snapshot) -> SyncResult<ClearResult> {
        let pair = self.config.pair();
        let dry_run = self.config.dry_run;
        let mut result = ClearResult {
            dry_run,
            ..ClearResult::default()
        };

        for &authority in self.config.direction.authorities() {
            let mirror_keys: HashSet<EventKey> = snapshot
                .records
                .iter()
                .filter(|r| r.authority == authority)
                .map(|r| r.mirror_key())
                .collect();

            let (sources, mirrors, calendar, backend) = match authority {
                Authority::Primary => (
                    &snapshot.primary,
                    &mut snapshot.secondary,
                    self.config.secondary_calendar.as_str(),
                    self.secondary,
                ),
                Authority::Secondary => (
                    &snapshot.secondary,
                    &mut snapshot.primary,
                    self.config.primary_calendar.as_str(),
                    self.primary,
                ),
            };

            let source_digests: HashSet<String> = sources
                .iter()
                .filter(|e| !is_managed(e))
                .map(|e| source_digest(&e.key()))
                .collect();
            let owned = |event: &Event| {
                is_managed(event)
                    && (mirror_keys.contains(&event.key())
                        || source_marker_digest(event).is_some_and(|d| source_digests.contains(&d)))
            };

            let mut deleted = 0;
            let mut kept = Vec::with_capacity(mirrors.len());
            for event in std::mem::take(mirrors) {
                if !owned(&event) {
                    kept.push(event);
                    continue;
                }
                if dry_run {
                    info!(calendar, uid = %event.uid, "would delete {}", event);
                    deleted += 1;
                    continue;
                }
                match backend.delete(calendar, &event.uid, event.recurrence_key.as_ref()) {
                    Ok(()) | Err(SyncError::NotFound(_)) => deleted += 1,
                    Err(e) if e.is_per_event() => {
                        error!(calendar, uid = %event.uid, error = %e, "failed to delete mirror");
                        result.errors += 1;
                        kept.push(event);
                    }
                    Err(e) => return Err(e),
                }
            }
            *mirrors = kept;

            match authority {
                Authority::Primary => result.secondary_deleted = deleted,
                Authority::Secondary => result.primary_deleted = deleted,
            }
        }

        result.records_removed = if dry_run {
            snapshot.records.len()
        } else {
            store.clear_pair(&pair)?
        };
        snapshot.records.clear();

        info!(
            events = result.events_deleted(),
            records = result.records_removed,
            errors = result.errors,
            dry_run,
            "cleared {}",
            pair
        );
        Ok(result)
    }
}

/// Both calendars and the pair's records, listed once per operation.
struct Snapshot {
    primary: Vec<Event>,
    secondary: Vec<Event>,
    records: Vec<SyncRecord>,
}

/// Record counts for one pair.
pub fn status(state_db: &Path, pair: &PairId) -> SyncResult<PairStatus> {
    StateStore::open(state_db)?.status(pair)
}

/// Repoint stored records from `old_id` to `new_id`, e.g. after a calendar was
/// re-created under a new id.
pub fn migrate(
    state_db: &Path,
    old_id: &str,
    new_id: &str,
    scope: MigrateScope,
    dry_run: bool,
) -> SyncResult<MigrateResult> {
    if old_id.trim().is_empty() || new_id.trim().is_empty() {
        return Err(SyncError::Config("Calendar ids must not be empty".into()));
    }
    if old_id == new_id {
        return Err(SyncError::Config(format!("'{}' is already the current id", old_id)));
    }

    let mut store = StateStore::open(state_db)?;
    let result = store.migrate_calendar_id(old_id, new_id, scope, dry_run)?;
    info!(
        old_id,
        new_id,
        primary = result.primary_rows,
        secondary = result.secondary_rows,
        dry_run,
        "migrated calendar id"
    );
    Ok(result)
}
