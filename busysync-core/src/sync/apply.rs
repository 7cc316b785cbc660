//! Execution of a plan, one event at a time.

use tracing::{error, info, warn};

use crate::backend::CalendarBackend;
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::event::{Event, EventKey};
use crate::fingerprint::fingerprint;
use crate::sanitize::{SanitizeOptions, TitleMode, sanitize, sanitize_with_uid};
use crate::store::{Authority, PairId, StateStore, SyncRecord};
use crate::sync::PassResult;
use crate::sync::plan::SyncAction;

/// Title handling for mirrors of a given authority.
pub fn title_mode(authority: Authority) -> TitleMode {
    match authority {
        Authority::Primary => TitleMode::Verbatim,
        Authority::Secondary => TitleMode::Redacted,
    }
}

pub struct Applier<'a> {
    config: &'a SyncConfig,
    pair: PairId,
    store: &'a mut StateStore,
    primary: &'a dyn CalendarBackend,
    secondary: &'a dyn CalendarBackend,
}

impl<'a> Applier<'a> {
    pub fn new(
        config: &'a SyncConfig,
        store: &'a mut StateStore,
        primary: &'a dyn CalendarBackend,
        secondary: &'a dyn CalendarBackend,
    ) -> Self {
        Applier {
            pair: config.pair(),
            config,
            store,
            primary,
            secondary,
        }
    }

    /// Apply every action in order. Per-event failures are counted and
    /// skipped; anything else stops the pass where it is.
    pub fn apply(&mut self, actions: Vec<SyncAction>, result: &mut PassResult) {
        for action in actions {
            if self.config.dry_run {
                info!(authority = %action.authority(), "would apply {}", action);
                result.count(action.kind());
                continue;
            }

            match self.apply_one(&action) {
                Ok(()) => {
                    info!(authority = %action.authority(), "{}", action);
                    result.count(action.kind());
                }
                Err(e) if e.is_per_event() => {
                    error!(authority = %action.authority(), error = %e, "failed {}", action);
                    result.errors += 1;
                    result.failures.push(format!("{}: {}", action, e));
                }
                Err(e) => {
                    error!(error = %e, "stopping pass at {}", action);
                    result.errors += 1;
                    result.interrupted = Some(e.to_string());
                    return;
                }
            }
        }
    }

    fn apply_one(&mut self, action: &SyncAction) -> SyncResult<()> {
        match action {
            SyncAction::Create { authority, source } => {
                let (mirror_key, stored) = self.create_mirror(*authority, source)?;
                let record = SyncRecord::new(
                    self.pair.clone(),
                    *authority,
                    &source.key(),
                    &mirror_key,
                    fingerprint(source),
                    fingerprint(&stored),
                );
                self.store.upsert(&record)
            }

            SyncAction::Register {
                authority,
                source,
                mirror,
            } => {
                let (calendar, backend) = self.mirror_side(*authority);
                let expected = sanitize_with_uid(source, &self.options(*authority), mirror.uid.clone());

                let stored = if fingerprint(&expected) == fingerprint(mirror) {
                    mirror.clone()
                } else {
                    backend.modify(calendar, &mirror.uid, mirror.recurrence_key.as_ref(), &expected)?
                };

                let record = SyncRecord::new(
                    self.pair.clone(),
                    *authority,
                    &source.key(),
                    &mirror.key(),
                    fingerprint(source),
                    fingerprint(&stored),
                );
                self.store.upsert(&record)
            }

            SyncAction::Update { record, source, .. } => {
                let mirror_key = record.mirror_key();
                let (calendar, backend) = self.mirror_side(record.authority);
                let replacement =
                    sanitize_with_uid(source, &self.options(record.authority), mirror_key.uid.clone());

                let (mirror_key, stored) = match backend.modify(
                    calendar,
                    &mirror_key.uid,
                    mirror_key.recurrence_key.as_ref(),
                    &replacement,
                ) {
                    Ok(stored) => (mirror_key, stored),
                    Err(SyncError::NotFound(_)) => {
                        warn!(mirror = %mirror_key, "mirror vanished during update, recreating");
                        self.create_mirror(record.authority, source)?
                    }
                    Err(e) => return Err(e),
                };

                self.commit(record, record.resynced(&mirror_key, fingerprint(source), fingerprint(&stored)))
            }

            SyncAction::Recreate { record, source } => {
                let (mirror_key, stored) = self.create_mirror(record.authority, source)?;
                self.commit(record, record.resynced(&mirror_key, fingerprint(source), fingerprint(&stored)))
            }

            SyncAction::Remove { record, mirror } => {
                if let Some(mirror) = mirror {
                    let (calendar, backend) = self.mirror_side(record.authority);
                    match backend.delete(calendar, &mirror.uid, mirror.recurrence_key.as_ref()) {
                        Ok(()) | Err(SyncError::NotFound(_)) => {}
                        Err(e) => return Err(e),
                    }
                }
                self.store.delete(&record.pair, &record.primary_key)?;
                Ok(())
            }
        }
    }

    fn create_mirror(&self, authority: Authority, source: &Event) -> SyncResult<(EventKey, Event)> {
        let (calendar, backend) = self.mirror_side(authority);
        let mirror = sanitize(source, &self.options(authority));
        let (uid, stored) = backend.create(calendar, &mirror)?;
        Ok((EventKey::new(uid, stored.recurrence_key.clone()), stored))
    }

    // The primary key only moves when the mirror lives on the primary side
    fn commit(&mut self, old: &SyncRecord, new: SyncRecord) -> SyncResult<()> {
        if old.primary_key == new.primary_key {
            self.store.upsert(&new)
        } else {
            self.store.replace(&old.primary_key, &new)
        }
    }

    fn mirror_side(&self, authority: Authority) -> (&'a str, &'a dyn CalendarBackend) {
        match authority {
            Authority::Primary => (self.config.secondary_calendar.as_str(), self.secondary),
            Authority::Secondary => (self.config.primary_calendar.as_str(), self.primary),
        }
    }

    fn options(&self, authority: Authority) -> SanitizeOptions {
        SanitizeOptions {
            mode: title_mode(authority),
            keep_reminders: self.config.keep_reminders,
        }
    }
}
