//! Classification of one pass into a list of actions.
//!
//! Planning never writes anything. A real run and a dry run share this code
//! and differ only in how the resulting actions are applied.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::CalendarBackend;
use crate::config::{Direction, SyncConfig};
use crate::event::{Event, EventKey};
use crate::fingerprint::fingerprint;
use crate::sanitize::is_managed;
use crate::store::{Authority, SyncRecord};
use crate::sync::orphan::OrphanIndex;
use crate::sync::skip::SkipPolicy;

/// Counter an action contributes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
}

impl ChangeKind {
    pub fn symbol(&self) -> &'static str {
        match self {
            ChangeKind::Added => "+",
            ChangeKind::Modified => "~",
            ChangeKind::Deleted => "-",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

#[derive(Debug, Clone)]
pub enum SyncAction {
    /// Mirror a source for the first time.
    Create { authority: Authority, source: Event },
    /// Adopt a mirror left behind by an interrupted pass.
    Register {
        authority: Authority,
        source: Event,
        mirror: Event,
    },
    /// Push authoritative content over an existing mirror.
    Update {
        record: SyncRecord,
        source: Event,
        mirror: Event,
    },
    /// The mirror disappeared while its source is still there.
    Recreate { record: SyncRecord, source: Event },
    /// The source is gone (or no longer mirrored); drop mirror and record.
    Remove {
        record: SyncRecord,
        mirror: Option<Event>,
    },
}

impl SyncAction {
    pub fn kind(&self) -> ChangeKind {
        match self {
            SyncAction::Create { .. } | SyncAction::Register { .. } => ChangeKind::Added,
            SyncAction::Update { .. } | SyncAction::Recreate { .. } => ChangeKind::Modified,
            SyncAction::Remove { .. } => ChangeKind::Deleted,
        }
    }

    pub fn authority(&self) -> Authority {
        match self {
            SyncAction::Create { authority, .. } | SyncAction::Register { authority, .. } => *authority,
            SyncAction::Update { record, .. }
            | SyncAction::Recreate { record, .. }
            | SyncAction::Remove { record, .. } => record.authority,
        }
    }
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncAction::Create { source, .. } => write!(f, "{} {}", self.kind(), source),
            SyncAction::Register { source, .. } => write!(f, "{} {} (recovered)", self.kind(), source),
            SyncAction::Update { source, .. } => write!(f, "{} {}", self.kind(), source),
            SyncAction::Recreate { source, .. } => write!(f, "{} {} (recreated)", self.kind(), source),
            SyncAction::Remove { record, mirror } => match mirror {
                Some(mirror) => write!(f, "{} {}", self.kind(), mirror),
                None => write!(f, "{} {}", self.kind(), record.source_key()),
            },
        }
    }
}

/// The live state of one calendar as listed at the start of a pass.
pub struct CalendarView<'a> {
    pub events: &'a [Event],
    by_key: HashMap<EventKey, &'a Event>,
    tracked: HashSet<EventKey>,
}

impl<'a> CalendarView<'a> {
    pub fn new(events: &'a [Event], tracked: HashSet<EventKey>) -> Self {
        let by_key = events.iter().map(|e| (e.key(), e)).collect();
        CalendarView {
            events,
            by_key,
            tracked,
        }
    }

    pub fn get(&self, key: &EventKey) -> Option<&'a Event> {
        self.by_key.get(key).copied()
    }

    /// Whether any record of the pair refers to `key` on this side.
    pub fn is_tracked(&self, key: &EventKey) -> bool {
        self.tracked.contains(key)
    }
}

/// Result of planning: actions in application order plus how many events were skipped.
#[derive(Debug, Default)]
pub struct Plan {
    pub actions: Vec<SyncAction>,
    pub skipped: usize,
}

pub struct Planner<'a> {
    pub config: &'a SyncConfig,
    pub primary: CalendarView<'a>,
    pub secondary: CalendarView<'a>,
    pub primary_backend: &'a dyn CalendarBackend,
    pub secondary_backend: &'a dyn CalendarBackend,
}

impl<'a> Planner<'a> {
    pub fn new(
        config: &'a SyncConfig,
        primary_events: &'a [Event],
        secondary_events: &'a [Event],
        records: &[SyncRecord],
        primary_backend: &'a dyn CalendarBackend,
        secondary_backend: &'a dyn CalendarBackend,
    ) -> Self {
        let primary_tracked = records.iter().map(|r| EventKey::parse(&r.primary_key)).collect();
        let secondary_tracked = records.iter().map(|r| EventKey::parse(&r.secondary_key)).collect();

        Planner {
            config,
            primary: CalendarView::new(primary_events, primary_tracked),
            secondary: CalendarView::new(secondary_events, secondary_tracked),
            primary_backend,
            secondary_backend,
        }
    }

    /// (source view, mirror view, source backend) for an authority.
    fn sides(&self, authority: Authority) -> (&CalendarView<'a>, &CalendarView<'a>, &'a dyn CalendarBackend) {
        match authority {
            Authority::Primary => (&self.primary, &self.secondary, self.primary_backend),
            Authority::Secondary => (&self.secondary, &self.primary, self.secondary_backend),
        }
    }

    pub fn plan(&self, records: &[SyncRecord]) -> Plan {
        let mut plan = Plan::default();
        let authorities = self.config.direction.authorities();
        let account_email = self.config.account_email.as_deref();

        let policy_for = |events: &[Event]| {
            let policy = SkipPolicy::new(events, account_email);
            if self.config.direction == Direction::Both {
                policy.keeping_same_date_overrides()
            } else {
                policy
            }
        };
        let primary_policy = policy_for(self.primary.events);
        let secondary_policy = policy_for(self.secondary.events);
        let policy = |authority: Authority| match authority {
            Authority::Primary => &primary_policy,
            Authority::Secondary => &secondary_policy,
        };

        // Tracked pairs first, each judged by its own authority
        for record in records.iter().filter(|r| authorities.contains(&r.authority)) {
            let (sources, mirrors, backend) = self.sides(record.authority);
            let source_key = record.source_key();
            let mirror = mirrors.get(&record.mirror_key());

            let source = sources.get(&source_key).filter(|s| !is_managed(s)).filter(|s| {
                match policy(record.authority).check(s, backend) {
                    Some(reason) => {
                        debug!(source = %source_key, %reason, "tracked source is no longer mirrored");
                        false
                    }
                    None => true,
                }
            });

            match (source, mirror) {
                (None, mirror) => plan.actions.push(SyncAction::Remove {
                    record: record.clone(),
                    mirror: mirror.cloned(),
                }),
                (Some(source), None) => plan.actions.push(SyncAction::Recreate {
                    record: record.clone(),
                    source: source.clone(),
                }),
                (Some(source), Some(mirror)) => {
                    let source_changed = fingerprint(source) != record.source_hash();
                    let mirror_changed = fingerprint(mirror) != record.mirror_hash();
                    if !source_changed && !mirror_changed {
                        continue;
                    }
                    debug!(source = %source_key, source_changed, mirror_changed, "pair drifted");
                    plan.actions.push(SyncAction::Update {
                        record: record.clone(),
                        source: source.clone(),
                        mirror: mirror.clone(),
                    });
                }
            }
        }

        // Then untracked native events on each authoritative side
        for &authority in authorities {
            let (sources, mirrors, backend) = self.sides(authority);
            let mut orphans = OrphanIndex::build(mirrors.events, &mirrors.tracked);

            for source in sources.events {
                if is_managed(source) {
                    continue;
                }
                let key = source.key();
                if sources.is_tracked(&key) {
                    continue;
                }
                if let Some(reason) = policy(authority).check(source, backend) {
                    debug!(source = %key, %reason, "skipping");
                    plan.skipped += 1;
                    continue;
                }

                match orphans.take(&key) {
                    Some(mirror) => plan.actions.push(SyncAction::Register {
                        authority,
                        source: source.clone(),
                        mirror,
                    }),
                    None => plan.actions.push(SyncAction::Create {
                        authority,
                        source: source.clone(),
                    }),
                }
            }
        }

        plan
    }
}
