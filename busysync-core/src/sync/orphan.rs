//! Recovery of mirrors whose record was never written.
//!
//! A crash between a successful create and the matching store commit leaves a
//! managed event behind with no record. Every mirror carries a digest of its
//! source key, so the next pass can find it again instead of creating a
//! duplicate.

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use crate::event::{Event, EventKey};
use crate::fingerprint::source_digest;
use crate::sanitize::{is_managed, source_marker_digest};

/// Untracked managed events on one calendar, by the source digest they carry.
#[derive(Debug, Default)]
pub struct OrphanIndex {
    by_digest: HashMap<String, Event>,
}

impl OrphanIndex {
    /// Index every managed event in `events` whose key is not in `tracked`.
    pub fn build(events: &[Event], tracked: &HashSet<EventKey>) -> Self {
        let mut by_digest = HashMap::new();

        for event in events.iter().filter(|e| is_managed(e)) {
            if tracked.contains(&event.key()) {
                continue;
            }
            let Some(digest) = source_marker_digest(event) else {
                debug!(uid = %event.uid, "managed event without source marker");
                continue;
            };
            if by_digest.contains_key(&digest) {
                warn!(uid = %event.uid, digest = %digest, "second orphan for the same source, leaving it alone");
                continue;
            }
            by_digest.insert(digest, event.clone());
        }

        if !by_digest.is_empty() {
            debug!(count = by_digest.len(), "found orphaned mirrors");
        }

        OrphanIndex { by_digest }
    }

    /// Claim the orphaned mirror of `source`, if there is one.
    pub fn take(&mut self, source: &EventKey) -> Option<Event> {
        self.by_digest.remove(&source_digest(source))
    }

    pub fn len(&self) -> usize {
        self.by_digest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_digest.is_empty()
    }
}
