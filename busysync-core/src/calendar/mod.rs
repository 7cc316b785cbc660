//! Calendars stored as directories of `.ics` files.
//!
//! Each calendar is a sub-directory of the calendar root and each event lives
//! in its own file. Files written by other tools may hold several VEVENTs
//! (a master and its overrides); those are rewritten in place when one of
//! their events changes.

mod recurrence;

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::backend::{CalendarBackend, CalendarInfo};
use crate::error::{SyncError, SyncResult};
use crate::event::{Event, EventKey, RecurrenceKey};
use crate::ics::{generate_ics, parse_events};

pub use recurrence::has_occurrences;

const MAX_FILE_NAME_SUFFIX: usize = 100;

/// One `.ics` file and the events it holds.
#[derive(Debug, Clone)]
struct EventFile {
    path: PathBuf,
    events: Vec<Event>,
}

impl EventFile {
    fn load(path: PathBuf) -> SyncResult<Self> {
        let content = fs::read_to_string(&path)?;
        let events = parse_events(&content)
            .map_err(|e| SyncError::IcsParse(format!("{}: {}", path.display(), e)))?;
        Ok(EventFile { path, events })
    }

    fn position(&self, key: &EventKey) -> Option<usize> {
        self.events.iter().position(|e| e.key() == *key)
    }

    fn save(&self) -> SyncResult<()> {
        write_atomic(&self.path, &generate_ics(&self.events))
    }
}

#[derive(Debug, Clone)]
pub struct DirectoryBackend {
    root: PathBuf,
}

impl DirectoryBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DirectoryBackend { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn calendar_path(&self, calendar_id: &str) -> PathBuf {
        self.root.join(calendar_id)
    }

    /// Every calendar under the root, sorted by id.
    pub fn calendars(&self) -> Vec<CalendarInfo> {
        let Ok(entries) = fs::read_dir(&self.root) else {
            return Vec::new();
        };

        let mut calendars: Vec<CalendarInfo> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .filter_map(|path| path.file_name().and_then(|n| n.to_str()).map(str::to_string))
            .filter(|name| !name.starts_with('.'))
            .map(|name| CalendarInfo {
                display_name: name.clone(),
                id: name,
            })
            .collect();

        calendars.sort_by(|a, b| a.id.cmp(&b.id));
        calendars
    }

    fn existing_calendar(&self, calendar_id: &str) -> SyncResult<PathBuf> {
        self.ping()?;
        let path = self.calendar_path(calendar_id);
        let outside_root =
            calendar_id.is_empty() || calendar_id.starts_with('.') || calendar_id.contains(['/', '\\']);
        if outside_root || !path.is_dir() {
            return Err(SyncError::NotFound(format!("calendar '{}'", calendar_id)));
        }
        Ok(path)
    }

    /// Load every readable event file. Unparseable files are skipped, not fatal.
    fn files(&self, calendar_id: &str) -> SyncResult<Vec<EventFile>> {
        let dir = self.existing_calendar(calendar_id)?;

        let mut paths: Vec<PathBuf> = fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|e| e == "ics"))
            .collect();
        paths.sort();

        Ok(paths
            .into_iter()
            .filter_map(|path| match EventFile::load(path) {
                Ok(file) => Some(file),
                Err(e) => {
                    warn!(error = %e, "skipping unreadable event file");
                    None
                }
            })
            .collect())
    }

    fn find(&self, calendar_id: &str, key: &EventKey) -> SyncResult<(EventFile, usize)> {
        self.files(calendar_id)?
            .into_iter()
            .find_map(|file| file.position(key).map(|idx| (file, idx)))
            .ok_or_else(|| SyncError::NotFound(format!("event '{}' in '{}'", key, calendar_id)))
    }

    fn unique_path_for(dir: &Path, event: &Event) -> SyncResult<PathBuf> {
        let base = file_stem_for(event);

        let candidate = dir.join(format!("{}.ics", base));
        if !candidate.exists() {
            return Ok(candidate);
        }

        for n in 2..=MAX_FILE_NAME_SUFFIX {
            let candidate = dir.join(format!("{}-{}.ics", base, n));
            if !candidate.exists() {
                return Ok(candidate);
            }
        }

        Err(SyncError::Rejected(format!(
            "Too many file name collisions for '{}'",
            base
        )))
    }
}

impl CalendarBackend for DirectoryBackend {
    fn ping(&self) -> SyncResult<()> {
        if self.root.is_dir() {
            Ok(())
        } else {
            Err(SyncError::Unreachable(format!(
                "calendar directory {} does not exist",
                self.root.display()
            )))
        }
    }

    fn calendar_info(&self, calendar_id: &str) -> SyncResult<CalendarInfo> {
        self.existing_calendar(calendar_id)?;
        Ok(CalendarInfo {
            id: calendar_id.to_string(),
            display_name: calendar_id.to_string(),
        })
    }

    fn list(&self, calendar_id: &str) -> SyncResult<Vec<Event>> {
        let events: Vec<Event> = self
            .files(calendar_id)?
            .into_iter()
            .flat_map(|file| file.events)
            .collect();
        debug!(calendar = calendar_id, count = events.len(), "listed");
        Ok(events)
    }

    fn create(&self, calendar_id: &str, event: &Event) -> SyncResult<(String, Event)> {
        let dir = self.existing_calendar(calendar_id)?;

        let mut event = event.clone();
        if event.uid.trim().is_empty() {
            event.uid = Uuid::new_v4().to_string();
        }

        let file = EventFile {
            path: Self::unique_path_for(&dir, &event)?,
            events: vec![event],
        };
        file.save()?;

        // Hand back what a later list will see
        let stored = EventFile::load(file.path)?
            .events
            .into_iter()
            .next()
            .ok_or_else(|| SyncError::IcsParse("written file holds no event".into()))?;
        Ok((stored.uid.clone(), stored))
    }

    fn modify(
        &self,
        calendar_id: &str,
        uid: &str,
        recurrence_key: Option<&RecurrenceKey>,
        event: &Event,
    ) -> SyncResult<Event> {
        let key = EventKey::new(uid, recurrence_key.cloned());
        let (mut file, idx) = self.find(calendar_id, &key)?;

        let mut replacement = event.clone();
        replacement.uid = key.uid;
        replacement.recurrence_key = key.recurrence_key;
        file.events[idx] = replacement;
        file.save()?;

        let stored = EventFile::load(file.path)?;
        stored
            .events
            .get(idx)
            .cloned()
            .ok_or_else(|| SyncError::IcsParse("rewritten file lost an event".into()))
    }

    fn delete(
        &self,
        calendar_id: &str,
        uid: &str,
        recurrence_key: Option<&RecurrenceKey>,
    ) -> SyncResult<()> {
        let key = EventKey::new(uid, recurrence_key.cloned());
        let (mut file, idx) = self.find(calendar_id, &key)?;

        file.events.remove(idx);
        if file.events.is_empty() {
            fs::remove_file(&file.path)?;
        } else {
            file.save()?;
        }
        Ok(())
    }

    fn is_writable(&self, calendar_id: &str) -> SyncResult<bool> {
        let dir = self.existing_calendar(calendar_id)?;
        Ok(!fs::metadata(dir)?.permissions().readonly())
    }

    fn has_occurrences(&self, event: &Event) -> bool {
        has_occurrences(event)
    }
}

/// File name for an event: its uid, plus the recurrence key for overrides.
fn file_stem_for(event: &Event) -> String {
    let uid = slugify(&event.uid);
    let uid = if uid.is_empty() { "event".to_string() } else { uid };

    match &event.recurrence_key {
        Some(rid) => format!("{}__{}", uid, slugify(rid.as_str())),
        None => uid,
    }
}

fn slugify(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
        .chars()
        .take(80)
        .collect()
}

fn write_atomic(path: &Path, content: &str) -> SyncResult<()> {
    let tmp = path.with_extension("ics.tmp");
    fs::write(&tmp, content)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
