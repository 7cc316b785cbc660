//! Checks run before a pass touches anything.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::backend::CalendarBackend;
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::store::StateStore;

const PROBE_FILE: &str = ".busysync-probe";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreflightCheck {
    pub name: String,
    pub ok: bool,
    pub detail: String,
    pub remedy_hint: Option<String>,
}

impl PreflightCheck {
    fn pass(name: impl Into<String>, detail: impl Into<String>) -> Self {
        PreflightCheck {
            name: name.into(),
            ok: true,
            detail: detail.into(),
            remedy_hint: None,
        }
    }

    fn fail(name: impl Into<String>, detail: impl Into<String>, hint: impl Into<String>) -> Self {
        PreflightCheck {
            name: name.into(),
            ok: false,
            detail: detail.into(),
            remedy_hint: Some(hint.into()),
        }
    }
}

pub fn all_passed(checks: &[PreflightCheck]) -> bool {
    checks.iter().all(|c| c.ok)
}

/// Run every check for `config`. Failing checks do not stop later ones, so the
/// caller sees the full picture at once.
pub fn run_checks(
    config: &SyncConfig,
    primary: &dyn CalendarBackend,
    secondary: &dyn CalendarBackend,
) -> Vec<PreflightCheck> {
    let sides = [
        ("primary", &config.primary_calendar, primary, config.direction.writes_primary()),
        ("secondary", &config.secondary_calendar, secondary, config.direction.writes_secondary()),
    ];

    let mut checks = Vec::new();

    for (side, calendar_id, backend, needs_write) in sides {
        checks.push(check_service(side, backend));
        let resolved = check_calendar(side, calendar_id, backend);
        let resolvable = resolved.ok;
        checks.push(resolved);
        if resolvable {
            checks.push(check_connect(calendar_id, backend, needs_write));
        }
    }

    checks.push(check_store_access(&config.state_db));

    for check in &checks {
        if check.ok {
            debug!(check = %check.name, detail = %check.detail, "preflight ok");
        } else {
            warn!(check = %check.name, detail = %check.detail, "preflight failed");
        }
    }

    checks
}

fn check_service(side: &str, backend: &dyn CalendarBackend) -> PreflightCheck {
    let name = format!("service:{}", side);
    match backend.ping() {
        Ok(()) => PreflightCheck::pass(name, "Calendar service reachable"),
        Err(e) => PreflightCheck::fail(
            name,
            e.to_string(),
            "Make sure the calendar service is running and you are signed in",
        ),
    }
}

fn check_calendar(side: &str, calendar_id: &str, backend: &dyn CalendarBackend) -> PreflightCheck {
    let name = format!("calendar:{}", calendar_id);
    match backend.calendar_info(calendar_id) {
        Ok(info) => PreflightCheck::pass(name, format!("{} calendar '{}'", side, info.display_name)),
        Err(SyncError::NotFound(_)) => PreflightCheck::fail(
            name,
            format!("No {} calendar with id '{}'", side, calendar_id),
            "Check the calendar id; if it changed, run `busysync migrate` to repoint stored records",
        ),
        Err(e) => PreflightCheck::fail(
            name,
            e.to_string(),
            "Make sure the calendar service is running",
        ),
    }
}

fn check_connect(calendar_id: &str, backend: &dyn CalendarBackend, needs_write: bool) -> PreflightCheck {
    let name = format!("connect:{}", calendar_id);
    match backend.is_writable(calendar_id) {
        Ok(true) => PreflightCheck::pass(name, "Connected, writable"),
        Ok(false) if needs_write => PreflightCheck::fail(
            name,
            "Calendar is read-only",
            "Choose a writable calendar or sync in the other direction only",
        ),
        Ok(false) => PreflightCheck::pass(name, "Connected, read-only"),
        Err(e) => PreflightCheck::fail(
            name,
            e.to_string(),
            "Check that the calendar account is online",
        ),
    }
}

fn check_store_access(state_db: &Path) -> PreflightCheck {
    let name = "state-store";
    let dir = match state_db.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(dir) => dir,
        None => Path::new("."),
    };

    let probe = || -> std::io::Result<()> {
        std::fs::create_dir_all(dir)?;
        let probe = dir.join(PROBE_FILE);
        std::fs::write(&probe, b"ok")?;
        std::fs::read(&probe)?;
        std::fs::remove_file(&probe)
    };

    if let Err(e) = probe() {
        return PreflightCheck::fail(
            name,
            format!("Cannot read and write {}: {}", dir.display(), e),
            "Fix the directory permissions or pass a different --state-db",
        );
    }

    match StateStore::open(state_db).and_then(|store| store.pair_ids()) {
        Ok(_) => PreflightCheck::pass(name, format!("{} is accessible", state_db.display())),
        Err(e) => PreflightCheck::fail(
            name,
            e.to_string(),
            "The state database may be locked by another run or corrupted",
        ),
    }
}
