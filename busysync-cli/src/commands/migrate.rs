use std::process::ExitCode;

use anyhow::{Result, bail};
use busysync_core::{CalendarBackend, MigrateScope, StateStore};
use owo_colors::OwoColorize;

use super::{Context, EXIT_CLEAN, EXIT_WITH_ERRORS};
use crate::render::Render;

pub fn run(ctx: &Context, old: &str, new: &str, scope: MigrateScope, dry_run: bool) -> Result<ExitCode> {
    if old == new {
        bail!("--old and --new both name '{}'", old);
    }

    let backend = ctx.backend();
    if backend.calendar_info(new).is_err() {
        println!(
            "{}",
            format!("Warning: no calendar '{}' in {}", new, ctx.calendar_dir.display()).yellow()
        );
    }

    let result = busysync_core::migrate(&ctx.state_db, old, new, scope, dry_run)?;
    println!("{}", result.render());

    if dry_run || result.total() == 0 {
        return Ok(ExitCode::from(EXIT_CLEAN));
    }

    // Keep the config file pointing at the same calendars as the store
    let mut settings = ctx.settings.clone();
    let mut changed = false;
    for id in [&mut settings.primary_calendar, &mut settings.secondary_calendar]
        .into_iter()
        .flatten()
    {
        if *id == old {
            *id = new.to_string();
            changed = true;
        }
    }
    if changed {
        settings.save(&ctx.settings_path)?;
        println!("{}", format!("Updated {}", ctx.settings_path.display()).dimmed());
    }

    Ok(ExitCode::from(EXIT_CLEAN))
}

/// List every calendar id the store references and whether it still resolves.
pub fn audit(ctx: &Context) -> Result<ExitCode> {
    let store = StateStore::open(&ctx.state_db)?;
    let backend = ctx.backend();
    let ids = store.calendar_ids()?;

    if ids.is_empty() {
        println!("{}", "No calendars referenced by the state store".dimmed());
        return Ok(ExitCode::from(EXIT_CLEAN));
    }

    let mut missing = 0;
    for id in &ids {
        if backend.calendar_info(id).is_ok() {
            println!("   {} {}", "✓".green(), id);
        } else {
            missing += 1;
            println!("   {} {} {}", "✗".red(), id, "(not found)".dimmed());
        }
    }

    if missing > 0 {
        println!();
        println!(
            "{}",
            "Repoint missing ids with: busysync migrate --old <id> --new <id>".dimmed()
        );
        return Ok(ExitCode::from(EXIT_WITH_ERRORS));
    }

    Ok(ExitCode::from(EXIT_CLEAN))
}
