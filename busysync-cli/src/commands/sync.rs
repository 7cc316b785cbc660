use std::process::ExitCode;

use anyhow::Result;
use busysync_core::{Direction, Engine, SyncError};
use owo_colors::OwoColorize;

use super::{Context, EXIT_ABORTED, finish_pass, print_preflight_failures};
use crate::render::Render;
use crate::utils::tui;

pub fn run(ctx: &Context, direction: Direction, dry_run: bool, keep_reminders: bool) -> Result<ExitCode> {
    let config = ctx.sync_config(direction, dry_run, keep_reminders)?;
    let backend = ctx.backend();
    let engine = Engine::new(config, &backend, &backend);

    println!("{}", engine.config().render());

    let spinner = tui::create_spinner("Syncing".to_string());
    let result = engine.run_pass();
    spinner.finish_and_clear();

    match result {
        Ok(result) => {
            if result.dry_run {
                println!("{}", "Dry run, nothing was written".dimmed());
            }
            Ok(finish_pass(&result, ctx.verbose))
        }
        Err(SyncError::Aborted(checks)) => {
            print_preflight_failures(&checks);
            Ok(ExitCode::from(EXIT_ABORTED))
        }
        Err(e) => Err(e.into()),
    }
}
