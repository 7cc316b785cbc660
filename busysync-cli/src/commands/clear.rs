use std::process::ExitCode;

use anyhow::Result;
use busysync_core::{Direction, Engine, SyncError};
use dialoguer::Confirm;
use owo_colors::OwoColorize;

use super::{Context, EXIT_ABORTED, EXIT_CLEAN, EXIT_WITH_ERRORS, print_preflight_failures};
use crate::render::Render;
use crate::utils::tui;

pub fn run(ctx: &Context, direction: Direction, dry_run: bool, yes: bool) -> Result<ExitCode> {
    let config = ctx.sync_config(direction, dry_run, false)?;
    let backend = ctx.backend();
    let engine = Engine::new(config, &backend, &backend);

    println!("{}", engine.config().render());

    if !yes && !dry_run {
        let confirmed = Confirm::new()
            .with_prompt("Delete every mirrored event of this pair and forget its state?")
            .default(false)
            .interact()?;

        if !confirmed {
            println!("{}", "Cancelled".dimmed());
            return Ok(ExitCode::from(EXIT_CLEAN));
        }
    }

    let spinner = tui::create_spinner("Clearing".to_string());
    let result = engine.clear();
    spinner.finish_and_clear();

    match result {
        Ok(result) => {
            println!("{}", result.render());
            Ok(ExitCode::from(if result.errors > 0 {
                EXIT_WITH_ERRORS
            } else {
                EXIT_CLEAN
            }))
        }
        Err(SyncError::Aborted(checks)) => {
            print_preflight_failures(&checks);
            Ok(ExitCode::from(EXIT_ABORTED))
        }
        Err(e) => Err(e.into()),
    }
}
