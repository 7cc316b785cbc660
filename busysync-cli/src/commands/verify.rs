use std::process::ExitCode;

use anyhow::Result;
use busysync_core::{Direction, Engine};

use super::{Context, EXIT_CLEAN, EXIT_WITH_ERRORS};
use crate::render::Render;
use crate::utils::tui;

pub fn run(ctx: &Context) -> Result<ExitCode> {
    let config = ctx.sync_config(Direction::Both, true, false)?;
    let backend = ctx.backend();
    let engine = Engine::new(config, &backend, &backend);

    println!("{}", engine.config().render());

    let spinner = tui::create_spinner("Verifying".to_string());
    let report = engine.verify();
    spinner.finish_and_clear();

    let report = report?;
    println!("{}", report.render());

    Ok(ExitCode::from(if report.is_consistent() {
        EXIT_CLEAN
    } else {
        EXIT_WITH_ERRORS
    }))
}
