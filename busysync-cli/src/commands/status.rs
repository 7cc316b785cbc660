use std::process::ExitCode;

use anyhow::Result;
use busysync_core::{PairId, PairStatus, StateStore};
use owo_colors::OwoColorize;

use super::{Context, EXIT_CLEAN};
use crate::render::Render;

/// Status of the configured pair, or of every pair in the store when none is configured.
pub fn run(ctx: &Context, json: bool) -> Result<ExitCode> {
    let store = StateStore::open(&ctx.state_db)?;

    let pairs: Vec<PairId> = match (&ctx.primary, &ctx.secondary) {
        (Some(primary), Some(secondary)) => vec![PairId::new(primary.clone(), secondary.clone())],
        _ => store.pair_ids()?,
    };

    let statuses = pairs
        .iter()
        .map(|pair| store.status(pair))
        .collect::<Result<Vec<PairStatus>, _>>()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&statuses)?);
        return Ok(ExitCode::from(EXIT_CLEAN));
    }

    if statuses.is_empty() {
        println!("{}", "No calendar pairs tracked yet".dimmed());
        return Ok(ExitCode::from(EXIT_CLEAN));
    }

    for (i, status) in statuses.iter().enumerate() {
        println!("{}", status.render());

        // Add spacing between pairs (but not after the last one)
        if i < statuses.len() - 1 {
            println!();
        }
    }

    Ok(ExitCode::from(EXIT_CLEAN))
}
