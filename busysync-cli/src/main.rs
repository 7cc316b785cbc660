mod commands;
mod render;
mod utils;

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use busysync_core::{Direction, MigrateScope};
use clap::{Args, Parser, Subcommand, ValueEnum};
use owo_colors::OwoColorize;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::commands::Context;

#[derive(Parser)]
#[command(name = "busysync")]
#[command(about = "Mirror busy time between a primary and a secondary calendar")]
#[command(version)]
struct Cli {
    /// Config file (defaults to ~/.config/busysync/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// State database path
    #[arg(long, global = true)]
    state_db: Option<PathBuf>,

    /// Directory holding one sub-directory per calendar
    #[arg(long, global = true)]
    calendar_dir: Option<PathBuf>,

    /// Primary calendar id
    #[arg(short, long, global = true)]
    primary: Option<String>,

    /// Secondary calendar id
    #[arg(short, long, global = true)]
    secondary: Option<String>,

    /// Show debug logs and every planned change
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone, Copy)]
struct DirectionArgs {
    /// Only mirror primary events onto the secondary calendar
    #[arg(long, conflicts_with = "to_primary")]
    to_secondary: bool,

    /// Only mirror secondary events onto the primary calendar
    #[arg(long)]
    to_primary: bool,
}

impl DirectionArgs {
    fn direction(&self) -> Direction {
        match (self.to_secondary, self.to_primary) {
            (true, _) => Direction::ToSecondary,
            (_, true) => Direction::ToPrimary,
            _ => Direction::Both,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ScopeArg {
    Primary,
    Secondary,
    Any,
}

impl From<ScopeArg> for MigrateScope {
    fn from(scope: ScopeArg) -> Self {
        match scope {
            ScopeArg::Primary => MigrateScope::Primary,
            ScopeArg::Secondary => MigrateScope::Secondary,
            ScopeArg::Any => MigrateScope::Any,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run one reconciliation pass
    Sync {
        #[command(flatten)]
        direction: DirectionArgs,

        /// Log what would change without writing anything
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Copy reminders onto mirrored events
        #[arg(long)]
        keep_reminders: bool,
    },
    /// Remove every mirror of the pair, then sync from scratch
    Refresh {
        #[command(flatten)]
        direction: DirectionArgs,

        #[arg(short = 'n', long)]
        dry_run: bool,

        #[arg(long)]
        keep_reminders: bool,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Remove every mirror of the pair and forget its state
    Clear {
        #[command(flatten)]
        direction: DirectionArgs,

        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Repoint stored records after a calendar id changed
    Migrate {
        /// Calendar id to replace (omit to list the ids in the store)
        #[arg(long, requires = "new")]
        old: Option<String>,

        /// Calendar id to use instead
        #[arg(long, requires = "old")]
        new: Option<String>,

        /// Which side of each record to rewrite
        #[arg(long, value_enum, default_value = "any")]
        scope: ScopeArg,

        #[arg(short = 'n', long)]
        dry_run: bool,
    },
    /// Show tracked record counts
    Status {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Check the store against both calendars
    Verify,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red(), e);
            ExitCode::from(commands::EXIT_ABORTED)
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let ctx = Context::load(
        cli.config,
        cli.state_db,
        cli.calendar_dir,
        cli.primary,
        cli.secondary,
        cli.verbose,
    )?;

    match cli.command {
        Commands::Sync {
            direction,
            dry_run,
            keep_reminders,
        } => commands::sync::run(&ctx, direction.direction(), dry_run, keep_reminders),
        Commands::Refresh {
            direction,
            dry_run,
            keep_reminders,
            yes,
        } => commands::refresh::run(&ctx, direction.direction(), dry_run, keep_reminders, yes),
        Commands::Clear {
            direction,
            dry_run,
            yes,
        } => commands::clear::run(&ctx, direction.direction(), dry_run, yes),
        Commands::Migrate {
            old,
            new,
            scope,
            dry_run,
        } => match (old, new) {
            (Some(old), Some(new)) => commands::migrate::run(&ctx, &old, &new, scope.into(), dry_run),
            _ => commands::migrate::audit(&ctx),
        },
        Commands::Status { json } => commands::status::run(&ctx, json),
        Commands::Verify => commands::verify::run(&ctx),
    }
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("BUSYSYNC_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose {
            "busysync=debug,busysync_core=debug,warn"
        } else {
            "busysync=info,busysync_core=info,warn"
        })
    });

    let format = env::var("BUSYSYNC_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}
