pub mod clear;
pub mod migrate;
pub mod refresh;
pub mod status;
pub mod sync;
pub mod verify;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context as _, Result};
use busysync_core::{
    DirectoryBackend, Direction, PairId, PassOutcome, PassResult, PreflightCheck, Settings,
    SyncConfig,
};
use owo_colors::OwoColorize;

use crate::render::Render;

pub const EXIT_CLEAN: u8 = 0;
pub const EXIT_WITH_ERRORS: u8 = 1;
pub const EXIT_ABORTED: u8 = 2;

/// Settings merged with command-line overrides.
pub struct Context {
    pub settings: Settings,
    pub settings_path: PathBuf,
    pub calendar_dir: PathBuf,
    pub state_db: PathBuf,
    pub primary: Option<String>,
    pub secondary: Option<String>,
    pub verbose: bool,
}

impl Context {
    pub fn load(
        config: Option<PathBuf>,
        state_db: Option<PathBuf>,
        calendar_dir: Option<PathBuf>,
        primary: Option<String>,
        secondary: Option<String>,
        verbose: bool,
    ) -> Result<Self> {
        let (settings, settings_path) = match config {
            Some(path) => (Settings::load_from(&path)?, path),
            None => (Settings::load()?, Settings::config_path()?),
        };

        let calendar_dir = calendar_dir.unwrap_or_else(|| settings.calendar_path());
        let state_db = match state_db {
            Some(path) => path,
            None => settings.state_db_path()?,
        };
        tracing::debug!(
            config = %settings_path.display(),
            calendar_dir = %calendar_dir.display(),
            state_db = %state_db.display(),
            "loaded settings"
        );

        Ok(Context {
            primary: primary.or_else(|| settings.primary_calendar.clone()),
            secondary: secondary.or_else(|| settings.secondary_calendar.clone()),
            settings,
            settings_path,
            calendar_dir,
            state_db,
            verbose,
        })
    }

    pub fn backend(&self) -> DirectoryBackend {
        DirectoryBackend::new(self.calendar_dir.clone())
    }

    pub fn pair(&self) -> Result<PairId> {
        let backend = self.backend();
        let available = || {
            let ids: Vec<String> = backend.calendars().into_iter().map(|c| c.id).collect();
            if ids.is_empty() {
                format!("No calendars found in {}", self.calendar_dir.display())
            } else {
                format!("Available: {}", ids.join(", "))
            }
        };

        let primary = self
            .primary
            .clone()
            .with_context(|| format!("No primary calendar given (use --primary). {}", available()))?;
        let secondary = self
            .secondary
            .clone()
            .with_context(|| format!("No secondary calendar given (use --secondary). {}", available()))?;

        Ok(PairId::new(primary, secondary))
    }

    pub fn sync_config(&self, direction: Direction, dry_run: bool, keep_reminders: bool) -> Result<SyncConfig> {
        let pair = self.pair()?;
        let mut config = SyncConfig::new(pair.primary, pair.secondary, self.state_db.clone())
            .with_direction(direction)
            .with_dry_run(dry_run);
        config.keep_reminders = keep_reminders || self.settings.keep_reminders;
        config.account_email = self.settings.account_email.clone();
        Ok(config)
    }
}

/// Print the failed checks of an aborted pass.
pub fn print_preflight_failures(checks: &[PreflightCheck]) {
    eprintln!("{}", "Preflight failed, nothing was changed:".red());
    for check in checks.iter().filter(|c| !c.ok) {
        eprintln!("   {}", check.render());
    }
}

/// Print a pass summary and map its outcome to an exit code.
pub fn finish_pass(result: &PassResult, verbose: bool) -> ExitCode {
    println!("{}", result.render());

    if verbose || result.failures.len() <= 10 {
        for failure in &result.failures {
            println!("   {} {}", "!".red(), failure);
        }
    } else {
        println!(
            "   {}",
            format!("({} failed events, rerun with --verbose to list them)", result.failures.len()).dimmed()
        );
    }

    match result.outcome() {
        PassOutcome::Clean => ExitCode::from(EXIT_CLEAN),
        PassOutcome::CompletedWithErrors => ExitCode::from(EXIT_WITH_ERRORS),
        PassOutcome::Interrupted => {
            if let Some(reason) = &result.interrupted {
                eprintln!("{} {}", "Pass interrupted:".red(), reason);
            }
            ExitCode::from(EXIT_ABORTED)
        }
    }
}
