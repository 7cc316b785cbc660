//! Terminal rendering for busysync-core types.
//!
//! Extension traits that add colored output to core types using owo_colors.

use busysync_core::sync::ChangeKind;
use busysync_core::{
    ClearResult, Direction, MigrateResult, PairStatus, PassResult, PreflightCheck, SyncConfig,
    VerifyReport,
};
use chrono::Local;
use owo_colors::OwoColorize;

pub trait Render {
    fn render(&self) -> String;
}

impl Render for ChangeKind {
    fn render(&self) -> String {
        let symbol = self.symbol();
        match self {
            ChangeKind::Added => symbol.green().to_string(),
            ChangeKind::Modified => symbol.yellow().to_string(),
            ChangeKind::Deleted => symbol.red().to_string(),
        }
    }
}

impl Render for SyncConfig {
    fn render(&self) -> String {
        let arrow = match self.direction {
            Direction::Both => "<->",
            Direction::ToSecondary => "->",
            Direction::ToPrimary => "<-",
        };
        format!(
            "📅 {} {} {}",
            self.primary_calendar.bold(),
            arrow.dimmed(),
            self.secondary_calendar.bold()
        )
    }
}

impl Render for PassResult {
    fn render(&self) -> String {
        if self.changes() == 0 && self.errors == 0 {
            let line = format!("   No changes ({} skipped)", self.skipped);
            return line.dimmed().to_string();
        }

        let mut lines = Vec::new();
        for (kind, count, label) in [
            (ChangeKind::Added, self.added, "added"),
            (ChangeKind::Modified, self.modified, "modified"),
            (ChangeKind::Deleted, self.deleted, "deleted"),
        ] {
            if count > 0 {
                lines.push(format!("   {} {} {}", kind.render(), count, label));
            }
        }
        if self.errors > 0 {
            let label = format!("{} {}", self.errors, pluralize("error", self.errors));
            lines.push(format!("   {} {}", "!".red(), label.red()));
        }
        if self.skipped > 0 {
            lines.push(format!("   {}", format!("{} skipped", self.skipped).dimmed()));
        }

        lines.join("\n")
    }
}

impl Render for ClearResult {
    fn render(&self) -> String {
        let verb = if self.dry_run { "Would delete" } else { "Deleted" };
        let mut line = format!(
            "{} {} mirrored {} ({} primary, {} secondary) and {} {}",
            verb,
            self.events_deleted(),
            pluralize("event", self.events_deleted()),
            self.primary_deleted,
            self.secondary_deleted,
            self.records_removed,
            pluralize("record", self.records_removed),
        );
        if self.errors > 0 {
            line.push_str(&format!(", {}", format!("{} failed", self.errors).red()));
        }
        line
    }
}

impl Render for PairStatus {
    fn render(&self) -> String {
        let last = self
            .last_synced_at
            .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "never".to_string());

        [
            format!("📅 {}", self.pair.to_string().bold()),
            format!(
                "   {} {} ({} from primary, {} from secondary)",
                self.total(),
                pluralize("record", self.total()),
                self.primary_authority,
                self.secondary_authority
            ),
            format!("   {}", format!("Last synced: {}", last).dimmed()),
        ]
        .join("\n")
    }
}

impl Render for VerifyReport {
    fn render(&self) -> String {
        if self.is_consistent() {
            return format!("   {} {} healthy", "✓".green(), self.healthy);
        }

        let mut lines = vec![format!("   {} {} healthy", "✓".green(), self.healthy)];
        for (count, label) in [
            (self.missing_source, "with a missing source"),
            (self.missing_mirror, "with a missing mirror"),
            (self.untracked_managed, "untracked mirrored events"),
        ] {
            if count > 0 {
                lines.push(format!("   {} {} {}", "✗".red(), count, label));
            }
        }
        lines.push(format!("   {}", "Run `busysync sync` to repair".dimmed()));
        lines.join("\n")
    }
}

impl Render for PreflightCheck {
    fn render(&self) -> String {
        let mark = if self.ok { "✓".green().to_string() } else { "✗".red().to_string() };
        let mut line = format!("{} {}: {}", mark, self.name.bold(), self.detail);
        if let Some(hint) = &self.remedy_hint {
            line.push_str(&format!("\n     {}", hint.dimmed()));
        }
        line
    }
}

impl Render for MigrateResult {
    fn render(&self) -> String {
        let verb = if self.dry_run { "Would update" } else { "Updated" };
        format!(
            "{} {} {} ({} primary, {} secondary)",
            verb,
            self.total(),
            pluralize("record", self.total()),
            self.primary_rows,
            self.secondary_rows
        )
    }
}

/// Simple pluralization helper
fn pluralize(word: &str, count: usize) -> String {
    if count == 1 {
        word.to_string()
    } else {
        format!("{}s", word)
    }
}
