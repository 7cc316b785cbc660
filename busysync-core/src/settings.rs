//! File configuration at `~/.config/busysync/config.toml`.
//!
//! Everything here is a default for the command line; flags win.

use std::path::{Path, PathBuf};

use ::config::{Config, File};
use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};

static DEFAULT_CALENDAR_DIR: &str = "~/calendar";

fn default_calendar_dir() -> PathBuf {
    PathBuf::from(DEFAULT_CALENDAR_DIR)
}

fn is_default_calendar_dir(p: &PathBuf) -> bool {
    *p == default_calendar_dir()
}

fn is_false(b: &bool) -> bool {
    !*b
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_calendar_dir", skip_serializing_if = "is_default_calendar_dir")]
    pub calendar_dir: PathBuf,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_db: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_calendar: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_calendar: Option<String>,

    /// Invitations this address declined are not mirrored
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_email: Option<String>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub keep_reminders: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            calendar_dir: default_calendar_dir(),
            state_db: None,
            primary_calendar: None,
            secondary_calendar: None,
            account_email: None,
            keep_reminders: false,
        }
    }
}

impl Settings {
    pub fn config_path() -> SyncResult<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| SyncError::Config("Could not determine config directory".into()))?
            .join("busysync");

        Ok(config_dir.join("config.toml"))
    }

    /// Load the default config file, writing a commented template on first use.
    pub fn load() -> SyncResult<Self> {
        let path = Self::config_path()?;
        if !path.exists() {
            Self::create_default_config(&path)?;
        }
        Self::load_from(&path)
    }

    /// Load `path`; a missing file yields the defaults.
    pub fn load_from(path: &Path) -> SyncResult<Self> {
        Config::builder()
            .add_source(File::from(path.to_path_buf()).required(false))
            .build()
            .map_err(|e| SyncError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| SyncError::Config(e.to_string()))
    }

    pub fn save(&self, path: &Path) -> SyncResult<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| SyncError::Config(e.to_string()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)
            .map_err(|e| SyncError::Config(format!("Could not write config file: {e}")))?;

        Ok(())
    }

    /// Create a config file with every option commented out.
    pub fn create_default_config(path: &Path) -> SyncResult<()> {
        let contents = format!(
            "\
# busysync configuration

# Where calendar directories live:
# calendar_dir = \"{}\"

# State database (defaults to the platform data directory):
# state_db = \"~/.local/share/busysync/state.db\"

# The calendar pair to mirror:
# primary_calendar = \"work\"
# secondary_calendar = \"personal\"

# Skip invitations this address declined:
# account_email = \"me@example.com\"

# Copy reminders onto mirrored events:
# keep_reminders = false
",
            DEFAULT_CALENDAR_DIR
        );

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                SyncError::Config(format!("Could not create config directory: {e}"))
            })?;
        }

        std::fs::write(path, contents)
            .map_err(|e| SyncError::Config(format!("Could not write config file: {e}")))?;

        Ok(())
    }

    /// `calendar_dir` with `~` expanded.
    pub fn calendar_path(&self) -> PathBuf {
        expand(&self.calendar_dir)
    }

    /// The configured state database, or `<data_dir>/busysync/state.db`.
    pub fn state_db_path(&self) -> SyncResult<PathBuf> {
        if let Some(path) = &self.state_db {
            return Ok(expand(path));
        }

        let data_dir = dirs::data_dir()
            .ok_or_else(|| SyncError::Config("Could not determine data directory".into()))?;
        Ok(data_dir.join("busysync").join("state.db"))
    }
}

fn expand(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");
        let settings = Settings::load_from(&dir.path().join("config.toml")).expect("load");
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_commented_template_gives_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("nested").join("config.toml");

        Settings::create_default_config(&path).expect("create");
        assert_eq!(Settings::load_from(&path).expect("load"), Settings::default());
    }

    #[test]
    fn test_values_are_read() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "calendar_dir = \"/srv/calendars\"\n\
             primary_calendar = \"work\"\n\
             secondary_calendar = \"personal\"\n\
             account_email = \"me@example.com\"\n\
             keep_reminders = true\n",
        )
        .expect("write");

        let settings = Settings::load_from(&path).expect("load");
        assert_eq!(settings.calendar_path(), PathBuf::from("/srv/calendars"));
        assert_eq!(settings.primary_calendar.as_deref(), Some("work"));
        assert_eq!(settings.secondary_calendar.as_deref(), Some("personal"));
        assert_eq!(settings.account_email.as_deref(), Some("me@example.com"));
        assert!(settings.keep_reminders);
    }

    #[test]
    fn test_saved_settings_load_back() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("config.toml");
        let settings = Settings {
            primary_calendar: Some("work-2026".into()),
            state_db: Some(PathBuf::from("/var/lib/busysync/state.db")),
            ..Settings::default()
        };

        settings.save(&path).expect("save");
        let loaded = Settings::load_from(&path).expect("load");
        assert_eq!(loaded, settings);
        assert_eq!(
            loaded.state_db_path().expect("path"),
            PathBuf::from("/var/lib/busysync/state.db")
        );
    }
}
