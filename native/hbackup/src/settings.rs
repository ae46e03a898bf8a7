use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, ensure};
use tracing::{debug, info, instrument};

use crate::models::Settings;

const SETTINGS_FILE_NAME: &str = "settings.json";

/// Default settings file location: `<config dir>/hbackup/settings.json`
pub fn default_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("hbackup").join(SETTINGS_FILE_NAME))
}

/// Loads settings from `explicit_path`, or from the default location when it exists.
///
/// An explicitly given file must exist. Without one, a missing default file yields defaults.
#[instrument(level = "debug")]
pub fn load_settings(explicit_path: Option<&Path>) -> Result<Settings> {
    let path = match explicit_path {
        Some(path) => path.to_path_buf(),
        None => match default_settings_path() {
            Some(path) if path.exists() => path,
            Some(path) => {
                info!(path = %path.display(), "Settings file doesn't exist, using defaults");
                return Ok(Settings::default());
            }
            None => {
                debug!("No config directory available, using defaults");
                return Ok(Settings::default());
            }
        },
    };
    read_settings_file(&path)
}

fn read_settings_file(path: &Path) -> Result<Settings> {
    info!(path = %path.display(), "Loading settings from file");
    let file_content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings file {}", path.display()))?;

    let settings: Settings =
        serde_json::from_str(&file_content).context("Failed to parse settings file")?;
    validate(&settings)?;

    debug!(?settings, "Loaded settings successfully");
    Ok(settings)
}

fn validate(settings: &Settings) -> Result<()> {
    ensure!(
        settings.remote_dir.starts_with('/'),
        "remote_dir must be an absolute device path, got '{}'",
        settings.remote_dir
    );
    Ok(())
}
