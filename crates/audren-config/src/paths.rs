//! Platform-specific configuration locations.
//!
//! - **User config**: `~/.config/audren/` (Linux), `~/Library/Application Support/audren/` (macOS), `%APPDATA%\audren\` (Windows)
//! - **Scenarios**: `<user config>/scenarios/`

use std::path::{Path, PathBuf};

use crate::error::{ConfigError, Result};

/// Application name used for directory paths.
const APP_NAME: &str = "audren";

/// File name of the engine configuration.
const CONFIG_FILE: &str = "engine.toml";

/// Subdirectory name for scenarios.
const SCENARIOS_SUBDIR: &str = "scenarios";

/// Returns the user-specific configuration directory.
///
/// Returns a relative fallback if the platform directory cannot be determined.
pub fn user_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Path of the default engine configuration file.
pub fn default_config_path() -> PathBuf {
    user_config_dir().join(CONFIG_FILE)
}

/// Returns the user scenarios directory.
pub fn user_scenarios_dir() -> PathBuf {
    user_config_dir().join(SCENARIOS_SUBDIR)
}

/// Ensure the user config directory exists.
///
/// # Errors
///
/// Returns an error if the directory cannot be created.
pub fn ensure_user_config_dir() -> Result<PathBuf> {
    let dir = user_config_dir();
    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| ConfigError::create_dir(&dir, e))?;
    }
    Ok(dir)
}

/// Resolves a scenario by path or by name.
///
/// An existing file path wins; otherwise `name` (with `.toml` appended if
/// missing) is looked up in `search_dir`.
pub fn find_scenario_in(name: &str, search_dir: &Path) -> Option<PathBuf> {
    let path = PathBuf::from(name);
    if path.is_file() {
        return Some(path);
    }
    let file_name = if name.ends_with(".toml") {
        name.to_string()
    } else {
        format!("{name}.toml")
    };
    let candidate = search_dir.join(file_name);
    candidate.is_file().then_some(candidate)
}

/// Resolves a scenario by path, or by name in [`user_scenarios_dir`].
pub fn find_scenario(name: &str) -> Option<PathBuf> {
    find_scenario_in(name, &user_scenarios_dir())
}
