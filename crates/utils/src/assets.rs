use std::path::PathBuf;

use directories::ProjectDirs;

/// Per-user configuration directory for the workshop client
/// (`~/.config/workshop` on Linux, `~/Library/Application Support/...` on macOS).
pub fn config_dir() -> Option<PathBuf> {
    ProjectDirs::from("com", "workshop", "workshop").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Location of the persisted credential map.
pub fn credentials_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("credentials.json"))
}
