//! Configuration loading and root folder resolution

use crate::{Error, Result};
use std::path::{Path, PathBuf};

/// Database file name inside the root folder
pub const DATABASE_FILE: &str = "ltrk.db";

/// Resolve the service root folder, in priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable (`LTRK_ROOT_FOLDER`)
/// 3. TOML config file (`root_folder` key)
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(cli_arg: Option<&str>, env_var_name: &str) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return PathBuf::from(path);
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: TOML config file
    if let Ok(config_path) = locate_config_file() {
        if let Ok(toml_content) = std::fs::read_to_string(&config_path) {
            if let Ok(config) = toml::from_str::<toml::Value>(&toml_content) {
                if let Some(root_folder) = config.get("root_folder").and_then(|v| v.as_str()) {
                    return PathBuf::from(root_folder);
                }
            }
        }
    }

    // Priority 4: OS-dependent compiled default
    default_root_folder()
}

/// Create the root folder if it does not exist yet
pub fn ensure_root_folder(root: &Path) -> Result<()> {
    if !root.exists() {
        std::fs::create_dir_all(root)?;
    }
    if !root.is_dir() {
        return Err(Error::Config(format!(
            "Root folder path is not a directory: {}",
            root.display()
        )));
    }
    Ok(())
}

/// Database file path inside a root folder
pub fn database_path(root: &Path) -> PathBuf {
    root.join(DATABASE_FILE)
}

/// Get default configuration file path for the platform
fn locate_config_file() -> Result<PathBuf> {
    let config_dir = if cfg!(target_os = "linux") {
        // Try ~/.config/ltrk/config.toml first, then /etc/ltrk/config.toml
        let user_config = dirs::config_dir().map(|d| d.join("ltrk").join("config.toml"));
        let system_config = PathBuf::from("/etc/ltrk/config.toml");

        if let Some(path) = user_config {
            if path.exists() {
                return Ok(path);
            }
        }
        if system_config.exists() {
            return Ok(system_config);
        }
        return Err(Error::Config("No config file found".to_string()));
    } else {
        dirs::config_dir()
            .map(|d| d.join("ltrk").join("config.toml"))
            .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))?
    };

    if config_dir.exists() {
        Ok(config_dir)
    } else {
        Err(Error::Config(format!(
            "Config file not found: {:?}",
            config_dir
        )))
    }
}

/// Get OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/ltrk (or /var/lib/ltrk for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("ltrk"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/ltrk"))
    } else if cfg!(target_os = "macos") {
        // ~/Library/Application Support/ltrk
        dirs::data_dir()
            .map(|d| d.join("ltrk"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/ltrk"))
    } else if cfg!(target_os = "windows") {
        // %LOCALAPPDATA%\ltrk
        dirs::data_local_dir()
            .map(|d| d.join("ltrk"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\ltrk"))
    } else {
        PathBuf::from("./ltrk_data")
    }
}
