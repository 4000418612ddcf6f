//! Layered settings: built-in defaults, then a TOML file, then environment
//!
//! # Sources
//!
//! - `$AGENTWATCH_CONFIG` (must exist when set), otherwise
//!   `<platform config dir>/config.toml` (optional)
//! - `AGENTWATCH__<SECTION>__<KEY>` variables, e.g.
//!   `AGENTWATCH__REPOS__FAST_REFRESH_SECS=1` or
//!   `AGENTWATCH__REPOS__ROOTS=~/code,~/work`

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

use agentwatch_core::application::constants::DEFAULT_LOG_DIR_NAME;
use agentwatch_core::config::MonitorConfig;

pub const CONFIG_PATH_VAR: &str = "AGENTWATCH_CONFIG";
const ENV_PREFIX: &str = "AGENTWATCH";

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("dev", "agentwatch", "agentwatch")
}

/// Config file to read and whether its absence is an error
pub fn config_file() -> Option<(PathBuf, bool)> {
    if let Ok(explicit) = std::env::var(CONFIG_PATH_VAR) {
        return Some((expand(Path::new(&explicit)), true));
    }
    project_dirs().map(|dirs| (dirs.config_dir().join("config.toml"), false))
}

/// Load settings from the standard locations
pub fn load() -> Result<MonitorConfig> {
    let file = config_file();
    load_from(file.as_ref().map(|(p, required)| (p.as_path(), *required)), ENV_PREFIX)
}

/// Load settings from an optional file and an env prefix, then resolve paths
pub fn load_from(file: Option<(&Path, bool)>, env_prefix: &str) -> Result<MonitorConfig> {
    let mut builder = Config::builder();
    if let Some((path, required)) = file {
        builder = builder.add_source(
            File::from(path)
                .format(FileFormat::Toml)
                .required(required),
        );
    }
    builder = builder.add_source(
        Environment::with_prefix(env_prefix)
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("repos.roots")
            .with_list_parse_key("repos.ignore_dirs"),
    );

    let mut monitor: MonitorConfig = builder
        .build()
        .context("Failed to read settings")?
        .try_deserialize()
        .context("Invalid settings")?;

    resolve_paths(&mut monitor);
    Ok(monitor)
}

/// Expand `~` in roots and the log directory; fill in the default log directory
fn resolve_paths(monitor: &mut MonitorConfig) {
    monitor.repos.roots = monitor.repos.roots.iter().map(|p| expand(p)).collect();
    monitor.logger.log_dir = match monitor.logger.log_dir.take() {
        Some(dir) => Some(expand(&dir)),
        None => Some(default_log_dir()),
    };
}

fn default_log_dir() -> PathBuf {
    match project_dirs() {
        Some(dirs) => dirs.data_dir().join(DEFAULT_LOG_DIR_NAME),
        None => expand(Path::new("~/.agentwatch")).join(DEFAULT_LOG_DIR_NAME),
    }
}

fn expand(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned())
}
