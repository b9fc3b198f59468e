use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

use super::AppConfig;

const APP_NAME: &str = "PaperTrail";
const CONFIG_FILE: &str = "config.json";

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "papertrail", APP_NAME)
}

/// Returns the platform-specific configuration directory for the application.
pub fn get_config_directory() -> Option<PathBuf> {
    project_dirs().map(|proj_dirs| proj_dirs.config_dir().to_path_buf())
}

/// Returns the default directory of the key-value store.
pub fn get_data_directory() -> Option<PathBuf> {
    project_dirs().map(|proj_dirs| proj_dirs.data_dir().join(APP_NAME))
}

fn resolve_config_dir(override_dir: Option<&Path>) -> Result<PathBuf> {
    match override_dir {
        Some(dir) => Ok(dir.to_path_buf()),
        None => get_config_directory()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory")),
    }
}

/// Loads the configuration from `override_dir` or the platform config directory.
///
/// A missing file is created with defaults. A file that cannot be parsed is
/// migrated field by field, and replaced by the defaults if that fails too.
pub fn load_config(override_dir: Option<&Path>) -> Result<AppConfig> {
    let config_path = resolve_config_dir(override_dir)?.join(CONFIG_FILE);

    if !config_path.exists() {
        tracing::info!(
            "Config file not found, creating default config at {:?}",
            config_path
        );
        let default_config = AppConfig::default();
        save_config(&default_config, override_dir)?;
        return Ok(default_config);
    }

    let config_content = fs::read_to_string(&config_path)
        .with_context(|| format!("Failed to read {:?}", config_path))?;

    match serde_json::from_str::<AppConfig>(&config_content) {
        Ok(config) => {
            tracing::info!("Loaded config from {:?}", config_path);
            Ok(config)
        }
        Err(e) => {
            tracing::warn!(
                "Failed to parse config file at {:?}: {}. Falling back to default config.",
                config_path,
                e
            );
            migrate_legacy_config(&config_content).or_else(|_| Ok(AppConfig::default()))
        }
    }
}

/// Fills in fields that older config files lack or hold as `null`.
fn migrate_legacy_config(config_content: &str) -> Result<AppConfig> {
    let value: Value = serde_json::from_str(config_content)?;
    let obj = value
        .as_object()
        .ok_or_else(|| anyhow::anyhow!("Config is not a JSON object"))?;

    let Value::Object(mut merged) = serde_json::to_value(AppConfig::default())? else {
        anyhow::bail!("Default config did not serialize to an object");
    };
    for (key, val) in obj {
        if merged.contains_key(key) && !val.is_null() {
            merged.insert(key.clone(), val.clone());
        }
    }

    let migrated_config: AppConfig = serde_json::from_value(Value::Object(merged))?;
    tracing::info!("Successfully migrated legacy config");
    Ok(migrated_config)
}

/// Saves the configuration to `override_dir` or the platform config directory.
pub fn save_config(config: &AppConfig, override_dir: Option<&Path>) -> Result<()> {
    let config_dir = resolve_config_dir(override_dir)?;

    if !config_dir.exists() {
        fs::create_dir_all(&config_dir)?;
        tracing::info!("Created config directory: {:?}", config_dir);
    }

    let config_path = config_dir.join(CONFIG_FILE);
    let config_json = serde_json::to_string_pretty(config)?;

    fs::write(&config_path, config_json)?;
    tracing::info!("Saved config to {:?}", config_path);

    Ok(())
}

/// Writes `config` to `export_path` so it can be shared with another machine.
///
/// Missing parent directories are created.
pub fn export_config(config: &AppConfig, export_path: &Path) -> Result<()> {
    if let Some(parent) = export_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {:?}", parent))?;
    }
    fs::write(export_path, serde_json::to_string_pretty(config)?)
        .with_context(|| format!("Failed to write {:?}", export_path))?;
    tracing::info!("Exported config to {:?}", export_path);
    Ok(())
}

/// Reads a shared config file. Files from older versions are migrated.
pub fn import_config(import_path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(import_path)
        .with_context(|| format!("Failed to read {:?}", import_path))?;
    let config = match serde_json::from_str::<AppConfig>(&content) {
        Ok(config) => config,
        Err(e) => {
            tracing::info!("{:?} is not a current config ({}), migrating", import_path, e);
            migrate_legacy_config(&content)
                .with_context(|| format!("{:?} is not a PaperTrail config", import_path))?
        }
    };
    tracing::info!("Imported config from {:?}", import_path);
    Ok(config)
}

// Platform-specific configuration paths for reference:
// macOS:   ~/Library/Application Support/com.papertrail.PaperTrail/
// Linux:   ~/.config/papertrail/
// Windows: %APPDATA%/papertrail/PaperTrail/config/
