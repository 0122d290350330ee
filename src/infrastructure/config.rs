use crate::domain::models::{Settings, TimeBlock};
use crate::domain::registry::default_presets;
use crate::infrastructure::error::InfraError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

const APP_JSON: &str = "app.json";
const SETTINGS_JSON: &str = "settings.json";
const PRESETS_JSON: &str = "presets.json";
const DEFAULT_EXPORT_DIR: &str = "exports";

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigBundle {
    pub app: serde_json::Value,
    pub settings: serde_json::Value,
    pub presets: serde_json::Value,
}

fn default_files() -> Result<HashMap<&'static str, serde_json::Value>, InfraError> {
    let mut settings = serde_json::to_value(Settings::default())?;
    if let Some(object) = settings.as_object_mut() {
        object.insert("schema".to_string(), serde_json::json!(1));
    }

    Ok(HashMap::from([
        (
            APP_JSON,
            serde_json::json!({
                "schema": 1,
                "appName": "Weekplanner",
                "timezone": "UTC",
                "exportDir": DEFAULT_EXPORT_DIR
            }),
        ),
        (SETTINGS_JSON, settings),
        (
            PRESETS_JSON,
            serde_json::json!({
                "schema": 1,
                "presets": default_presets()
            }),
        ),
    ]))
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), InfraError> {
    for (name, value) in default_files()? {
        let path = config_dir.join(name);
        if !path.exists() {
            let formatted = serde_json::to_string_pretty(&value)?;
            fs::write(path, format!("{formatted}\n"))?;
        }
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != 1 {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

pub fn load_configs(config_dir: &Path) -> Result<ConfigBundle, InfraError> {
    Ok(ConfigBundle {
        app: read_config(&config_dir.join(APP_JSON))?,
        settings: read_config(&config_dir.join(SETTINGS_JSON))?,
        presets: read_config(&config_dir.join(PRESETS_JSON))?,
    })
}

fn read_app_string(config_dir: &Path, key: &str) -> Result<Option<String>, InfraError> {
    let app = read_config(&config_dir.join(APP_JSON))?;
    Ok(app
        .get(key)
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned))
}

pub fn read_timezone(config_dir: &Path) -> Result<Option<String>, InfraError> {
    read_app_string(config_dir, "timezone")
}

pub fn read_export_dir(config_dir: &Path) -> Result<String, InfraError> {
    Ok(read_app_string(config_dir, "exportDir")?.unwrap_or_else(|| DEFAULT_EXPORT_DIR.to_string()))
}

pub fn read_default_settings(config_dir: &Path) -> Result<Settings, InfraError> {
    let path = config_dir.join(SETTINGS_JSON);
    let settings: Settings = serde_json::from_value(read_config(&path)?)?;
    settings.validate().map_err(|message| {
        InfraError::InvalidConfig(format!("{message} in {}", path.display()))
    })?;
    Ok(settings)
}

pub fn read_seed_presets(config_dir: &Path) -> Result<Vec<TimeBlock>, InfraError> {
    let path = config_dir.join(PRESETS_JSON);
    let config = read_config(&path)?;
    let presets: Vec<TimeBlock> = match config.get("presets") {
        Some(value) => serde_json::from_value(value.clone())?,
        None => Vec::new(),
    };
    for preset in &presets {
        preset.validate().map_err(|message| {
            InfraError::InvalidConfig(format!("{message} in {}", path.display()))
        })?;
    }
    Ok(presets)
}
