//! Application configuration management.
//!
//! User preferences (display name, chat colour, forced offline mode) are
//! stored at `~/.config/letschat/config.json`. Firebase project settings come
//! from the environment so that keys stay out of the config file.

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::connectivity::DEFAULT_PROBE_ADDR;
use crate::models::ChatColor;
use crate::remote::FirestoreSettings;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "letschat";

/// Config file name
const CONFIG_FILE: &str = "config.json";

pub const ENV_API_KEY: &str = "LETSCHAT_API_KEY";
pub const ENV_PROJECT_ID: &str = "LETSCHAT_PROJECT_ID";
pub const ENV_STORAGE_BUCKET: &str = "LETSCHAT_STORAGE_BUCKET";
pub const ENV_PROBE_ADDR: &str = "LETSCHAT_PROBE_ADDR";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub display_name: Option<String>,
    pub background_color: ChatColor,
    pub offline_mode: bool,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }
}

/// Firebase project settings read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirebaseSettings {
    pub api_key: String,
    pub project_id: String,
    pub storage_bucket: Option<String>,
}

impl FirebaseSettings {
    /// `None` when the API key or project id is missing (loopback mode)
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        Some(Self {
            api_key: get(ENV_API_KEY)?,
            project_id: get(ENV_PROJECT_ID)?,
            storage_bucket: get(ENV_STORAGE_BUCKET),
        })
    }

    pub fn firestore(&self) -> FirestoreSettings {
        FirestoreSettings::new(self.project_id.clone(), self.api_key.clone())
    }
}

/// Probe target for the connectivity monitor
pub fn probe_addr_from_env() -> String {
    std::env::var(ENV_PROBE_ADDR)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_PROBE_ADDR.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_config_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join(CONFIG_FILE);

        let config = Config {
            display_name: Some("Alice".to_string()),
            background_color: ChatColor::Purple,
            offline_mode: true,
        };
        config.save_to(&path).expect("save");

        assert_eq!(Config::load_from(&path).expect("load"), config);
    }

    #[test]
    fn test_missing_config_is_default() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = Config::load_from(&dir.path().join(CONFIG_FILE)).expect("load");
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"display_name": "Bob"}"#).expect("parse");
        assert_eq!(config.display_name.as_deref(), Some("Bob"));
        assert_eq!(config.background_color, ChatColor::Black);
        assert!(!config.offline_mode);
    }

    #[test]
    fn test_firebase_settings_lookup() {
        let env: HashMap<&str, &str> = [
            (ENV_API_KEY, "AIza-test"),
            (ENV_PROJECT_ID, "lets-chat"),
            (ENV_STORAGE_BUCKET, ""),
        ]
        .into_iter()
        .collect();

        let settings = FirebaseSettings::from_lookup(|k| env.get(k).map(|v| v.to_string()))
            .expect("settings");
        assert_eq!(settings.project_id, "lets-chat");
        assert_eq!(settings.storage_bucket, None);
        assert_eq!(settings.firestore().api_key, "AIza-test");
    }

    #[test]
    fn test_firebase_settings_missing_key_is_loopback() {
        let settings = FirebaseSettings::from_lookup(|k| {
            (k == ENV_PROJECT_ID).then(|| "lets-chat".to_string())
        });
        assert!(settings.is_none());
    }
}
