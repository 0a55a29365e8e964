use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use figment::{
    Figment,
    providers::{Format, Json, Serialized},
};
use mentor_backend::BackendConfig;
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

pub const DEFAULT_API_BASE_URL: &str = "https://api.wedevx.co/v1";
pub const DEFAULT_AUTH_BASE_URL: &str = "https://auth.wedevx.co/v1";
pub const SETTINGS_DIRECTORY_NAME: &str = "mentor";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const LOCAL_STORE_FILE_NAME: &str = "local.json";
pub const COOKIE_FILE_NAME: &str = "cookies.json";

const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopupSettings {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_auth_base_url")]
    pub auth_base_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for PopupSettings {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            auth_base_url: default_auth_base_url(),
            user_agent: default_user_agent(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl PopupSettings {
    pub fn normalized(mut self) -> Self {
        self.api_base_url = if self.api_base_url.trim().is_empty() {
            default_api_base_url()
        } else {
            self.api_base_url.trim().to_string()
        };
        self.auth_base_url = if self.auth_base_url.trim().is_empty() {
            default_auth_base_url()
        } else {
            self.auth_base_url.trim().to_string()
        };
        self.user_agent = if self.user_agent.trim().is_empty() {
            default_user_agent()
        } else {
            self.user_agent.trim().to_string()
        };
        if self.connect_timeout_secs == 0 {
            self.connect_timeout_secs = default_connect_timeout_secs();
        }

        self
    }

    pub fn backend_config(&self) -> BackendConfig {
        BackendConfig::new(&self.api_base_url, &self.auth_base_url, &self.user_agent)
            .with_connect_timeout(Duration::from_secs(self.connect_timeout_secs))
    }
}

pub struct SettingsStore {
    settings: Arc<ArcSwap<PopupSettings>>,
    config_path: PathBuf,
}

impl SettingsStore {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".mentor"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(SETTINGS_FILE_NAME)
    }

    /// Path of the exercise-context store that sits beside the settings file.
    pub fn default_local_store_path() -> PathBuf {
        Self::default_config_dir().join(LOCAL_STORE_FILE_NAME)
    }

    /// Path of the session cookie jar that sits beside the settings file.
    pub fn default_cookie_path() -> PathBuf {
        Self::default_config_dir().join(COOKIE_FILE_NAME)
    }

    pub fn new(config_path: PathBuf) -> Self {
        let settings = Self::load_from_disk(&config_path);
        Self {
            settings: Arc::new(ArcSwap::from_pointee(settings)),
            config_path,
        }
    }

    pub fn load() -> Self {
        Self::new(Self::default_config_path())
    }

    pub fn settings(&self) -> Arc<PopupSettings> {
        self.settings.load_full()
    }

    pub fn update(&self, settings: PopupSettings) -> Result<(), SettingsError> {
        let normalized_settings = settings.normalized();
        self.persist(&normalized_settings)?;
        self.settings.store(Arc::new(normalized_settings));
        Ok(())
    }

    pub fn config_path(&self) -> &PathBuf {
        &self.config_path
    }

    fn load_from_disk(path: &PathBuf) -> PopupSettings {
        if !path.exists() {
            tracing::info!("settings file not found at {:?}, using defaults", path);
            return PopupSettings::default();
        }

        let figment =
            Figment::from(Serialized::defaults(PopupSettings::default())).merge(Json::file(path));

        match figment.extract::<PopupSettings>() {
            Ok(settings) => settings.normalized(),
            Err(error) => {
                tracing::warn!(
                    "failed to parse settings from {:?}: {}. using defaults",
                    path,
                    error
                );
                PopupSettings::default()
            }
        }
    }

    fn persist(&self, settings: &PopupSettings) -> Result<(), SettingsError> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).context(CreateDirSnafu {
                stage: "create-settings-directory",
                path: parent.to_path_buf(),
            })?;
        }

        let content = serde_json::to_string_pretty(settings).context(SerializeConfigSnafu {
            stage: "serialize-settings-json",
        })?;

        let temp_path = self.config_path.with_extension("json.tmp");
        std::fs::write(&temp_path, content).context(WriteFileSnafu {
            stage: "write-temporary-settings-file",
            path: temp_path.clone(),
        })?;

        std::fs::rename(&temp_path, &self.config_path).context(RenameTempFileSnafu {
            stage: "rename-temporary-settings-file",
            from: temp_path,
            to: self.config_path.clone(),
        })?;

        tracing::info!("saved settings to {:?}", self.config_path);
        Ok(())
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("failed to create settings directory at {path:?} on `{stage}`: {source}"))]
    CreateDir {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to serialize settings on `{stage}`: {source}"))]
    SerializeConfig {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to write settings file at {path:?} on `{stage}`: {source}"))]
    WriteFile {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display(
        "failed to replace settings file from {from:?} to {to:?} on `{stage}`: {source}"
    ))]
    RenameTempFile {
        stage: &'static str,
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_auth_base_url() -> String {
    DEFAULT_AUTH_BASE_URL.to_string()
}

fn default_user_agent() -> String {
    format!(
        "mentor/{} ({})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS
    )
}

fn default_connect_timeout_secs() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json"));

        let settings = store.settings();
        assert_eq!(settings.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(settings.auth_base_url, DEFAULT_AUTH_BASE_URL);
        assert_eq!(settings.connect_timeout_secs, 10);
    }

    #[test]
    fn partial_file_keeps_defaults_for_absent_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"api_base_url": "https://staging.example.com/v1"}"#).unwrap();

        let store = SettingsStore::new(path);
        let settings = store.settings();
        assert_eq!(settings.api_base_url, "https://staging.example.com/v1");
        assert_eq!(settings.auth_base_url, DEFAULT_AUTH_BASE_URL);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not json at all {").unwrap();

        let store = SettingsStore::new(path);
        assert_eq!(*store.settings(), PopupSettings::default());
    }

    #[test]
    fn update_persists_and_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let store = SettingsStore::new(path.clone());
        let mut settings = PopupSettings::default();
        settings.api_base_url = "https://staging.example.com/v1/".to_string();
        settings.connect_timeout_secs = 30;
        store.update(settings).unwrap();

        let reloaded = SettingsStore::new(path);
        let settings = reloaded.settings();
        assert_eq!(settings.api_base_url, "https://staging.example.com/v1/");
        assert_eq!(settings.connect_timeout_secs, 30);
        assert!(!dir.path().join("settings.json.tmp").exists());
    }

    #[test]
    fn normalization_restores_blank_and_zero_fields() {
        let settings = PopupSettings {
            api_base_url: "   ".to_string(),
            auth_base_url: "https://auth.example.com/v1/".to_string(),
            user_agent: String::new(),
            connect_timeout_secs: 0,
        };

        let normalized = settings.normalized();
        assert_eq!(normalized.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(normalized.auth_base_url, "https://auth.example.com/v1/");
        assert!(normalized.user_agent.starts_with("mentor/"));
        assert_eq!(normalized.connect_timeout_secs, 10);
    }

    #[test]
    fn backend_config_trims_trailing_slashes() {
        let mut settings = PopupSettings::default();
        settings.api_base_url = "https://api.example.com/v1/".to_string();

        let config = settings.backend_config();
        assert_eq!(config.api_base_url, "https://api.example.com/v1");
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
    }
}
