use crate::poller::{
    interval_from_millis, PollerConfig, DEFAULT_INTERVAL, DEFAULT_PENDING_INTERVAL,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const TOKEN_ENV: &str = "PAGEMAIL_TOKEN";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub api: ApiSettings,
    pub polling: PollingSettings,
    pub visibility: VisibilitySettings,
    pub debug: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub base_url: String,
    pub token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            token: None,
            timeout_secs: 30,
        }
    }
}

impl ApiSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingSettings {
    pub interval_ms: f64,
    pub pending_interval_ms: f64,
    pub immediate: bool,
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_INTERVAL.as_millis() as f64,
            pending_interval_ms: DEFAULT_PENDING_INTERVAL.as_millis() as f64,
            immediate: true,
        }
    }
}

impl PollingSettings {
    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig::default()
            .with_interval(interval_from_millis(self.interval_ms))
            .with_pending_interval(interval_from_millis(self.pending_interval_ms))
            .with_immediate(self.immediate)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisibilitySource {
    Always,
    #[default]
    Screensaver,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VisibilitySettings {
    pub source: VisibilitySource,
}

impl Settings {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("pagemail").join("config.toml"))
    }

    pub fn load() -> Result<Self> {
        let path = Self::config_path().context("Could not determine config directory")?;
        let mut settings = Self::load_from(&path)?;

        if let Ok(token) = std::env::var(TOKEN_ENV) {
            if !token.is_empty() {
                settings.api.token = Some(token);
            }
        }

        settings.validate()?;
        Ok(settings)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!(?path, "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let settings: Settings = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        tracing::info!(?path, "Loaded config");
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.api.base_url.trim().is_empty() {
            anyhow::bail!("api.base_url must not be empty");
        }
        if self.api.timeout_secs == 0 {
            anyhow::bail!("api.timeout_secs must be greater than 0");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.api.base_url, "http://localhost:8080");
        assert!(settings.api.token.is_none());
        assert_eq!(settings.api.timeout(), Duration::from_secs(30));
        assert_eq!(settings.visibility.source, VisibilitySource::Screensaver);
        assert!(!settings.debug);

        let config = settings.polling.poller_config();
        assert_eq!(config.interval, Duration::from_secs(10));
        assert_eq!(config.pending_interval, Duration::from_secs(5));
        assert!(config.immediate);
        assert!(config.auto_start);
    }

    #[test]
    fn test_settings_validation() {
        let mut settings = Settings::default();
        assert!(settings.validate().is_ok());

        settings.api.timeout_secs = 0;
        assert!(settings.validate().is_err());

        settings.api.timeout_secs = 5;
        settings.api.base_url = "  ".to_string();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
            debug = true

            [api]
            base_url = "https://pagemail.example.com"
            token = "secret"

            [polling]
            interval_ms = 30000
            pending_interval_ms = 2500.0
            immediate = false

            [visibility]
            source = "always"
        "#;

        let settings: Settings = toml::from_str(toml).unwrap();
        assert!(settings.debug);
        assert_eq!(settings.api.base_url, "https://pagemail.example.com");
        assert_eq!(settings.api.token.as_deref(), Some("secret"));
        assert_eq!(settings.api.timeout_secs, 30);
        assert_eq!(settings.visibility.source, VisibilitySource::Always);

        let config = settings.polling.poller_config();
        assert_eq!(config.interval, Duration::from_secs(30));
        assert_eq!(config.pending_interval, Duration::from_millis(2_500));
        assert!(!config.immediate);
    }

    #[test]
    fn test_bad_intervals_fall_back_to_default() {
        let toml = r#"
            [polling]
            interval_ms = -5
            pending_interval_ms = nan
        "#;

        let settings: Settings = toml::from_str(toml).unwrap();
        let config = settings.polling.poller_config();
        assert_eq!(config.interval, DEFAULT_INTERVAL);
        assert_eq!(config.pending_interval, DEFAULT_INTERVAL);
    }

    #[test]
    fn test_load_from_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(settings.api.base_url, ApiSettings::default().base_url);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[api]\nbase_url = \"http://capture.internal:9000\"").unwrap();

        let settings = Settings::load_from(file.path()).unwrap();
        assert_eq!(settings.api.base_url, "http://capture.internal:9000");
    }

    #[test]
    fn test_load_from_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[api\nbase_url =").unwrap();

        let err = Settings::load_from(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }
}
