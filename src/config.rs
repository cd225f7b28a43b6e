use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::options::Options;

/// Longest accepted reclaim interval: one day.
const MAX_RECLAIM_INTERVAL_SECS: u64 = 86_400;

/// Trait for abstracting environment variable access
pub trait EnvProvider {
    fn get(&self, key: &str) -> Option<String>;
}

/// System environment variable provider for production use
pub struct SystemEnvProvider;

impl EnvProvider for SystemEnvProvider {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("JSON parsing error: {0}")]
    JsonParsing(#[from] serde_json::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("Environment variable error: {0}")]
    Environment(String),

    #[error("Unsupported configuration file format: {0}")]
    UnsupportedFormat(String),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct EngineConfig {
    /// Seconds between native memory trims; `None` or 0 disables the ticker
    pub reclaim_interval_secs: Option<u64>,
    /// Keep the parser's own messages for schema and document parse failures
    pub parse_verbose: bool,
    /// Also capture messages libxml2 reports outside the validation context
    pub validate_verbose: bool,
}

impl EngineConfig {
    /// The reclaim interval, `None` when disabled.
    pub fn reclaim_interval(&self) -> Option<Duration> {
        self.reclaim_interval_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// Options selected by this configuration.
    pub fn options(&self) -> Options {
        let mut options = Options::default();
        if self.parse_verbose {
            options |= Options::PARSE_VERBOSE;
        }
        if self.validate_verbose {
            options |= Options::VALIDATE_VERBOSE;
        }
        options
    }
}

/// Configuration manager for loading and checking configurations
pub struct ConfigManager;

impl ConfigManager {
    /// Configuration file names looked up by [`ConfigManager::find_config_file`]
    pub const CONFIG_NAMES: [&'static str; 4] = [
        "xsd-validate.toml",
        "xsd-validate.json",
        ".xsd-validate.toml",
        ".xsd-validate.json",
    ];

    /// Load configuration with precedence: defaults -> file -> environment
    pub async fn load_config(path: Option<&Path>) -> ConfigResult<EngineConfig> {
        Self::load_config_with(&SystemEnvProvider, path).await
    }

    pub async fn load_config_with(
        env: &impl EnvProvider,
        path: Option<&Path>,
    ) -> ConfigResult<EngineConfig> {
        let config = match path {
            Some(path) => Self::load_from_file(path).await?,
            None => EngineConfig::default(),
        };

        let config = Self::apply_environment_overrides_with(env, config)?;
        Self::validate_config(&config)?;

        Ok(config)
    }

    /// Load configuration from a file (TOML or JSON)
    pub async fn load_from_file(path: &Path) -> ConfigResult<EngineConfig> {
        let content = tokio::fs::read_to_string(path).await?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => {
                let config: EngineConfig = toml::from_str(&content)?;
                Ok(config)
            }
            Some("json") => {
                let config: EngineConfig = serde_json::from_str(&content)?;
                Ok(config)
            }
            Some(ext) => Err(ConfigError::UnsupportedFormat(ext.to_string())),
            None => {
                // Try to parse as TOML first, then JSON
                if let Ok(config) = toml::from_str::<EngineConfig>(&content) {
                    Ok(config)
                } else {
                    let config: EngineConfig = serde_json::from_str(&content)?;
                    Ok(config)
                }
            }
        }
    }

    /// First configuration file present in `dir`, by [`Self::CONFIG_NAMES`] order
    pub fn find_config_file(dir: &Path) -> Option<PathBuf> {
        Self::CONFIG_NAMES
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.is_file())
    }

    /// Apply environment variable overrides using the system environment
    pub fn apply_environment_overrides(config: EngineConfig) -> ConfigResult<EngineConfig> {
        Self::apply_environment_overrides_with(&SystemEnvProvider, config)
    }

    /// Apply environment variable overrides with a custom environment provider
    pub fn apply_environment_overrides_with(
        env: &impl EnvProvider,
        mut config: EngineConfig,
    ) -> ConfigResult<EngineConfig> {
        if let Some(interval) = env.get("XSD_VALIDATE_RECLAIM_INTERVAL") {
            config.reclaim_interval_secs = Some(interval.parse().map_err(|_| {
                ConfigError::Environment(format!(
                    "Invalid XSD_VALIDATE_RECLAIM_INTERVAL value: {}",
                    interval
                ))
            })?);
        }

        if let Some(verbose) = env.get("XSD_VALIDATE_PARSE_VERBOSE") {
            config.parse_verbose = verbose.parse().map_err(|_| {
                ConfigError::Environment(format!(
                    "Invalid XSD_VALIDATE_PARSE_VERBOSE value: {}",
                    verbose
                ))
            })?;
        }

        if let Some(verbose) = env.get("XSD_VALIDATE_VALIDATE_VERBOSE") {
            config.validate_verbose = verbose.parse().map_err(|_| {
                ConfigError::Environment(format!(
                    "Invalid XSD_VALIDATE_VALIDATE_VERBOSE value: {}",
                    verbose
                ))
            })?;
        }

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate_config(config: &EngineConfig) -> ConfigResult<()> {
        if config
            .reclaim_interval_secs
            .is_some_and(|secs| secs > MAX_RECLAIM_INTERVAL_SECS)
        {
            return Err(ConfigError::Validation(format!(
                "Reclaim interval cannot exceed {} seconds",
                MAX_RECLAIM_INTERVAL_SECS
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::TempDir;

    /// Mock environment variable provider for testing
    #[derive(Default)]
    struct MockEnvProvider {
        vars: HashMap<String, String>,
    }

    impl MockEnvProvider {
        fn new() -> Self {
            Self {
                vars: HashMap::new(),
            }
        }

        fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
            self.vars.insert(key.into(), value.into());
        }
    }

    impl EnvProvider for MockEnvProvider {
        fn get(&self, key: &str) -> Option<String> {
            self.vars.get(key).cloned()
        }
    }

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();

        assert_eq!(config.reclaim_interval_secs, None);
        assert_eq!(config.reclaim_interval(), None);
        assert!(!config.parse_verbose);
        assert!(!config.validate_verbose);
        assert_eq!(config.options(), Options::default());
    }

    #[tokio::test]
    async fn test_load_toml_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        let toml_content = r#"
reclaim_interval_secs = 300
parse_verbose = true
"#;

        fs::write(&config_path, toml_content).unwrap();

        let config = ConfigManager::load_from_file(&config_path).await.unwrap();

        assert_eq!(config.reclaim_interval_secs, Some(300));
        assert_eq!(config.reclaim_interval(), Some(Duration::from_secs(300)));
        assert!(config.parse_verbose);
        // Missing keys fall back to defaults
        assert!(!config.validate_verbose);
    }

    #[tokio::test]
    async fn test_load_json_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");

        let json_content = r#"{
    "reclaim_interval_secs": 60,
    "parse_verbose": false,
    "validate_verbose": true
}"#;

        fs::write(&config_path, json_content).unwrap();

        let config = ConfigManager::load_from_file(&config_path).await.unwrap();

        assert_eq!(config.reclaim_interval_secs, Some(60));
        assert!(!config.parse_verbose);
        assert!(config.validate_verbose);
    }

    #[tokio::test]
    async fn test_load_without_extension() {
        let temp_dir = TempDir::new().unwrap();

        let toml_path = temp_dir.path().join("toml_config");
        fs::write(&toml_path, "reclaim_interval_secs = 10\n").unwrap();
        let config = ConfigManager::load_from_file(&toml_path).await.unwrap();
        assert_eq!(config.reclaim_interval_secs, Some(10));

        let json_path = temp_dir.path().join("json_config");
        fs::write(&json_path, r#"{"validate_verbose": true}"#).unwrap();
        let config = ConfigManager::load_from_file(&json_path).await.unwrap();
        assert!(config.validate_verbose);
    }

    #[tokio::test]
    async fn test_unsupported_file_format() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        fs::write(&config_path, "invalid: yaml").unwrap();

        let result = ConfigManager::load_from_file(&config_path).await;
        assert!(result.is_err());

        match result.unwrap_err() {
            ConfigError::UnsupportedFormat(ext) => assert_eq!(ext, "yaml"),
            _ => panic!("Expected UnsupportedFormat error"),
        }
    }

    #[tokio::test]
    async fn test_invalid_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        fs::write(&config_path, "invalid toml [[[").unwrap();

        let result = ConfigManager::load_from_file(&config_path).await;
        assert!(result.is_err());
        assert!(matches!(result.unwrap_err(), ConfigError::TomlParsing(_)));
    }

    #[tokio::test]
    async fn test_invalid_json() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");

        fs::write(&config_path, "{ invalid json }").unwrap();

        let result = ConfigManager::load_from_file(&config_path).await;
        assert!(result.is_err());
        assert!(matches!(result.unwrap_err(), ConfigError::JsonParsing(_)));
    }

    #[tokio::test]
    async fn test_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let result = ConfigManager::load_from_file(&temp_dir.path().join("absent.toml")).await;
        assert!(matches!(result.unwrap_err(), ConfigError::Io(_)));
    }

    #[test]
    fn test_environment_overrides() {
        let mut mock_env = MockEnvProvider::new();
        mock_env.set("XSD_VALIDATE_RECLAIM_INTERVAL", "120");
        mock_env.set("XSD_VALIDATE_PARSE_VERBOSE", "true");
        mock_env.set("XSD_VALIDATE_VALIDATE_VERBOSE", "true");

        let config =
            ConfigManager::apply_environment_overrides_with(&mock_env, EngineConfig::default())
                .unwrap();

        assert_eq!(config.reclaim_interval_secs, Some(120));
        assert!(config.parse_verbose);
        assert!(config.validate_verbose);
        assert_eq!(
            config.options(),
            Options::default() | Options::PARSE_VERBOSE | Options::VALIDATE_VERBOSE
        );
    }

    #[test]
    fn test_invalid_environment_values() {
        let mut mock_env = MockEnvProvider::new();
        mock_env.set("XSD_VALIDATE_RECLAIM_INTERVAL", "soon");

        let result =
            ConfigManager::apply_environment_overrides_with(&mock_env, EngineConfig::default());
        assert!(matches!(result.unwrap_err(), ConfigError::Environment(_)));

        let mut mock_env = MockEnvProvider::new();
        mock_env.set("XSD_VALIDATE_PARSE_VERBOSE", "yes");

        let result =
            ConfigManager::apply_environment_overrides_with(&mock_env, EngineConfig::default());
        assert!(matches!(result.unwrap_err(), ConfigError::Environment(_)));
    }

    #[test]
    fn test_config_validation() {
        let mut config = EngineConfig::default();
        assert!(ConfigManager::validate_config(&config).is_ok());

        config.reclaim_interval_secs = Some(MAX_RECLAIM_INTERVAL_SECS);
        assert!(ConfigManager::validate_config(&config).is_ok());

        config.reclaim_interval_secs = Some(MAX_RECLAIM_INTERVAL_SECS + 1);
        assert!(matches!(
            ConfigManager::validate_config(&config),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_zero_interval_disables_reclaim() {
        let config = EngineConfig {
            reclaim_interval_secs: Some(0),
            ..EngineConfig::default()
        };
        assert_eq!(config.reclaim_interval(), None);
    }

    #[test]
    fn test_find_config_file() {
        let temp_dir = TempDir::new().unwrap();
        assert_eq!(ConfigManager::find_config_file(temp_dir.path()), None);

        let json_path = temp_dir.path().join(".xsd-validate.json");
        fs::write(&json_path, "{}").unwrap();
        assert_eq!(
            ConfigManager::find_config_file(temp_dir.path()),
            Some(json_path)
        );

        let toml_path = temp_dir.path().join("xsd-validate.toml");
        fs::write(&toml_path, "").unwrap();
        assert_eq!(
            ConfigManager::find_config_file(temp_dir.path()),
            Some(toml_path)
        );
    }

    #[tokio::test]
    async fn test_load_config_integration() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("xsd-validate.toml");
        fs::write(&config_path, "reclaim_interval_secs = 30\n").unwrap();

        let mut mock_env = MockEnvProvider::new();
        mock_env.set("XSD_VALIDATE_RECLAIM_INTERVAL", "45");

        let config = ConfigManager::load_config_with(&mock_env, Some(&config_path))
            .await
            .unwrap();
        assert_eq!(config.reclaim_interval_secs, Some(45));

        let mut too_long = MockEnvProvider::new();
        too_long.set("XSD_VALIDATE_RECLAIM_INTERVAL", "100000");
        let result = ConfigManager::load_config_with(&too_long, None).await;
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }
}
