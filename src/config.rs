use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::output::OutputFormat;
use crate::rules::DEFAULT_ROOT_TAG;
use crate::validator::ValidationOptions;

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

pub type Result<T> = std::result::Result<T, ConfigError>;

const CONFIG_NAMES: [&str; 4] = [
    "sar-validator.toml",
    "sar-validator.json",
    ".sar-validator.toml",
    ".sar-validator.json",
];

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub validation: ValidationConfig,
    pub monitor: MonitorConfig,
    pub output: OutputConfig,
}

/// Rule engine settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ValidationConfig {
    /// Accepted currency codes; empty accepts any well-formed code
    pub currency_allow_list: Vec<String>,
    /// Fixed reference date for future-date warnings
    pub today: Option<NaiveDate>,
    /// Expected root element
    pub root_tag: String,
}

/// Live-change monitor settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MonitorConfig {
    /// Delay between polls in milliseconds
    pub interval_ms: u64,
    /// Document to watch
    pub path: Option<PathBuf>,
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    /// Output format
    pub format: OutputFormat,
    /// Verbose output
    pub verbose: bool,
    /// Quiet mode (errors only)
    pub quiet: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            currency_allow_list: Vec::new(),
            today: None,
            root_tag: DEFAULT_ROOT_TAG.to_string(),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            path: None,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Human,
            verbose: false,
            quiet: false,
        }
    }
}

impl Config {
    /// Rule engine options described by this configuration
    pub fn validation_options(&self) -> ValidationOptions {
        let currency_allow_list = if self.validation.currency_allow_list.is_empty() {
            None
        } else {
            Some(
                self.validation
                    .currency_allow_list
                    .iter()
                    .cloned()
                    .collect::<BTreeSet<_>>(),
            )
        };

        ValidationOptions {
            today: self.validation.today,
            currency_allow_list,
            root_tag: self.validation.root_tag.clone(),
        }
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor.interval_ms)
    }
}

/// Configuration manager for loading and merging configurations
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration with precedence: defaults -> file -> environment
    pub async fn load_config(explicit_path: Option<&Path>) -> Result<Config> {
        Self::load_config_with(&SystemEnvProvider, explicit_path).await
    }

    /// Same as [`ConfigManager::load_config`] with a custom environment provider
    pub async fn load_config_with(
        env: &impl EnvProvider,
        explicit_path: Option<&Path>,
    ) -> Result<Config> {
        let mut config = Config::default();

        if let Some(config_path) = explicit_path {
            let file_config = Self::load_from_file(config_path).await?;
            config = Self::merge_configs(config, file_config);
        } else if let Some(found_config) = Self::find_config_file().await? {
            config = Self::merge_configs(config, found_config);
        }

        config = Self::apply_environment_overrides_with(env, config)?;

        Self::validate_config(&config)?;

        Ok(config)
    }

    /// Load configuration from a file (TOML or JSON)
    pub async fn load_from_file(path: &Path) -> Result<Config> {
        let content = tokio::fs::read_to_string(path).await?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(toml::from_str(&content)?),
            Some("json") => Ok(serde_json::from_str(&content)?),
            Some(ext) => Err(ConfigError::UnsupportedFormat(ext.to_string())),
            None => {
                // Try to parse as TOML first, then JSON
                if let Ok(config) = toml::from_str::<Config>(&content) {
                    Ok(config)
                } else {
                    Ok(serde_json::from_str(&content)?)
                }
            }
        }
    }

    /// Find configuration file in standard locations
    pub async fn find_config_file() -> Result<Option<Config>> {
        // Current directory first
        if let Some(config) = Self::find_config_in(Path::new(".")).await? {
            return Ok(Some(config));
        }

        if let Some(config_dir) = dirs::config_dir() {
            return Self::find_config_in(&config_dir.join("sar-validator")).await;
        }

        Ok(None)
    }

    /// Load the first known configuration file name present in `dir`
    pub async fn find_config_in(dir: &Path) -> Result<Option<Config>> {
        for name in &CONFIG_NAMES {
            let path = dir.join(name);
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                return Ok(Some(Self::load_from_file(&path).await?));
            }
        }
        Ok(None)
    }

    /// Apply environment variable overrides using the system environment
    pub fn apply_environment_overrides(config: Config) -> Result<Config> {
        Self::apply_environment_overrides_with(&SystemEnvProvider, config)
    }

    /// Apply environment variable overrides with a custom environment provider
    pub fn apply_environment_overrides_with(
        env: &impl EnvProvider,
        mut config: Config,
    ) -> Result<Config> {
        // Validation settings
        if let Some(currencies) = env.get("SAR_VALIDATOR_CURRENCIES") {
            config.validation.currency_allow_list = currencies
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        if let Some(today) = env.get("SAR_VALIDATOR_TODAY") {
            config.validation.today =
                Some(NaiveDate::parse_from_str(&today, "%Y-%m-%d").map_err(|_| {
                    ConfigError::Environment(format!("Invalid SAR_VALIDATOR_TODAY value: {}", today))
                })?);
        }

        if let Some(root_tag) = env.get("SAR_VALIDATOR_ROOT_TAG") {
            config.validation.root_tag = root_tag.trim().to_string();
        }

        // Monitor settings
        if let Some(interval) = env.get("SAR_VALIDATOR_INTERVAL_MS") {
            config.monitor.interval_ms = interval.parse().map_err(|_| {
                ConfigError::Environment(format!(
                    "Invalid SAR_VALIDATOR_INTERVAL_MS value: {}",
                    interval
                ))
            })?;
        }

        if let Some(path) = env.get("SAR_VALIDATOR_WATCH_PATH") {
            config.monitor.path = Some(PathBuf::from(path));
        }

        // Output settings
        if let Some(verbose) = env.get("SAR_VALIDATOR_VERBOSE") {
            config.output.verbose = verbose.parse().map_err(|_| {
                ConfigError::Environment(format!("Invalid SAR_VALIDATOR_VERBOSE value: {}", verbose))
            })?;
        }

        if let Some(quiet) = env.get("SAR_VALIDATOR_QUIET") {
            config.output.quiet = quiet.parse().map_err(|_| {
                ConfigError::Environment(format!("Invalid SAR_VALIDATOR_QUIET value: {}", quiet))
            })?;
        }

        if let Some(format) = env.get("SAR_VALIDATOR_FORMAT") {
            config.output.format = match format.to_lowercase().as_str() {
                "human" => OutputFormat::Human,
                "json" => OutputFormat::Json,
                "summary" => OutputFormat::Summary,
                _ => {
                    return Err(ConfigError::Environment(format!(
                        "Invalid SAR_VALIDATOR_FORMAT value: {}",
                        format
                    )));
                }
            };
        }

        Ok(config)
    }

    /// Merge two configurations (second takes precedence for non-None values)
    pub fn merge_configs(mut base: Config, override_config: Config) -> Config {
        // Validation settings
        if !override_config.validation.currency_allow_list.is_empty() {
            base.validation.currency_allow_list = override_config.validation.currency_allow_list;
        }
        if override_config.validation.today.is_some() {
            base.validation.today = override_config.validation.today;
        }
        base.validation.root_tag = override_config.validation.root_tag;

        // Monitor settings
        base.monitor.interval_ms = override_config.monitor.interval_ms;
        if override_config.monitor.path.is_some() {
            base.monitor.path = override_config.monitor.path;
        }

        // Output settings
        base.output.format = override_config.output.format;
        base.output.verbose = override_config.output.verbose;
        base.output.quiet = override_config.output.quiet;

        base
    }

    /// Validate configuration values
    pub fn validate_config(config: &Config) -> Result<()> {
        if config.monitor.interval_ms == 0 {
            return Err(ConfigError::Validation(
                "Monitor interval must be greater than 0".to_string(),
            ));
        }

        if config.validation.root_tag.trim().is_empty() {
            return Err(ConfigError::Validation(
                "Root tag cannot be empty".to_string(),
            ));
        }

        for code in &config.validation.currency_allow_list {
            if code.len() != 3 || !code.chars().all(|c| c.is_ascii_uppercase()) {
                return Err(ConfigError::Validation(format!(
                    "Invalid currency code: {}",
                    code
                )));
            }
        }

        if config.output.verbose && config.output.quiet {
            return Err(ConfigError::Validation(
                "Cannot enable both verbose and quiet modes".to_string(),
            ));
        }

        Ok(())
    }
}
