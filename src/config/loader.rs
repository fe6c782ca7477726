//! Configuration Loader
//!
//! Environment-aware configuration loading. Finds `process-sessions.yaml`,
//! applies the section named after the active environment as a deep merge,
//! expands `${VAR}` references in the database URL and validates the result.

use super::error::{ConfigResult, ConfigurationError};
use super::EngineConfig;
use crate::constants::{CONFIG_FILE_NAMES, ENVIRONMENT_VARIABLES, KNOWN_ENVIRONMENTS};
use serde_yaml::Value as YamlValue;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Loaded engine configuration together with where it came from
#[derive(Debug)]
pub struct ConfigManager {
    config: EngineConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment
    /// This is useful for testing without modifying global environment variables
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);

        debug!(
            "Loading configuration for environment '{}' from directory: {}",
            environment,
            config_directory.display()
        );

        let mut config = Self::load_and_merge_config(&config_directory, environment)?;
        Self::expand_environment_variables(&mut config)?;
        config.validate()?;

        debug!(
            "Configuration loaded successfully: {}",
            serde_json::to_string_pretty(&Self::sanitize_config_for_logging(&config))
                .unwrap_or_else(|_| "[serialization error]".to_string())
        );

        info!(
            environment = environment,
            max_connections = config.database.max_connections,
            in_memory = config.database.is_in_memory(),
            "Configuration loaded"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Get the current environment
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Get the configuration directory
    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Get sanitized configuration for debugging/logging that masks credentials in the URL
    pub fn debug_config(&self) -> serde_json::Value {
        Self::sanitize_config_for_logging(&self.config)
    }

    /// Detect current environment from environment variables
    pub fn detect_environment() -> String {
        ENVIRONMENT_VARIABLES
            .iter()
            .find_map(|name| env::var(name).ok())
            .unwrap_or_else(|| "development".to_string())
            .to_lowercase()
    }

    fn default_config_directory() -> PathBuf {
        if let Ok(manifest_dir) = env::var("CARGO_MANIFEST_DIR") {
            let dir = PathBuf::from(manifest_dir).join("config");
            if dir.exists() {
                return dir;
            }
        }

        PathBuf::from("config")
    }

    /// Find the configuration file
    fn find_config_file(config_directory: &Path) -> ConfigResult<PathBuf> {
        let mut searched_paths = Vec::new();

        for name in CONFIG_FILE_NAMES {
            let config_path = config_directory.join(name);
            searched_paths.push(config_path.clone());

            if config_path.is_file() {
                debug!("Found configuration file: {}", config_path.display());
                return Ok(config_path);
            }
        }

        Err(ConfigurationError::config_file_not_found(searched_paths))
    }

    /// Load and merge configuration with environment-specific overrides
    fn load_and_merge_config(
        config_directory: &Path,
        environment: &str,
    ) -> ConfigResult<EngineConfig> {
        let config_file = Self::find_config_file(config_directory)?;

        let yaml_content = std::fs::read_to_string(&config_file)
            .map_err(|e| ConfigurationError::file_read_error(config_file.display().to_string(), e))?;

        let mut yaml_data: YamlValue = serde_yaml::from_str(&yaml_content)
            .map_err(|e| ConfigurationError::invalid_yaml(config_file.display().to_string(), e))?;

        if let Some(env_overrides) = yaml_data
            .get(YamlValue::String(environment.to_string()))
            .cloned()
        {
            debug!(
                "Applying environment-specific overrides for: {}",
                environment
            );
            Self::merge_yaml_values(&mut yaml_data, env_overrides);
        }

        // Environment sections must not leak into the deserialized struct
        if let YamlValue::Mapping(ref mut map) = yaml_data {
            for known in KNOWN_ENVIRONMENTS {
                map.remove(YamlValue::String(known.to_string()));
            }
            map.remove(YamlValue::String(environment.to_string()));
        }

        let mut config: EngineConfig = serde_yaml::from_value(yaml_data).map_err(|e| {
            ConfigurationError::invalid_yaml(
                config_file.display().to_string(),
                format!("Failed to deserialize configuration: {e}"),
            )
        })?;

        config.environment = environment.to_string();

        Ok(config)
    }

    /// Recursively merge YAML values (environment overrides into base config)
    fn merge_yaml_values(base: &mut YamlValue, override_value: YamlValue) {
        match (&mut *base, override_value) {
            (YamlValue::Mapping(base_map), YamlValue::Mapping(override_map)) => {
                for (key, value) in override_map {
                    if let Some(existing_value) = base_map.get_mut(&key) {
                        Self::merge_yaml_values(existing_value, value);
                    } else {
                        base_map.insert(key, value);
                    }
                }
            }
            (base_ref, override_val) => {
                *base_ref = override_val;
            }
        }
    }

    /// Expand `${VAR}` in the database URL
    fn expand_environment_variables(config: &mut EngineConfig) -> ConfigResult<()> {
        let url = config.database.url.trim();
        if url.starts_with("${") && url.ends_with('}') {
            let var_name = url[2..url.len() - 1].to_string();
            match env::var(&var_name) {
                Ok(env_value) => {
                    debug!(
                        "Expanding environment variable {} in database URL",
                        var_name
                    );
                    config.database.url = env_value;
                }
                Err(_) => {
                    warn!("Environment variable {} not found", var_name);
                    return Err(ConfigurationError::environment_variable_error(
                        var_name,
                        "database.url references an unset variable",
                    ));
                }
            }
        }

        Ok(())
    }

    fn sanitize_config_for_logging(config: &EngineConfig) -> serde_json::Value {
        let mut config_json = serde_json::json!(config);

        if let Some(url) = config_json.pointer_mut("/database/url") {
            if let Some(raw) = url.as_str() {
                *url = serde_json::Value::String(mask_credentials(raw));
            }
        }

        config_json
    }
}

/// Mask a `user:password@` segment if one is present
fn mask_credentials(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end + 3 => {
            format!("{}[MASKED]{}", &url[..scheme_end + 3], &url[at..])
        }
        _ => url.to_string(),
    }
}
