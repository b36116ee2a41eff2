//! # Configuration Loading
//!
//! Layers defaults, the first configuration file found on the search path and
//! `KAELIX_*` environment variables, then validates the result.
//!
//! Environment variable names map onto the schema with `__` between sections,
//! so `KAELIX_ROUTING__MAX_DIVERT_HOPS=4` sets `routing.max_divert_hops`.

use crate::{
    config::{schema::KaelixConfig, validator::ConfigValidator},
    Error, Result,
};
use std::{
    env,
    path::{Path, PathBuf},
};
use tracing::{debug, info, warn};

const CONFIG_FILE_NAMES: [&str; 2] = ["kaelix.toml", "config.toml"];
const SECTION_SEPARATOR: &str = "__";

/// Configuration loader with support for multiple sources
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    search_paths: Vec<PathBuf>,
    explicit_file: Option<PathBuf>,
    env_prefix: String,
}

impl ConfigLoader {
    /// Create a new configuration loader
    #[must_use]
    pub fn new() -> Self {
        let mut search_paths = vec![PathBuf::from("."), PathBuf::from("./config")];
        if let Some(dir) = dirs::config_dir() {
            search_paths.push(dir.join("kaelix"));
        }
        Self { search_paths, explicit_file: None, env_prefix: "KAELIX".to_string() }
    }

    /// Add a search path for configuration files
    #[must_use]
    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Set the environment variable prefix
    #[must_use]
    pub fn with_env_prefix<S: AsRef<str>>(mut self, prefix: S) -> Self {
        self.env_prefix = prefix.as_ref().to_string();
        self
    }

    /// Use this file instead of searching; it must exist when loading
    #[must_use]
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.explicit_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Load configuration from all available sources
    ///
    /// # Errors
    /// Returns `Configuration` when a source cannot be read or parsed, or the
    /// merged result fails validation.
    pub fn load(&self) -> Result<KaelixConfig> {
        self.load_with_env(env::vars())
    }

    /// [`ConfigLoader::load`] with an explicit environment.
    ///
    /// # Errors
    /// See [`ConfigLoader::load`].
    pub fn load_with_env<I>(&self, vars: I) -> Result<KaelixConfig>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        info!("Loading configuration");

        let mut config_value = toml::Value::try_from(KaelixConfig::default())?;

        if let Some(config_path) = self.find_config_file()? {
            let file_config = self.load_config_file(&config_path)?;
            merge_config(&mut config_value, file_config);
            info!(path = %config_path.display(), "Loaded configuration file");
        } else {
            debug!("No configuration file found in search paths");
        }

        let applied = self.apply_env_vars(&mut config_value, vars);
        debug!(count = applied, "Applied environment variables");

        let config: KaelixConfig = config_value
            .try_into()
            .map_err(|e| Error::Configuration(format!("Failed to deserialize config: {e}")))?;

        ConfigValidator::validate(&config)?;
        info!("Configuration loaded and validated successfully");
        Ok(config)
    }

    /// Load configuration from a specific file, on top of the defaults
    ///
    /// # Errors
    /// Returns `Configuration` when the file cannot be read, parsed or
    /// validated.
    pub fn load_from_file<P: AsRef<Path>>(&self, path: P) -> Result<KaelixConfig> {
        self.load_from_files(&[path])
    }

    /// Load and merge configuration from multiple TOML files, later files
    /// overriding earlier ones
    ///
    /// # Errors
    /// Returns `Configuration` when a file cannot be read, parsed or
    /// validated.
    pub fn load_from_files<P: AsRef<Path>>(&self, paths: &[P]) -> Result<KaelixConfig> {
        let mut config_value = toml::Value::try_from(KaelixConfig::default())?;

        for path in paths {
            let file_config = self.load_config_file(path.as_ref())?;
            merge_config(&mut config_value, file_config);
            info!(path = %path.as_ref().display(), "Merged configuration file");
        }

        let config: KaelixConfig = config_value
            .try_into()
            .map_err(|e| Error::Configuration(format!("Failed to parse merged config: {e}")))?;

        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    ///
    /// # Errors
    /// Returns `Configuration` when serialization or the write fails.
    pub fn save_to_file<P: AsRef<Path>>(&self, config: &KaelixConfig, path: P) -> Result<()> {
        let toml_string = toml::to_string_pretty(config)?;

        std::fs::write(path.as_ref(), toml_string).map_err(|e| {
            Error::Configuration(format!(
                "Failed to write config to {}: {e}",
                path.as_ref().display()
            ))
        })?;

        info!(path = %path.as_ref().display(), "Configuration saved");
        Ok(())
    }

    /// Get the effective search paths being used
    #[must_use]
    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Get the environment prefix being used
    #[must_use]
    pub fn env_prefix(&self) -> &str {
        &self.env_prefix
    }

    fn find_config_file(&self) -> Result<Option<PathBuf>> {
        if let Some(file) = &self.explicit_file {
            if !file.exists() {
                return Err(Error::Configuration(format!(
                    "Configuration file {} does not exist",
                    file.display()
                )));
            }
            return Ok(Some(file.clone()));
        }

        for search_path in &self.search_paths {
            for config_name in CONFIG_FILE_NAMES {
                let config_path = search_path.join(config_name);
                if config_path.exists() {
                    debug!(path = %config_path.display(), "Found config file");
                    return Ok(Some(config_path));
                }
            }
        }

        Ok(None)
    }

    fn load_config_file(&self, path: &Path) -> Result<toml::Value> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("Failed to read config file {}: {e}", path.display()))
        })?;

        content.parse::<toml::Value>().map_err(|e| {
            Error::Configuration(format!("Failed to parse config file {}: {e}", path.display()))
        })
    }

    /// Apply every `<prefix>_SECTION__KEY` variable; returns how many applied.
    fn apply_env_vars<I>(&self, config: &mut toml::Value, vars: I) -> usize
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let prefix = format!("{}_", self.env_prefix);
        let mut applied = 0;

        for (key, value) in vars {
            let Some(path) = key.strip_prefix(&prefix) else {
                continue;
            };
            let path = path.to_lowercase();
            let parts: Vec<&str> = path.split(SECTION_SEPARATOR).collect();
            if parts.iter().any(|p| p.is_empty()) {
                warn!(variable = %key, "Ignoring malformed configuration variable");
                continue;
            }
            set_nested_value(config, &parts, parse_env_value(&value));
            applied += 1;
        }

        applied
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Merge `override_value` into `base`, recursing into tables.
fn merge_config(base: &mut toml::Value, override_value: toml::Value) {
    match (base, override_value) {
        (toml::Value::Table(base_table), toml::Value::Table(override_table)) => {
            for (key, value) in override_table {
                match base_table.get_mut(&key) {
                    Some(existing) if existing.is_table() && value.is_table() => {
                        merge_config(existing, value);
                    },
                    _ => {
                        base_table.insert(key, value);
                    },
                }
            }
        },
        (base, value) => *base = value,
    }
}

fn set_nested_value(config: &mut toml::Value, parts: &[&str], value: toml::Value) {
    let toml::Value::Table(table) = config else {
        return;
    };
    match parts {
        [] => {},
        [last] => {
            table.insert((*last).to_string(), value);
        },
        [first, rest @ ..] => {
            let entry = table
                .entry((*first).to_string())
                .or_insert_with(|| toml::Value::Table(toml::map::Map::new()));
            set_nested_value(entry, rest, value);
        },
    }
}

/// Parse an environment value to the narrowest TOML type.
fn parse_env_value(value: &str) -> toml::Value {
    if let Ok(bool_val) = value.parse::<bool>() {
        return toml::Value::Boolean(bool_val);
    }
    if let Ok(int_val) = value.parse::<i64>() {
        return toml::Value::Integer(int_val);
    }
    if let Ok(float_val) = value.parse::<f64>() {
        return toml::Value::Float(float_val);
    }
    toml::Value::String(value.to_string())
}
