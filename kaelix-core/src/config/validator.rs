//! # Configuration Validation
//!
//! Field-level rules come from the `validator` derives on the schema; this
//! module adds the rules that span fields and sections.

use crate::{
    address::{Address, WildcardConfiguration},
    config::schema::{AddressSettingsEntry, KaelixConfig},
    filter::Filter,
    Error, Result,
};
use std::collections::HashSet;
use tracing::{debug, warn};
use validator::Validate;

/// Semantic configuration checks.
#[derive(Debug, Default)]
pub struct ConfigValidator;

impl ConfigValidator {
    /// Create a new configuration validator
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validate a configuration
    ///
    /// # Errors
    /// Returns `Configuration` describing the first violated rule.
    pub fn validate(config: &KaelixConfig) -> Result<()> {
        Self::new().validate_config(config)
    }

    /// Perform comprehensive validation of the configuration
    ///
    /// # Errors
    /// Returns `Configuration` describing the first violated rule.
    pub fn validate_config(&self, config: &KaelixConfig) -> Result<()> {
        debug!("Starting configuration validation");

        config.validate().map_err(Error::from)?;

        config.wildcard.validate()?;
        self.validate_logging(config)?;
        self.validate_address_settings(config)?;
        self.validate_bindings(config)?;

        if config.routing.max_divert_hops > 100 {
            warn!(
                max_divert_hops = config.routing.max_divert_hops,
                "Very long divert chains allowed; a cycle will copy each message many times"
            );
        }

        debug!("Configuration validation completed successfully");
        Ok(())
    }

    fn validate_logging(&self, config: &KaelixConfig) -> Result<()> {
        tracing_subscriber::EnvFilter::try_new(&config.logging.level).map_err(|e| {
            Error::Configuration(format!("Invalid log level '{}': {e}", config.logging.level))
        })?;
        Ok(())
    }

    fn validate_address_settings(&self, config: &KaelixConfig) -> Result<()> {
        for entry in &config.address_settings {
            self.validate_address_settings_entry(entry, &config.wildcard)?;
        }
        Ok(())
    }

    /// Validate one `[[address_settings]]` entry, whether configured or
    /// added at runtime.
    ///
    /// # Errors
    /// Returns `Configuration` for an invalid match pattern, a zero delivery
    /// attempt limit, or a dead-letter or expiry address that is malformed or
    /// contains wildcards.
    pub fn validate_address_settings_entry(
        &self,
        entry: &AddressSettingsEntry,
        wildcard: &WildcardConfiguration,
    ) -> Result<()> {
        entry.validate().map_err(Error::from)?;
        Address::new(entry.pattern.as_str()).map_err(|e| {
            Error::Configuration(format!("Invalid address settings match '{}': {e}", entry.pattern))
        })?;

        let targets = [
            ("dead-letter", entry.settings.dead_letter_address.as_deref()),
            ("expiry", entry.settings.expiry_address.as_deref()),
        ];
        for (role, target) in targets {
            let Some(target) = target else { continue };
            let address = Address::new(target).map_err(|e| {
                Error::Configuration(format!("Address settings '{}' has an invalid {role} address: {e}", entry.pattern))
            })?;
            if address.is_wildcard(wildcard) {
                return Err(Error::Configuration(format!(
                    "Address settings '{}' sends to wildcard {role} address '{target}'",
                    entry.pattern
                )));
            }
        }
        Ok(())
    }

    fn validate_bindings(&self, config: &KaelixConfig) -> Result<()> {
        let mut names = HashSet::new();

        for queue in &config.queues {
            if !names.insert(queue.name.as_str()) {
                return Err(Error::Configuration(format!("Duplicate binding name '{}'", queue.name)));
            }
            check_address(&queue.address, &queue.name)?;
            check_filter(queue.filter.as_deref(), &queue.name)?;
        }

        for divert in &config.diverts {
            if !names.insert(divert.name.as_str()) {
                return Err(Error::Configuration(format!("Duplicate binding name '{}'", divert.name)));
            }
            check_address(&divert.address, &divert.name)?;
            check_address(&divert.forwarding_address, &divert.name)?;
            if Address::new(divert.forwarding_address.as_str())?.is_wildcard(&config.wildcard) {
                return Err(Error::Configuration(format!(
                    "Divert '{}' forwards to wildcard address '{}'",
                    divert.name, divert.forwarding_address
                )));
            }
            if divert.forwarding_address == divert.address {
                return Err(Error::Configuration(format!(
                    "Divert '{}' forwards to its own address '{}'",
                    divert.name, divert.address
                )));
            }
            check_filter(divert.filter.as_deref(), &divert.name)?;
        }

        Ok(())
    }
}

fn check_address(address: &str, binding: &str) -> Result<()> {
    Address::new(address)
        .map(drop)
        .map_err(|e| Error::Configuration(format!("Binding '{binding}' has an invalid address: {e}")))
}

fn check_filter(filter: Option<&str>, binding: &str) -> Result<()> {
    Filter::parse_optional(filter)
        .map(drop)
        .map_err(|e| Error::Configuration(format!("Binding '{binding}' has an invalid filter: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{AddressSettingsEntry, DivertConfig, QueueConfig};

    fn queue(name: &str, address: &str) -> QueueConfig {
        QueueConfig { name: name.to_string(), address: address.to_string(), filter: None, durable: true }
    }

    fn divert(name: &str, address: &str, forwarding: &str) -> DivertConfig {
        DivertConfig {
            name: name.to_string(),
            address: address.to_string(),
            forwarding_address: forwarding.to_string(),
            exclusive: false,
            filter: None,
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(ConfigValidator::validate(&KaelixConfig::default()).is_ok());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut config = KaelixConfig::default();
        config.queues.push(queue("same", "a"));
        config.diverts.push(divert("same", "b", "c"));
        assert!(matches!(ConfigValidator::validate(&config), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_divert_to_self_rejected() {
        let mut config = KaelixConfig::default();
        config.diverts.push(divert("loop", "a", "a"));
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_divert_to_wildcard_rejected() {
        let mut config = KaelixConfig::default();
        config.diverts.push(divert("wide", "a", "b.*"));
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_bad_filter_rejected() {
        let mut config = KaelixConfig::default();
        let mut q = queue("q", "a");
        q.filter = Some("x = ".to_string());
        config.queues.push(q);
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_wildcard_clash_rejected() {
        let mut config = KaelixConfig::default();
        config.wildcard.any_words = '*';
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_empty_match_rejected() {
        let mut config = KaelixConfig::default();
        config.address_settings.push(AddressSettingsEntry {
            pattern: String::new(),
            settings: Default::default(),
        });
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_address_settings_entry_rules() {
        use crate::config::schema::AddressSettings;

        let validator = ConfigValidator::new();
        let wildcard = WildcardConfiguration::default();
        let check = |settings: AddressSettings| {
            validator.validate_address_settings_entry(
                &AddressSettingsEntry { pattern: "orders.#".to_string(), settings },
                &wildcard,
            )
        };

        assert!(check(AddressSettings { max_delivery_attempts: Some(1), ..Default::default() }).is_ok());
        assert!(check(AddressSettings { dead_letter_address: Some("DLA".to_string()), ..Default::default() }).is_ok());
        assert!(matches!(
            check(AddressSettings { max_delivery_attempts: Some(0), ..Default::default() }),
            Err(Error::Configuration(_))
        ));
        assert!(check(AddressSettings { dead_letter_address: Some(String::new()), ..Default::default() }).is_err());
        assert!(check(AddressSettings { expiry_address: Some("expired.*".to_string()), ..Default::default() }).is_err());
    }

    #[test]
    fn test_bad_log_level_rejected() {
        let mut config = KaelixConfig::default();
        config.logging.level = "kaelix=loud".to_string();
        assert!(ConfigValidator::validate(&config).is_err());
    }
}
