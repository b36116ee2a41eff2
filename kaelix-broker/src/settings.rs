//! Address settings resolution.
//!
//! Every `[[address_settings]]` entry whose pattern matches an address
//! contributes to that address's settings. Fields are taken from the most
//! specific matching entry that sets them, then from the broker-wide
//! delivery defaults.

use crate::Result;
use kaelix_core::address::{Address, Segment, WildcardConfiguration};
use kaelix_core::config::{AddressSettings, AddressSettingsEntry, ConfigValidator, DeliveryConfig};
use kaelix_core::message::headers::HDR_LAST_VALUE_NAME;
use parking_lot::RwLock;
use std::cmp::Reverse;
use tracing::{debug, warn};

/// Fully resolved settings for one address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSettings {
    /// Property grouping messages of a last-value queue; `None` for an
    /// ordinary queue
    pub last_value_key: Option<String>,
    /// Deliveries attempted before dead-lettering
    pub max_delivery_attempts: u32,
    /// Dead-letter address
    pub dead_letter_address: Option<Address>,
    /// Expiry address
    pub expiry_address: Option<Address>,
}

/// Pattern-keyed settings with specificity-ordered merging.
#[derive(Debug)]
pub struct AddressSettingsRepository {
    wildcard: WildcardConfiguration,
    defaults: DeliveryConfig,
    entries: RwLock<Vec<AddressSettingsEntry>>,
}

/// Specificity of a pattern: literal words first, then fewer `#`, then fewer `*`.
fn specificity(wildcard: &WildcardConfiguration, pattern: &str) -> (usize, Reverse<usize>, Reverse<usize>) {
    let (mut literal, mut any, mut single) = (0, 0, 0);
    for segment in wildcard.segments(pattern) {
        match segment {
            Segment::Literal(_) => literal += 1,
            Segment::AnyWords => any += 1,
            Segment::SingleWord => single += 1,
        }
    }
    (literal, Reverse(any), Reverse(single))
}

/// Parse a configured dead-letter or expiry address, logging and ignoring
/// one that is not a valid address.
fn target_address(address: &str, role: &str, target: Option<String>) -> Option<Address> {
    let target = target?;
    match Address::new(target.as_str()) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            warn!(%address, role, %target, error = %e, "Ignoring invalid address in settings");
            None
        },
    }
}

impl AddressSettingsRepository {
    /// Create a repository.
    #[must_use]
    pub fn new(
        wildcard: WildcardConfiguration,
        defaults: DeliveryConfig,
        entries: Vec<AddressSettingsEntry>,
    ) -> Self {
        Self { wildcard, defaults, entries: RwLock::new(entries) }
    }

    /// Add or replace the entry for `pattern`.
    ///
    /// # Errors
    /// Returns a configuration error when the entry fails the same checks
    /// applied to configured entries; the repository is left unchanged.
    pub fn add_match(&self, pattern: impl Into<String>, settings: AddressSettings) -> Result<()> {
        let entry = AddressSettingsEntry { pattern: pattern.into(), settings };
        ConfigValidator::new().validate_address_settings_entry(&entry, &self.wildcard)?;

        let mut entries = self.entries.write();
        entries.retain(|e| e.pattern != entry.pattern);
        debug!(pattern = %entry.pattern, "Address settings added");
        entries.push(entry);
        Ok(())
    }

    /// Remove the entry for `pattern`; `false` when there was none.
    pub fn remove_match(&self, pattern: &str) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|e| e.pattern != pattern);
        entries.len() != before
    }

    /// Merge the settings of every entry matching `address`.
    #[must_use]
    pub fn get_match(&self, address: &str) -> AddressSettings {
        let entries = self.entries.read();
        let mut matching: Vec<(usize, &AddressSettingsEntry)> = entries
            .iter()
            .enumerate()
            .filter(|(_, e)| self.wildcard.matches(&e.pattern, address))
            .collect();
        // most specific first; later declarations win ties
        matching.sort_by_key(|(index, e)| Reverse((specificity(&self.wildcard, &e.pattern), *index)));

        matching
            .into_iter()
            .fold(AddressSettings::default(), |merged, (_, e)| merged.merge_with(&e.settings))
    }

    /// Settings for `address` with defaults applied.
    #[must_use]
    pub fn resolve(&self, address: &str) -> ResolvedSettings {
        let settings = self.get_match(address);

        let last_value_key = match (settings.last_value_key, settings.last_value_queue) {
            (_, Some(false)) => None,
            (Some(key), _) => Some(key),
            (None, Some(true)) => Some(HDR_LAST_VALUE_NAME.to_string()),
            (None, None) => None,
        };

        let dead_letter_address = target_address(
            address,
            "dead-letter",
            settings.dead_letter_address.or_else(|| self.defaults.dead_letter_address.clone()),
        );
        let expiry_address = target_address(
            address,
            "expiry",
            settings.expiry_address.or_else(|| self.defaults.expiry_address.clone()),
        );

        ResolvedSettings {
            last_value_key,
            max_delivery_attempts: settings
                .max_delivery_attempts
                .unwrap_or(self.defaults.max_delivery_attempts),
            dead_letter_address,
            expiry_address,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(pattern: &str, settings: AddressSettings) -> AddressSettingsEntry {
        AddressSettingsEntry { pattern: pattern.to_string(), settings }
    }

    fn repository(entries: Vec<AddressSettingsEntry>) -> AddressSettingsRepository {
        AddressSettingsRepository::new(WildcardConfiguration::default(), DeliveryConfig::default(), entries)
    }

    #[test]
    fn test_defaults_when_nothing_matches() {
        let resolved = repository(Vec::new()).resolve("a.b");
        assert_eq!(resolved.max_delivery_attempts, 10);
        assert_eq!(resolved.last_value_key, None);
        assert_eq!(resolved.dead_letter_address, None);
    }

    #[test]
    fn test_specific_overrides_general_per_field() {
        let repo = repository(vec![
            entry(
                "orders.#",
                AddressSettings {
                    max_delivery_attempts: Some(5),
                    dead_letter_address: Some("DLQ".to_string()),
                    ..Default::default()
                },
            ),
            entry("orders.eu", AddressSettings { max_delivery_attempts: Some(2), ..Default::default() }),
        ]);

        let eu = repo.resolve("orders.eu");
        assert_eq!(eu.max_delivery_attempts, 2);
        assert_eq!(eu.dead_letter_address.as_ref().map(Address::as_str), Some("DLQ"));

        let us = repo.resolve("orders.us");
        assert_eq!(us.max_delivery_attempts, 5);
    }

    #[test]
    fn test_single_word_beats_any_words() {
        let repo = repository(vec![
            entry("a.*", AddressSettings { max_delivery_attempts: Some(3), ..Default::default() }),
            entry("a.#", AddressSettings { max_delivery_attempts: Some(4), ..Default::default() }),
        ]);
        assert_eq!(repo.resolve("a.b").max_delivery_attempts, 3);
        assert_eq!(repo.resolve("a.b.c").max_delivery_attempts, 4);
    }

    #[test]
    fn test_last_value_key_resolution() {
        let repo = repository(vec![
            entry("lvq.#", AddressSettings { last_value_queue: Some(true), ..Default::default() }),
            entry("lvq.custom", AddressSettings { last_value_key: Some("sym".to_string()), ..Default::default() }),
            entry("lvq.off", AddressSettings { last_value_queue: Some(false), ..Default::default() }),
        ]);
        assert_eq!(repo.resolve("lvq.a").last_value_key.as_deref(), Some(HDR_LAST_VALUE_NAME));
        assert_eq!(repo.resolve("lvq.custom").last_value_key.as_deref(), Some("sym"));
        assert_eq!(repo.resolve("lvq.off").last_value_key, None);
        assert_eq!(repo.resolve("other").last_value_key, None);
    }

    #[test]
    fn test_add_and_remove_match() {
        let repo = repository(Vec::new());
        repo.add_match("x", AddressSettings { max_delivery_attempts: Some(1), ..Default::default() }).unwrap();
        repo.add_match("x", AddressSettings { max_delivery_attempts: Some(2), ..Default::default() }).unwrap();
        assert_eq!(repo.resolve("x").max_delivery_attempts, 2);
        assert!(repo.remove_match("x"));
        assert!(!repo.remove_match("x"));
        assert_eq!(repo.resolve("x").max_delivery_attempts, 10);
    }

    #[test]
    fn test_add_match_rejects_invalid_entries() {
        let repo = repository(Vec::new());
        repo.add_match("x", AddressSettings { max_delivery_attempts: Some(4), ..Default::default() }).unwrap();

        let zero = repo.add_match("x", AddressSettings { max_delivery_attempts: Some(0), ..Default::default() });
        assert!(matches!(zero, Err(crate::BrokerError::Core(kaelix_core::Error::Configuration(_)))));
        let wide = repo.add_match("x", AddressSettings { dead_letter_address: Some("dead.#".to_string()), ..Default::default() });
        assert!(wide.is_err());
        assert!(repo.add_match("", AddressSettings::default()).is_err());

        // rejected entries leave the previous one in place
        assert_eq!(repo.resolve("x").max_delivery_attempts, 4);
        assert_eq!(repo.resolve("x").dead_letter_address, None);
    }

    #[test]
    fn test_invalid_default_target_is_ignored() {
        let defaults = DeliveryConfig { dead_letter_address: Some(String::new()), ..DeliveryConfig::default() };
        let repo = AddressSettingsRepository::new(WildcardConfiguration::default(), defaults, Vec::new());
        let resolved = repo.resolve("a");
        assert_eq!(resolved.dead_letter_address, None);
        assert_eq!(resolved.max_delivery_attempts, 10);
    }
}
