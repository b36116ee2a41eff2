//! Addresses and wildcard matching.
//!
//! An address is a delimiter-separated list of words, `orders.eu.created`.
//! Binding patterns may use two wildcard words:
//!
//! - `*` matches exactly one word
//! - `#` matches zero or more words
//!
//! [`matches`] answers a single pattern/address question. [`AddressTrie`]
//! indexes many patterns so that every pattern matching a concrete address
//! is found without testing each one.

pub mod matcher;
pub mod trie;

pub use matcher::matches;
pub use trie::AddressTrie;

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A routable address, possibly containing wildcard words when used as a
/// binding pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    /// Create an address.
    ///
    /// # Errors
    /// Returns `InvalidAddress` for an empty name or one containing control
    /// characters.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::invalid_address("address cannot be empty"));
        }
        if name.chars().any(char::is_control) {
            return Err(Error::invalid_address(format!("address {name:?} contains control characters")));
        }
        Ok(Self(name))
    }

    /// Address as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert to owned string.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }

    /// Check whether this address contains wildcard words under `config`.
    #[must_use]
    pub fn is_wildcard(&self, config: &WildcardConfiguration) -> bool {
        config.segments(&self.0).any(|s| !matches!(s, Segment::Literal(_)))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Address {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl TryFrom<&str> for Address {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.0
    }
}

/// One word of a pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    /// Must equal the address word byte for byte.
    Literal(&'a str),
    /// Matches exactly one word.
    SingleWord,
    /// Matches zero or more words.
    AnyWords,
}

/// Wildcard syntax used to split and interpret addresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WildcardConfiguration {
    /// Whether `*` and `#` words are interpreted at all.
    pub enabled: bool,
    /// Word delimiter.
    pub delimiter: char,
    /// Word matching zero or more words.
    pub any_words: char,
    /// Word matching exactly one word.
    pub single_word: char,
}

impl Default for WildcardConfiguration {
    fn default() -> Self {
        Self { enabled: true, delimiter: '.', any_words: '#', single_word: '*' }
    }
}

impl WildcardConfiguration {
    /// Split `address` into classified segments.
    pub fn segments<'a>(&'a self, address: &'a str) -> impl Iterator<Item = Segment<'a>> + 'a {
        address.split(self.delimiter).map(move |word| self.classify(word))
    }

    fn classify<'a>(&self, word: &'a str) -> Segment<'a> {
        if self.enabled {
            let mut chars = word.chars();
            if let (Some(c), None) = (chars.next(), chars.next()) {
                if c == self.any_words {
                    return Segment::AnyWords;
                }
                if c == self.single_word {
                    return Segment::SingleWord;
                }
            }
        }
        Segment::Literal(word)
    }

    /// Split a concrete address into words.
    pub fn words<'a>(&self, address: &'a str) -> impl Iterator<Item = &'a str> {
        address.split(self.delimiter)
    }

    /// Test `address` against `pattern` under this configuration.
    #[must_use]
    pub fn matches(&self, pattern: &str, address: &str) -> bool {
        matcher::matches_with(self, pattern, address)
    }

    /// Check that the three special characters are distinct.
    ///
    /// # Errors
    /// Returns `Configuration` when two of them coincide.
    pub fn validate(&self) -> Result<()> {
        let chars = [self.delimiter, self.any_words, self.single_word];
        if chars[0] == chars[1] || chars[0] == chars[2] || chars[1] == chars[2] {
            return Err(Error::Configuration(format!(
                "wildcard delimiter '{}', any-words '{}' and single-word '{}' must be distinct",
                self.delimiter, self.any_words, self.single_word
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_validation() {
        assert!(Address::new("orders.eu").is_ok());
        assert!(Address::new("").is_err());
        assert!(Address::new("bad\naddress").is_err());
    }

    #[test]
    fn test_wildcard_detection() {
        let config = WildcardConfiguration::default();
        assert!(Address::new("a.*").unwrap().is_wildcard(&config));
        assert!(Address::new("#").unwrap().is_wildcard(&config));
        assert!(!Address::new("a.b*").unwrap().is_wildcard(&config));

        let disabled = WildcardConfiguration { enabled: false, ..Default::default() };
        assert!(!Address::new("a.*").unwrap().is_wildcard(&disabled));
    }

    #[test]
    fn test_segments() {
        let config = WildcardConfiguration::default();
        let segments: Vec<_> = config.segments("a.*.#").collect();
        assert_eq!(segments, vec![Segment::Literal("a"), Segment::SingleWord, Segment::AnyWords]);
    }

    #[test]
    fn test_custom_delimiter() {
        let config = WildcardConfiguration { delimiter: '/', any_words: '>', ..Default::default() };
        assert!(config.matches("a/>", "a/b/c"));
        assert!(!config.matches("a.#", "a.b"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_clash() {
        let config = WildcardConfiguration { single_word: '.', ..Default::default() };
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_address_serde() {
        let address: Address = toml::Value::String("a.b".to_string()).try_into().unwrap();
        assert_eq!(address.as_str(), "a.b");
        let bad: std::result::Result<Address, _> = toml::Value::String(String::new()).try_into();
        assert!(bad.is_err());
    }
}
