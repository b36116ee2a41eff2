//! Configuration schema for a Kaelix broker.
//!
//! Every section has defaults, so an empty file (or no file at all) yields a
//! working broker. Sources are layered: defaults → file → environment.

use crate::address::WildcardConfiguration;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Root configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct KaelixConfig {
    /// Address word syntax
    pub wildcard: WildcardConfiguration,

    /// Router limits
    #[validate(nested)]
    pub routing: RoutingConfig,

    /// Broker-wide delivery defaults, overridden per address by
    /// `address_settings`
    #[validate(nested)]
    pub delivery: DeliveryConfig,

    /// Log output
    #[validate(nested)]
    pub logging: LoggingConfig,

    /// Per-address settings; every entry whose pattern matches an address
    /// contributes, more specific patterns winning
    #[validate(nested)]
    pub address_settings: Vec<AddressSettingsEntry>,

    /// Queues deployed at start-up
    #[validate(nested)]
    pub queues: Vec<QueueConfig>,

    /// Diverts deployed at start-up
    #[validate(nested)]
    pub diverts: Vec<DivertConfig>,
}

impl Default for KaelixConfig {
    fn default() -> Self {
        Self {
            wildcard: WildcardConfiguration::default(),
            routing: RoutingConfig::default(),
            delivery: DeliveryConfig::default(),
            logging: LoggingConfig::default(),
            address_settings: Vec::new(),
            queues: Vec::new(),
            diverts: Vec::new(),
        }
    }
}

/// Router limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct RoutingConfig {
    /// Longest divert chain a single publish may follow before the copy is
    /// dropped
    #[validate(range(min = 1, max = 1000))]
    pub max_divert_hops: u32,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self { max_divert_hops: 10 }
    }
}

/// Delivery defaults applied when no address setting overrides them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Deliveries attempted before a message is dead-lettered
    #[validate(range(min = 1))]
    pub max_delivery_attempts: u32,

    /// Where dead-lettered messages go; dropped when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dead_letter_address: Option<String>,

    /// Where expired messages go; dropped when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry_address: Option<String>,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self { max_delivery_attempts: 10, dead_letter_address: None, expiry_address: None }
    }
}

/// Log output configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `"info"` or `"kaelix_broker=debug,info"`
    #[validate(length(min = 1))]
    pub level: String,

    /// Output format
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: LogFormat::Text }
    }
}

/// Log output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text
    Text,
    /// One JSON object per event
    Json,
}

/// Settings overriding the delivery defaults for matching addresses.
///
/// Unset fields inherit from less specific entries and finally from
/// [`DeliveryConfig`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct AddressSettings {
    /// Collapse undelivered messages sharing a last-value key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_value_queue: Option<bool>,

    /// Property naming the last-value key; `_AMQ_LVQ_NAME` when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1))]
    pub last_value_key: Option<String>,

    /// Deliveries attempted before dead-lettering
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1))]
    pub max_delivery_attempts: Option<u32>,

    /// Dead-letter address
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dead_letter_address: Option<String>,

    /// Expiry address
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry_address: Option<String>,
}

impl AddressSettings {
    /// Fill every unset field of `self` from `fallback`.
    #[must_use]
    pub fn merge_with(mut self, fallback: &Self) -> Self {
        self.last_value_queue = self.last_value_queue.or(fallback.last_value_queue);
        self.last_value_key = self.last_value_key.or_else(|| fallback.last_value_key.clone());
        self.max_delivery_attempts = self.max_delivery_attempts.or(fallback.max_delivery_attempts);
        self.dead_letter_address =
            self.dead_letter_address.or_else(|| fallback.dead_letter_address.clone());
        self.expiry_address = self.expiry_address.or_else(|| fallback.expiry_address.clone());
        self
    }
}

/// An `[[address_settings]]` table: a match pattern and its settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct AddressSettingsEntry {
    /// Address pattern, wildcards allowed
    #[serde(rename = "match")]
    #[validate(length(min = 1))]
    pub pattern: String,

    /// Settings applied to matching addresses
    #[serde(flatten)]
    #[validate(nested)]
    pub settings: AddressSettings,
}

/// A queue deployed at start-up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct QueueConfig {
    /// Unique binding name
    #[validate(length(min = 1))]
    pub name: String,

    /// Address (or wildcard pattern) the queue is bound to
    #[validate(length(min = 1))]
    pub address: String,

    /// Filter expression messages must satisfy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,

    /// Whether durable messages routed here are persisted
    #[serde(default = "default_true")]
    pub durable: bool,
}

/// A divert deployed at start-up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct DivertConfig {
    /// Unique binding name
    #[validate(length(min = 1))]
    pub name: String,

    /// Source address (or wildcard pattern)
    #[validate(length(min = 1))]
    pub address: String,

    /// Address copies are forwarded to
    #[validate(length(min = 1))]
    pub forwarding_address: String,

    /// An exclusive divert takes the message away from the source queues
    #[serde(default)]
    pub exclusive: bool,

    /// Filter expression messages must satisfy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

const fn default_true() -> bool {
    true
}
