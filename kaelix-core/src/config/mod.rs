//! Configuration management.
//!
//! - Schema-driven configuration with `validator` field rules
//! - Multi-source loading (defaults, TOML file, `KAELIX_*` environment)
//! - Semantic validation across sections
//!
//! # Examples
//!
//! ```rust
//! use kaelix_core::config::KaelixConfig;
//!
//! let config: KaelixConfig = toml::from_str(r#"
//!     [[queues]]
//!     name = "orders"
//!     address = "orders.#"
//! "#).unwrap();
//!
//! kaelix_core::config::validate(&config).unwrap();
//! assert_eq!(config.routing.max_divert_hops, 10);
//! ```

pub mod loader;
pub mod schema;
pub mod validator;

pub use loader::ConfigLoader;
pub use schema::*;
pub use validator::ConfigValidator;

use crate::Result;
use std::path::Path;

/// Load configuration from the default search paths and environment.
///
/// # Errors
/// Returns `Configuration` when loading or validation fails.
pub fn load_default() -> Result<KaelixConfig> {
    ConfigLoader::new().load()
}

/// Load configuration from a specific file.
///
/// # Errors
/// Returns `Configuration` when loading or validation fails.
pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<KaelixConfig> {
    ConfigLoader::new().load_from_file(path)
}

/// Validate a configuration object.
///
/// # Errors
/// Returns `Configuration` describing the first violated rule.
pub fn validate(config: &KaelixConfig) -> Result<()> {
    ConfigValidator::validate(config)
}
