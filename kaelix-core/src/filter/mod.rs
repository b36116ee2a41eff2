//! Message selectors.
//!
//! A filter is a boolean expression over message properties and headers in
//! the JMS selector syntax:
//!
//! ```rust
//! use kaelix_core::filter::Filter;
//! use kaelix_core::Message;
//! use bytes::Bytes;
//!
//! # fn example() -> kaelix_core::Result<()> {
//! let filter = Filter::parse("region = 'eu' AND qty BETWEEN 1 AND 10")?;
//!
//! let message = Message::new("orders", Bytes::new())?;
//! message.properties.put_string("region", "eu");
//! message.properties.put_int("qty", 4);
//! assert!(filter.matches(&message));
//!
//! // unknown properties make the expression UNKNOWN, which does not match
//! message.properties.remove("qty");
//! assert!(!filter.matches(&message));
//! # Ok(())
//! # }
//! ```
//!
//! Headers are addressed by reserved identifiers: `AMQPriority`,
//! `AMQTimestamp`, `AMQExpiration`, `AMQDurable` (`'DURABLE'` or
//! `'NON_DURABLE'`), `AMQAddress` and `AMQUserID`.

mod evaluator;
mod lexer;
pub mod parser;

pub use evaluator::Value;
pub use parser::Expr;

use crate::message::Message;
use crate::properties::PropertyValue;
use crate::Result;
use std::fmt;

/// Source of identifier values during evaluation.
pub trait FilterContext {
    /// Value of `identifier`, or `None` when it is unset or has no filter
    /// representation.
    fn value(&self, identifier: &str) -> Option<Value>;
}

/// A parsed filter expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    expression: String,
    root: Expr,
}

impl Filter {
    /// Parse a filter expression.
    ///
    /// # Errors
    /// Returns `InvalidFilter` when the expression does not parse.
    pub fn parse(expression: &str) -> Result<Self> {
        let root = parser::parse(expression)?;
        Ok(Self { expression: expression.trim().to_string(), root })
    }

    /// Parse an optional expression; `None` or blank text means no filter.
    ///
    /// # Errors
    /// Returns `InvalidFilter` when a non-blank expression does not parse.
    pub fn parse_optional(expression: Option<&str>) -> Result<Option<Self>> {
        match expression.map(str::trim) {
            None | Some("") => Ok(None),
            Some(text) => Self::parse(text).map(Some),
        }
    }

    /// Source text of the expression.
    #[must_use]
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Parsed expression tree.
    #[must_use]
    pub const fn root(&self) -> &Expr {
        &self.root
    }

    /// Check whether the expression is TRUE for `ctx`.
    #[must_use]
    pub fn matches(&self, ctx: &dyn FilterContext) -> bool {
        evaluator::truth(&self.root, ctx) == Some(true)
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

fn property_value(value: PropertyValue) -> Option<Value> {
    match value {
        PropertyValue::Null | PropertyValue::Bytes(_) => None,
        PropertyValue::Boolean(b) => Some(Value::Bool(b)),
        PropertyValue::Byte(v) => Some(Value::Int(i64::from(v))),
        PropertyValue::Short(v) => Some(Value::Int(i64::from(v))),
        PropertyValue::Int(v) => Some(Value::Int(i64::from(v))),
        PropertyValue::Long(v) => Some(Value::Int(v)),
        PropertyValue::Float(v) => Some(Value::Float(f64::from(v))),
        PropertyValue::Double(v) => Some(Value::Float(v)),
        value @ PropertyValue::Char(_) => Some(Value::Str(value.to_string())),
        PropertyValue::String(s) => Some(Value::Str(s)),
    }
}

impl FilterContext for Message {
    fn value(&self, identifier: &str) -> Option<Value> {
        match identifier {
            "AMQPriority" => Some(Value::Int(i64::from(self.priority))),
            "AMQTimestamp" => Some(Value::Int(self.timestamp.timestamp_millis())),
            "AMQExpiration" => {
                Some(Value::Int(self.expiration.map_or(0, |e| e.timestamp_millis())))
            },
            "AMQDurable" => {
                let durable = if self.durable { "DURABLE" } else { "NON_DURABLE" };
                Some(Value::Str(durable.to_string()))
            },
            "AMQAddress" => Some(Value::Str(self.address.to_string())),
            "AMQUserID" => self.user_id.clone().map(Value::Str),
            name => self.properties.get_object(name).and_then(property_value),
        }
    }
}

impl FilterContext for std::collections::HashMap<String, Value> {
    fn value(&self, identifier: &str) -> Option<Value> {
        self.get(identifier).cloned()
    }
}
