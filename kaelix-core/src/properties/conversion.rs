//! JMS property conversion rules.
//!
//! A stored value converts to a requested type only along the widening
//! paths allowed by JMS. Strings parse into any scalar type; byte arrays and
//! chars never convert to numbers.

use super::value::PropertyValue;
use crate::{Error, Result};
use bytes::Bytes;
use std::str::FromStr;

/// Types that can be read out of a [`super::TypedProperties`] container.
pub trait FromProperty: Sized {
    /// Convert a stored value.
    ///
    /// # Errors
    /// Returns `PropertyConversion` when the conversion is not allowed or a
    /// string fails to parse.
    fn from_value(key: &str, value: &PropertyValue) -> Result<Self>;

    /// Result for a key that is not set or holds an explicit null.
    ///
    /// # Errors
    /// Primitive types fail with `PropertyConversion` by default.
    fn from_missing(key: &str) -> Result<Self> {
        Err(Error::property_conversion(key, "property not set"))
    }
}

fn not_allowed(key: &str, value: &PropertyValue, requested: &str) -> Error {
    Error::property_conversion(
        key,
        format!("cannot convert {} to {requested}", value.property_type()),
    )
}

fn parse<T>(key: &str, text: &str, requested: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    text.parse::<T>().map_err(|e| {
        Error::property_conversion(key, format!("cannot parse {text:?} as {requested}: {e}"))
    })
}

impl FromProperty for bool {
    fn from_value(key: &str, value: &PropertyValue) -> Result<Self> {
        match value {
            PropertyValue::Boolean(v) => Ok(*v),
            PropertyValue::String(s) => Ok(s.eq_ignore_ascii_case("true")),
            other => Err(not_allowed(key, other, "boolean")),
        }
    }

    fn from_missing(_key: &str) -> Result<Self> {
        Ok(false)
    }
}

impl FromProperty for i8 {
    fn from_value(key: &str, value: &PropertyValue) -> Result<Self> {
        match value {
            PropertyValue::Byte(v) => Ok(*v),
            PropertyValue::String(s) => parse(key, s, "byte"),
            other => Err(not_allowed(key, other, "byte")),
        }
    }
}

impl FromProperty for i16 {
    fn from_value(key: &str, value: &PropertyValue) -> Result<Self> {
        match value {
            PropertyValue::Byte(v) => Ok(Self::from(*v)),
            PropertyValue::Short(v) => Ok(*v),
            PropertyValue::String(s) => parse(key, s, "short"),
            other => Err(not_allowed(key, other, "short")),
        }
    }
}

impl FromProperty for i32 {
    fn from_value(key: &str, value: &PropertyValue) -> Result<Self> {
        match value {
            PropertyValue::Byte(v) => Ok(Self::from(*v)),
            PropertyValue::Short(v) => Ok(Self::from(*v)),
            PropertyValue::Int(v) => Ok(*v),
            PropertyValue::String(s) => parse(key, s, "int"),
            other => Err(not_allowed(key, other, "int")),
        }
    }
}

impl FromProperty for i64 {
    fn from_value(key: &str, value: &PropertyValue) -> Result<Self> {
        match value {
            PropertyValue::Byte(v) => Ok(Self::from(*v)),
            PropertyValue::Short(v) => Ok(Self::from(*v)),
            PropertyValue::Int(v) => Ok(Self::from(*v)),
            PropertyValue::Long(v) => Ok(*v),
            PropertyValue::String(s) => parse(key, s, "long"),
            other => Err(not_allowed(key, other, "long")),
        }
    }
}

impl FromProperty for f32 {
    fn from_value(key: &str, value: &PropertyValue) -> Result<Self> {
        match value {
            PropertyValue::Float(v) => Ok(*v),
            PropertyValue::String(s) => parse(key, s, "float"),
            other => Err(not_allowed(key, other, "float")),
        }
    }
}

impl FromProperty for f64 {
    fn from_value(key: &str, value: &PropertyValue) -> Result<Self> {
        match value {
            PropertyValue::Float(v) => Ok(Self::from(*v)),
            PropertyValue::Double(v) => Ok(*v),
            PropertyValue::String(s) => parse(key, s, "double"),
            other => Err(not_allowed(key, other, "double")),
        }
    }
}

impl FromProperty for String {
    fn from_value(key: &str, value: &PropertyValue) -> Result<Self> {
        match value {
            PropertyValue::Bytes(_) => Err(not_allowed(key, value, "string")),
            other => Ok(other.to_string()),
        }
    }
}

impl FromProperty for Bytes {
    fn from_value(key: &str, value: &PropertyValue) -> Result<Self> {
        match value {
            PropertyValue::Bytes(v) => Ok(v.clone()),
            other => Err(not_allowed(key, other, "bytes")),
        }
    }
}

/// Object getters: absent or null yields `None` instead of an error.
impl<T: FromProperty> FromProperty for Option<T> {
    fn from_value(key: &str, value: &PropertyValue) -> Result<Self> {
        T::from_value(key, value).map(Some)
    }

    fn from_missing(_key: &str) -> Result<Self> {
        Ok(None)
    }
}

/// Convert a stored value to a UTF-16 code unit. Only chars qualify.
pub(crate) fn char_from_value(key: &str, value: &PropertyValue) -> Result<u16> {
    match value {
        PropertyValue::Char(v) => Ok(*v),
        other => Err(not_allowed(key, other, "char")),
    }
}
