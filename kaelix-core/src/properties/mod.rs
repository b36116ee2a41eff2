//! Typed property container carried by every message.
//!
//! [`TypedProperties`] maps property names to [`PropertyValue`]s and keeps a
//! running total of its encoded size so that [`TypedProperties::encode_size`]
//! is O(1). The backing map is allocated lazily: a container that has never
//! been written to encodes as a single null marker byte.
//!
//! All mutation, encoding and decoding goes through one mutex per container.
//! `contains`, `len` and `is_empty` short-circuit on an atomic entry count
//! when the container is empty.
//!
//! ```rust
//! use kaelix_core::properties::TypedProperties;
//! use bytes::BytesMut;
//!
//! # fn example() -> kaelix_core::Result<()> {
//! let props = TypedProperties::new();
//! props.put_short("retries", 3);
//! props.put_string("region", "eu-west");
//!
//! // widening conversion
//! assert_eq!(props.get_long("retries")?, 3);
//!
//! let mut buf = BytesMut::new();
//! props.encode(&mut buf);
//! assert_eq!(buf.len(), props.encode_size());
//!
//! let decoded = TypedProperties::decode_new(&mut buf.freeze())?;
//! assert_eq!(decoded, props);
//! # Ok(())
//! # }
//! ```

pub mod conversion;
pub mod value;

pub use conversion::FromProperty;
pub use value::{PropertyType, PropertyValue};

use crate::protocol::data_constants::{NOT_NULL, NULL, SIZE_BYTE, SIZE_INT};
use crate::protocol::{wire, ProtocolError, ProtocolResult};
use crate::Result;
use bytes::{Buf, BufMut, Bytes};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Key prefix reserved for broker-internal properties.
pub const INTERNAL_PROPERTY_PREFIX: &str = "_HQ_";

/// Approximate per-entry bookkeeping cost of the backing map.
const ENTRY_OVERHEAD: usize = 32;

/// Smallest possible encoded entry: empty key plus a null tag.
const MIN_ENTRY_SIZE: usize = SIZE_INT + SIZE_BYTE;

#[derive(Debug, Default, Clone)]
struct PropertyMap {
    entries: Option<HashMap<String, PropertyValue>>,
    byte_size: usize,
    internal_properties: bool,
}

impl PropertyMap {
    fn entry_size(key: &str, value: &PropertyValue) -> usize {
        wire::simple_string_size(key) + value.encoded_size()
    }

    fn insert(&mut self, key: String, value: PropertyValue) -> Option<PropertyValue> {
        if key.starts_with(INTERNAL_PROPERTY_PREFIX) {
            self.internal_properties = true;
        }
        let entries = self.entries.get_or_insert_with(HashMap::new);
        let new_size = value.encoded_size();
        let key_size = wire::simple_string_size(&key);

        let previous = entries.insert(key, value);
        match &previous {
            Some(old) => {
                self.byte_size = self.byte_size - old.encoded_size() + new_size;
            },
            None => self.byte_size += key_size + new_size,
        }
        previous
    }

    fn remove(&mut self, key: &str) -> Option<PropertyValue> {
        let removed = self.entries.as_mut()?.remove(key)?;
        self.byte_size -= Self::entry_size(key, &removed);
        Some(removed)
    }

    fn len(&self) -> usize {
        self.entries.as_ref().map_or(0, HashMap::len)
    }

    fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.entries.as_ref()?.get(key)
    }
}

/// Thread-safe typed property container with a length-prefixed binary form.
pub struct TypedProperties {
    inner: Mutex<PropertyMap>,
    entry_count: AtomicUsize,
}

impl TypedProperties {
    /// Create an empty container without allocating the backing map.
    #[must_use]
    pub fn new() -> Self {
        Self { inner: Mutex::new(PropertyMap::default()), entry_count: AtomicUsize::new(0) }
    }

    /// Decode a fresh container from `buf`.
    ///
    /// # Errors
    /// See [`TypedProperties::decode`].
    pub fn decode_new<B: Buf + ?Sized>(buf: &mut B) -> ProtocolResult<Self> {
        let properties = Self::new();
        properties.decode(buf)?;
        Ok(properties)
    }

    fn with_map<R>(&self, f: impl FnOnce(&mut PropertyMap) -> R) -> R {
        let mut map = self.inner.lock();
        let result = f(&mut map);
        self.entry_count.store(map.len(), Ordering::Release);
        result
    }

    /// Insert or replace a value, returning the previous one.
    ///
    /// `None` strings and byte arrays are stored as [`PropertyValue::Null`].
    pub fn put(&self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Option<PropertyValue> {
        let key = key.into();
        let value = value.into();
        self.with_map(|map| map.insert(key, value))
    }

    /// Store a boolean.
    pub fn put_bool(&self, key: impl Into<String>, value: bool) {
        self.put(key, value);
    }

    /// Store a signed byte.
    pub fn put_byte(&self, key: impl Into<String>, value: i8) {
        self.put(key, value);
    }

    /// Store a byte array.
    pub fn put_bytes(&self, key: impl Into<String>, value: impl Into<Bytes>) {
        self.put(key, PropertyValue::Bytes(value.into()));
    }

    /// Store a 16-bit integer.
    pub fn put_short(&self, key: impl Into<String>, value: i16) {
        self.put(key, value);
    }

    /// Store a 32-bit integer.
    pub fn put_int(&self, key: impl Into<String>, value: i32) {
        self.put(key, value);
    }

    /// Store a 64-bit integer.
    pub fn put_long(&self, key: impl Into<String>, value: i64) {
        self.put(key, value);
    }

    /// Store a single-precision float.
    pub fn put_float(&self, key: impl Into<String>, value: f32) {
        self.put(key, value);
    }

    /// Store a double-precision float.
    pub fn put_double(&self, key: impl Into<String>, value: f64) {
        self.put(key, value);
    }

    /// Store a UTF-16 code unit.
    pub fn put_char(&self, key: impl Into<String>, value: u16) {
        self.put(key, PropertyValue::Char(value));
    }

    /// Store a string.
    pub fn put_string(&self, key: impl Into<String>, value: impl Into<String>) {
        self.put(key, PropertyValue::String(value.into()));
    }

    /// Store an explicit null.
    pub fn put_null(&self, key: impl Into<String>) {
        self.put(key, PropertyValue::Null);
    }

    /// Read a value converted to `T` by the JMS conversion rules.
    ///
    /// # Errors
    /// Returns `PropertyConversion` when the stored type cannot convert to
    /// `T`, a string fails to parse, or a primitive is requested for a
    /// missing key.
    pub fn get<T: FromProperty>(&self, key: &str) -> Result<T> {
        let map = self.inner.lock();
        match map.get(key) {
            None | Some(PropertyValue::Null) => T::from_missing(key),
            Some(value) => T::from_value(key, value),
        }
    }

    /// Read a boolean. A missing key reads as `false`.
    ///
    /// # Errors
    /// Fails when the stored value is neither a boolean nor a string.
    pub fn get_bool(&self, key: &str) -> Result<bool> {
        self.get(key)
    }

    /// Read a signed byte.
    ///
    /// # Errors
    /// Fails on a missing key or a disallowed conversion.
    pub fn get_byte(&self, key: &str) -> Result<i8> {
        self.get(key)
    }

    /// Read a 16-bit integer.
    ///
    /// # Errors
    /// Fails on a missing key or a disallowed conversion.
    pub fn get_short(&self, key: &str) -> Result<i16> {
        self.get(key)
    }

    /// Read a 32-bit integer.
    ///
    /// # Errors
    /// Fails on a missing key or a disallowed conversion.
    pub fn get_int(&self, key: &str) -> Result<i32> {
        self.get(key)
    }

    /// Read a 64-bit integer.
    ///
    /// # Errors
    /// Fails on a missing key or a disallowed conversion.
    pub fn get_long(&self, key: &str) -> Result<i64> {
        self.get(key)
    }

    /// Read a single-precision float.
    ///
    /// # Errors
    /// Fails on a missing key or a disallowed conversion.
    pub fn get_float(&self, key: &str) -> Result<f32> {
        self.get(key)
    }

    /// Read a double-precision float.
    ///
    /// # Errors
    /// Fails on a missing key or a disallowed conversion.
    pub fn get_double(&self, key: &str) -> Result<f64> {
        self.get(key)
    }

    /// Read a UTF-16 code unit. Only char values qualify.
    ///
    /// # Errors
    /// Fails on a missing key or any non-char value.
    pub fn get_char(&self, key: &str) -> Result<u16> {
        let map = self.inner.lock();
        match map.get(key) {
            None | Some(PropertyValue::Null) => Err(crate::Error::property_conversion(key, "property not set")),
            Some(value) => conversion::char_from_value(key, value),
        }
    }

    /// Read a string; `None` when missing or null.
    ///
    /// # Errors
    /// Fails when the stored value is a byte array.
    pub fn get_string(&self, key: &str) -> Result<Option<String>> {
        self.get(key)
    }

    /// Read a byte array; `None` when missing or null.
    ///
    /// # Errors
    /// Fails when the stored value is not a byte array.
    pub fn get_bytes(&self, key: &str) -> Result<Option<Bytes>> {
        self.get(key)
    }

    /// Raw stored value; `None` when missing or null.
    #[must_use]
    pub fn get_object(&self, key: &str) -> Option<PropertyValue> {
        self.inner.lock().get(key).filter(|v| !v.is_null()).cloned()
    }

    /// Remove a property, returning its value.
    pub fn remove(&self, key: &str) -> Option<PropertyValue> {
        if self.is_empty() {
            return None;
        }
        self.with_map(|map| map.remove(key))
    }

    /// Check whether a key is set (an explicit null counts as set).
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        if self.is_empty() {
            return false;
        }
        self.inner.lock().get(key).is_some()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entry_count.load(Ordering::Acquire)
    }

    /// Check for zero entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Property names in sorted order.
    #[must_use]
    pub fn property_names(&self) -> Vec<String> {
        let map = self.inner.lock();
        let mut names: Vec<String> =
            map.entries.as_ref().map(|e| e.keys().cloned().collect()).unwrap_or_default();
        names.sort_unstable();
        names
    }

    /// Remove every entry. An allocated container stays allocated.
    pub fn clear(&self) {
        self.with_map(|map| {
            if let Some(entries) = map.entries.as_mut() {
                entries.clear();
                map.byte_size = 0;
            }
        });
    }

    /// Remove every key carrying the internal prefix.
    ///
    /// The internal-properties latch stays set.
    pub fn clear_internal_properties(&self) {
        self.with_map(|map| {
            let internal: Vec<String> = map
                .entries
                .as_ref()
                .map(|e| {
                    e.keys().filter(|k| k.starts_with(INTERNAL_PROPERTY_PREFIX)).cloned().collect()
                })
                .unwrap_or_default();
            for key in internal {
                map.remove(&key);
            }
        });
    }

    /// Whether an internal-prefixed key was ever stored in this container.
    #[must_use]
    pub fn has_internal_properties(&self) -> bool {
        self.inner.lock().internal_properties
    }

    /// Copy every entry of `other` into this container, replacing clashes.
    pub fn put_all(&self, other: &Self) {
        if std::ptr::eq(self, other) {
            return;
        }
        let snapshot = other.inner.lock().entries.clone();
        if let Some(entries) = snapshot {
            self.with_map(|map| {
                for (key, value) in entries {
                    map.insert(key, value);
                }
            });
        }
    }

    /// Visit every entry under the container lock.
    pub fn for_each(&self, mut f: impl FnMut(&str, &PropertyValue)) {
        let map = self.inner.lock();
        if let Some(entries) = map.entries.as_ref() {
            for (key, value) in entries {
                f(key, value);
            }
        }
    }

    /// Sum of the encoded entry sizes (keys, tags and payloads).
    #[must_use]
    pub fn byte_size(&self) -> usize {
        self.inner.lock().byte_size
    }

    /// Encoded size: one marker byte, plus count and entries when allocated.
    #[must_use]
    pub fn encode_size(&self) -> usize {
        let map = self.inner.lock();
        match map.entries {
            None => SIZE_BYTE,
            Some(_) => SIZE_BYTE + SIZE_INT + map.byte_size,
        }
    }

    /// Rough in-memory footprint in bytes.
    #[must_use]
    pub fn memory_offset(&self) -> usize {
        let map = self.inner.lock();
        let entries = map.entries.as_ref().map_or(0, |entries| {
            entries
                .iter()
                .map(|(k, v)| ENTRY_OVERHEAD + k.capacity() + v.memory_size())
                .sum()
        });
        std::mem::size_of::<Self>() + entries
    }

    /// Write the container.
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    pub fn encode<B: BufMut + ?Sized>(&self, buf: &mut B) {
        let map = self.inner.lock();
        match map.entries.as_ref() {
            None => buf.put_u8(NULL),
            Some(entries) => {
                buf.put_u8(NOT_NULL);
                buf.put_i32(entries.len() as i32);
                for (key, value) in entries {
                    wire::put_simple_string(buf, key);
                    value.encode(buf);
                }
            },
        }
    }

    /// Replace the contents with a container read from `buf`.
    ///
    /// The new contents are committed only when the whole container decodes.
    ///
    /// # Errors
    /// Returns `InvalidPropertyType` for an unknown tag, `InvalidMarker` for
    /// a bad container marker, or a buffer error for truncated input.
    pub fn decode<B: Buf + ?Sized>(&self, buf: &mut B) -> ProtocolResult<()> {
        let mut decoded = match wire::get_u8(buf)? {
            NULL => PropertyMap::default(),
            NOT_NULL => {
                let count = wire::get_length(buf)?;
                let mut entries = HashMap::with_capacity(count.min(buf.remaining() / MIN_ENTRY_SIZE));
                let mut byte_size = 0;
                let mut internal = false;
                for _ in 0..count {
                    let key = wire::get_simple_string(buf)?;
                    let value = PropertyValue::decode(buf)?;
                    internal |= key.starts_with(INTERNAL_PROPERTY_PREFIX);
                    byte_size += PropertyMap::entry_size(&key, &value);
                    if let Some(old) = entries.insert(key.clone(), value) {
                        byte_size -= PropertyMap::entry_size(&key, &old);
                    }
                }
                PropertyMap { entries: Some(entries), byte_size, internal_properties: internal }
            },
            marker => return Err(ProtocolError::InvalidMarker { marker }),
        };

        self.with_map(|map| {
            decoded.internal_properties |= map.internal_properties;
            *map = decoded;
        });
        Ok(())
    }

    fn snapshot(&self) -> PropertyMap {
        self.inner.lock().clone()
    }
}

impl Default for TypedProperties {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for TypedProperties {
    fn clone(&self) -> Self {
        let map = self.snapshot();
        let count = map.len();
        Self { inner: Mutex::new(map), entry_count: AtomicUsize::new(count) }
    }
}

impl PartialEq for TypedProperties {
    fn eq(&self, other: &Self) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        let theirs = other.snapshot();
        self.inner.lock().entries == theirs.entries
    }
}

impl Eq for TypedProperties {}

impl fmt::Debug for TypedProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let map = self.inner.lock();
        f.debug_struct("TypedProperties")
            .field("entries", &map.entries)
            .field("byte_size", &map.byte_size)
            .finish()
    }
}

impl fmt::Display for TypedProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let map = self.inner.lock();
        let mut entries: Vec<(&String, &PropertyValue)> =
            map.entries.iter().flat_map(|e| e.iter()).collect();
        entries.sort_unstable_by(|a, b| a.0.cmp(b.0));

        f.write_str("TypedProperties[")?;
        for (i, (key, value)) in entries.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{key}={value}")?;
        }
        f.write_str("]")
    }
}
