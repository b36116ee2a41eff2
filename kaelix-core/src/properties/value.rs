//! Property values and their tagged binary form.

use crate::protocol::data_constants::{
    self, SIZE_BOOLEAN, SIZE_BYTE, SIZE_CHAR, SIZE_DOUBLE, SIZE_FLOAT, SIZE_INT, SIZE_LONG,
    SIZE_SHORT,
};
use crate::protocol::{wire, ProtocolError, ProtocolResult};
use bytes::{Buf, BufMut, Bytes};
use std::fmt;

/// Wire type of a property value, carrying the shared type tag as discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PropertyType {
    /// Explicit null.
    Null = data_constants::NULL_TYPE,
    /// Boolean.
    Boolean = data_constants::BOOLEAN,
    /// Signed 8-bit integer.
    Byte = data_constants::BYTE,
    /// Byte array.
    Bytes = data_constants::BYTES,
    /// Signed 16-bit integer.
    Short = data_constants::SHORT,
    /// Signed 32-bit integer.
    Int = data_constants::INT,
    /// Signed 64-bit integer.
    Long = data_constants::LONG,
    /// IEEE-754 single precision.
    Float = data_constants::FLOAT,
    /// IEEE-754 double precision.
    Double = data_constants::DOUBLE,
    /// Simple string.
    String = data_constants::STRING,
    /// UTF-16 code unit.
    Char = data_constants::CHAR,
}

impl PropertyType {
    /// Every property type, in tag order.
    pub const ALL: [Self; 11] = [
        Self::Null,
        Self::Boolean,
        Self::Byte,
        Self::Bytes,
        Self::Short,
        Self::Int,
        Self::Long,
        Self::Float,
        Self::Double,
        Self::String,
        Self::Char,
    ];

    /// Convert from a wire tag.
    ///
    /// # Errors
    /// Returns `InvalidPropertyType` for an unknown tag.
    pub const fn from_u8(tag: u8) -> ProtocolResult<Self> {
        match tag {
            data_constants::NULL_TYPE => Ok(Self::Null),
            data_constants::BOOLEAN => Ok(Self::Boolean),
            data_constants::BYTE => Ok(Self::Byte),
            data_constants::BYTES => Ok(Self::Bytes),
            data_constants::SHORT => Ok(Self::Short),
            data_constants::INT => Ok(Self::Int),
            data_constants::LONG => Ok(Self::Long),
            data_constants::FLOAT => Ok(Self::Float),
            data_constants::DOUBLE => Ok(Self::Double),
            data_constants::STRING => Ok(Self::String),
            data_constants::CHAR => Ok(Self::Char),
            _ => Err(ProtocolError::InvalidPropertyType { type_tag: tag }),
        }
    }

    /// Wire tag of this type.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Lower-case name used in conversion error messages.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean => "boolean",
            Self::Byte => "byte",
            Self::Bytes => "bytes",
            Self::Short => "short",
            Self::Int => "int",
            Self::Long => "long",
            Self::Float => "float",
            Self::Double => "double",
            Self::String => "string",
            Self::Char => "char",
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A typed property value.
///
/// Floats compare by raw bit pattern so that a decoded value is equal to the
/// encoded one even for NaN payloads and signed zeros.
#[derive(Debug, Clone)]
pub enum PropertyValue {
    /// Explicit null.
    Null,
    /// Boolean.
    Boolean(bool),
    /// Signed 8-bit integer.
    Byte(i8),
    /// Byte array.
    Bytes(Bytes),
    /// Signed 16-bit integer.
    Short(i16),
    /// Signed 32-bit integer.
    Int(i32),
    /// Signed 64-bit integer.
    Long(i64),
    /// IEEE-754 single precision.
    Float(f32),
    /// IEEE-754 double precision.
    Double(f64),
    /// UTF-16 code unit.
    Char(u16),
    /// String.
    String(String),
}

impl PropertyValue {
    /// Wire type of this value.
    #[must_use]
    pub const fn property_type(&self) -> PropertyType {
        match self {
            Self::Null => PropertyType::Null,
            Self::Boolean(_) => PropertyType::Boolean,
            Self::Byte(_) => PropertyType::Byte,
            Self::Bytes(_) => PropertyType::Bytes,
            Self::Short(_) => PropertyType::Short,
            Self::Int(_) => PropertyType::Int,
            Self::Long(_) => PropertyType::Long,
            Self::Float(_) => PropertyType::Float,
            Self::Double(_) => PropertyType::Double,
            Self::Char(_) => PropertyType::Char,
            Self::String(_) => PropertyType::String,
        }
    }

    /// Check for the null variant.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Encoded size: one tag byte plus the payload.
    #[must_use]
    pub fn encoded_size(&self) -> usize {
        SIZE_BYTE
            + match self {
                Self::Null => 0,
                Self::Boolean(_) => SIZE_BOOLEAN,
                Self::Byte(_) => SIZE_BYTE,
                Self::Bytes(b) => SIZE_INT + b.len(),
                Self::Short(_) => SIZE_SHORT,
                Self::Int(_) => SIZE_INT,
                Self::Long(_) => SIZE_LONG,
                Self::Float(_) => SIZE_FLOAT,
                Self::Double(_) => SIZE_DOUBLE,
                Self::Char(_) => SIZE_CHAR,
                Self::String(s) => wire::simple_string_size(s),
            }
    }

    /// Write the tag byte and the payload.
    pub fn encode<B: BufMut + ?Sized>(&self, buf: &mut B) {
        buf.put_u8(self.property_type().as_u8());
        match self {
            Self::Null => {},
            Self::Boolean(v) => {
                buf.put_u8(if *v { data_constants::TRUE } else { data_constants::FALSE });
            },
            Self::Byte(v) => buf.put_i8(*v),
            Self::Bytes(v) => wire::put_bytes(buf, v),
            Self::Short(v) => buf.put_i16(*v),
            Self::Int(v) => buf.put_i32(*v),
            Self::Long(v) => buf.put_i64(*v),
            Self::Float(v) => buf.put_u32(v.to_bits()),
            Self::Double(v) => buf.put_u64(v.to_bits()),
            Self::Char(v) => buf.put_u16(*v),
            Self::String(v) => wire::put_simple_string(buf, v),
        }
    }

    /// Read a tag byte and dispatch to the matching payload reader.
    ///
    /// # Errors
    /// Returns `InvalidPropertyType` for an unknown tag, or a buffer error for
    /// a truncated payload.
    pub fn decode<B: Buf + ?Sized>(buf: &mut B) -> ProtocolResult<Self> {
        let property_type = PropertyType::from_u8(wire::get_u8(buf)?)?;
        Self::decode_payload(property_type, buf)
    }

    /// Read the payload of an already-decoded type tag.
    ///
    /// # Errors
    /// Returns a buffer error for a truncated or malformed payload.
    pub fn decode_payload<B: Buf + ?Sized>(
        property_type: PropertyType,
        buf: &mut B,
    ) -> ProtocolResult<Self> {
        Ok(match property_type {
            PropertyType::Null => Self::Null,
            PropertyType::Boolean => Self::Boolean(wire::get_bool(buf)?),
            PropertyType::Byte => Self::Byte(wire::get_i8(buf)?),
            PropertyType::Bytes => Self::Bytes(wire::get_bytes(buf)?),
            PropertyType::Short => Self::Short(wire::get_i16(buf)?),
            PropertyType::Int => Self::Int(wire::get_i32(buf)?),
            PropertyType::Long => Self::Long(wire::get_i64(buf)?),
            PropertyType::Float => Self::Float(f32::from_bits(wire::get_u32(buf)?)),
            PropertyType::Double => Self::Double(f64::from_bits(wire::get_u64(buf)?)),
            PropertyType::Char => Self::Char(wire::get_u16(buf)?),
            PropertyType::String => Self::String(wire::get_simple_string(buf)?),
        })
    }

    /// Rough heap plus inline footprint, used for memory estimates.
    #[must_use]
    pub fn memory_size(&self) -> usize {
        std::mem::size_of::<Self>()
            + match self {
                Self::Bytes(b) => b.len(),
                Self::String(s) => s.capacity(),
                _ => 0,
            }
    }
}

impl PartialEq for PropertyValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Byte(a), Self::Byte(b)) => a == b,
            (Self::Bytes(a), Self::Bytes(b)) => a == b,
            (Self::Short(a), Self::Short(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Long(a), Self::Long(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Double(a), Self::Double(b)) => a.to_bits() == b.to_bits(),
            (Self::Char(a), Self::Char(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for PropertyValue {}

/// Textual form used by string conversion.
impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Boolean(v) => write!(f, "{v}"),
            Self::Byte(v) => write!(f, "{v}"),
            Self::Bytes(v) => write!(f, "{v:?}"),
            Self::Short(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Long(v) => write!(f, "{v}"),
            Self::Float(v) => write_decimal(f, *v, v.is_nan(), v.is_infinite(), v.is_sign_negative()),
            Self::Double(v) => write_decimal(f, *v, v.is_nan(), v.is_infinite(), v.is_sign_negative()),
            Self::Char(v) => f.write_str(&String::from_utf16_lossy(&[*v])),
            Self::String(v) => f.write_str(v),
        }
    }
}

/// Decimal text in the JMS form: plain for magnitudes in `[1e-3, 1e7)`,
/// otherwise a mantissa and exponent such as `1.0E20`. Both keep at least one
/// fractional digit.
fn write_decimal<T>(f: &mut fmt::Formatter<'_>, value: T, nan: bool, infinite: bool, negative: bool) -> fmt::Result
where
    T: fmt::Display + fmt::LowerExp,
{
    if nan {
        return f.write_str("NaN");
    }
    if infinite {
        return f.write_str(if negative { "-Infinity" } else { "Infinity" });
    }

    let scientific = format!("{value:e}");
    let (mantissa, exponent) = scientific.split_once('e').unwrap_or((scientific.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    if (-3..7).contains(&exponent) {
        let plain = value.to_string();
        if plain.contains('.') {
            f.write_str(&plain)
        } else {
            write!(f, "{plain}.0")
        }
    } else if mantissa.contains('.') {
        write!(f, "{mantissa}E{exponent}")
    } else {
        write!(f, "{mantissa}.0E{exponent}")
    }
}

macro_rules! impl_from_primitive {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for PropertyValue {
                fn from(value: $ty) -> Self {
                    Self::$variant(value)
                }
            }
        )*
    };
}

impl_from_primitive!(
    bool => Boolean,
    i8 => Byte,
    i16 => Short,
    i32 => Int,
    i64 => Long,
    f32 => Float,
    f64 => Double,
    String => String,
    Bytes => Bytes,
);

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<Vec<u8>> for PropertyValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(value))
    }
}

impl From<&[u8]> for PropertyValue {
    fn from(value: &[u8]) -> Self {
        Self::Bytes(Bytes::copy_from_slice(value))
    }
}

/// Absent strings and byte arrays are stored as [`PropertyValue::Null`].
impl<T: Into<Self>> From<Option<T>> for PropertyValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}
