//! Every stored type read back as every requested type.

use bytes::Bytes;
use kaelix_core::properties::{PropertyValue, TypedProperties};
use kaelix_core::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Requested {
    Bool,
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    Str,
    Char,
    Bytes,
}

const ALL: [Requested; 10] = [
    Requested::Bool,
    Requested::Byte,
    Requested::Short,
    Requested::Int,
    Requested::Long,
    Requested::Float,
    Requested::Double,
    Requested::Str,
    Requested::Char,
    Requested::Bytes,
];

fn read(properties: &TypedProperties, requested: Requested) -> Result<String, Error> {
    let key = "k";
    Ok(match requested {
        Requested::Bool => properties.get_bool(key)?.to_string(),
        Requested::Byte => properties.get_byte(key)?.to_string(),
        Requested::Short => properties.get_short(key)?.to_string(),
        Requested::Int => properties.get_int(key)?.to_string(),
        Requested::Long => properties.get_long(key)?.to_string(),
        Requested::Float => properties.get_float(key)?.to_string(),
        Requested::Double => properties.get_double(key)?.to_string(),
        Requested::Str => format!("{:?}", properties.get_string(key)?),
        Requested::Char => properties.get_char(key)?.to_string(),
        Requested::Bytes => format!("{:?}", properties.get_bytes(key)?),
    })
}

fn allowed(stored: &PropertyValue) -> &'static [Requested] {
    use Requested::*;
    match stored {
        PropertyValue::Boolean(_) => &[Bool, Str],
        PropertyValue::Byte(_) => &[Byte, Short, Int, Long, Str],
        PropertyValue::Short(_) => &[Short, Int, Long, Str],
        PropertyValue::Int(_) => &[Int, Long, Str],
        PropertyValue::Long(_) => &[Long, Str],
        PropertyValue::Float(_) => &[Float, Double, Str],
        PropertyValue::Double(_) => &[Double, Str],
        PropertyValue::Char(_) => &[Char, Str],
        PropertyValue::Bytes(_) => &[Bytes],
        // numeric text parses into every scalar but char
        PropertyValue::String(_) => &[Bool, Byte, Short, Int, Long, Float, Double, Str],
        PropertyValue::Null => &[Bool, Str, Bytes],
    }
}

#[test]
fn conversion_matrix() {
    let stored = [
        PropertyValue::Boolean(true),
        PropertyValue::Byte(7),
        PropertyValue::Short(7),
        PropertyValue::Int(7),
        PropertyValue::Long(7),
        PropertyValue::Float(7.0),
        PropertyValue::Double(7.0),
        PropertyValue::Char(u16::from(b'x')),
        PropertyValue::Bytes(Bytes::from_static(b"7")),
        PropertyValue::String("7".to_string()),
        PropertyValue::Null,
    ];

    for value in stored {
        let properties = TypedProperties::new();
        properties.put("k", value.clone());
        let allowed = allowed(&value);

        for requested in ALL {
            let result = read(&properties, requested);
            if allowed.contains(&requested) {
                assert!(result.is_ok(), "{value:?} as {requested:?} should convert: {result:?}");
            } else {
                assert!(
                    matches!(result, Err(Error::PropertyConversion { .. })),
                    "{value:?} as {requested:?} should fail: {result:?}"
                );
            }
        }
    }
}

#[test]
fn widening_preserves_value() {
    let properties = TypedProperties::new();
    properties.put_byte("b", -3);
    properties.put_float("f", 1.5);
    assert_eq!(properties.get_long("b").unwrap(), -3);
    assert_eq!(properties.get_short("b").unwrap(), -3);
    assert_eq!(properties.get_double("f").unwrap(), 1.5);
}

#[test]
fn string_parsing_rules() {
    let properties = TypedProperties::new();
    properties.put_string("yes", "TrUe");
    properties.put_string("other", "yes");
    properties.put_string("num", "300");
    properties.put_string("text", "abc");

    assert!(properties.get_bool("yes").unwrap());
    assert!(!properties.get_bool("other").unwrap());
    assert_eq!(properties.get_short("num").unwrap(), 300);
    assert!(matches!(properties.get_byte("num"), Err(Error::PropertyConversion { .. })));
    assert!(matches!(properties.get_int("text"), Err(Error::PropertyConversion { .. })));
    assert!(matches!(properties.get_char("text"), Err(Error::PropertyConversion { .. })));
}

#[test]
fn textual_forms() {
    let properties = TypedProperties::new();
    properties.put_bool("b", false);
    properties.put_char("c", u16::from(b'z'));
    properties.put_double("d", 2.5);
    assert_eq!(properties.get_string("b").unwrap().as_deref(), Some("false"));
    assert_eq!(properties.get_string("c").unwrap().as_deref(), Some("z"));
    assert_eq!(properties.get_string("d").unwrap().as_deref(), Some("2.5"));

    properties.put_double("large", 1e20);
    properties.put_float("small", 1e-7);
    assert_eq!(properties.get_string("large").unwrap().as_deref(), Some("1.0E20"));
    assert_eq!(properties.get_string("small").unwrap().as_deref(), Some("1.0E-7"));
    assert_eq!(properties.get_double("large").unwrap(), 1e20);
}

#[test]
fn missing_key_behaviour() {
    let properties = TypedProperties::new();
    assert!(!properties.get_bool("missing").unwrap());
    assert_eq!(properties.get_string("missing").unwrap(), None);
    assert_eq!(properties.get_bytes("missing").unwrap(), None);
    assert_eq!(properties.get_object("missing"), None);
    assert!(properties.get_int("missing").is_err());
    assert!(properties.get_char("missing").is_err());
    assert_eq!(properties.get::<Option<i64>>("missing").unwrap(), None);
}
