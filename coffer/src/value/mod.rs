//! Stored binary values
//!
//! The bytes of a stored value don't say what type they are. The caller supplies a
//! [`PropertyValueType`] and the bytes are decoded as that type:
//!
//! | type | stored as |
//! |------|-----------|
//! | string, double, boolean, javascript | 16 bit length (counting the terminator), text, terminator |
//! | ip address, wkb | 16 bit length, bytes |
//! | integer | 32 bit integer |
//! | float | single precision float |
//! | azimuth, declination | 16 bit integer scaled to ±180° / ±90° |
//! | byte | 1 byte |
//!
//! All values are little endian.

use std::cmp::Ordering;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use bincode::Options;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::builder::StringBuilder;
use crate::collection::key::{self, CollectionKey, KeyType};
use crate::collection::{Collection, Item};
use crate::error::{CofferError, Result};
use crate::BINCODER;

pub mod wkb;

pub use crate::builder::MAX_DOUBLE_DECIMAL_PLACES;

/// Buffer size most WKT text is expected to fit in.
pub const REASONABLE_WKT_STRING_LENGTH: usize = 128;

/// Degrees represented by the largest stored azimuth.
pub const AZIMUTH_MAX_DEGREES: f64 = 180.0;

/// Degrees represented by the largest stored declination.
pub const DECLINATION_MAX_DEGREES: f64 = 90.0;

/// The type of a stored value.
#[derive(
    Clone, Copy, Debug, Default, Display, EnumString, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[strum(ascii_case_insensitive)]
#[repr(u8)]
pub enum PropertyValueType {
    /// Text
    #[default]
    #[strum(serialize = "string")]
    String = 0,
    /// 32 bit integer
    #[strum(to_string = "integer", serialize = "int")]
    Integer = 1,
    /// Double, stored as text
    #[strum(serialize = "double")]
    Double = 2,
    /// Boolean, stored as text
    #[strum(to_string = "boolean", serialize = "bool")]
    Boolean = 3,
    /// JavaScript source, stored as text
    #[strum(serialize = "javascript")]
    JavaScript = 4,
    /// Single precision float
    #[strum(serialize = "float")]
    SinglePrecisionFloat = 5,
    /// Single byte
    #[strum(serialize = "byte")]
    SingleByte = 6,
    /// Coordinate, not stored as a single value
    #[strum(serialize = "coordinate")]
    Coordinate = 7,
    /// IPv4 or IPv6 address
    #[strum(to_string = "ip", serialize = "ipaddress")]
    IpAddress = 8,
    /// Well-Known-Binary geometry
    #[strum(serialize = "wkb")]
    Wkb = 9,
    /// Object, not stored as a single value
    #[strum(serialize = "object")]
    Object = 10,
    /// Declination, compressed degrees
    #[strum(serialize = "declination")]
    Declination = 11,
    /// Azimuth, compressed degrees
    #[strum(serialize = "azimuth")]
    Azimuth = 12,
}

impl PropertyValueType {
    /// Convert a stored type code.
    pub fn from_u8(code: u8) -> Result<Self> {
        use PropertyValueType::*;
        [
            String,
            Integer,
            Double,
            Boolean,
            JavaScript,
            SinglePrecisionFloat,
            SingleByte,
            Coordinate,
            IpAddress,
            Wkb,
            Object,
            Declination,
            Azimuth,
        ]
        .get(usize::from(code))
        .copied()
        .ok_or(CofferError::UnknownStoredValueType(code))
    }

    /// How records of this type are sized.
    pub fn key_type(&self) -> Result<KeyType> {
        use PropertyValueType::*;
        match self {
            String | Double | Boolean | JavaScript => Ok(key::STRING),
            Integer => Ok(key::INTEGER),
            SinglePrecisionFloat => Ok(key::FLOAT),
            SingleByte => Ok(key::BYTE),
            IpAddress | Wkb => Ok(key::BYTE_ARRAY),
            Declination | Azimuth => Ok(key::SHORT),
            Coordinate | Object => Err(CofferError::UnsupportedStoredValueType(*self)),
        }
    }
}

/// A decoded stored value, borrowing from the record it was decoded from.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum StoredBinaryValue<'a> {
    /// Text without its terminator
    String(&'a [u8]),
    /// Network order address bytes, 4 or 16 long
    IpAddress(&'a [u8]),
    /// WKB geometry
    Wkb(&'a [u8]),
    /// 32 bit integer
    Integer(i32),
    /// Single precision float
    Float(f32),
    /// Raw azimuth
    Azimuth(i16),
    /// Raw declination
    Declination(i16),
    /// Single byte
    Byte(u8),
}

fn length_prefixed(bytes: &[u8]) -> Result<&[u8]> {
    let length = key::length_prefixed(bytes)? as usize;
    bytes
        .get(2..length)
        .ok_or_else(|| CofferError::CorruptData(format!("{} bytes, {length} needed", bytes.len())))
}

fn numeric<'de, T: Deserialize<'de>>(bytes: &'de [u8]) -> Result<T> {
    BINCODER
        .deserialize(bytes)
        .map_err(|e| CofferError::CorruptData(e.to_string()))
}

/// Fetch the record of a stored value at `offset`.
pub fn get(
    collection: &Collection,
    offset: u32,
    value_type: PropertyValueType,
) -> Result<Option<Item>> {
    collection.get(&CollectionKey::offset(offset, value_type.key_type()?))
}

// Longest prefix of `s` (after leading whitespace) which reads as a number, like strtod/strtol.
fn numeric_prefix(s: &str, fraction: bool) -> &str {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let digits = |from: usize| {
        bytes[from..]
            .iter()
            .take_while(|b| b.is_ascii_digit())
            .count()
    };
    let mut end = usize::from(matches!(bytes.first(), Some(b'+' | b'-')));
    let whole = digits(end);
    end += whole;
    if !fraction {
        return if whole > 0 { &s[..end] } else { "" };
    }
    let mut mantissa = whole;
    if bytes.get(end) == Some(&b'.') {
        let part = digits(end + 1);
        if whole > 0 || part > 0 {
            end += 1 + part;
            mantissa += part;
        }
    }
    if mantissa == 0 {
        return "";
    }
    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exponent = end + 1;
        if matches!(bytes.get(exponent), Some(b'+' | b'-')) {
            exponent += 1;
        }
        let part = digits(exponent);
        if part > 0 {
            end = exponent + part;
        }
    }
    &s[..end]
}

// None if out of range
fn parse_long(s: &str) -> Option<i64> {
    match numeric_prefix(s, false) {
        "" => Some(0),
        prefix => prefix.parse().ok(),
    }
}

// None if out of range
fn parse_double(s: &str) -> Option<f64> {
    match numeric_prefix(s, true) {
        "" => Some(0.0),
        prefix => prefix.parse::<f64>().ok().filter(|v| v.is_finite()),
    }
}

fn sign(ordering: Ordering) -> i32 {
    match ordering {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    }
}

fn compare_float(value: f64, target: &str) -> i32 {
    match parse_double(target) {
        Some(target) => value.partial_cmp(&target).map_or(-1, sign),
        None => -1,
    }
}

fn compare_bytes_with_string(value: &[u8], target: &[u8]) -> i32 {
    let common = value.len().min(target.len());
    match value[..common].cmp(&target[..common]) {
        Ordering::Equal => sign(value.len().cmp(&target.len())),
        ordering => sign(ordering),
    }
}

fn compare_ip_address(value: &[u8], target: &str) -> i32 {
    let target: Vec<u8> = match target.trim().parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => v4.octets().to_vec(),
        Ok(IpAddr::V6(v6)) => v6.octets().to_vec(),
        Err(_) => return value.len() as i32,
    };
    let common = value.len().min(target.len());
    match value[..common].cmp(&target[..common]) {
        Ordering::Equal => value.len() as i32 - target.len() as i32,
        ordering => sign(ordering),
    }
}

impl<'a> StoredBinaryValue<'a> {
    /// Decode the bytes of a record as `value_type`.
    pub fn decode(bytes: &'a [u8], value_type: PropertyValueType) -> Result<Self> {
        use PropertyValueType::*;
        match value_type {
            String | Double | Boolean | JavaScript => {
                let text = length_prefixed(bytes)?;
                match text.split_last() {
                    Some((_terminator, text)) => Ok(Self::String(text)),
                    None => Err(CofferError::CorruptData(
                        "string without a terminator".to_string(),
                    )),
                }
            }
            IpAddress => Ok(Self::IpAddress(length_prefixed(bytes)?)),
            Wkb => Ok(Self::Wkb(length_prefixed(bytes)?)),
            Integer => Ok(Self::Integer(numeric(bytes)?)),
            SinglePrecisionFloat => Ok(Self::Float(numeric(bytes)?)),
            Azimuth => Ok(Self::Azimuth(numeric(bytes)?)),
            Declination => Ok(Self::Declination(numeric(bytes)?)),
            SingleByte => bytes
                .first()
                .map(|b| Self::Byte(*b))
                .ok_or_else(|| CofferError::CorruptData("empty byte record".to_string())),
            Coordinate | Object => Err(CofferError::UnsupportedStoredValueType(value_type)),
        }
    }

    /// Compare with the text form of a value of the same type.
    ///
    /// Negative if this value orders first, 0 if equal and positive otherwise. Numeric targets
    /// are parsed from their leading number, a target out of range compares as -1.
    pub fn compare_with_string(&self, target: &str) -> Result<i32> {
        match self {
            Self::String(value) => Ok(compare_bytes_with_string(value, target.as_bytes())),
            Self::IpAddress(value) => Ok(compare_ip_address(value, target)),
            Self::Wkb(_) => {
                let text = self.to_text(MAX_DOUBLE_DECIMAL_PLACES)?;
                Ok(sign(text.as_bytes().cmp(target.as_bytes())))
            }
            Self::Integer(value) => Ok(match parse_long(target) {
                Some(target) if i32::try_from(target).is_ok() => (i64::from(*value) - target)
                    .clamp(i64::from(i32::MIN), i64::from(i32::MAX))
                    as i32,
                _ => -1,
            }),
            Self::Float(value) => Ok(compare_float(f64::from(*value), target)),
            Self::Azimuth(_) | Self::Declination(_) => {
                Ok(compare_float(self.to_double_or_default(0.0), target))
            }
            Self::Byte(_) => Err(CofferError::UnsupportedStoredValueType(
                PropertyValueType::SingleByte,
            )),
        }
    }

    /// The value as an integer, or `default` if it has no integer form.
    pub fn to_int_or_default(&self, default: i32) -> i32 {
        match self {
            Self::String(text) => std::str::from_utf8(text)
                .ok()
                .and_then(|text| match numeric_prefix(text, false) {
                    "" => None,
                    prefix => prefix.parse().ok(),
                })
                .unwrap_or(default),
            Self::Integer(value) => *value,
            Self::Float(value) => *value as i32,
            Self::Azimuth(_) | Self::Declination(_) => self.to_double_or_default(0.0) as i32,
            Self::Byte(value) => i32::from(*value),
            Self::IpAddress(_) | Self::Wkb(_) => default,
        }
    }

    /// The value as a double, or `default` if it has no numeric form.
    pub fn to_double_or_default(&self, default: f64) -> f64 {
        match self {
            Self::String(text) => std::str::from_utf8(text)
                .ok()
                .and_then(|text| match numeric_prefix(text, true) {
                    "" => None,
                    prefix => prefix.parse().ok(),
                })
                .unwrap_or(default),
            Self::Integer(value) => f64::from(*value),
            Self::Float(value) => f64::from(*value),
            Self::Azimuth(value) => f64::from(*value) * AZIMUTH_MAX_DEGREES / f64::from(i16::MAX),
            Self::Declination(value) => {
                f64::from(*value) * DECLINATION_MAX_DEGREES / f64::from(i16::MAX)
            }
            Self::Byte(value) => f64::from(*value),
            Self::IpAddress(_) | Self::Wkb(_) => default,
        }
    }

    /// The value as a boolean, or `default` if it has no boolean form.
    ///
    /// Only the exact text `True` is true.
    pub fn to_bool_or_default(&self, default: bool) -> bool {
        match self {
            Self::String(text) => *text == b"True",
            Self::Integer(value) => *value != 0,
            Self::Byte(value) => *value != 0,
            Self::Float(value) => *value != 0.0,
            _ => default,
        }
    }

    /// Write the text form of the value.
    pub fn write_to(&self, builder: &mut StringBuilder<'_>, decimal_places: u8) -> Result<()> {
        match self {
            Self::String(text) => {
                builder.add_chars(text);
            }
            Self::IpAddress(bytes) => {
                let address = if let Ok(v4) = <[u8; 4]>::try_from(*bytes) {
                    IpAddr::V4(Ipv4Addr::from(v4))
                } else if let Ok(v6) = <[u8; 16]>::try_from(*bytes) {
                    IpAddr::V6(Ipv6Addr::from(v6))
                } else {
                    return Err(CofferError::CorruptData(format!(
                        "IP address of {} bytes",
                        bytes.len()
                    )));
                };
                builder.add_str(&address.to_string());
            }
            Self::Wkb(bytes) => wkb::write_wkb_as_wkt(bytes, decimal_places, builder)?,
            Self::Integer(value) => {
                builder.add_integer(i64::from(*value));
            }
            Self::Float(value) => {
                builder.add_double(f64::from(*value), decimal_places);
            }
            Self::Azimuth(_) | Self::Declination(_) => {
                builder.add_double(self.to_double_or_default(0.0), decimal_places);
            }
            Self::Byte(value) => {
                builder.add_integer(i64::from(*value));
            }
        }
        Ok(())
    }

    /// The text form of the value.
    pub fn to_text(&self, decimal_places: u8) -> Result<String> {
        let mut buf = [0u8; REASONABLE_WKT_STRING_LENGTH];
        let mut builder = StringBuilder::new(&mut buf);
        self.write_to(&mut builder, decimal_places)?;
        builder.complete();
        if !builder.is_full() {
            return Ok(String::from_utf8_lossy(builder.as_bytes()).into_owned());
        }

        let mut buf = vec![0u8; builder.added()];
        let mut builder = StringBuilder::new(&mut buf);
        self.write_to(&mut builder, decimal_places)?;
        builder.complete();
        Ok(String::from_utf8_lossy(builder.as_bytes()).into_owned())
    }
}

/// Compare the stored bytes of a value with text, see
/// [`StoredBinaryValue::compare_with_string`].
pub fn compare_with_string(
    bytes: &[u8],
    value_type: PropertyValueType,
    target: &str,
) -> Result<i32> {
    StoredBinaryValue::decode(bytes, value_type)?.compare_with_string(target)
}

/// Stored bytes as an integer. Never fails, anything which can't be converted is `default`.
pub fn to_int_or_default(bytes: &[u8], value_type: PropertyValueType, default: i32) -> i32 {
    StoredBinaryValue::decode(bytes, value_type)
        .map(|value| value.to_int_or_default(default))
        .unwrap_or(default)
}

/// Stored bytes as a double. Never fails, anything which can't be converted is `default`.
pub fn to_double_or_default(bytes: &[u8], value_type: PropertyValueType, default: f64) -> f64 {
    StoredBinaryValue::decode(bytes, value_type)
        .map(|value| value.to_double_or_default(default))
        .unwrap_or(default)
}

/// Stored bytes as a boolean. Never fails, anything which can't be converted is `default`.
pub fn to_bool_or_default(bytes: &[u8], value_type: PropertyValueType, default: bool) -> bool {
    StoredBinaryValue::decode(bytes, value_type)
        .map(|value| value.to_bool_or_default(default))
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::writer::CollectionWriter;
    use rand::Rng;
    use std::str::FromStr;

    fn stored(write: impl FnOnce(&mut CollectionWriter) -> anyhow::Result<u32>) -> Vec<u8> {
        let mut writer = CollectionWriter::new();
        write(&mut writer).expect("writes value");
        // Drop the container header
        writer.finish_with_length().expect("finishes")[4..].to_vec()
    }

    fn string(value: &str) -> Vec<u8> {
        stored(|w| w.write_string(value))
    }

    const POINT: [u8; 21] = [
        0x00, 0x00, 0x00, 0x00, 0x01, 0x40, 0x31, 0x40, 0x00, 0x00, 0x00, 0x00, 0x00, 0x40, 0x8b,
        0xe0, 0xc0, 0x00, 0x00, 0x00, 0x00,
    ];

    #[test]
    fn it_parses_value_types() {
        assert_eq!(
            PropertyValueType::from_str("WKB").expect("parses"),
            PropertyValueType::Wkb
        );
        assert_eq!(
            PropertyValueType::from_str("Azimuth").expect("parses"),
            PropertyValueType::Azimuth
        );
        assert_eq!(
            PropertyValueType::from_str("ip").expect("parses"),
            PropertyValueType::IpAddress
        );
        assert!(PropertyValueType::from_str("nonsense").is_err());
        assert_eq!(PropertyValueType::SinglePrecisionFloat.to_string(), "float");
        assert_eq!(
            PropertyValueType::from_u8(12).expect("known"),
            PropertyValueType::Azimuth
        );
        assert!(matches!(
            PropertyValueType::from_u8(13),
            Err(CofferError::UnknownStoredValueType(13))
        ));
        assert!(PropertyValueType::Object.key_type().is_err());
    }

    #[test]
    fn it_decodes_values() {
        let bytes = string("abc");
        assert_eq!(
            StoredBinaryValue::decode(&bytes, PropertyValueType::String).expect("decodes"),
            StoredBinaryValue::String(b"abc")
        );
        let bytes = stored(|w| w.write_integer(-7));
        assert_eq!(
            StoredBinaryValue::decode(&bytes, PropertyValueType::Integer).expect("decodes"),
            StoredBinaryValue::Integer(-7)
        );
        let bytes = stored(|w| w.write_float(2.5));
        assert_eq!(
            StoredBinaryValue::decode(&bytes, PropertyValueType::SinglePrecisionFloat)
                .expect("decodes"),
            StoredBinaryValue::Float(2.5)
        );
        let bytes = stored(|w| w.write_byte_array(&[1, 2, 3, 4]));
        assert_eq!(
            StoredBinaryValue::decode(&bytes, PropertyValueType::IpAddress).expect("decodes"),
            StoredBinaryValue::IpAddress(&[1, 2, 3, 4])
        );
    }

    #[test]
    fn it_rejects_bad_records() {
        assert!(matches!(
            StoredBinaryValue::decode(&[9, 0, b'a'], PropertyValueType::String),
            Err(CofferError::CorruptData(_))
        ));
        assert!(matches!(
            StoredBinaryValue::decode(&[0, 0], PropertyValueType::String),
            Err(CofferError::CorruptData(_))
        ));
        assert!(matches!(
            StoredBinaryValue::decode(&[1, 2], PropertyValueType::Integer),
            Err(CofferError::CorruptData(_))
        ));
        assert!(matches!(
            StoredBinaryValue::decode(&[1, 2], PropertyValueType::Coordinate),
            Err(CofferError::UnsupportedStoredValueType(
                PropertyValueType::Coordinate
            ))
        ));
    }

    #[test]
    fn it_compares_strings() {
        let bytes = string("apple");
        let compare = |target| {
            compare_with_string(&bytes, PropertyValueType::String, target).expect("compares")
        };
        assert_eq!(compare("apple"), 0);
        assert!(compare("banana") < 0);
        assert!(compare("aardvark") > 0);
        assert!(compare("apples") < 0);
        assert!(compare("app") > 0);
        assert!(compare("Apple") > 0);
    }

    #[test]
    fn it_compares_ip_addresses() {
        let v4 = stored(|w| w.write_ip_address("192.168.1.1".parse().expect("parses")));
        let compare = |bytes: &[u8], target| {
            compare_with_string(bytes, PropertyValueType::IpAddress, target).expect("compares")
        };
        assert_eq!(compare(&v4, "192.168.1.1"), 0);
        assert!(compare(&v4, "192.168.1.2") < 0);
        assert!(compare(&v4, "10.0.0.1") > 0);
        assert_eq!(compare(&v4, "not an address"), 4);
        assert_ne!(compare(&v4, "::1"), 0);

        let v6 = stored(|w| w.write_ip_address("2001:db8::1".parse().expect("parses")));
        assert_eq!(compare(&v6, "2001:db8::1"), 0);
        assert_eq!(compare(&v6, "garbage"), 16);
    }

    #[test]
    fn it_compares_numbers() {
        let integer = stored(|w| w.write_integer(42));
        let compare = |bytes: &[u8], value_type, target| {
            compare_with_string(bytes, value_type, target).expect("compares")
        };
        assert_eq!(compare(&integer, PropertyValueType::Integer, "42"), 0);
        assert_eq!(compare(&integer, PropertyValueType::Integer, " 40"), 2);
        assert_eq!(compare(&integer, PropertyValueType::Integer, "50abc"), -8);
        assert_eq!(compare(&integer, PropertyValueType::Integer, "99999999999999999999"), -1);

        let float = stored(|w| w.write_float(1.5));
        assert_eq!(compare(&float, PropertyValueType::SinglePrecisionFloat, "1.5"), 0);
        assert_eq!(compare(&float, PropertyValueType::SinglePrecisionFloat, "1"), 1);
        assert_eq!(compare(&float, PropertyValueType::SinglePrecisionFloat, "2e0"), -1);
        assert_eq!(compare(&float, PropertyValueType::SinglePrecisionFloat, "1e999"), -1);

        let azimuth = stored(|w| w.write_short(i16::MAX));
        assert_eq!(compare(&azimuth, PropertyValueType::Azimuth, "180"), 0);
        assert_eq!(compare(&azimuth, PropertyValueType::Declination, "90"), 0);
        assert_eq!(compare(&azimuth, PropertyValueType::Declination, "100"), -1);

        let byte = stored(|w| w.write_byte(1));
        assert!(matches!(
            compare_with_string(&byte, PropertyValueType::SingleByte, "1"),
            Err(CofferError::UnsupportedStoredValueType(_))
        ));
    }

    #[test]
    fn it_compares_wkb_with_its_wkt() {
        let bytes = stored(|w| w.write_byte_array(&POINT));
        let value = StoredBinaryValue::decode(&bytes, PropertyValueType::Wkb).expect("decodes");
        let text = value.to_text(MAX_DOUBLE_DECIMAL_PLACES).expect("renders");
        assert_eq!(text, "POINT(17.25 892.09375)");
        assert_eq!(value.compare_with_string(&text).expect("compares"), 0);
        assert_ne!(value.compare_with_string("POINT(17.25 892)").expect("compares"), 0);
    }

    #[test]
    fn it_compares_long_wkt() {
        // Needs more than the first buffer
        let mut wkb = vec![1, 2, 0, 0, 0, 40, 0, 0, 0];
        for i in 0..80 {
            wkb.extend_from_slice(&(f64::from(i) + 0.125).to_le_bytes());
        }
        let bytes = stored(|w| w.write_byte_array(&wkb));
        let value = StoredBinaryValue::decode(&bytes, PropertyValueType::Wkb).expect("decodes");
        let text = value.to_text(MAX_DOUBLE_DECIMAL_PLACES).expect("renders");
        assert!(text.len() > REASONABLE_WKT_STRING_LENGTH);
        assert!(text.starts_with("LINESTRING(0.125 1.125,2.125 3.125"));
        assert!(text.ends_with("78.125 79.125)"));
        assert_eq!(value.compare_with_string(&text).expect("compares"), 0);
    }

    #[test]
    fn it_rejects_deeply_nested_wkb() {
        // Collections of one collection, then a point
        let mut wkb = Vec::new();
        for _ in 0..3_600 {
            wkb.push(1);
            wkb.extend_from_slice(&7u32.to_le_bytes());
            wkb.extend_from_slice(&1u32.to_le_bytes());
        }
        wkb.extend_from_slice(&POINT);
        let bytes = stored(|w| w.write_byte_array(&wkb));
        let value = StoredBinaryValue::decode(&bytes, PropertyValueType::Wkb).expect("decodes");
        assert!(matches!(
            value.compare_with_string("POINT(17.25 892.09375)"),
            Err(CofferError::InvalidInput(_))
        ));
        assert!(matches!(
            value.to_text(MAX_DOUBLE_DECIMAL_PLACES),
            Err(CofferError::InvalidInput(_))
        ));
    }

    #[test]
    fn it_coerces_strictly_to_bool() {
        for (text, expected) in [
            ("True", true),
            ("true", false),
            ("TRUE", false),
            ("trUe", false),
            ("Trueish", false),
            ("", false),
        ] {
            assert_eq!(
                to_bool_or_default(&string(text), PropertyValueType::Boolean, true),
                expected,
                "{text}"
            );
        }
        let integer = stored(|w| w.write_integer(3));
        assert!(to_bool_or_default(&integer, PropertyValueType::Integer, false));
        let wkb = stored(|w| w.write_byte_array(&POINT));
        assert!(to_bool_or_default(&wkb, PropertyValueType::Wkb, true));
    }

    #[test]
    fn it_maps_azimuth_and_declination() {
        let bytes = stored(|w| w.write_short(24672));
        let azimuth = to_double_or_default(&bytes, PropertyValueType::Azimuth, 0.0);
        let declination = to_double_or_default(&bytes, PropertyValueType::Declination, 0.0);
        assert_eq!(azimuth, (24672.0 * 180.0) / 32767.0);
        assert_eq!(declination, (24672.0 * 90.0) / 32767.0);
        assert!((azimuth - 135.531_479_842_524_49).abs() < 1e-12);
        assert!((declination - 67.765_739_921_262_24).abs() < 1e-12);
        assert_eq!(to_int_or_default(&bytes, PropertyValueType::Azimuth, 0), 135);
    }

    #[test]
    fn it_coerces_to_numbers() {
        assert_eq!(to_int_or_default(&string("12"), PropertyValueType::String, 5), 12);
        assert_eq!(to_int_or_default(&string("x"), PropertyValueType::String, 5), 5);
        assert_eq!(
            to_double_or_default(&string("2.25"), PropertyValueType::Double, 0.0),
            2.25
        );
        let float = stored(|w| w.write_float(-3.75));
        assert_eq!(
            to_int_or_default(&float, PropertyValueType::SinglePrecisionFloat, 0),
            -3
        );
        let byte = stored(|w| w.write_byte(200));
        assert_eq!(to_double_or_default(&byte, PropertyValueType::SingleByte, 0.0), 200.0);
        let ip = stored(|w| w.write_byte_array(&[1, 2, 3, 4]));
        assert_eq!(to_int_or_default(&ip, PropertyValueType::IpAddress, 9), 9);
    }

    #[test]
    fn it_never_fails_to_coerce() {
        let types = [
            PropertyValueType::String,
            PropertyValueType::Integer,
            PropertyValueType::Double,
            PropertyValueType::Boolean,
            PropertyValueType::JavaScript,
            PropertyValueType::SinglePrecisionFloat,
            PropertyValueType::SingleByte,
            PropertyValueType::Coordinate,
            PropertyValueType::IpAddress,
            PropertyValueType::Wkb,
            PropertyValueType::Object,
            PropertyValueType::Declination,
            PropertyValueType::Azimuth,
        ];
        let mut rng = rand::thread_rng();
        for _ in 0..1_000 {
            let len = rng.gen_range(0..12);
            let bytes: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
            for value_type in types {
                to_int_or_default(&bytes, value_type, 0);
                to_double_or_default(&bytes, value_type, 0.0);
                to_bool_or_default(&bytes, value_type, false);
            }
        }
        assert_eq!(to_int_or_default(&[], PropertyValueType::Object, 7), 7);
    }

    #[test]
    fn it_renders_values() {
        let text = |bytes: &[u8], value_type| {
            StoredBinaryValue::decode(bytes, value_type)
                .expect("decodes")
                .to_text(3)
                .expect("renders")
        };
        assert_eq!(text(&string("hi"), PropertyValueType::String), "hi");
        assert_eq!(
            text(&stored(|w| w.write_integer(-12)), PropertyValueType::Integer),
            "-12"
        );
        assert_eq!(
            text(&stored(|w| w.write_float(0.1)), PropertyValueType::SinglePrecisionFloat),
            "0.1"
        );
        assert_eq!(
            text(&stored(|w| w.write_azimuth(-180.0)), PropertyValueType::Azimuth),
            "-180"
        );
        assert_eq!(
            text(
                &stored(|w| w.write_ip_address("::1".parse().expect("parses"))),
                PropertyValueType::IpAddress
            ),
            "::1"
        );
        assert_eq!(
            text(&stored(|w| w.write_byte_array(&POINT)), PropertyValueType::Wkb),
            "POINT(17.25 892.094)"
        );
    }
}
