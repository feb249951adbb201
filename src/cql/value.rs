//! CQL values.
//!
//! [`CqlValue`] is the tagged union the codec system encodes and decodes.
//! A value's tag must match the column type it is bound against; a mismatch
//! is a local codec error and is never sent over the wire.

use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use super::types::ColumnType;

/// Native CQL `varint` representation.
///
/// Represented as two's-complement binary in big-endian order. Constructors
/// don't perform any normalization on the provided data, so the underlying
/// bytes may contain leading zeros; they are passed to the database as is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CqlVarint {
    inner: Vec<u8>,
}

impl CqlVarint {
    /// Build from raw two's-complement big-endian bytes.
    pub fn from_signed_bytes_be(inner: Vec<u8>) -> Self {
        Self { inner }
    }

    /// The raw two's-complement big-endian bytes.
    pub fn as_signed_bytes_be_slice(&self) -> &[u8] {
        &self.inner
    }

    /// Convert to an `i64` if the magnitude fits.
    pub fn to_i64(&self) -> Option<i64> {
        let bytes = self.normalized();
        if bytes.is_empty() || bytes.len() > 8 {
            return None;
        }
        let mut value: i64 = if bytes[0] & 0x80 != 0 { -1 } else { 0 };
        for b in bytes {
            value = (value << 8) | (*b as i64);
        }
        Some(value)
    }

    /// Bytes with redundant sign-extension prefixes removed.
    fn normalized(&self) -> &[u8] {
        let mut bytes = self.inner.as_slice();
        while bytes.len() > 1 {
            let redundant = (bytes[0] == 0x00 && bytes[1] & 0x80 == 0)
                || (bytes[0] == 0xFF && bytes[1] & 0x80 != 0);
            if !redundant {
                break;
            }
            bytes = &bytes[1..];
        }
        bytes
    }
}

impl From<i64> for CqlVarint {
    fn from(value: i64) -> Self {
        let full = value.to_be_bytes();
        let mut start = 0;
        while start < 7 {
            let redundant = (full[start] == 0x00 && full[start + 1] & 0x80 == 0)
                || (full[start] == 0xFF && full[start + 1] & 0x80 != 0);
            if !redundant {
                break;
            }
            start += 1;
        }
        Self {
            inner: full[start..].to_vec(),
        }
    }
}

/// Native CQL `decimal` representation: a two's-complement big-endian
/// unscaled integer and a base-10 scale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CqlDecimal {
    int_val: Vec<u8>,
    scale: i32,
}

impl CqlDecimal {
    /// Build from the unscaled two's-complement bytes and the scale.
    pub fn from_signed_be_bytes_and_exponent(int_val: Vec<u8>, scale: i32) -> Self {
        Self { int_val, scale }
    }

    /// The unscaled bytes and the scale.
    pub fn as_signed_be_bytes_slice_and_exponent(&self) -> (&[u8], i32) {
        (&self.int_val, self.scale)
    }
}

/// Native CQL `duration` representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CqlDuration {
    pub months: i32,
    pub days: i32,
    pub nanoseconds: i64,
}

/// A CQL value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CqlValue {
    /// Null cell.
    Null,
    Ascii(String),
    Boolean(bool),
    Blob(Vec<u8>),
    Counter(i64),
    Decimal(CqlDecimal),
    /// Days since epoch, shifted so that the epoch is `1 << 31`.
    Date(u32),
    Double(f64),
    Duration(CqlDuration),
    Float(f32),
    Int(i32),
    BigInt(i64),
    Text(String),
    /// Milliseconds since the unix epoch.
    Timestamp(i64),
    Inet(IpAddr),
    List(Vec<CqlValue>),
    Map(Vec<(CqlValue, CqlValue)>),
    Set(Vec<CqlValue>),
    UserDefinedType {
        keyspace: String,
        name: String,
        fields: Vec<(String, Option<CqlValue>)>,
    },
    SmallInt(i16),
    TinyInt(i8),
    /// Nanoseconds since midnight.
    Time(i64),
    TimeUuid(uuid::Uuid),
    Tuple(Vec<Option<CqlValue>>),
    Uuid(uuid::Uuid),
    Varint(CqlVarint),
}

impl CqlValue {
    /// Whether the value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, CqlValue::Null)
    }

    /// Convert to a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            CqlValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Convert to a 32-bit integer.
    pub fn as_int(&self) -> Option<i32> {
        match self {
            CqlValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Convert to a 64-bit integer.
    pub fn as_bigint(&self) -> Option<i64> {
        match self {
            CqlValue::BigInt(i) | CqlValue::Counter(i) | CqlValue::Timestamp(i) => Some(*i),
            _ => None,
        }
    }

    /// Convert to a double.
    pub fn as_double(&self) -> Option<f64> {
        match self {
            CqlValue::Double(d) => Some(*d),
            CqlValue::Float(f) => Some(*f as f64),
            _ => None,
        }
    }

    /// Convert to a string slice.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            CqlValue::Text(s) | CqlValue::Ascii(s) => Some(s),
            _ => None,
        }
    }

    /// Convert to a blob slice.
    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            CqlValue::Blob(b) => Some(b),
            _ => None,
        }
    }

    /// Convert to a UUID.
    pub fn as_uuid(&self) -> Option<uuid::Uuid> {
        match self {
            CqlValue::Uuid(u) | CqlValue::TimeUuid(u) => Some(*u),
            _ => None,
        }
    }

    /// Convert to a list slice.
    pub fn as_list(&self) -> Option<&[CqlValue]> {
        match self {
            CqlValue::List(l) => Some(l),
            _ => None,
        }
    }

    /// Convert to a set slice.
    pub fn as_set(&self) -> Option<&[CqlValue]> {
        match self {
            CqlValue::Set(s) => Some(s),
            _ => None,
        }
    }

    /// Convert to map entries.
    pub fn as_map(&self) -> Option<&[(CqlValue, CqlValue)]> {
        match self {
            CqlValue::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Convert to an IP address.
    pub fn as_inet(&self) -> Option<IpAddr> {
        match self {
            CqlValue::Inet(a) => Some(*a),
            _ => None,
        }
    }

    /// Convert a timestamp to a chrono datetime.
    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            CqlValue::Timestamp(ms) => DateTime::from_timestamp_millis(*ms),
            _ => None,
        }
    }

    /// Convert a date to a chrono naive date.
    pub fn as_naive_date(&self) -> Option<NaiveDate> {
        match self {
            CqlValue::Date(days) => {
                let offset = *days as i64 - (1i64 << 31);
                NaiveDate::from_ymd_opt(1970, 1, 1)
                    .and_then(|epoch| epoch.checked_add_signed(chrono::Duration::days(offset)))
            }
            _ => None,
        }
    }

    /// Tag name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            CqlValue::Null => "null",
            CqlValue::Ascii(_) => "ascii",
            CqlValue::Boolean(_) => "boolean",
            CqlValue::Blob(_) => "blob",
            CqlValue::Counter(_) => "counter",
            CqlValue::Decimal(_) => "decimal",
            CqlValue::Date(_) => "date",
            CqlValue::Double(_) => "double",
            CqlValue::Duration(_) => "duration",
            CqlValue::Float(_) => "float",
            CqlValue::Int(_) => "int",
            CqlValue::BigInt(_) => "bigint",
            CqlValue::Text(_) => "text",
            CqlValue::Timestamp(_) => "timestamp",
            CqlValue::Inet(_) => "inet",
            CqlValue::List(_) => "list",
            CqlValue::Map(_) => "map",
            CqlValue::Set(_) => "set",
            CqlValue::UserDefinedType { .. } => "udt",
            CqlValue::SmallInt(_) => "smallint",
            CqlValue::TinyInt(_) => "tinyint",
            CqlValue::Time(_) => "time",
            CqlValue::TimeUuid(_) => "timeuuid",
            CqlValue::Tuple(_) => "tuple",
            CqlValue::Uuid(_) => "uuid",
            CqlValue::Varint(_) => "varint",
        }
    }

    /// Infer the natural wire type for unprepared statements, where no
    /// server-provided bind metadata exists.
    pub fn inferred_type(&self) -> Option<ColumnType> {
        fn element_type(values: &[CqlValue]) -> ColumnType {
            values
                .iter()
                .find(|v| !v.is_null())
                .and_then(|v| v.inferred_type())
                .unwrap_or(ColumnType::Blob)
        }

        Some(match self {
            CqlValue::Null => return None,
            CqlValue::Ascii(_) => ColumnType::Ascii,
            CqlValue::Boolean(_) => ColumnType::Boolean,
            CqlValue::Blob(_) => ColumnType::Blob,
            CqlValue::Counter(_) => ColumnType::Counter,
            CqlValue::Decimal(_) => ColumnType::Decimal,
            CqlValue::Date(_) => ColumnType::Date,
            CqlValue::Double(_) => ColumnType::Double,
            CqlValue::Duration(_) => ColumnType::Duration,
            CqlValue::Float(_) => ColumnType::Float,
            CqlValue::Int(_) => ColumnType::Int,
            CqlValue::BigInt(_) => ColumnType::BigInt,
            CqlValue::Text(_) => ColumnType::Text,
            CqlValue::Timestamp(_) => ColumnType::Timestamp,
            CqlValue::Inet(_) => ColumnType::Inet,
            CqlValue::List(values) => ColumnType::List(Box::new(element_type(values))),
            CqlValue::Map(entries) => {
                let key = entries
                    .first()
                    .and_then(|(k, _)| k.inferred_type())
                    .unwrap_or(ColumnType::Blob);
                let value = entries
                    .iter()
                    .find(|(_, v)| !v.is_null())
                    .and_then(|(_, v)| v.inferred_type())
                    .unwrap_or(ColumnType::Blob);
                ColumnType::Map(Box::new(key), Box::new(value))
            }
            CqlValue::Set(values) => ColumnType::Set(Box::new(element_type(values))),
            CqlValue::UserDefinedType {
                keyspace,
                name,
                fields,
            } => ColumnType::UserDefined {
                keyspace: keyspace.clone(),
                name: name.clone(),
                fields: fields
                    .iter()
                    .map(|(field_name, value)| {
                        let typ = value
                            .as_ref()
                            .and_then(|v| v.inferred_type())
                            .unwrap_or(ColumnType::Blob);
                        (field_name.clone(), typ)
                    })
                    .collect(),
            },
            CqlValue::SmallInt(_) => ColumnType::SmallInt,
            CqlValue::TinyInt(_) => ColumnType::TinyInt,
            CqlValue::Time(_) => ColumnType::Time,
            CqlValue::TimeUuid(_) => ColumnType::TimeUuid,
            CqlValue::Tuple(values) => ColumnType::Tuple(
                values
                    .iter()
                    .map(|v| {
                        v.as_ref()
                            .and_then(|v| v.inferred_type())
                            .unwrap_or(ColumnType::Blob)
                    })
                    .collect(),
            ),
            CqlValue::Uuid(_) => ColumnType::Uuid,
            CqlValue::Varint(_) => ColumnType::Varint,
        })
    }
}

impl fmt::Display for CqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CqlValue::Null => write!(f, "null"),
            CqlValue::Ascii(s) => write!(f, "'{}'", s),
            CqlValue::Boolean(b) => write!(f, "{}", b),
            CqlValue::Blob(b) => write!(f, "<{} bytes>", b.len()),
            CqlValue::Counter(c) => write!(f, "{}", c),
            CqlValue::Decimal(d) => {
                let (bytes, scale) = d.as_signed_be_bytes_slice_and_exponent();
                write!(f, "<decimal {} bytes, scale {}>", bytes.len(), scale)
            }
            CqlValue::Date(d) => write!(f, "{}", d),
            CqlValue::Double(d) => write!(f, "{}", d),
            CqlValue::Duration(d) => {
                write!(f, "{}mo{}d{}ns", d.months, d.days, d.nanoseconds)
            }
            CqlValue::Float(v) => write!(f, "{}", v),
            CqlValue::Int(i) => write!(f, "{}", i),
            CqlValue::BigInt(i) => write!(f, "{}", i),
            CqlValue::Text(s) => write!(f, "'{}'", s),
            CqlValue::Timestamp(ms) => write!(f, "{}", ms),
            CqlValue::Inet(a) => write!(f, "{}", a),
            CqlValue::List(l) => write!(f, "[{} items]", l.len()),
            CqlValue::Map(m) => write!(f, "{{{} entries}}", m.len()),
            CqlValue::Set(s) => write!(f, "{{{} items}}", s.len()),
            CqlValue::UserDefinedType { name, fields, .. } => {
                write!(f, "{}{{{} fields}}", name, fields.len())
            }
            CqlValue::SmallInt(i) => write!(f, "{}", i),
            CqlValue::TinyInt(i) => write!(f, "{}", i),
            CqlValue::Time(ns) => write!(f, "{}", ns),
            CqlValue::TimeUuid(u) => write!(f, "{}", u),
            CqlValue::Tuple(t) => write!(f, "({} elements)", t.len()),
            CqlValue::Uuid(u) => write!(f, "{}", u),
            CqlValue::Varint(v) => {
                write!(f, "<varint {} bytes>", v.as_signed_bytes_be_slice().len())
            }
        }
    }
}

impl From<bool> for CqlValue {
    fn from(v: bool) -> Self {
        CqlValue::Boolean(v)
    }
}

impl From<i8> for CqlValue {
    fn from(v: i8) -> Self {
        CqlValue::TinyInt(v)
    }
}

impl From<i16> for CqlValue {
    fn from(v: i16) -> Self {
        CqlValue::SmallInt(v)
    }
}

impl From<i32> for CqlValue {
    fn from(v: i32) -> Self {
        CqlValue::Int(v)
    }
}

impl From<i64> for CqlValue {
    fn from(v: i64) -> Self {
        CqlValue::BigInt(v)
    }
}

impl From<f32> for CqlValue {
    fn from(v: f32) -> Self {
        CqlValue::Float(v)
    }
}

impl From<f64> for CqlValue {
    fn from(v: f64) -> Self {
        CqlValue::Double(v)
    }
}

impl From<&str> for CqlValue {
    fn from(v: &str) -> Self {
        CqlValue::Text(v.to_string())
    }
}

impl From<String> for CqlValue {
    fn from(v: String) -> Self {
        CqlValue::Text(v)
    }
}

impl From<Vec<u8>> for CqlValue {
    fn from(v: Vec<u8>) -> Self {
        CqlValue::Blob(v)
    }
}

impl From<uuid::Uuid> for CqlValue {
    fn from(v: uuid::Uuid) -> Self {
        CqlValue::Uuid(v)
    }
}

impl From<IpAddr> for CqlValue {
    fn from(v: IpAddr) -> Self {
        CqlValue::Inet(v)
    }
}

impl From<CqlDuration> for CqlValue {
    fn from(v: CqlDuration) -> Self {
        CqlValue::Duration(v)
    }
}

impl From<CqlDecimal> for CqlValue {
    fn from(v: CqlDecimal) -> Self {
        CqlValue::Decimal(v)
    }
}

impl From<CqlVarint> for CqlValue {
    fn from(v: CqlVarint) -> Self {
        CqlValue::Varint(v)
    }
}

impl<T: Into<CqlValue>> From<Option<T>> for CqlValue {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(value) => value.into(),
            None => CqlValue::Null,
        }
    }
}

impl From<HashMap<String, CqlValue>> for CqlValue {
    fn from(v: HashMap<String, CqlValue>) -> Self {
        CqlValue::Map(
            v.into_iter()
                .map(|(k, value)| (CqlValue::Text(k), value))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_varint_i64_roundtrip() {
        for v in [0i64, 1, -1, 127, 128, -128, -129, i64::MAX, i64::MIN, 300] {
            let varint = CqlVarint::from(v);
            assert_eq!(varint.to_i64(), Some(v), "value {}", v);
        }
    }

    #[test]
    fn test_varint_minimal_encoding() {
        assert_eq!(CqlVarint::from(0).as_signed_bytes_be_slice(), &[0x00]);
        assert_eq!(CqlVarint::from(-1).as_signed_bytes_be_slice(), &[0xFF]);
        assert_eq!(CqlVarint::from(127).as_signed_bytes_be_slice(), &[0x7F]);
        assert_eq!(
            CqlVarint::from(128).as_signed_bytes_be_slice(),
            &[0x00, 0x80]
        );
        assert_eq!(CqlVarint::from(-128).as_signed_bytes_be_slice(), &[0x80]);
    }

    #[test]
    fn test_varint_non_normalized() {
        // Leading zeros are kept as-is but ignored for conversion
        let varint = CqlVarint::from_signed_bytes_be(vec![0x00, 0x00, 0x2A]);
        assert_eq!(varint.as_signed_bytes_be_slice().len(), 3);
        assert_eq!(varint.to_i64(), Some(42));
    }

    #[test]
    fn test_varint_too_wide() {
        let varint = CqlVarint::from_signed_bytes_be(vec![0x01; 9]);
        assert_eq!(varint.to_i64(), None);
    }

    #[test]
    fn test_accessors() {
        assert_eq!(CqlValue::Int(7).as_int(), Some(7));
        assert_eq!(CqlValue::Int(7).as_bigint(), None);
        assert_eq!(CqlValue::BigInt(7).as_bigint(), Some(7));
        assert_eq!(CqlValue::Text("x".into()).as_str(), Some("x"));
        assert_eq!(CqlValue::Ascii("x".into()).as_str(), Some("x"));
        assert_eq!(CqlValue::Float(1.5).as_double(), Some(1.5));
        assert!(CqlValue::Null.is_null());
    }

    #[test]
    fn test_from_impls() {
        assert_eq!(CqlValue::from(true), CqlValue::Boolean(true));
        assert_eq!(CqlValue::from(1i32), CqlValue::Int(1));
        assert_eq!(CqlValue::from(1i64), CqlValue::BigInt(1));
        assert_eq!(CqlValue::from("abc"), CqlValue::Text("abc".into()));
        assert_eq!(CqlValue::from(None::<i32>), CqlValue::Null);
        assert_eq!(CqlValue::from(Some(2i32)), CqlValue::Int(2));
    }

    #[test]
    fn test_inferred_type() {
        assert_eq!(CqlValue::Int(1).inferred_type(), Some(ColumnType::Int));
        assert_eq!(CqlValue::Null.inferred_type(), None);
        assert_eq!(
            CqlValue::List(vec![CqlValue::Text("a".into())]).inferred_type(),
            Some(ColumnType::List(Box::new(ColumnType::Text)))
        );
        assert_eq!(
            CqlValue::Map(vec![(CqlValue::Text("k".into()), CqlValue::Int(1))]).inferred_type(),
            Some(ColumnType::Map(
                Box::new(ColumnType::Text),
                Box::new(ColumnType::Int)
            ))
        );
    }

    #[test]
    fn test_chrono_accessors() {
        let ts = CqlValue::Timestamp(0);
        assert_eq!(ts.as_datetime().map(|dt| dt.timestamp_millis()), Some(0));

        // Epoch day
        let date = CqlValue::Date(1u32 << 31);
        let nd = date.as_naive_date().unwrap();
        assert_eq!((nd.format("%Y-%m-%d")).to_string(), "1970-01-01");
    }

    #[test]
    fn test_display() {
        assert_eq!(CqlValue::Int(3).to_string(), "3");
        assert_eq!(CqlValue::Text("hi".into()).to_string(), "'hi'");
        assert_eq!(
            CqlValue::Duration(CqlDuration {
                months: 1,
                days: 2,
                nanoseconds: 3
            })
            .to_string(),
            "1mo2d3ns"
        );
    }

    #[test]
    fn test_malformed_uuid_string_reports_group_length() {
        // 11 hex digits in the last group instead of 12
        let result = uuid::Uuid::parse_str("123e4567-e89b-12d3-a456-42661417400");
        let err = result.unwrap_err().to_string();
        assert!(err.contains("group"), "unexpected error text: {}", err);
    }
}
