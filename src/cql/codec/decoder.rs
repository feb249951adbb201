//! Value decoder: wire bytes to application values.

use super::super::types::ColumnType;
use super::super::value::{CqlDecimal, CqlDuration, CqlValue, CqlVarint};
use super::super::wire::Reader;
use super::{read_signed_vint, CodecError};

/// Nanoseconds in a day; the valid exclusive upper bound for `time`.
const NANOS_PER_DAY: i64 = 86_400_000_000_000;

/// Decode a non-null value body for the given column type.
///
/// Malformed byte lengths always yield an error, never a panic.
pub fn decode_value(bytes: &[u8], typ: &ColumnType) -> Result<CqlValue, CodecError> {
    match typ {
        ColumnType::Ascii => {
            let s = utf8(bytes, "ascii")?;
            if !s.is_ascii() {
                return Err(CodecError::ValueOutOfRange {
                    type_name: "ascii",
                    detail: "payload contains non-ASCII bytes".into(),
                });
            }
            Ok(CqlValue::Ascii(s.to_string()))
        }
        ColumnType::Text => Ok(CqlValue::Text(utf8(bytes, "text")?.to_string())),
        ColumnType::Blob => Ok(CqlValue::Blob(bytes.to_vec())),
        ColumnType::Custom(_) => Ok(CqlValue::Blob(bytes.to_vec())),
        ColumnType::Boolean => {
            let b = fixed::<1>(bytes, "boolean")?;
            Ok(CqlValue::Boolean(b[0] != 0))
        }
        ColumnType::TinyInt => {
            let b = fixed::<1>(bytes, "tinyint")?;
            Ok(CqlValue::TinyInt(b[0] as i8))
        }
        ColumnType::SmallInt => {
            let b = fixed::<2>(bytes, "smallint")?;
            Ok(CqlValue::SmallInt(i16::from_be_bytes(b)))
        }
        ColumnType::Int => {
            let b = fixed::<4>(bytes, "int")?;
            Ok(CqlValue::Int(i32::from_be_bytes(b)))
        }
        ColumnType::BigInt => {
            let b = fixed::<8>(bytes, "bigint")?;
            Ok(CqlValue::BigInt(i64::from_be_bytes(b)))
        }
        ColumnType::Counter => {
            let b = fixed::<8>(bytes, "counter")?;
            Ok(CqlValue::Counter(i64::from_be_bytes(b)))
        }
        ColumnType::Float => {
            let b = fixed::<4>(bytes, "float")?;
            Ok(CqlValue::Float(f32::from_be_bytes(b)))
        }
        ColumnType::Double => {
            let b = fixed::<8>(bytes, "double")?;
            Ok(CqlValue::Double(f64::from_be_bytes(b)))
        }
        ColumnType::Timestamp => {
            let b = fixed::<8>(bytes, "timestamp")?;
            Ok(CqlValue::Timestamp(i64::from_be_bytes(b)))
        }
        ColumnType::Date => {
            let b = fixed::<4>(bytes, "date")?;
            Ok(CqlValue::Date(u32::from_be_bytes(b)))
        }
        ColumnType::Time => {
            let b = fixed::<8>(bytes, "time")?;
            let ns = i64::from_be_bytes(b);
            if !(0..NANOS_PER_DAY).contains(&ns) {
                return Err(CodecError::ValueOutOfRange {
                    type_name: "time",
                    detail: format!("{} nanoseconds is not within a day", ns),
                });
            }
            Ok(CqlValue::Time(ns))
        }
        ColumnType::Uuid => {
            let b = fixed::<16>(bytes, "uuid")?;
            Ok(CqlValue::Uuid(uuid::Uuid::from_bytes(b)))
        }
        ColumnType::TimeUuid => {
            let b = fixed::<16>(bytes, "timeuuid")?;
            Ok(CqlValue::TimeUuid(uuid::Uuid::from_bytes(b)))
        }
        ColumnType::Inet => match bytes.len() {
            4 => Ok(CqlValue::Inet(std::net::IpAddr::from([
                bytes[0], bytes[1], bytes[2], bytes[3],
            ]))),
            16 => {
                let mut octets = [0u8; 16];
                octets.copy_from_slice(bytes);
                Ok(CqlValue::Inet(std::net::IpAddr::from(octets)))
            }
            other => Err(CodecError::WrongLength {
                type_name: "inet",
                expected: "4 or 16",
                actual: other,
            }),
        },
        ColumnType::Varint => {
            if bytes.is_empty() {
                return Err(CodecError::WrongLength {
                    type_name: "varint",
                    expected: "at least 1",
                    actual: 0,
                });
            }
            Ok(CqlValue::Varint(CqlVarint::from_signed_bytes_be(
                bytes.to_vec(),
            )))
        }
        ColumnType::Decimal => {
            if bytes.len() < 4 {
                return Err(CodecError::WrongLength {
                    type_name: "decimal",
                    expected: "at least 4",
                    actual: bytes.len(),
                });
            }
            let scale = i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            Ok(CqlValue::Decimal(
                CqlDecimal::from_signed_be_bytes_and_exponent(bytes[4..].to_vec(), scale),
            ))
        }
        ColumnType::Duration => {
            let mut r = Reader::new(bytes);
            let months = read_signed_vint(&mut r)?;
            let days = read_signed_vint(&mut r)?;
            let nanoseconds = read_signed_vint(&mut r)?;
            if !r.is_empty() {
                return Err(CodecError::TrailingBytes {
                    type_name: "duration",
                    remaining: r.remaining(),
                });
            }
            let months = int_component(months, "duration months")?;
            let days = int_component(days, "duration days")?;
            Ok(CqlValue::Duration(CqlDuration {
                months,
                days,
                nanoseconds,
            }))
        }
        ColumnType::List(element_type) => {
            Ok(CqlValue::List(decode_elements(bytes, element_type, "list")?))
        }
        ColumnType::Set(element_type) => {
            Ok(CqlValue::Set(decode_elements(bytes, element_type, "set")?))
        }
        ColumnType::Map(key_type, value_type) => {
            let mut r = Reader::new(bytes);
            let count = element_count(&mut r, "map")?;
            let mut entries = Vec::with_capacity(count.min(1024));
            for _ in 0..count {
                let key = match r.bytes()? {
                    Some(body) => decode_value(body, key_type)?,
                    None => return Err(CodecError::NullElement("map key")),
                };
                let value = match r.bytes()? {
                    Some(body) => decode_value(body, value_type)?,
                    None => return Err(CodecError::NullElement("map value")),
                };
                entries.push((key, value));
            }
            no_trailing(&r, "map")?;
            Ok(CqlValue::Map(entries))
        }
        ColumnType::UserDefined {
            keyspace,
            name,
            fields,
        } => {
            let mut r = Reader::new(bytes);
            let mut decoded = Vec::with_capacity(fields.len());
            for (field_name, field_type) in fields {
                // A UDT body may legally end early: fields added later are null
                if r.is_empty() {
                    decoded.push((field_name.clone(), None));
                    continue;
                }
                let value = match r.bytes()? {
                    Some(body) => Some(decode_value(body, field_type)?),
                    None => None,
                };
                decoded.push((field_name.clone(), value));
            }
            no_trailing(&r, "udt")?;
            Ok(CqlValue::UserDefinedType {
                keyspace: keyspace.clone(),
                name: name.clone(),
                fields: decoded,
            })
        }
        ColumnType::Tuple(element_types) => {
            let mut r = Reader::new(bytes);
            let mut elements = Vec::with_capacity(element_types.len());
            for element_type in element_types {
                if r.is_empty() {
                    elements.push(None);
                    continue;
                }
                let value = match r.bytes()? {
                    Some(body) => Some(decode_value(body, element_type)?),
                    None => None,
                };
                elements.push(value);
            }
            no_trailing(&r, "tuple")?;
            Ok(CqlValue::Tuple(elements))
        }
    }
}

fn utf8<'a>(bytes: &'a [u8], type_name: &'static str) -> Result<&'a str, CodecError> {
    std::str::from_utf8(bytes).map_err(|_| CodecError::ValueOutOfRange {
        type_name,
        detail: "payload is not valid UTF-8".into(),
    })
}

fn fixed<const N: usize>(bytes: &[u8], type_name: &'static str) -> Result<[u8; N], CodecError> {
    if bytes.len() != N {
        return Err(CodecError::WrongLength {
            type_name,
            expected: match N {
                1 => "1",
                2 => "2",
                4 => "4",
                8 => "8",
                16 => "16",
                _ => "fixed",
            },
            actual: bytes.len(),
        });
    }
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    Ok(out)
}

fn int_component(v: i64, what: &'static str) -> Result<i32, CodecError> {
    i32::try_from(v).map_err(|_| CodecError::ValueOutOfRange {
        type_name: "duration",
        detail: format!("{} {} exceeds 32 bits", what, v),
    })
}

fn element_count(r: &mut Reader<'_>, type_name: &'static str) -> Result<usize, CodecError> {
    let count = r.int()?;
    if count < 0 {
        return Err(CodecError::ValueOutOfRange {
            type_name: "collection",
            detail: format!("negative {} element count: {}", type_name, count),
        });
    }
    Ok(count as usize)
}

fn no_trailing(r: &Reader<'_>, type_name: &'static str) -> Result<(), CodecError> {
    if r.is_empty() {
        Ok(())
    } else {
        Err(CodecError::TrailingBytes {
            type_name,
            remaining: r.remaining(),
        })
    }
}

fn decode_elements(
    bytes: &[u8],
    element_type: &ColumnType,
    collection_name: &'static str,
) -> Result<Vec<CqlValue>, CodecError> {
    let mut r = Reader::new(bytes);
    let count = element_count(&mut r, collection_name)?;
    let mut items = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        match r.bytes()? {
            Some(body) => items.push(decode_value(body, element_type)?),
            None => return Err(CodecError::NullElement(collection_name)),
        }
    }
    no_trailing(&r, collection_name)?;
    Ok(items)
}
