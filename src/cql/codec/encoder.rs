//! Value encoder: application values to wire bytes.

use bytes::{BufMut, BytesMut};

use super::super::types::ColumnType;
use super::super::value::CqlValue;
use super::super::wire;
use super::{put_signed_vint, CodecError};

/// Nanoseconds in a day; the valid exclusive upper bound for `time`.
const NANOS_PER_DAY: i64 = 86_400_000_000_000;

/// Serialize a value for the given column type.
///
/// Returns `None` for [`CqlValue::Null`]; the caller writes the null
/// marker at the `[value]` level.
pub fn serialize_value(
    value: &CqlValue,
    typ: &ColumnType,
) -> Result<Option<Vec<u8>>, CodecError> {
    if value.is_null() {
        return Ok(None);
    }
    let mut buf = BytesMut::new();
    encode_value(value, typ, &mut buf)?;
    Ok(Some(buf.to_vec()))
}

/// Encode a non-null value body for the given column type.
pub fn encode_value(
    value: &CqlValue,
    typ: &ColumnType,
    dst: &mut BytesMut,
) -> Result<(), CodecError> {
    match (typ, value) {
        (ColumnType::Ascii, CqlValue::Ascii(s) | CqlValue::Text(s)) => {
            if !s.is_ascii() {
                return Err(CodecError::ValueOutOfRange {
                    type_name: "ascii",
                    detail: "string contains non-ASCII characters".into(),
                });
            }
            dst.put_slice(s.as_bytes());
        }
        (ColumnType::Text, CqlValue::Text(s) | CqlValue::Ascii(s)) => {
            dst.put_slice(s.as_bytes());
        }
        (ColumnType::Boolean, CqlValue::Boolean(b)) => {
            dst.put_u8(if *b { 1 } else { 0 });
        }
        (ColumnType::Blob, CqlValue::Blob(b)) => {
            dst.put_slice(b);
        }
        (ColumnType::TinyInt, CqlValue::TinyInt(v)) => {
            dst.put_i8(*v);
        }
        (ColumnType::SmallInt, CqlValue::SmallInt(v)) => {
            dst.put_i16(*v);
        }
        (ColumnType::Int, CqlValue::Int(v)) => {
            dst.put_i32(*v);
        }
        (ColumnType::BigInt, CqlValue::BigInt(v)) => {
            dst.put_i64(*v);
        }
        (ColumnType::Counter, CqlValue::Counter(v) | CqlValue::BigInt(v)) => {
            dst.put_i64(*v);
        }
        (ColumnType::Float, CqlValue::Float(v)) => {
            dst.put_f32(*v);
        }
        (ColumnType::Double, CqlValue::Double(v)) => {
            dst.put_f64(*v);
        }
        (ColumnType::Timestamp, CqlValue::Timestamp(ms)) => {
            dst.put_i64(*ms);
        }
        (ColumnType::Date, CqlValue::Date(days)) => {
            dst.put_u32(*days);
        }
        (ColumnType::Time, CqlValue::Time(ns)) => {
            if *ns < 0 || *ns >= NANOS_PER_DAY {
                return Err(CodecError::ValueOutOfRange {
                    type_name: "time",
                    detail: format!("{} nanoseconds is not within a day", ns),
                });
            }
            dst.put_i64(*ns);
        }
        (ColumnType::Uuid, CqlValue::Uuid(u) | CqlValue::TimeUuid(u)) => {
            dst.put_slice(u.as_bytes());
        }
        (ColumnType::TimeUuid, CqlValue::TimeUuid(u)) => {
            dst.put_slice(u.as_bytes());
        }
        (ColumnType::Inet, CqlValue::Inet(addr)) => match addr {
            std::net::IpAddr::V4(v4) => dst.put_slice(&v4.octets()),
            std::net::IpAddr::V6(v6) => dst.put_slice(&v6.octets()),
        },
        (ColumnType::Varint, CqlValue::Varint(v)) => {
            let bytes = v.as_signed_bytes_be_slice();
            if bytes.is_empty() {
                return Err(CodecError::ValueOutOfRange {
                    type_name: "varint",
                    detail: "empty byte representation".into(),
                });
            }
            dst.put_slice(bytes);
        }
        (ColumnType::Decimal, CqlValue::Decimal(d)) => {
            let (bytes, scale) = d.as_signed_be_bytes_slice_and_exponent();
            dst.put_i32(scale);
            dst.put_slice(bytes);
        }
        (ColumnType::Duration, CqlValue::Duration(d)) => {
            let signs = [
                (d.months as i64).signum(),
                (d.days as i64).signum(),
                d.nanoseconds.signum(),
            ];
            let has_positive = signs.iter().any(|s| *s > 0);
            let has_negative = signs.iter().any(|s| *s < 0);
            if has_positive && has_negative {
                return Err(CodecError::ValueOutOfRange {
                    type_name: "duration",
                    detail: "months, days and nanoseconds must have a uniform sign".into(),
                });
            }
            put_signed_vint(dst, d.months as i64);
            put_signed_vint(dst, d.days as i64);
            put_signed_vint(dst, d.nanoseconds);
        }
        (ColumnType::List(element_type), CqlValue::List(items))
        | (ColumnType::Set(element_type), CqlValue::Set(items)) => {
            encode_elements(items, element_type, typ.name(), dst)?;
        }
        (ColumnType::Map(key_type, value_type), CqlValue::Map(entries)) => {
            if entries.len() > i32::MAX as usize {
                return Err(CodecError::TooManyElements(entries.len()));
            }
            for (i, (key, _)) in entries.iter().enumerate() {
                if entries[..i].iter().any(|(seen, _)| seen == key) {
                    return Err(CodecError::DuplicateMapKey);
                }
            }
            dst.put_i32(entries.len() as i32);
            for (key, value) in entries {
                if key.is_null() {
                    return Err(CodecError::NullElement("map key"));
                }
                if value.is_null() {
                    return Err(CodecError::NullElement("map value"));
                }
                encode_framed(key, key_type, dst)?;
                encode_framed(value, value_type, dst)?;
            }
        }
        (
            ColumnType::UserDefined { fields, .. },
            CqlValue::UserDefinedType {
                fields: value_fields,
                ..
            },
        ) => {
            for (field_name, _) in value_fields {
                if !fields.iter().any(|(declared, _)| declared == field_name) {
                    return Err(CodecError::UnknownUdtField(field_name.clone()));
                }
            }
            // Field-ordered concatenation, in the declared order
            for (declared_name, field_type) in fields {
                let field_value = value_fields
                    .iter()
                    .find(|(name, _)| name == declared_name)
                    .and_then(|(_, value)| value.as_ref());
                match field_value {
                    Some(v) if !v.is_null() => encode_framed(v, field_type, dst)?,
                    _ => wire::put_bytes(dst, None).map_err(CodecError::Wire)?,
                }
            }
        }
        (ColumnType::Tuple(element_types), CqlValue::Tuple(elements)) => {
            if elements.len() != element_types.len() {
                return Err(CodecError::ValueOutOfRange {
                    type_name: "tuple",
                    detail: format!(
                        "arity mismatch: type has {} elements, value has {}",
                        element_types.len(),
                        elements.len()
                    ),
                });
            }
            for (element, element_type) in elements.iter().zip(element_types) {
                match element {
                    Some(v) if !v.is_null() => encode_framed(v, element_type, dst)?,
                    _ => wire::put_bytes(dst, None).map_err(CodecError::Wire)?,
                }
            }
        }
        (ColumnType::Custom(_), CqlValue::Blob(b)) => {
            dst.put_slice(b);
        }
        (typ, value) => {
            return Err(CodecError::TypeMismatch {
                expected: typ.name(),
                actual: value.type_name(),
            });
        }
    }
    Ok(())
}

/// Encode homogeneous list/set elements: element count then framed bodies.
fn encode_elements(
    items: &[CqlValue],
    element_type: &ColumnType,
    collection_name: &'static str,
    dst: &mut BytesMut,
) -> Result<(), CodecError> {
    if items.len() > i32::MAX as usize {
        return Err(CodecError::TooManyElements(items.len()));
    }
    dst.put_i32(items.len() as i32);
    for item in items {
        if item.is_null() {
            return Err(CodecError::NullElement(collection_name));
        }
        encode_framed(item, element_type, dst)?;
    }
    Ok(())
}

/// Encode a value with its `[bytes]` length framing.
fn encode_framed(
    value: &CqlValue,
    typ: &ColumnType,
    dst: &mut BytesMut,
) -> Result<(), CodecError> {
    let mut body = BytesMut::new();
    encode_value(value, typ, &mut body)?;
    wire::put_bytes(dst, Some(&body)).map_err(CodecError::Wire)
}
