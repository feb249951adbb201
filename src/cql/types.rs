//! CQL column types.
//!
//! Column types appear in result metadata and prepared-statement metadata
//! as an option id, optionally followed by type parameters (element types
//! for collections, the field list for user-defined types).

use bytes::BytesMut;

use super::wire::{self, Reader, WireError};

/// Standard option ids.
pub mod type_id {
    pub const CUSTOM: u16 = 0x0000;
    pub const ASCII: u16 = 0x0001;
    pub const BIGINT: u16 = 0x0002;
    pub const BLOB: u16 = 0x0003;
    pub const BOOLEAN: u16 = 0x0004;
    pub const COUNTER: u16 = 0x0005;
    pub const DECIMAL: u16 = 0x0006;
    pub const DOUBLE: u16 = 0x0007;
    pub const FLOAT: u16 = 0x0008;
    pub const INT: u16 = 0x0009;
    pub const TIMESTAMP: u16 = 0x000B;
    pub const UUID: u16 = 0x000C;
    pub const VARCHAR: u16 = 0x000D;
    pub const VARINT: u16 = 0x000E;
    pub const TIMEUUID: u16 = 0x000F;
    pub const INET: u16 = 0x0010;
    pub const DATE: u16 = 0x0011;
    pub const TIME: u16 = 0x0012;
    pub const SMALLINT: u16 = 0x0013;
    pub const TINYINT: u16 = 0x0014;
    pub const DURATION: u16 = 0x0015;
    pub const LIST: u16 = 0x0020;
    pub const MAP: u16 = 0x0021;
    pub const SET: u16 = 0x0022;
    pub const UDT: u16 = 0x0030;
    pub const TUPLE: u16 = 0x0031;
}

/// A CQL column type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnType {
    Ascii,
    BigInt,
    Blob,
    Boolean,
    Counter,
    Decimal,
    Double,
    Float,
    Int,
    Timestamp,
    Uuid,
    Text,
    Varint,
    TimeUuid,
    Inet,
    Date,
    Time,
    SmallInt,
    TinyInt,
    Duration,
    List(Box<ColumnType>),
    Map(Box<ColumnType>, Box<ColumnType>),
    Set(Box<ColumnType>),
    UserDefined {
        keyspace: String,
        name: String,
        fields: Vec<(String, ColumnType)>,
    },
    Tuple(Vec<ColumnType>),
    Custom(String),
}

impl ColumnType {
    /// Parse a type option from metadata.
    pub fn from_reader(r: &mut Reader<'_>) -> Result<Self, WireError> {
        let id = r.short()?;
        Ok(match id {
            type_id::CUSTOM => ColumnType::Custom(r.string()?.to_string()),
            type_id::ASCII => ColumnType::Ascii,
            type_id::BIGINT => ColumnType::BigInt,
            type_id::BLOB => ColumnType::Blob,
            type_id::BOOLEAN => ColumnType::Boolean,
            type_id::COUNTER => ColumnType::Counter,
            type_id::DECIMAL => ColumnType::Decimal,
            type_id::DOUBLE => ColumnType::Double,
            type_id::FLOAT => ColumnType::Float,
            type_id::INT => ColumnType::Int,
            type_id::TIMESTAMP => ColumnType::Timestamp,
            type_id::UUID => ColumnType::Uuid,
            type_id::VARCHAR => ColumnType::Text,
            type_id::VARINT => ColumnType::Varint,
            type_id::TIMEUUID => ColumnType::TimeUuid,
            type_id::INET => ColumnType::Inet,
            type_id::DATE => ColumnType::Date,
            type_id::TIME => ColumnType::Time,
            type_id::SMALLINT => ColumnType::SmallInt,
            type_id::TINYINT => ColumnType::TinyInt,
            type_id::DURATION => ColumnType::Duration,
            type_id::LIST => ColumnType::List(Box::new(Self::from_reader(r)?)),
            type_id::MAP => {
                let key = Self::from_reader(r)?;
                let value = Self::from_reader(r)?;
                ColumnType::Map(Box::new(key), Box::new(value))
            }
            type_id::SET => ColumnType::Set(Box::new(Self::from_reader(r)?)),
            type_id::UDT => {
                let keyspace = r.string()?.to_string();
                let name = r.string()?.to_string();
                let n = r.short()? as usize;
                let mut fields = Vec::with_capacity(n);
                for _ in 0..n {
                    let field_name = r.string()?.to_string();
                    let field_type = Self::from_reader(r)?;
                    fields.push((field_name, field_type));
                }
                ColumnType::UserDefined {
                    keyspace,
                    name,
                    fields,
                }
            }
            type_id::TUPLE => {
                let n = r.short()? as usize;
                let mut elements = Vec::with_capacity(n);
                for _ in 0..n {
                    elements.push(Self::from_reader(r)?);
                }
                ColumnType::Tuple(elements)
            }
            other => ColumnType::Custom(format!("unknown:{:#06x}", other)),
        })
    }

    /// Write the type option to metadata.
    pub fn write(&self, dst: &mut BytesMut) -> Result<(), WireError> {
        match self {
            ColumnType::Custom(name) => {
                wire::put_short(dst, type_id::CUSTOM);
                wire::put_string(dst, name)?;
            }
            ColumnType::Ascii => wire::put_short(dst, type_id::ASCII),
            ColumnType::BigInt => wire::put_short(dst, type_id::BIGINT),
            ColumnType::Blob => wire::put_short(dst, type_id::BLOB),
            ColumnType::Boolean => wire::put_short(dst, type_id::BOOLEAN),
            ColumnType::Counter => wire::put_short(dst, type_id::COUNTER),
            ColumnType::Decimal => wire::put_short(dst, type_id::DECIMAL),
            ColumnType::Double => wire::put_short(dst, type_id::DOUBLE),
            ColumnType::Float => wire::put_short(dst, type_id::FLOAT),
            ColumnType::Int => wire::put_short(dst, type_id::INT),
            ColumnType::Timestamp => wire::put_short(dst, type_id::TIMESTAMP),
            ColumnType::Uuid => wire::put_short(dst, type_id::UUID),
            ColumnType::Text => wire::put_short(dst, type_id::VARCHAR),
            ColumnType::Varint => wire::put_short(dst, type_id::VARINT),
            ColumnType::TimeUuid => wire::put_short(dst, type_id::TIMEUUID),
            ColumnType::Inet => wire::put_short(dst, type_id::INET),
            ColumnType::Date => wire::put_short(dst, type_id::DATE),
            ColumnType::Time => wire::put_short(dst, type_id::TIME),
            ColumnType::SmallInt => wire::put_short(dst, type_id::SMALLINT),
            ColumnType::TinyInt => wire::put_short(dst, type_id::TINYINT),
            ColumnType::Duration => wire::put_short(dst, type_id::DURATION),
            ColumnType::List(element) => {
                wire::put_short(dst, type_id::LIST);
                element.write(dst)?;
            }
            ColumnType::Map(key, value) => {
                wire::put_short(dst, type_id::MAP);
                key.write(dst)?;
                value.write(dst)?;
            }
            ColumnType::Set(element) => {
                wire::put_short(dst, type_id::SET);
                element.write(dst)?;
            }
            ColumnType::UserDefined {
                keyspace,
                name,
                fields,
            } => {
                wire::put_short(dst, type_id::UDT);
                wire::put_string(dst, keyspace)?;
                wire::put_string(dst, name)?;
                wire::put_short(dst, fields.len() as u16);
                for (field_name, field_type) in fields {
                    wire::put_string(dst, field_name)?;
                    field_type.write(dst)?;
                }
            }
            ColumnType::Tuple(elements) => {
                wire::put_short(dst, type_id::TUPLE);
                wire::put_short(dst, elements.len() as u16);
                for element in elements {
                    element.write(dst)?;
                }
            }
        }
        Ok(())
    }

    /// Short name used in error messages.
    pub fn name(&self) -> &'static str {
        match self {
            ColumnType::Ascii => "ascii",
            ColumnType::BigInt => "bigint",
            ColumnType::Blob => "blob",
            ColumnType::Boolean => "boolean",
            ColumnType::Counter => "counter",
            ColumnType::Decimal => "decimal",
            ColumnType::Double => "double",
            ColumnType::Float => "float",
            ColumnType::Int => "int",
            ColumnType::Timestamp => "timestamp",
            ColumnType::Uuid => "uuid",
            ColumnType::Text => "text",
            ColumnType::Varint => "varint",
            ColumnType::TimeUuid => "timeuuid",
            ColumnType::Inet => "inet",
            ColumnType::Date => "date",
            ColumnType::Time => "time",
            ColumnType::SmallInt => "smallint",
            ColumnType::TinyInt => "tinyint",
            ColumnType::Duration => "duration",
            ColumnType::List(_) => "list",
            ColumnType::Map(_, _) => "map",
            ColumnType::Set(_) => "set",
            ColumnType::UserDefined { .. } => "udt",
            ColumnType::Tuple(_) => "tuple",
            ColumnType::Custom(_) => "custom",
        }
    }

    /// Whether the type is a collection.
    pub fn is_collection(&self) -> bool {
        matches!(
            self,
            ColumnType::List(_) | ColumnType::Map(_, _) | ColumnType::Set(_)
        )
    }
}
