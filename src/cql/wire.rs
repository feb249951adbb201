//! CQL wire notation primitives.
//!
//! Readers and writers for the primitive elements of the native protocol:
//! `[short]`, `[int]`, `[long]`, `[string]`, `[long string]`, `[bytes]`,
//! `[short bytes]`, `[value]`, `[string list]`, `[string map]`,
//! `[string multimap]`, `[inet]` and `[uuid]`.

use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;

use bytes::{BufMut, BytesMut};

/// Errors produced by the primitive layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    /// Not enough bytes left in the buffer.
    UnexpectedEof { needed: usize, remaining: usize },

    /// A length-prefixed string was not valid UTF-8.
    InvalidUtf8,

    /// A value exceeds the representable size for its notation.
    TooLong(&'static str, usize),

    /// A length prefix was negative where a non-null value was required.
    NegativeLength(i64),

    /// An `[inet]` element carried an address of invalid size.
    InvalidInetLength(u8),
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireError::UnexpectedEof { needed, remaining } => {
                write!(
                    f,
                    "unexpected end of buffer: needed {} bytes, {} remaining",
                    needed, remaining
                )
            }
            WireError::InvalidUtf8 => write!(f, "string is not valid UTF-8"),
            WireError::TooLong(what, len) => {
                write!(f, "{} too long for wire notation: {} bytes", what, len)
            }
            WireError::NegativeLength(len) => {
                write!(f, "negative length {} where a value is required", len)
            }
            WireError::InvalidInetLength(len) => {
                write!(f, "invalid inet address length: {}", len)
            }
        }
    }
}

impl std::error::Error for WireError {}

// ============================================================================
// Reader
// ============================================================================

/// Positioned reader over a byte slice.
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    /// Create a reader over the given bytes.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    /// Whether all bytes have been consumed.
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Current position.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Take `n` raw bytes.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        if self.remaining() < n {
            return Err(WireError::UnexpectedEof {
                needed: n,
                remaining: self.remaining(),
            });
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    /// Read a single byte.
    pub fn byte(&mut self) -> Result<u8, WireError> {
        Ok(self.take(1)?[0])
    }

    /// Read a `[short]` (unsigned 16-bit big-endian).
    pub fn short(&mut self) -> Result<u16, WireError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    /// Read an `[int]` (signed 32-bit big-endian).
    pub fn int(&mut self) -> Result<i32, WireError> {
        let b = self.take(4)?;
        Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Read a `[long]` (signed 64-bit big-endian).
    pub fn long(&mut self) -> Result<i64, WireError> {
        let b = self.take(8)?;
        Ok(i64::from_be_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    /// Read a `[string]` (short-prefixed UTF-8).
    pub fn string(&mut self) -> Result<&'a str, WireError> {
        let len = self.short()? as usize;
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes).map_err(|_| WireError::InvalidUtf8)
    }

    /// Read a `[long string]` (int-prefixed UTF-8).
    pub fn long_string(&mut self) -> Result<&'a str, WireError> {
        let len = self.int()?;
        if len < 0 {
            return Err(WireError::NegativeLength(len as i64));
        }
        let bytes = self.take(len as usize)?;
        std::str::from_utf8(bytes).map_err(|_| WireError::InvalidUtf8)
    }

    /// Read a `[bytes]` (int-prefixed; negative length means null).
    pub fn bytes(&mut self) -> Result<Option<&'a [u8]>, WireError> {
        let len = self.int()?;
        if len < 0 {
            return Ok(None);
        }
        Ok(Some(self.take(len as usize)?))
    }

    /// Read a `[short bytes]` (short-prefixed, never null).
    pub fn short_bytes(&mut self) -> Result<&'a [u8], WireError> {
        let len = self.short()? as usize;
        self.take(len)
    }

    /// Read a `[string list]`.
    pub fn string_list(&mut self) -> Result<Vec<String>, WireError> {
        let n = self.short()? as usize;
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            out.push(self.string()?.to_string());
        }
        Ok(out)
    }

    /// Read a `[string map]`.
    pub fn string_map(&mut self) -> Result<HashMap<String, String>, WireError> {
        let n = self.short()? as usize;
        let mut out = HashMap::with_capacity(n);
        for _ in 0..n {
            let key = self.string()?.to_string();
            let value = self.string()?.to_string();
            out.insert(key, value);
        }
        Ok(out)
    }

    /// Read a `[string multimap]`.
    pub fn string_multimap(&mut self) -> Result<HashMap<String, Vec<String>>, WireError> {
        let n = self.short()? as usize;
        let mut out = HashMap::with_capacity(n);
        for _ in 0..n {
            let key = self.string()?.to_string();
            let values = self.string_list()?;
            out.insert(key, values);
        }
        Ok(out)
    }

    /// Read a `[bytes map]` (used for custom payloads, which are skipped).
    pub fn bytes_map(&mut self) -> Result<(), WireError> {
        let n = self.short()? as usize;
        for _ in 0..n {
            let _ = self.string()?;
            let _ = self.bytes()?;
        }
        Ok(())
    }

    /// Read an `[inet]`: one size byte, 4 or 16 address bytes, an int port.
    pub fn inet(&mut self) -> Result<(IpAddr, i32), WireError> {
        let size = self.byte()?;
        let addr = match size {
            4 => {
                let b = self.take(4)?;
                IpAddr::from([b[0], b[1], b[2], b[3]])
            }
            16 => {
                let b = self.take(16)?;
                let mut octets = [0u8; 16];
                octets.copy_from_slice(b);
                IpAddr::from(octets)
            }
            other => return Err(WireError::InvalidInetLength(other)),
        };
        let port = self.int()?;
        Ok((addr, port))
    }

    /// Read a `[uuid]` (16 raw bytes).
    pub fn uuid(&mut self) -> Result<uuid::Uuid, WireError> {
        let b = self.take(16)?;
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(b);
        Ok(uuid::Uuid::from_bytes(bytes))
    }
}

// ============================================================================
// Writers
// ============================================================================

/// Write a single byte.
pub fn put_byte(dst: &mut BytesMut, v: u8) {
    dst.put_u8(v);
}

/// Write a `[short]`.
pub fn put_short(dst: &mut BytesMut, v: u16) {
    dst.put_u16(v);
}

/// Write an `[int]`.
pub fn put_int(dst: &mut BytesMut, v: i32) {
    dst.put_i32(v);
}

/// Write a `[long]`.
pub fn put_long(dst: &mut BytesMut, v: i64) {
    dst.put_i64(v);
}

/// Write a `[string]`.
pub fn put_string(dst: &mut BytesMut, v: &str) -> Result<(), WireError> {
    if v.len() > u16::MAX as usize {
        return Err(WireError::TooLong("string", v.len()));
    }
    dst.put_u16(v.len() as u16);
    dst.put_slice(v.as_bytes());
    Ok(())
}

/// Write a `[long string]`.
pub fn put_long_string(dst: &mut BytesMut, v: &str) -> Result<(), WireError> {
    if v.len() > i32::MAX as usize {
        return Err(WireError::TooLong("long string", v.len()));
    }
    dst.put_i32(v.len() as i32);
    dst.put_slice(v.as_bytes());
    Ok(())
}

/// Write a `[bytes]`; `None` writes the null marker.
pub fn put_bytes(dst: &mut BytesMut, v: Option<&[u8]>) -> Result<(), WireError> {
    match v {
        Some(bytes) => {
            if bytes.len() > i32::MAX as usize {
                return Err(WireError::TooLong("bytes", bytes.len()));
            }
            dst.put_i32(bytes.len() as i32);
            dst.put_slice(bytes);
        }
        None => dst.put_i32(-1),
    }
    Ok(())
}

/// Write a `[short bytes]`.
pub fn put_short_bytes(dst: &mut BytesMut, v: &[u8]) -> Result<(), WireError> {
    if v.len() > u16::MAX as usize {
        return Err(WireError::TooLong("short bytes", v.len()));
    }
    dst.put_u16(v.len() as u16);
    dst.put_slice(v);
    Ok(())
}

/// Write a `[string list]`.
pub fn put_string_list(dst: &mut BytesMut, items: &[String]) -> Result<(), WireError> {
    if items.len() > u16::MAX as usize {
        return Err(WireError::TooLong("string list", items.len()));
    }
    dst.put_u16(items.len() as u16);
    for item in items {
        put_string(dst, item)?;
    }
    Ok(())
}

/// Write a `[string map]`.
pub fn put_string_map<'a, I>(dst: &mut BytesMut, entries: I, count: usize) -> Result<(), WireError>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    if count > u16::MAX as usize {
        return Err(WireError::TooLong("string map", count));
    }
    dst.put_u16(count as u16);
    for (key, value) in entries {
        put_string(dst, key)?;
        put_string(dst, value)?;
    }
    Ok(())
}

/// Write a `[string multimap]`.
pub fn put_string_multimap(
    dst: &mut BytesMut,
    entries: &HashMap<String, Vec<String>>,
) -> Result<(), WireError> {
    if entries.len() > u16::MAX as usize {
        return Err(WireError::TooLong("string multimap", entries.len()));
    }
    dst.put_u16(entries.len() as u16);
    for (key, values) in entries {
        put_string(dst, key)?;
        put_string_list(dst, values)?;
    }
    Ok(())
}

/// Write an `[inet]`.
pub fn put_inet(dst: &mut BytesMut, addr: IpAddr, port: i32) {
    match addr {
        IpAddr::V4(v4) => {
            dst.put_u8(4);
            dst.put_slice(&v4.octets());
        }
        IpAddr::V6(v6) => {
            dst.put_u8(16);
            dst.put_slice(&v6.octets());
        }
    }
    dst.put_i32(port);
}

/// Write a `[uuid]`.
pub fn put_uuid(dst: &mut BytesMut, v: &uuid::Uuid) {
    dst.put_slice(v.as_bytes());
}
