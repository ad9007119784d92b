//! Protobuf wire primitives: varints, zig-zag, field keys and length-delimited payloads.
//!
//! Encoding writes into any [`BufMut`]. Decoding goes through [`WireReader`], a cursor
//! over a borrowed buffer that reports absolute offsets in its errors, including
//! for readers nested inside length-delimited payloads.

use std::fmt;

use bytes::BufMut;

use crate::error::DecodeError;

/// A 64-bit varint occupies at most ten bytes.
pub const MAX_VARINT_LEN: usize = 10;

/// Largest field number the key encoding can carry.
pub const MAX_FIELD_NUMBER: u32 = (1 << 29) - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireType {
    Varint = 0,
    Fixed64 = 1,
    LengthDelimited = 2,
    Fixed32 = 5,
}

impl WireType {
    /// Wire types 3 and 4 (groups) are deprecated and rejected along with 6 and 7.
    pub fn from_raw(raw: u64) -> Option<Self> {
        match raw {
            0 => Some(WireType::Varint),
            1 => Some(WireType::Fixed64),
            2 => Some(WireType::LengthDelimited),
            5 => Some(WireType::Fixed32),
            _ => None,
        }
    }
}

impl fmt::Display for WireType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WireType::Varint => "varint",
            WireType::Fixed64 => "fixed64",
            WireType::LengthDelimited => "length-delimited",
            WireType::Fixed32 => "fixed32",
        };
        f.write_str(name)
    }
}

/// A field payload as it appears on the wire, before interpretation by a field kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawValue<'a> {
    Varint(u64),
    Fixed32(u32),
    Fixed64(u64),
    LengthDelimited(&'a [u8]),
}

impl RawValue<'_> {
    pub fn wire_type(&self) -> WireType {
        match self {
            RawValue::Varint(_) => WireType::Varint,
            RawValue::Fixed32(_) => WireType::Fixed32,
            RawValue::Fixed64(_) => WireType::Fixed64,
            RawValue::LengthDelimited(_) => WireType::LengthDelimited,
        }
    }
}

pub fn encode_varint(mut value: u64, buf: &mut impl BufMut) {
    while value >= 0x80 {
        buf.put_u8((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    buf.put_u8(value as u8);
}

pub fn encoded_len_varint(value: u64) -> usize {
    // Every 7 significant bits cost one byte; zero still takes one.
    let bits = 64 - (value | 1).leading_zeros() as usize;
    bits.div_ceil(7)
}

pub fn encode_key(number: u32, wire_type: WireType, buf: &mut impl BufMut) {
    debug_assert!((1..=MAX_FIELD_NUMBER).contains(&number));
    encode_varint((u64::from(number) << 3) | wire_type as u64, buf);
}

pub fn encode_length_delimited(payload: &[u8], buf: &mut impl BufMut) {
    encode_varint(payload.len() as u64, buf);
    buf.put_slice(payload);
}

/// Encodes one complete field: key followed by the payload in its wire form.
pub fn encode_raw(number: u32, value: &RawValue<'_>, buf: &mut impl BufMut) {
    encode_key(number, value.wire_type(), buf);
    match value {
        RawValue::Varint(v) => encode_varint(*v, buf),
        RawValue::Fixed32(v) => buf.put_u32_le(*v),
        RawValue::Fixed64(v) => buf.put_u64_le(*v),
        RawValue::LengthDelimited(payload) => encode_length_delimited(payload, buf),
    }
}

pub fn zigzag_encode32(value: i32) -> u32 {
    ((value << 1) ^ (value >> 31)) as u32
}

pub fn zigzag_decode32(value: u32) -> i32 {
    ((value >> 1) as i32) ^ -((value & 1) as i32)
}

pub fn zigzag_encode64(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

pub fn zigzag_decode64(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

/// Decodes a varint at the start of `buf`, returning the value and the bytes consumed.
pub fn decode_varint(buf: &[u8]) -> Result<(u64, usize), DecodeError> {
    let mut reader = WireReader::new(buf);
    let value = reader.read_varint()?;
    Ok((value, reader.consumed()))
}

/// Cursor over protobuf wire bytes.
#[derive(Debug, Clone)]
pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
    base: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            base: 0,
        }
    }

    /// Absolute offset of the cursor within the outermost buffer.
    pub fn position(&self) -> usize {
        self.base + self.pos
    }

    /// Bytes consumed from this reader's own buffer.
    pub fn consumed(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    pub fn read_varint(&mut self) -> Result<u64, DecodeError> {
        let start = self.position();
        let mut value = 0u64;
        for index in 0..MAX_VARINT_LEN {
            let Some(&byte) = self.buf.get(self.pos) else {
                return Err(DecodeError::truncated(self.position(), 1, 0));
            };
            self.pos += 1;
            // The tenth byte may only contribute the single remaining bit.
            if index == MAX_VARINT_LEN - 1 && byte > 1 {
                return Err(DecodeError::MalformedVarint { offset: start });
            }
            value |= u64::from(byte & 0x7f) << (7 * index);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(DecodeError::MalformedVarint { offset: start })
    }

    pub fn read_key(&mut self) -> Result<(u32, WireType), DecodeError> {
        let offset = self.position();
        let key = self.read_varint()?;
        if key > u64::from(u32::MAX) {
            return Err(DecodeError::invalid_key(offset, format!("key {key} overflows 32 bits")));
        }
        let number = (key >> 3) as u32;
        if number == 0 {
            return Err(DecodeError::invalid_key(offset, "field number 0"));
        }
        if number > MAX_FIELD_NUMBER {
            return Err(DecodeError::invalid_key(
                offset,
                format!("field number {number} exceeds {MAX_FIELD_NUMBER}"),
            ));
        }
        let wire_type = WireType::from_raw(key & 0x07).ok_or_else(|| {
            DecodeError::invalid_key(offset, format!("unsupported wire type {}", key & 0x07))
        })?;
        Ok((number, wire_type))
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        let remaining = self.remaining();
        if len > remaining {
            return Err(DecodeError::truncated(self.position(), len, remaining));
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn read_fixed32(&mut self) -> Result<u32, DecodeError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_fixed64(&mut self) -> Result<u64, DecodeError> {
        let bytes = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(raw))
    }

    pub fn read_length_delimited(&mut self) -> Result<&'a [u8], DecodeError> {
        let len = self.read_varint()?;
        let len = usize::try_from(len)
            .map_err(|_| DecodeError::truncated(self.position(), usize::MAX, self.remaining()))?;
        self.take(len)
    }

    /// Reads a length-delimited payload and returns a reader positioned over it.
    pub fn read_nested(&mut self) -> Result<WireReader<'a>, DecodeError> {
        let len = self.read_varint()?;
        let len = usize::try_from(len)
            .map_err(|_| DecodeError::truncated(self.position(), usize::MAX, self.remaining()))?;
        let base = self.position();
        let buf = self.take(len)?;
        Ok(WireReader { buf, pos: 0, base })
    }

    pub fn read_raw(&mut self, wire_type: WireType) -> Result<RawValue<'a>, DecodeError> {
        match wire_type {
            WireType::Varint => self.read_varint().map(RawValue::Varint),
            WireType::Fixed32 => self.read_fixed32().map(RawValue::Fixed32),
            WireType::Fixed64 => self.read_fixed64().map(RawValue::Fixed64),
            WireType::LengthDelimited => self.read_length_delimited().map(RawValue::LengthDelimited),
        }
    }

    /// Skips a payload using its wire type's length rule and returns the bytes skipped.
    pub fn skip(&mut self, wire_type: WireType) -> Result<usize, DecodeError> {
        let start = self.pos;
        self.read_raw(wire_type)?;
        Ok(self.pos - start)
    }
}
