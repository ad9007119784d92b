use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use log::{debug, trace};

use crate::codec::{
    WireReader, WireType, encode_key, encode_length_delimited, encode_varint, zigzag_decode32,
    zigzag_decode64, zigzag_encode32, zigzag_encode64,
};
use crate::descriptor::{Cardinality, FieldDescriptor, FieldKind, MessageDescriptor};
use crate::error::{DecodeError, FieldError};
use crate::value::{MapKey, Value};

/// Deepest message nesting the decoder will follow.
pub const RECURSION_LIMIT: usize = 100;

/// A message instance whose layout is given by a [`MessageDescriptor`] at runtime.
///
/// Only explicitly set fields are stored. Reads of unset fields yield the field's
/// zero value, and two messages compare equal when every field's effective value
/// does, so an unset field equals one explicitly set to zero.
#[derive(Clone)]
pub struct DynamicMessage {
    descriptor: &'static MessageDescriptor,
    fields: BTreeMap<u32, Value>,
}

impl DynamicMessage {
    pub fn new(descriptor: &'static MessageDescriptor) -> Self {
        Self {
            descriptor,
            fields: BTreeMap::new(),
        }
    }

    pub fn descriptor(&self) -> &'static MessageDescriptor {
        self.descriptor
    }

    pub fn set_field(&mut self, number: u32, value: impl Into<Value>) -> Result<(), FieldError> {
        let field = self.known_field(number)?;
        self.store(field, value.into())
    }

    pub fn set_field_by_name(&mut self, name: &str, value: impl Into<Value>) -> Result<(), FieldError> {
        let field = self
            .descriptor
            .field_by_name(name)
            .ok_or_else(|| FieldError::UnknownField {
                message: self.descriptor.full_name,
                field: name.to_string(),
            })?;
        self.store(field, value.into())
    }

    /// Effective value of a field: the stored value, or the zero value when unset.
    /// `None` only for numbers the descriptor does not define.
    pub fn get_field(&self, number: u32) -> Option<Cow<'_, Value>> {
        let field = self.descriptor.field(number)?;
        Some(self.effective(field))
    }

    pub fn get_field_by_name(&self, name: &str) -> Option<Cow<'_, Value>> {
        let field = self.descriptor.field_by_name(name)?;
        Some(self.effective(field))
    }

    /// The explicitly stored value, if any.
    pub fn field(&self, number: u32) -> Option<&Value> {
        self.fields.get(&number)
    }

    /// True when the field would be written by [`serialize`](Self::serialize).
    pub fn has_field(&self, number: u32) -> bool {
        self.fields.get(&number).is_some_and(|value| !value.is_default())
    }

    pub fn clear_field(&mut self, number: u32) -> Option<Value> {
        self.fields.remove(&number)
    }

    pub fn clear(&mut self) {
        self.fields.clear();
    }

    /// Merges `other` into `self`: scalars are overwritten, lists and maps extended,
    /// singular messages merged recursively.
    pub fn merge_from_message(&mut self, other: &DynamicMessage) -> Result<(), FieldError> {
        if other.descriptor != self.descriptor {
            return Err(FieldError::TypeMismatch {
                message: self.descriptor.full_name,
                field: "<message>",
                expected: self.descriptor.full_name.to_string(),
                found: other.descriptor.full_name.to_string(),
            });
        }
        self.absorb_all(other.clone());
        Ok(())
    }

    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        buf.freeze()
    }

    /// Writes set fields in ascending field-number order.
    pub fn encode(&self, buf: &mut impl BufMut) {
        for (number, value) in &self.fields {
            if let Some(field) = self.descriptor.field(*number) {
                encode_field(field, value, buf);
            }
        }
    }

    pub fn decode(descriptor: &'static MessageDescriptor, bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut message = Self::new(descriptor);
        let mut reader = WireReader::new(bytes);
        message.merge_from(&mut reader, RECURSION_LIMIT)?;
        Ok(message)
    }

    /// Replaces the contents with the decoded `bytes`. On error the message is left
    /// untouched.
    pub fn deserialize(&mut self, bytes: &[u8]) -> Result<(), DecodeError> {
        *self = Self::decode(self.descriptor, bytes)?;
        Ok(())
    }

    /// Merges decoded `bytes` into the current contents. On error the message is
    /// left untouched.
    pub fn merge(&mut self, bytes: &[u8]) -> Result<(), DecodeError> {
        let decoded = Self::decode(self.descriptor, bytes)?;
        self.absorb_all(decoded);
        Ok(())
    }

    fn known_field(&self, number: u32) -> Result<&'static FieldDescriptor, FieldError> {
        self.descriptor
            .field(number)
            .ok_or_else(|| FieldError::UnknownField {
                message: self.descriptor.full_name,
                field: number.to_string(),
            })
    }

    fn store(&mut self, field: &'static FieldDescriptor, value: Value) -> Result<(), FieldError> {
        if !value.matches(field) {
            return Err(FieldError::TypeMismatch {
                message: self.descriptor.full_name,
                field: field.name,
                expected: field.type_description(),
                found: value.type_name(),
            });
        }
        self.fields.insert(field.number, value);
        Ok(())
    }

    fn effective(&self, field: &FieldDescriptor) -> Cow<'_, Value> {
        match self.fields.get(&field.number) {
            Some(value) => Cow::Borrowed(value),
            None => Cow::Owned(Value::default_for(field)),
        }
    }

    fn merge_from(&mut self, reader: &mut WireReader<'_>, depth: usize) -> Result<(), DecodeError> {
        if depth == 0 {
            return Err(DecodeError::RecursionLimitExceeded {
                limit: RECURSION_LIMIT,
            });
        }
        let message = self.descriptor.full_name;

        while !reader.is_empty() {
            let (number, wire_type) = reader.read_key()?;
            let Some(field) = self.descriptor.field(number) else {
                let skipped = reader.skip(wire_type)?;
                trace!("Skipped unknown field {number} ({wire_type}, {skipped} bytes) in {message}");
                continue;
            };
            if let FieldKind::Map(entry) = field.kind
                && matches!(entry.value, FieldKind::Map(_))
            {
                reader.skip(wire_type)?;
                debug!("Skipped {message}.{}: map values cannot themselves be maps", field.name);
                continue;
            }

            let value = if field.cardinality == Cardinality::Repeated
                && field.kind.is_packable()
                && wire_type == WireType::LengthDelimited
            {
                let mut packed = reader.read_nested()?;
                let mut items = Vec::new();
                while !packed.is_empty() {
                    items.push(read_value(
                        message,
                        field,
                        field.kind,
                        field.kind.wire_type(),
                        &mut packed,
                        depth,
                    )?);
                }
                Value::List(items)
            } else {
                let value = read_value(message, field, field.kind, wire_type, reader, depth)?;
                match (field.cardinality, field.kind) {
                    (Cardinality::Repeated, FieldKind::Map(_)) | (Cardinality::Singular, _) => value,
                    (Cardinality::Repeated, _) => Value::List(vec![value]),
                }
            };
            self.absorb(number, value);
        }
        Ok(())
    }

    fn absorb_all(&mut self, other: DynamicMessage) {
        for (number, value) in other.fields {
            self.absorb(number, value);
        }
    }

    fn absorb(&mut self, number: u32, incoming: Value) {
        let unmerged = match (self.fields.get_mut(&number), incoming) {
            (Some(Value::Message(existing)), Value::Message(message)) => {
                existing.absorb_all(message);
                None
            }
            (Some(Value::List(existing)), Value::List(items)) => {
                existing.extend(items);
                None
            }
            (Some(Value::Map(existing)), Value::Map(entries)) => {
                existing.extend(entries);
                None
            }
            (_, incoming) => Some(incoming),
        };
        if let Some(value) = unmerged {
            self.fields.insert(number, value);
        }
    }
}

fn encode_field(field: &FieldDescriptor, value: &Value, buf: &mut impl BufMut) {
    match (field.kind, value) {
        (FieldKind::Map(entry), Value::Map(entries)) => {
            for (key, value) in entries {
                let mut record = BytesMut::new();
                encode_single(1, entry.key, &Value::from(key.clone()), &mut record);
                encode_single(2, entry.value, value, &mut record);
                encode_key(field.number, WireType::LengthDelimited, buf);
                encode_length_delimited(&record, buf);
            }
        }
        (kind, Value::List(items)) if field.packed => {
            if items.is_empty() {
                return;
            }
            let mut packed = BytesMut::new();
            for item in items {
                encode_payload(kind, item, &mut packed);
            }
            encode_key(field.number, WireType::LengthDelimited, buf);
            encode_length_delimited(&packed, buf);
        }
        (kind, Value::List(items)) => {
            for item in items {
                encode_single(field.number, kind, item, buf);
            }
        }
        (kind, value) => {
            if !value.is_default() {
                encode_single(field.number, kind, value, buf);
            }
        }
    }
}

fn encode_single(number: u32, kind: FieldKind, value: &Value, buf: &mut impl BufMut) {
    encode_key(number, kind.wire_type(), buf);
    encode_payload(kind, value, buf);
}

fn encode_payload(kind: FieldKind, value: &Value, buf: &mut impl BufMut) {
    match (kind, value) {
        // negative int32 and enum values are sign-extended to ten bytes
        (FieldKind::Int32, Value::I32(v)) | (FieldKind::Enum(_), Value::Enum(v)) => {
            encode_varint(i64::from(*v) as u64, buf)
        }
        (FieldKind::Int64, Value::I64(v)) => encode_varint(*v as u64, buf),
        (FieldKind::Uint32, Value::U32(v)) => encode_varint(u64::from(*v), buf),
        (FieldKind::Uint64, Value::U64(v)) => encode_varint(*v, buf),
        (FieldKind::Sint32, Value::I32(v)) => encode_varint(u64::from(zigzag_encode32(*v)), buf),
        (FieldKind::Sint64, Value::I64(v)) => encode_varint(zigzag_encode64(*v), buf),
        (FieldKind::Bool, Value::Bool(v)) => encode_varint(u64::from(*v), buf),
        (FieldKind::Fixed32, Value::U32(v)) => buf.put_u32_le(*v),
        (FieldKind::Sfixed32, Value::I32(v)) => buf.put_i32_le(*v),
        (FieldKind::Float, Value::F32(v)) => buf.put_f32_le(*v),
        (FieldKind::Fixed64, Value::U64(v)) => buf.put_u64_le(*v),
        (FieldKind::Sfixed64, Value::I64(v)) => buf.put_i64_le(*v),
        (FieldKind::Double, Value::F64(v)) => buf.put_f64_le(*v),
        (FieldKind::String, Value::String(v)) => encode_length_delimited(v.as_bytes(), buf),
        (FieldKind::Bytes, Value::Bytes(v)) => encode_length_delimited(v, buf),
        (FieldKind::Message(_), Value::Message(message)) => {
            let mut nested = BytesMut::new();
            message.encode(&mut nested);
            encode_length_delimited(&nested, buf);
        }
        (kind, value) => unreachable!(
            "stored {} does not match field kind {}",
            value.type_name(),
            kind.type_name()
        ),
    }
}

fn read_value(
    message: &'static str,
    field: &'static FieldDescriptor,
    kind: FieldKind,
    wire_type: WireType,
    reader: &mut WireReader<'_>,
    depth: usize,
) -> Result<Value, DecodeError> {
    let expected = kind.wire_type();
    if wire_type != expected {
        return Err(DecodeError::UnexpectedWireType {
            message,
            field: field.name,
            expected,
            found: wire_type,
        });
    }

    let value = match kind {
        FieldKind::Int32 => Value::I32(reader.read_varint()? as i32),
        FieldKind::Int64 => Value::I64(reader.read_varint()? as i64),
        FieldKind::Uint32 => Value::U32(reader.read_varint()? as u32),
        FieldKind::Uint64 => Value::U64(reader.read_varint()?),
        FieldKind::Sint32 => Value::I32(zigzag_decode32(reader.read_varint()? as u32)),
        FieldKind::Sint64 => Value::I64(zigzag_decode64(reader.read_varint()?)),
        FieldKind::Bool => Value::Bool(reader.read_varint()? != 0),
        FieldKind::Enum(_) => Value::Enum(reader.read_varint()? as i32),
        FieldKind::Fixed32 => Value::U32(reader.read_fixed32()?),
        FieldKind::Sfixed32 => Value::I32(reader.read_fixed32()? as i32),
        FieldKind::Float => Value::F32(f32::from_bits(reader.read_fixed32()?)),
        FieldKind::Fixed64 => Value::U64(reader.read_fixed64()?),
        FieldKind::Sfixed64 => Value::I64(reader.read_fixed64()? as i64),
        FieldKind::Double => Value::F64(f64::from_bits(reader.read_fixed64()?)),
        FieldKind::String => {
            let bytes = reader.read_length_delimited()?;
            let text = std::str::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8 {
                message,
                field: field.name,
            })?;
            Value::String(text.to_owned())
        }
        FieldKind::Bytes => Value::Bytes(Bytes::copy_from_slice(reader.read_length_delimited()?)),
        FieldKind::Message(descriptor) => {
            let mut nested = reader.read_nested()?;
            let mut inner = DynamicMessage::new(descriptor);
            inner.merge_from(&mut nested, depth - 1)?;
            Value::Message(inner)
        }
        FieldKind::Map(entry) => {
            let mut record = reader.read_nested()?;
            let mut key = Value::default_for_kind(entry.key);
            let mut value = Value::default_for_kind(entry.value);
            while !record.is_empty() {
                let (number, wire_type) = record.read_key()?;
                match number {
                    1 => key = read_value(message, field, entry.key, wire_type, &mut record, depth)?,
                    2 => {
                        value = read_value(message, field, entry.value, wire_type, &mut record, depth)?
                    }
                    _ => {
                        record.skip(wire_type)?;
                    }
                }
            }
            let mut entries = BTreeMap::new();
            match MapKey::from_value(key) {
                Some(key) => {
                    entries.insert(key, value);
                }
                None => debug!("Dropped map entry with unusable key type in {message}.{}", field.name),
            }
            Value::Map(entries)
        }
    };
    Ok(value)
}

impl PartialEq for DynamicMessage {
    fn eq(&self, other: &Self) -> bool {
        self.descriptor == other.descriptor
            && self
                .descriptor
                .fields
                .iter()
                .all(|field| self.effective(field) == other.effective(field))
    }
}

impl fmt::Debug for DynamicMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct(self.descriptor.full_name);
        for (number, value) in &self.fields {
            let name = self.descriptor.field(*number).map_or("?", |field| field.name);
            out.field(name, value);
        }
        out.finish()
    }
}
