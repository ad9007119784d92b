use std::collections::BTreeMap;

use bytes::Bytes;

use crate::descriptor::{Cardinality, FieldDescriptor, FieldKind};
use crate::message::DynamicMessage;

/// A field value held by a [`DynamicMessage`].
///
/// Nested messages are owned, so assigning a message into a field copies it.
/// Floats compare by bit pattern, so a NaN equals an identical NaN and `0.0`
/// differs from `-0.0`.
#[derive(Debug, Clone)]
pub enum Value {
    Bool(bool),
    I32(i32),
    I64(i64),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    String(String),
    Bytes(Bytes),
    Enum(i32),
    Message(DynamicMessage),
    List(Vec<Value>),
    Map(BTreeMap<MapKey, Value>),
}

/// Map keys, ordered so that map entries encode deterministically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MapKey {
    Bool(bool),
    I32(i32),
    I64(i64),
    U32(u32),
    U64(u64),
    String(String),
}

impl Value {
    /// Zero value of a field: empty list or map for repeated fields, otherwise the
    /// kind's zero.
    pub fn default_for(field: &FieldDescriptor) -> Value {
        match (field.cardinality, field.kind) {
            (_, FieldKind::Map(_)) => Value::Map(BTreeMap::new()),
            (Cardinality::Repeated, _) => Value::List(Vec::new()),
            (Cardinality::Singular, kind) => Value::default_for_kind(kind),
        }
    }

    pub fn default_for_kind(kind: FieldKind) -> Value {
        match kind {
            FieldKind::Double => Value::F64(0.0),
            FieldKind::Float => Value::F32(0.0),
            FieldKind::Int32 | FieldKind::Sint32 | FieldKind::Sfixed32 => Value::I32(0),
            FieldKind::Int64 | FieldKind::Sint64 | FieldKind::Sfixed64 => Value::I64(0),
            FieldKind::Uint32 | FieldKind::Fixed32 => Value::U32(0),
            FieldKind::Uint64 | FieldKind::Fixed64 => Value::U64(0),
            FieldKind::Bool => Value::Bool(false),
            FieldKind::String => Value::String(String::new()),
            FieldKind::Bytes => Value::Bytes(Bytes::new()),
            FieldKind::Enum(_) => Value::Enum(0),
            FieldKind::Message(descriptor) => Value::Message(DynamicMessage::new(descriptor)),
            FieldKind::Map(_) => Value::Map(BTreeMap::new()),
        }
    }

    /// True for values the encoder omits. Nested messages never count as
    /// default; negative zero floats are written.
    pub fn is_default(&self) -> bool {
        match self {
            Value::Bool(v) => !v,
            Value::I32(v) | Value::Enum(v) => *v == 0,
            Value::I64(v) => *v == 0,
            Value::U32(v) => *v == 0,
            Value::U64(v) => *v == 0,
            Value::F32(v) => v.to_bits() == 0,
            Value::F64(v) => v.to_bits() == 0,
            Value::String(v) => v.is_empty(),
            Value::Bytes(v) => v.is_empty(),
            Value::Message(_) => false,
            Value::List(items) => items.is_empty(),
            Value::Map(entries) => entries.is_empty(),
        }
    }

    /// Checks the value against a field's kind and cardinality.
    pub fn matches(&self, field: &FieldDescriptor) -> bool {
        match (field.cardinality, field.kind, self) {
            (_, FieldKind::Map(entry), Value::Map(entries)) => entries.iter().all(|(key, value)| {
                key.matches_kind(entry.key) && value.matches_kind(entry.value)
            }),
            (_, FieldKind::Map(_), _) => false,
            (Cardinality::Repeated, kind, Value::List(items)) => {
                items.iter().all(|item| item.matches_kind(kind))
            }
            (Cardinality::Repeated, _, _) => false,
            (Cardinality::Singular, kind, value) => value.matches_kind(kind),
        }
    }

    pub fn matches_kind(&self, kind: FieldKind) -> bool {
        match (kind, self) {
            (FieldKind::Double, Value::F64(_))
            | (FieldKind::Float, Value::F32(_))
            | (FieldKind::Int32 | FieldKind::Sint32 | FieldKind::Sfixed32, Value::I32(_))
            | (FieldKind::Int64 | FieldKind::Sint64 | FieldKind::Sfixed64, Value::I64(_))
            | (FieldKind::Uint32 | FieldKind::Fixed32, Value::U32(_))
            | (FieldKind::Uint64 | FieldKind::Fixed64, Value::U64(_))
            | (FieldKind::Bool, Value::Bool(_))
            | (FieldKind::String, Value::String(_))
            | (FieldKind::Bytes, Value::Bytes(_))
            | (FieldKind::Enum(_), Value::Enum(_)) => true,
            (FieldKind::Message(descriptor), Value::Message(message)) => {
                message.descriptor().full_name == descriptor.full_name
            }
            // maps only appear at field level, never as a list item or map value
            _ => false,
        }
    }

    pub fn type_name(&self) -> String {
        match self {
            Value::Bool(_) => "bool".to_string(),
            Value::I32(_) => "i32".to_string(),
            Value::I64(_) => "i64".to_string(),
            Value::U32(_) => "u32".to_string(),
            Value::U64(_) => "u64".to_string(),
            Value::F32(_) => "f32".to_string(),
            Value::F64(_) => "f64".to_string(),
            Value::String(_) => "string".to_string(),
            Value::Bytes(_) => "bytes".to_string(),
            Value::Enum(_) => "enum".to_string(),
            Value::Message(message) => format!("message {}", message.descriptor().full_name),
            Value::List(_) => "list".to_string(),
            Value::Map(_) => "map".to_string(),
        }
    }

    pub fn list<T: Into<Value>>(items: impl IntoIterator<Item = T>) -> Value {
        Value::List(items.into_iter().map(Into::into).collect())
    }

    pub fn map<K: Into<MapKey>, V: Into<Value>>(entries: impl IntoIterator<Item = (K, V)>) -> Value {
        Value::Map(
            entries
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::I32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::I64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Value::U32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::U64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Value::F32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::F64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Value::Bytes(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_enum(&self) -> Option<i32> {
        match self {
            Value::Enum(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_message(&self) -> Option<&DynamicMessage> {
        match self {
            Value::Message(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<MapKey, Value>> {
        match self {
            Value::Map(v) => Some(v),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::I32(a), Value::I32(b)) | (Value::Enum(a), Value::Enum(b)) => a == b,
            (Value::I64(a), Value::I64(b)) => a == b,
            (Value::U32(a), Value::U32(b)) => a == b,
            (Value::U64(a), Value::U64(b)) => a == b,
            (Value::F32(a), Value::F32(b)) => a.to_bits() == b.to_bits(),
            (Value::F64(a), Value::F64(b)) => a.to_bits() == b.to_bits(),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Message(a), Value::Message(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl MapKey {
    pub fn matches_kind(&self, kind: FieldKind) -> bool {
        Value::from(self.clone()).matches_kind(kind)
    }

    /// Converts a decoded key value; `None` for kinds that cannot key a map.
    pub fn from_value(value: Value) -> Option<MapKey> {
        match value {
            Value::Bool(v) => Some(MapKey::Bool(v)),
            Value::I32(v) => Some(MapKey::I32(v)),
            Value::I64(v) => Some(MapKey::I64(v)),
            Value::U32(v) => Some(MapKey::U32(v)),
            Value::U64(v) => Some(MapKey::U64(v)),
            Value::String(v) => Some(MapKey::String(v)),
            _ => None,
        }
    }
}

impl From<MapKey> for Value {
    fn from(key: MapKey) -> Self {
        match key {
            MapKey::Bool(v) => Value::Bool(v),
            MapKey::I32(v) => Value::I32(v),
            MapKey::I64(v) => Value::I64(v),
            MapKey::U32(v) => Value::U32(v),
            MapKey::U64(v) => Value::U64(v),
            MapKey::String(v) => Value::String(v),
        }
    }
}

macro_rules! impl_from {
    ($target:ident: $($source:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$source> for $target {
                fn from(value: $source) -> Self {
                    $target::$variant(value.into())
                }
            }
        )*
    };
}

impl_from!(Value:
    bool => Bool,
    i32 => I32,
    i64 => I64,
    u32 => U32,
    u64 => U64,
    f32 => F32,
    f64 => F64,
    String => String,
    &str => String,
    Bytes => Bytes,
    Vec<u8> => Bytes,
    &'static [u8] => Bytes,
    DynamicMessage => Message,
    Vec<Value> => List,
    BTreeMap<MapKey, Value> => Map,
);

impl_from!(MapKey:
    bool => Bool,
    i32 => I32,
    i64 => I64,
    u32 => U32,
    u64 => U64,
    String => String,
    &str => String,
);
