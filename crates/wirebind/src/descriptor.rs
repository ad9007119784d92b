//! Static schema tables for messages, enums, maps and services.
//!
//! Descriptors are plain `'static` data, usually declared as `static` items so that
//! message types can refer to each other (and to themselves) by reference:
//!
//! ```
//! use wirebind::descriptor::{FieldDescriptor, FieldKind, MessageDescriptor};
//!
//! static NODE: MessageDescriptor = MessageDescriptor {
//!     full_name: "demo.Node",
//!     fields: &[
//!         FieldDescriptor::singular("label", 1, FieldKind::String),
//!         FieldDescriptor::repeated("children", 2, FieldKind::Message(&NODE)),
//!     ],
//! };
//!
//! assert_eq!(NODE.field(2).map(|f| f.name), Some("children"));
//! ```

use std::collections::HashSet;
use std::fmt;

use crate::codec::{MAX_FIELD_NUMBER, WireType};
use crate::error::DescriptorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    Singular,
    Repeated,
}

#[derive(Clone, Copy)]
pub enum FieldKind {
    Double,
    Float,
    Int32,
    Int64,
    Uint32,
    Uint64,
    Sint32,
    Sint64,
    Fixed32,
    Fixed64,
    Sfixed32,
    Sfixed64,
    Bool,
    String,
    Bytes,
    Enum(&'static EnumDescriptor),
    Message(&'static MessageDescriptor),
    Map(&'static MapDescriptor),
}

impl FieldKind {
    pub const fn wire_type(&self) -> WireType {
        match self {
            FieldKind::Int32
            | FieldKind::Int64
            | FieldKind::Uint32
            | FieldKind::Uint64
            | FieldKind::Sint32
            | FieldKind::Sint64
            | FieldKind::Bool
            | FieldKind::Enum(_) => WireType::Varint,
            FieldKind::Double | FieldKind::Fixed64 | FieldKind::Sfixed64 => WireType::Fixed64,
            FieldKind::Float | FieldKind::Fixed32 | FieldKind::Sfixed32 => WireType::Fixed32,
            FieldKind::String | FieldKind::Bytes | FieldKind::Message(_) | FieldKind::Map(_) => {
                WireType::LengthDelimited
            }
        }
    }

    /// Scalar numeric kinds may share one length-delimited record when repeated.
    pub const fn is_packable(&self) -> bool {
        !matches!(
            self,
            FieldKind::String | FieldKind::Bytes | FieldKind::Message(_) | FieldKind::Map(_)
        )
    }

    pub const fn is_valid_map_key(&self) -> bool {
        matches!(
            self,
            FieldKind::Int32
                | FieldKind::Int64
                | FieldKind::Uint32
                | FieldKind::Uint64
                | FieldKind::Sint32
                | FieldKind::Sint64
                | FieldKind::Fixed32
                | FieldKind::Fixed64
                | FieldKind::Sfixed32
                | FieldKind::Sfixed64
                | FieldKind::Bool
                | FieldKind::String
        )
    }

    pub fn type_name(&self) -> String {
        match self {
            FieldKind::Double => "double".to_string(),
            FieldKind::Float => "float".to_string(),
            FieldKind::Int32 => "int32".to_string(),
            FieldKind::Int64 => "int64".to_string(),
            FieldKind::Uint32 => "uint32".to_string(),
            FieldKind::Uint64 => "uint64".to_string(),
            FieldKind::Sint32 => "sint32".to_string(),
            FieldKind::Sint64 => "sint64".to_string(),
            FieldKind::Fixed32 => "fixed32".to_string(),
            FieldKind::Fixed64 => "fixed64".to_string(),
            FieldKind::Sfixed32 => "sfixed32".to_string(),
            FieldKind::Sfixed64 => "sfixed64".to_string(),
            FieldKind::Bool => "bool".to_string(),
            FieldKind::String => "string".to_string(),
            FieldKind::Bytes => "bytes".to_string(),
            FieldKind::Enum(e) => format!("enum {}", e.full_name),
            FieldKind::Message(m) => format!("message {}", m.full_name),
            FieldKind::Map(map) => {
                format!("map<{}, {}>", map.key.type_name(), map.value.type_name())
            }
        }
    }
}

// Message kinds print by name only; descriptor graphs may be cyclic.
impl fmt::Debug for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.type_name())
    }
}

impl PartialEq for FieldKind {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FieldKind::Enum(a), FieldKind::Enum(b)) => a.full_name == b.full_name,
            (FieldKind::Message(a), FieldKind::Message(b)) => a.full_name == b.full_name,
            (FieldKind::Map(a), FieldKind::Map(b)) => a.key == b.key && a.value == b.value,
            _ => std::mem::discriminant(self) == std::mem::discriminant(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub number: u32,
    pub kind: FieldKind,
    pub cardinality: Cardinality,
    pub packed: bool,
}

impl FieldDescriptor {
    pub const fn singular(name: &'static str, number: u32, kind: FieldKind) -> Self {
        Self {
            name,
            number,
            kind,
            cardinality: Cardinality::Singular,
            packed: false,
        }
    }

    /// Repeated field; packable kinds are packed, as in proto3.
    pub const fn repeated(name: &'static str, number: u32, kind: FieldKind) -> Self {
        Self {
            name,
            number,
            kind,
            cardinality: Cardinality::Repeated,
            packed: kind.is_packable(),
        }
    }

    pub const fn map(name: &'static str, number: u32, entry: &'static MapDescriptor) -> Self {
        Self {
            name,
            number,
            kind: FieldKind::Map(entry),
            cardinality: Cardinality::Repeated,
            packed: false,
        }
    }

    /// Writes one record per element. Decoding accepts both forms either way.
    pub const fn unpacked(self) -> Self {
        Self {
            packed: false,
            ..self
        }
    }

    pub fn is_repeated(&self) -> bool {
        self.cardinality == Cardinality::Repeated
    }

    pub fn is_map(&self) -> bool {
        matches!(self.kind, FieldKind::Map(_))
    }

    /// lowerCamelCase form used as the JSON key: underscores are dropped and the
    /// letter after each one is upper-cased.
    pub fn json_name(&self) -> String {
        let mut name = String::with_capacity(self.name.len());
        let mut upper = false;
        for c in self.name.chars() {
            if c == '_' {
                upper = true;
            } else if upper {
                name.push(c.to_ascii_uppercase());
                upper = false;
            } else {
                name.push(c);
            }
        }
        name
    }

    pub fn type_description(&self) -> String {
        match (self.cardinality, self.kind) {
            (_, FieldKind::Map(_)) | (Cardinality::Singular, _) => self.kind.type_name(),
            (Cardinality::Repeated, kind) => format!("repeated {}", kind.type_name()),
        }
    }
}

pub struct MessageDescriptor {
    pub full_name: &'static str,
    pub fields: &'static [FieldDescriptor],
}

impl MessageDescriptor {
    pub fn field(&self, number: u32) -> Option<&'static FieldDescriptor> {
        self.fields.iter().find(|field| field.number == number)
    }

    pub fn field_by_name(&self, name: &str) -> Option<&'static FieldDescriptor> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Matches the JSON key first, then the declared name.
    pub fn field_by_json_name(&self, name: &str) -> Option<&'static FieldDescriptor> {
        self.fields
            .iter()
            .find(|field| field.json_name() == name)
            .or_else(|| self.field_by_name(name))
    }

    pub fn validate(&self) -> Result<(), DescriptorError> {
        let mut numbers = HashSet::new();
        let mut names = HashSet::new();

        for field in self.fields {
            if field.number == 0 || field.number > MAX_FIELD_NUMBER {
                return Err(DescriptorError::InvalidNumber {
                    message: self.full_name,
                    field: field.name,
                    number: field.number,
                });
            }
            if !numbers.insert(field.number) {
                return Err(DescriptorError::DuplicateNumber {
                    message: self.full_name,
                    number: field.number,
                });
            }
            if !names.insert(field.name) {
                return Err(DescriptorError::DuplicateName {
                    message: self.full_name,
                    name: field.name,
                });
            }
            if let FieldKind::Map(entry) = field.kind
                && (!entry.key.is_valid_map_key() || matches!(entry.value, FieldKind::Map(_)))
            {
                return Err(DescriptorError::InvalidMapKey {
                    message: self.full_name,
                    field: field.name,
                });
            }
        }
        Ok(())
    }
}

impl fmt::Debug for MessageDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageDescriptor")
            .field("full_name", &self.full_name)
            .field("fields", &self.fields)
            .finish()
    }
}

impl PartialEq for MessageDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.full_name == other.full_name
    }
}

#[derive(Debug)]
pub struct EnumDescriptor {
    pub full_name: &'static str,
    pub values: &'static [(&'static str, i32)],
}

impl EnumDescriptor {
    pub fn name_of(&self, number: i32) -> Option<&'static str> {
        self.values
            .iter()
            .find(|(_, value)| *value == number)
            .map(|(name, _)| *name)
    }

    pub fn number_of(&self, name: &str) -> Option<i32> {
        self.values
            .iter()
            .find(|(candidate, _)| *candidate == name)
            .map(|(_, value)| *value)
    }
}

/// Key and value kinds of a map field's entry message (key = 1, value = 2).
#[derive(Debug)]
pub struct MapDescriptor {
    pub key: FieldKind,
    pub value: FieldKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    Unary,
    ServerStreaming,
    ClientStreaming,
    BidiStreaming,
}

#[derive(Debug)]
pub struct MethodDescriptor {
    /// Fully qualified service name, e.g. `wirebind.tests.TestService`.
    pub service: &'static str,
    pub name: &'static str,
    pub input: &'static MessageDescriptor,
    pub output: &'static MessageDescriptor,
    pub kind: MethodKind,
}

impl MethodDescriptor {
    pub fn path(&self) -> String {
        format!("/{}/{}", self.service, self.name)
    }
}

#[derive(Debug)]
pub struct ServiceDescriptor {
    pub full_name: &'static str,
    pub methods: &'static [MethodDescriptor],
}

impl ServiceDescriptor {
    pub fn method(&self, name: &str) -> Option<&'static MethodDescriptor> {
        self.methods.iter().find(|method| method.name == name)
    }

    pub fn owns(&self, method: &MethodDescriptor) -> bool {
        method.service == self.full_name
            && self.method(method.name).is_some_and(|own| {
                own.input == method.input && own.output == method.output && own.kind == method.kind
            })
    }
}
