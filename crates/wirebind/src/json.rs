//! JSON form of dynamic messages.
//!
//! Keys are the lowerCamelCase field names; the declared names are accepted on
//! input too. 64-bit integers are written as strings and accepted as strings or
//! numbers. Bytes use standard base64 (padding optional on input), enums their
//! value names, and non-finite floats the strings `"NaN"`, `"Infinity"` and
//! `"-Infinity"`. Every explicitly set field is written, including zero values;
//! unset fields are left out, and `null` on input leaves a field unset.

use std::collections::BTreeMap;
use std::str::FromStr;

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use bytes::Bytes;
use log::trace;
use serde::ser::{Error as _, SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use serde_json::Value as Json;

use crate::descriptor::{Cardinality, FieldDescriptor, FieldKind, MessageDescriptor};
use crate::error::JsonError;
use crate::message::DynamicMessage;
use crate::value::{MapKey, Value};

const BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

impl DynamicMessage {
    pub fn to_json(&self) -> Result<String, JsonError> {
        serde_json::to_string(&JsonMessage(self))
            .map_err(|e| JsonError::from_serde_error(e, self.descriptor().full_name))
    }

    pub fn to_json_pretty(&self) -> Result<String, JsonError> {
        serde_json::to_string_pretty(&JsonMessage(self))
            .map_err(|e| JsonError::from_serde_error(e, self.descriptor().full_name))
    }

    pub fn from_json(descriptor: &'static MessageDescriptor, text: &str) -> Result<Self, JsonError> {
        let json: Json = serde_json::from_str(text)
            .map_err(|e| JsonError::from_serde_error(e, descriptor.full_name))?;
        Self::from_json_value(descriptor, &json)
    }

    pub fn from_json_value(
        descriptor: &'static MessageDescriptor,
        json: &Json,
    ) -> Result<Self, JsonError> {
        let Json::Object(object) = json else {
            return Err(JsonError::InvalidValue {
                message: descriptor.full_name,
                field: "<message>",
                expected: "object".to_string(),
                found: json_type(json).to_string(),
            });
        };

        let mut message = DynamicMessage::new(descriptor);
        for (key, value) in object {
            let field = descriptor
                .field_by_json_name(key)
                .ok_or_else(|| JsonError::UnknownField {
                    message: descriptor.full_name,
                    field: key.clone(),
                })?;
            if value.is_null() {
                trace!("Left {}.{} unset for null", descriptor.full_name, field.name);
                continue;
            }
            let parsed = parse_field(descriptor, field, value)?;
            message.set_field(field.number, parsed)?;
        }
        Ok(message)
    }
}

struct JsonMessage<'a>(&'a DynamicMessage);

impl Serialize for JsonMessage<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let message = self.0;
        let descriptor = message.descriptor();
        let set: Vec<_> = descriptor
            .fields
            .iter()
            .filter_map(|field| message.field(field.number).map(|value| (field, value)))
            .collect();

        let mut map = serializer.serialize_map(Some(set.len()))?;
        for (field, value) in set {
            map.serialize_entry(&field.json_name(), &JsonValue { kind: field.kind, value })?;
        }
        map.end()
    }
}

struct JsonValue<'a> {
    kind: FieldKind,
    value: &'a Value,
}

impl Serialize for JsonValue<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.value {
            Value::Bool(v) => serializer.serialize_bool(*v),
            Value::I32(v) => serializer.serialize_i32(*v),
            Value::U32(v) => serializer.serialize_u32(*v),
            Value::I64(v) => serializer.collect_str(v),
            Value::U64(v) => serializer.collect_str(v),
            Value::F32(v) if v.is_finite() => serializer.serialize_f32(*v),
            Value::F64(v) if v.is_finite() => serializer.serialize_f64(*v),
            Value::F32(v) => serializer.serialize_str(non_finite(f64::from(*v))),
            Value::F64(v) => serializer.serialize_str(non_finite(*v)),
            Value::String(v) => serializer.serialize_str(v),
            Value::Bytes(v) => serializer.serialize_str(&BASE64.encode(v)),
            Value::Enum(number) => match self.kind {
                FieldKind::Enum(descriptor) => match descriptor.name_of(*number) {
                    Some(name) => serializer.serialize_str(name),
                    None => serializer.serialize_i32(*number),
                },
                _ => serializer.serialize_i32(*number),
            },
            Value::Message(message) => JsonMessage(message).serialize(serializer),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(&JsonValue {
                        kind: self.kind,
                        value: item,
                    })?;
                }
                seq.end()
            }
            Value::Map(entries) => {
                let FieldKind::Map(entry) = self.kind else {
                    return Err(S::Error::custom(format!(
                        "map value stored for {} field",
                        self.kind.type_name()
                    )));
                };
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    map.serialize_entry(
                        &map_key_string(key),
                        &JsonValue {
                            kind: entry.value,
                            value,
                        },
                    )?;
                }
                map.end()
            }
        }
    }
}

fn non_finite(v: f64) -> &'static str {
    if v.is_nan() {
        "NaN"
    } else if v.is_sign_positive() {
        "Infinity"
    } else {
        "-Infinity"
    }
}

fn map_key_string(key: &MapKey) -> String {
    match key {
        MapKey::Bool(v) => v.to_string(),
        MapKey::I32(v) => v.to_string(),
        MapKey::I64(v) => v.to_string(),
        MapKey::U32(v) => v.to_string(),
        MapKey::U64(v) => v.to_string(),
        MapKey::String(v) => v.clone(),
    }
}

fn parse_field(
    descriptor: &'static MessageDescriptor,
    field: &'static FieldDescriptor,
    json: &Json,
) -> Result<Value, JsonError> {
    let parser = FieldParser { descriptor, field };
    match (field.cardinality, field.kind) {
        (_, FieldKind::Map(entry)) => {
            let Json::Object(object) = json else {
                return Err(parser.invalid("object", json));
            };
            let mut entries = BTreeMap::new();
            for (key, value) in object {
                let key = parser.map_key(entry.key, key)?;
                entries.insert(key, parser.single(entry.value, value)?);
            }
            Ok(Value::Map(entries))
        }
        (Cardinality::Repeated, kind) => {
            let Json::Array(items) = json else {
                return Err(parser.invalid("array", json));
            };
            items
                .iter()
                .map(|item| parser.single(kind, item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List)
        }
        (Cardinality::Singular, kind) => parser.single(kind, json),
    }
}

struct FieldParser {
    descriptor: &'static MessageDescriptor,
    field: &'static FieldDescriptor,
}

impl FieldParser {
    fn single(&self, kind: FieldKind, json: &Json) -> Result<Value, JsonError> {
        let value = match kind {
            FieldKind::Double => float(json).map(Value::F64),
            FieldKind::Float => float(json).map(|v| Value::F32(v as f32)),
            FieldKind::Int32 | FieldKind::Sint32 | FieldKind::Sfixed32 => {
                integer(json).map(Value::I32)
            }
            FieldKind::Int64 | FieldKind::Sint64 | FieldKind::Sfixed64 => {
                integer(json).map(Value::I64)
            }
            FieldKind::Uint32 | FieldKind::Fixed32 => integer(json).map(Value::U32),
            FieldKind::Uint64 | FieldKind::Fixed64 => integer(json).map(Value::U64),
            FieldKind::Bool => json.as_bool().map(Value::Bool),
            FieldKind::String => json.as_str().map(|v| Value::String(v.to_string())),
            FieldKind::Bytes => json
                .as_str()
                .and_then(|v| BASE64.decode(v).ok())
                .map(|v| Value::Bytes(Bytes::from(v))),
            FieldKind::Enum(descriptor) => match json {
                Json::String(name) => descriptor.number_of(name).map(Value::Enum),
                _ => integer(json).map(Value::Enum),
            },
            FieldKind::Message(descriptor) => {
                return DynamicMessage::from_json_value(descriptor, json).map(Value::Message);
            }
            FieldKind::Map(_) => None,
        };
        value.ok_or_else(|| self.invalid(&kind.type_name(), json))
    }

    fn map_key(&self, kind: FieldKind, key: &str) -> Result<MapKey, JsonError> {
        let json = Json::String(key.to_string());
        let parsed = match kind {
            FieldKind::Bool => match key {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },
            FieldKind::String => Some(Value::String(key.to_string())),
            kind => self.single(kind, &json).ok(),
        };
        parsed
            .and_then(MapKey::from_value)
            .ok_or_else(|| self.invalid(&format!("{} map key", kind.type_name()), &json))
    }

    fn invalid(&self, expected: &str, found: &Json) -> JsonError {
        JsonError::InvalidValue {
            message: self.descriptor.full_name,
            field: self.field.name,
            expected: expected.to_string(),
            found: match found {
                Json::Object(_) | Json::Array(_) => json_type(found).to_string(),
                other => other.to_string(),
            },
        }
    }
}

fn integer<T>(json: &Json) -> Option<T>
where
    T: TryFrom<i64> + TryFrom<u64> + FromStr,
{
    match json {
        Json::Number(number) => number
            .as_i64()
            .and_then(|v| <T as TryFrom<i64>>::try_from(v).ok())
            .or_else(|| {
                number
                    .as_u64()
                    .and_then(|v| <T as TryFrom<u64>>::try_from(v).ok())
            }),
        Json::String(text) => text.parse().ok(),
        _ => None,
    }
}

fn float(json: &Json) -> Option<f64> {
    match json {
        Json::Number(number) => number.as_f64(),
        Json::String(text) => match text.as_str() {
            "NaN" => Some(f64::NAN),
            "Infinity" => Some(f64::INFINITY),
            "-Infinity" => Some(f64::NEG_INFINITY),
            text => text.parse().ok(),
        },
        _ => None,
    }
}

fn json_type(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "bool",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}
