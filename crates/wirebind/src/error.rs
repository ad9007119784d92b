//! Error types for wire decoding, JSON conversion, field access and descriptor
//! validation.

use std::fmt;

use crate::codec::WireType;

/// Failure while decoding protobuf wire bytes.
///
/// Offsets are absolute positions in the outermost buffer handed to the decoder.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// No terminating byte within the 10 bytes a 64-bit varint may occupy.
    MalformedVarint {
        offset: usize,
    },
    /// Fewer bytes remain than the field declares.
    TruncatedPayload {
        offset: usize,
        needed: usize,
        remaining: usize,
    },
    /// Field key with number 0, a number above the protobuf maximum, or an
    /// unsupported wire type.
    InvalidKey {
        offset: usize,
        reason: String,
    },
    UnexpectedWireType {
        message: &'static str,
        field: &'static str,
        expected: WireType,
        found: WireType,
    },
    InvalidUtf8 {
        message: &'static str,
        field: &'static str,
    },
    RecursionLimitExceeded {
        limit: usize,
    },
}

/// Failure while reading or writing a field of a dynamic message.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldError {
    UnknownField {
        message: &'static str,
        field: String,
    },
    TypeMismatch {
        message: &'static str,
        field: &'static str,
        expected: String,
        found: String,
    },
}

/// Failure while converting a message to or from its JSON form.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonError {
    /// Malformed JSON text, or a serializer failure.
    Syntax {
        context: String,
        reason: String,
    },
    UnknownField {
        message: &'static str,
        field: String,
    },
    InvalidValue {
        message: &'static str,
        field: &'static str,
        expected: String,
        found: String,
    },
    Field(FieldError),
}

/// Inconsistent descriptor table.
#[derive(Debug, Clone, PartialEq)]
pub enum DescriptorError {
    DuplicateNumber {
        message: &'static str,
        number: u32,
    },
    DuplicateName {
        message: &'static str,
        name: &'static str,
    },
    InvalidNumber {
        message: &'static str,
        field: &'static str,
        number: u32,
    },
    InvalidMapKey {
        message: &'static str,
        field: &'static str,
    },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::MalformedVarint { offset } => {
                write!(f, "Malformed varint at offset {offset}")
            }
            DecodeError::TruncatedPayload {
                offset,
                needed,
                remaining,
            } => write!(
                f,
                "Truncated payload at offset {offset}: needed {needed} bytes, {remaining} remaining"
            ),
            DecodeError::InvalidKey { offset, reason } => {
                write!(f, "Invalid field key at offset {offset}: {reason}")
            }
            DecodeError::UnexpectedWireType {
                message,
                field,
                expected,
                found,
            } => write!(
                f,
                "Unexpected wire type for {message}.{field}: expected {expected}, found {found}"
            ),
            DecodeError::InvalidUtf8 { message, field } => {
                write!(f, "Invalid UTF-8 in string field {message}.{field}")
            }
            DecodeError::RecursionLimitExceeded { limit } => {
                write!(f, "Message nesting exceeds recursion limit of {limit}")
            }
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldError::UnknownField { message, field } => {
                write!(f, "Message '{message}' has no field '{field}'")
            }
            FieldError::TypeMismatch {
                message,
                field,
                expected,
                found,
            } => write!(
                f,
                "Type mismatch for {message}.{field}: expected {expected}, got {found}"
            ),
        }
    }
}

impl fmt::Display for JsonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JsonError::Syntax { context, reason } => write!(f, "Invalid JSON in {context}: {reason}"),
            JsonError::UnknownField { message, field } => {
                write!(f, "Message '{message}' has no JSON field '{field}'")
            }
            JsonError::InvalidValue {
                message,
                field,
                expected,
                found,
            } => write!(
                f,
                "Invalid JSON value for {message}.{field}: expected {expected}, got {found}"
            ),
            JsonError::Field(e) => write!(f, "{e}"),
        }
    }
}

impl fmt::Display for DescriptorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DescriptorError::DuplicateNumber { message, number } => {
                write!(f, "Field number {number} is used twice in '{message}'")
            }
            DescriptorError::DuplicateName { message, name } => {
                write!(f, "Field name '{name}' is used twice in '{message}'")
            }
            DescriptorError::InvalidNumber {
                message,
                field,
                number,
            } => write!(f, "Field {message}.{field} has invalid number {number}"),
            DescriptorError::InvalidMapKey { message, field } => {
                write!(f, "Map field {message}.{field} has a key type that cannot be a map key")
            }
        }
    }
}

impl std::error::Error for DecodeError {}
impl std::error::Error for FieldError {}
impl std::error::Error for JsonError {}
impl std::error::Error for DescriptorError {}

impl DecodeError {
    pub fn is_truncation(&self) -> bool {
        matches!(self, DecodeError::TruncatedPayload { .. })
    }

    pub fn is_malformed_varint(&self) -> bool {
        matches!(self, DecodeError::MalformedVarint { .. })
    }

    pub(crate) fn truncated(offset: usize, needed: usize, remaining: usize) -> Self {
        DecodeError::TruncatedPayload {
            offset,
            needed,
            remaining,
        }
    }

    pub(crate) fn invalid_key(offset: usize, reason: impl Into<String>) -> Self {
        DecodeError::InvalidKey {
            offset,
            reason: reason.into(),
        }
    }
}

impl JsonError {
    pub fn is_syntax(&self) -> bool {
        matches!(self, JsonError::Syntax { .. })
    }

    pub fn from_serde_error(e: serde_json::Error, context: &str) -> Self {
        JsonError::Syntax {
            context: context.to_string(),
            reason: e.to_string(),
        }
    }
}

impl From<FieldError> for JsonError {
    fn from(e: FieldError) -> Self {
        JsonError::Field(e)
    }
}
