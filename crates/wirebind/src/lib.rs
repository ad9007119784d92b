//! Runtime protobuf messages: a wire codec, static descriptors, dynamically typed
//! message instances with a JSON form, and an observable list model.

pub mod codec;
pub mod descriptor;
pub mod error;
pub mod json;
pub mod message;
pub mod model;
pub mod telemetry;
pub mod value;

pub use descriptor::{
    Cardinality, EnumDescriptor, FieldDescriptor, FieldKind, MapDescriptor, MessageDescriptor,
    MethodDescriptor, MethodKind, ServiceDescriptor,
};
pub use error::{DecodeError, DescriptorError, FieldError, JsonError};
pub use message::DynamicMessage;
pub use model::{ListModel, ListenerId, ModelChange};
pub use value::{MapKey, Value};

// Re-export logging macros for consistent usage across the crate
pub use log::{debug, error, info, trace, warn};
