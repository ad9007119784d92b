//! `wirebind.tests.TestService`: descriptors for the test schema and an echo
//! implementation used by the integration tests and the `echo-server` binary.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Status};
use tracing::{debug, info};
use wirebind::{
    DynamicMessage, FieldDescriptor, FieldError, FieldKind, MessageDescriptor, MethodDescriptor,
    MethodKind, ServiceDescriptor, Value,
};

use crate::error::RegistrationError;
use crate::server::{ServiceDefinition, ServiceRouter};

pub const SERVICE_NAME: &str = "wirebind.tests.TestService";

pub const TEST_FIELD_STRING: u32 = 6;
pub const TEST_FIELD_INT: u32 = 1;
pub const TEST_BYTES: u32 = 1;

pub static SIMPLE_STRING_MESSAGE: MessageDescriptor = MessageDescriptor {
    full_name: "wirebind.tests.SimpleStringMessage",
    fields: &[FieldDescriptor::singular(
        "testFieldString",
        TEST_FIELD_STRING,
        FieldKind::String,
    )],
};

pub static SIMPLE_INT_MESSAGE: MessageDescriptor = MessageDescriptor {
    full_name: "wirebind.tests.SimpleIntMessage",
    fields: &[FieldDescriptor::singular(
        "testFieldInt",
        TEST_FIELD_INT,
        FieldKind::Sint32,
    )],
};

pub static BLOB_MESSAGE: MessageDescriptor = MessageDescriptor {
    full_name: "wirebind.tests.BlobMessage",
    fields: &[FieldDescriptor::singular(
        "testBytes",
        TEST_BYTES,
        FieldKind::Bytes,
    )],
};

pub static TEST_SERVICE: ServiceDescriptor = ServiceDescriptor {
    full_name: SERVICE_NAME,
    methods: &[
        MethodDescriptor {
            service: SERVICE_NAME,
            name: "testMethod",
            input: &SIMPLE_STRING_MESSAGE,
            output: &SIMPLE_STRING_MESSAGE,
            kind: MethodKind::Unary,
        },
        MethodDescriptor {
            service: SERVICE_NAME,
            name: "testMethodServerStream",
            input: &SIMPLE_STRING_MESSAGE,
            output: &SIMPLE_STRING_MESSAGE,
            kind: MethodKind::ServerStreaming,
        },
        MethodDescriptor {
            service: SERVICE_NAME,
            name: "testMethodBlobServerStream",
            input: &BLOB_MESSAGE,
            output: &BLOB_MESSAGE,
            kind: MethodKind::ServerStreaming,
        },
        MethodDescriptor {
            service: SERVICE_NAME,
            name: "testMethodStatusMessage",
            input: &SIMPLE_STRING_MESSAGE,
            output: &SIMPLE_STRING_MESSAGE,
            kind: MethodKind::Unary,
        },
        MethodDescriptor {
            service: SERVICE_NAME,
            name: "testMethodNonCompatibleArgRet",
            input: &SIMPLE_INT_MESSAGE,
            output: &SIMPLE_STRING_MESSAGE,
            kind: MethodKind::Unary,
        },
    ],
};

/// Marker for serving [`TEST_SERVICE`] through [`crate::server::GrpcService`].
#[derive(Debug, Clone, Copy)]
pub struct TestService;

impl ServiceDefinition for TestService {
    const NAME: &'static str = SERVICE_NAME;

    fn descriptor() -> &'static ServiceDescriptor {
        &TEST_SERVICE
    }
}

pub fn string_message(text: impl Into<String>) -> Result<DynamicMessage, FieldError> {
    single_field(&SIMPLE_STRING_MESSAGE, TEST_FIELD_STRING, text.into())
}

pub fn int_message(value: i32) -> Result<DynamicMessage, FieldError> {
    single_field(&SIMPLE_INT_MESSAGE, TEST_FIELD_INT, value)
}

pub fn blob_message(blob: impl Into<Bytes>) -> Result<DynamicMessage, FieldError> {
    single_field(&BLOB_MESSAGE, TEST_BYTES, blob.into())
}

fn single_field(
    descriptor: &'static MessageDescriptor,
    number: u32,
    value: impl Into<Value>,
) -> Result<DynamicMessage, FieldError> {
    let mut message = DynamicMessage::new(descriptor);
    message.set_field(number, value)?;
    Ok(message)
}

fn internal(e: FieldError) -> Status {
    Status::internal(e.to_string())
}

/// `testFieldString` of a `SimpleStringMessage`, empty for other messages.
pub fn text_of(message: &DynamicMessage) -> String {
    message
        .get_field(TEST_FIELD_STRING)
        .and_then(|value| value.as_str().map(str::to_string))
        .unwrap_or_default()
}

const TEST_METHOD: usize = 0;
const TEST_METHOD_SERVER_STREAM: usize = 1;
const TEST_METHOD_BLOB_SERVER_STREAM: usize = 2;
const TEST_METHOD_STATUS_MESSAGE: usize = 3;
const TEST_METHOD_NON_COMPATIBLE_ARG_RET: usize = 4;

fn method(index: usize) -> &'static MethodDescriptor {
    &TEST_SERVICE.methods[index]
}

/// Echo implementation of the test service.
#[derive(Debug, Clone, Copy)]
pub struct EchoServer {
    sleep_delay: Duration,
    stream_interval: Duration,
}

impl Default for EchoServer {
    fn default() -> Self {
        Self {
            sleep_delay: Duration::from_secs(3),
            stream_interval: Duration::from_secs(1),
        }
    }
}

impl EchoServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay applied to `testMethod` when the request text is `"sleep"`.
    pub fn with_sleep_delay(mut self, delay: Duration) -> Self {
        self.sleep_delay = delay;
        self
    }

    /// Pause between the replies of `testMethodServerStream`.
    pub fn with_stream_interval(mut self, interval: Duration) -> Self {
        self.stream_interval = interval;
        self
    }

    pub fn router(self) -> Result<Arc<ServiceRouter>, RegistrationError> {
        let router = ServiceRouter::new();
        self.register(&router)?;
        Ok(Arc::new(router))
    }

    pub fn register(self, router: &ServiceRouter) -> Result<(), RegistrationError> {
        let sleep_delay = self.sleep_delay;
        router.add_unary(
            method(TEST_METHOD),
            move |request: Request<DynamicMessage>| async move {
                let text = text_of(request.get_ref());
                debug!(%text, "testMethod called");
                if text == "sleep" {
                    tokio::time::sleep(sleep_delay).await;
                }
                string_message(text).map_err(internal)
            },
        )?;

        let interval = self.stream_interval;
        router.add_server_stream(
            method(TEST_METHOD_SERVER_STREAM),
            move |request: Request<DynamicMessage>| async move {
                let text = text_of(request.get_ref());
                let (sender, receiver) = mpsc::channel::<Result<DynamicMessage, Status>>(4);
                tokio::spawn(async move {
                    for index in 1..=4 {
                        if index > 1 {
                            tokio::time::sleep(interval).await;
                        }
                        let reply = string_message(format!("{text}{index}")).map_err(internal);
                        if sender.send(reply).await.is_err() {
                            debug!(index, "Stream receiver dropped");
                            break;
                        }
                    }
                });
                Ok::<_, Status>(ReceiverStream::new(receiver))
            },
        )?;

        router.add_server_stream(
            method(TEST_METHOD_BLOB_SERVER_STREAM),
            |request: Request<DynamicMessage>| async move {
                let reply = request.into_inner();
                Ok(tokio_stream::once(Ok::<_, Status>(reply)))
            },
        )?;

        router.add_unary(
            method(TEST_METHOD_STATUS_MESSAGE),
            |request: Request<DynamicMessage>| async move {
                Err(Status::unimplemented(text_of(request.get_ref())))
            },
        )?;

        router.add_unary(
            method(TEST_METHOD_NON_COMPATIBLE_ARG_RET),
            |request: Request<DynamicMessage>| async move {
                let value = request
                    .get_ref()
                    .get_field(TEST_FIELD_INT)
                    .and_then(|value| value.as_i32())
                    .unwrap_or_default();
                string_message(value.to_string()).map_err(internal)
            },
        )?;

        info!(
            service = SERVICE_NAME,
            sleep_delay_ms = self.sleep_delay.as_millis() as u64,
            "Echo handlers registered"
        );
        Ok(())
    }
}
