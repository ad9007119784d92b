use super::test_utilities::*;
use test_log::test;
use wirebind::DynamicMessage;
use wirebind_grpc::testservice::{
    SIMPLE_STRING_MESSAGE, TEST_SERVICE, int_message, string_message, text_of,
};
use wirebind_grpc::{Code, RpcError};

#[test(tokio::test)]
async fn unary_echo_returns_request_text() {
    let server = TestServer::start().await.unwrap();
    let client = server.client().await;

    let reply = client
        .call("testMethod", &string_message("Hello beach!").unwrap())
        .await
        .unwrap();
    assert_eq!(text_of(&reply), "Hello beach!");
    assert_eq!(reply.descriptor(), &SIMPLE_STRING_MESSAGE);

    server.stop().await;
}

#[test(tokio::test)]
async fn empty_request_echoes_empty_reply() {
    let server = TestServer::start().await.unwrap();
    let client = server.client().await;

    let reply = client
        .call("testMethod", &DynamicMessage::new(&SIMPLE_STRING_MESSAGE))
        .await
        .unwrap();
    assert_eq!(text_of(&reply), "");
    assert!(reply.serialize().is_empty());
}

#[test(tokio::test)]
async fn call_into_fills_existing_reply() {
    let server = TestServer::start().await.unwrap();
    let client = server.client().await;

    let mut reply = string_message("stale").unwrap();
    client
        .call_into("testMethod", &string_message("fresh").unwrap(), &mut reply)
        .await
        .unwrap();
    assert_eq!(text_of(&reply), "fresh");
}

#[test(tokio::test)]
async fn status_message_is_surfaced() {
    let server = TestServer::start().await.unwrap();
    let client = server.client().await;
    let mut errors = client.errors();

    let err = client
        .call("testMethodStatusMessage", &string_message("Some status message").unwrap())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        RpcError::Status {
            code: Code::Unimplemented,
            message: "Some status message".to_string(),
        }
    );
    assert_eq!(errors.recv().await.unwrap(), err);
}

#[test(tokio::test)]
async fn different_argument_and_return_types() {
    let server = TestServer::start().await.unwrap();
    let client = server.client().await;

    let reply = client
        .call("testMethodNonCompatibleArgRet", &int_message(2048).unwrap())
        .await
        .unwrap();
    assert_eq!(text_of(&reply), "2048");

    let err = client
        .call("testMethodNonCompatibleArgRet", &string_message("2048").unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::TypeMismatch { .. }));
}

#[test(tokio::test)]
async fn unknown_path_is_unimplemented() {
    static MISSING: wirebind::ServiceDescriptor = wirebind::ServiceDescriptor {
        full_name: "wirebind.tests.TestService",
        methods: &[wirebind::MethodDescriptor {
            service: "wirebind.tests.TestService",
            name: "testMethodMissing",
            input: &SIMPLE_STRING_MESSAGE,
            output: &SIMPLE_STRING_MESSAGE,
            kind: wirebind::MethodKind::Unary,
        }],
    };

    let server = TestServer::start().await.unwrap();
    let channel = wirebind_grpc::Http2Channel::connect(server.config())
        .await
        .unwrap();
    let client = wirebind_grpc::Client::with_channel(&MISSING, std::sync::Arc::new(channel));

    let err = client
        .call("testMethodMissing", &string_message("x").unwrap())
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::Unimplemented);
}

#[test(tokio::test)]
async fn unreachable_server_is_a_transport_error() {
    let port = find_available_port().unwrap();
    let config = wirebind_grpc::ChannelConfig::new(
        format!("http://127.0.0.1:{port}"),
        wirebind_grpc::ChannelCredentials::insecure(),
    )
    .with_timeout(std::time::Duration::from_millis(500));
    let channel = wirebind_grpc::Http2Channel::new(config).unwrap();
    let client = wirebind_grpc::Client::with_channel(&TEST_SERVICE, std::sync::Arc::new(channel));

    let err = client
        .call("testMethod", &string_message("anyone?").unwrap())
        .await
        .unwrap_err();
    assert!(err.is_transport(), "unexpected error: {err:?}");
}

#[test(tokio::test)]
async fn echo_server_binary_serves_the_test_service() {
    let server = EchoServerProcess::start().await.unwrap();
    let channel = wirebind_grpc::Http2Channel::connect(server.config())
        .await
        .unwrap();
    let client = wirebind_grpc::Client::with_channel(&TEST_SERVICE, std::sync::Arc::new(channel));

    let reply = client
        .call("testMethod", &string_message("over the wire").unwrap())
        .await
        .unwrap();
    assert_eq!(text_of(&reply), "over the wire");
}
