use std::sync::Arc;

use super::test_utilities::*;
use test_log::test;
use tonic::{Request, Status};
use wirebind::DynamicMessage;
use wirebind_grpc::credentials::{USER_NAME_KEY, USER_PASSWORD_KEY};
use wirebind_grpc::testservice::{TEST_SERVICE, TestService, string_message, text_of};
use wirebind_grpc::{CallCredentials, Code, ServiceRouter};

fn metadata_value(request: &Request<DynamicMessage>, key: &str) -> Option<String> {
    request
        .metadata()
        .get(key)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

/// `testMethod` answers with the caller's user name and rejects bad passwords.
async fn authenticating_server() -> TestServer {
    let router = ServiceRouter::new();
    router
        .add_unary(&TEST_SERVICE.methods[0], |request: Request<DynamicMessage>| async move {
            if metadata_value(&request, USER_PASSWORD_KEY).as_deref() != Some("secret") {
                return Err(Status::unauthenticated("bad password"));
            }
            let user = metadata_value(&request, USER_NAME_KEY).unwrap_or_default();
            Ok(string_message(user).unwrap())
        })
        .unwrap();
    TestServer::start_with::<TestService>(Arc::new(router))
        .await
        .unwrap()
}

#[test(tokio::test)]
async fn call_credentials_reach_the_server() {
    let server = authenticating_server().await;
    let client = server
        .client_with_credentials(CallCredentials::user_password("qtprotobuf", "secret"))
        .await;

    let reply = client
        .call("testMethod", &string_message("who am i").unwrap())
        .await
        .unwrap();
    assert_eq!(text_of(&reply), "qtprotobuf");
}

#[test(tokio::test)]
async fn wrong_credentials_are_rejected() {
    let server = authenticating_server().await;
    let client = server
        .client_with_credentials(CallCredentials::user_password("qtprotobuf", "wrong"))
        .await;

    let err = client
        .call("testMethod", &string_message("who am i").unwrap())
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::Unauthenticated);
    assert!(!err.is_transport());
}

#[test(tokio::test)]
async fn missing_handler_is_unimplemented() {
    let server = authenticating_server().await;
    let client = server.client().await;

    let err = client
        .call("testMethodStatusMessage", &string_message("x").unwrap())
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::Unimplemented);
}
