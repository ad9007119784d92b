//! Dynamic client and server against code generated by tonic-build for the same
//! schema.

use std::pin::Pin;
use std::sync::Arc;

use futures_util::{Stream, StreamExt};
use super::test_utilities::*;
use test_log::test;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::{Request, Response, Status};
use wirebind_grpc::testservice::{TEST_SERVICE, int_message, string_message, text_of};
use wirebind_grpc::{Client, Http2Channel, RpcError};
use wirebind_proto::{
    BlobMessage, SimpleIntMessage, SimpleStringMessage, TestService, TestServiceClient,
    TestServiceServer,
};

type ReplyStream<T> = Pin<Box<dyn Stream<Item = Result<T, Status>> + Send + 'static>>;

#[derive(Debug, Default)]
struct GeneratedEcho;

#[tonic::async_trait]
impl TestService for GeneratedEcho {
    async fn test_method(
        &self,
        request: Request<SimpleStringMessage>,
    ) -> Result<Response<SimpleStringMessage>, Status> {
        Ok(Response::new(request.into_inner()))
    }

    type testMethodServerStreamStream = ReplyStream<SimpleStringMessage>;

    async fn test_method_server_stream(
        &self,
        request: Request<SimpleStringMessage>,
    ) -> Result<Response<Self::testMethodServerStreamStream>, Status> {
        let text = request.into_inner().test_field_string;
        let replies = (1..=4).map(move |i| {
            Ok(SimpleStringMessage {
                test_field_string: format!("{text}{i}"),
            })
        });
        Ok(Response::new(futures_util::stream::iter(replies).boxed()))
    }

    type testMethodBlobServerStreamStream = ReplyStream<BlobMessage>;

    async fn test_method_blob_server_stream(
        &self,
        request: Request<BlobMessage>,
    ) -> Result<Response<Self::testMethodBlobServerStreamStream>, Status> {
        let reply = request.into_inner();
        Ok(Response::new(futures_util::stream::iter([Ok(reply)]).boxed()))
    }

    async fn test_method_status_message(
        &self,
        request: Request<SimpleStringMessage>,
    ) -> Result<Response<SimpleStringMessage>, Status> {
        Err(Status::unimplemented(request.into_inner().test_field_string))
    }

    async fn test_method_non_compatible_arg_ret(
        &self,
        request: Request<SimpleIntMessage>,
    ) -> Result<Response<SimpleStringMessage>, Status> {
        Ok(Response::new(SimpleStringMessage {
            test_field_string: request.into_inner().test_field_int.to_string(),
        }))
    }
}

async fn start_generated_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        tonic::transport::Server::builder()
            .add_service(TestServiceServer::new(GeneratedEcho))
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await
            .unwrap();
    });
    format!("http://{addr}")
}

#[test(tokio::test)]
async fn dynamic_client_talks_to_generated_server() {
    let target = start_generated_server().await;
    let config = wirebind_grpc::ChannelConfig::new(
        target,
        wirebind_grpc::ChannelCredentials::insecure(),
    );
    let channel = Http2Channel::connect(config).await.unwrap();
    let client = Client::with_channel(&TEST_SERVICE, Arc::new(channel));

    let reply = client
        .call("testMethod", &string_message("generated").unwrap())
        .await
        .unwrap();
    assert_eq!(text_of(&reply), "generated");

    let reply = client
        .call("testMethodNonCompatibleArgRet", &int_message(-17).unwrap())
        .await
        .unwrap();
    assert_eq!(text_of(&reply), "-17");

    let replies: Vec<String> = client
        .server_stream("testMethodServerStream", &string_message("G").unwrap())
        .await
        .unwrap()
        .map(|reply| text_of(&reply.unwrap()))
        .collect()
        .await;
    assert_eq!(replies, vec!["G1", "G2", "G3", "G4"]);

    let err = client
        .call("testMethodStatusMessage", &string_message("from generated").unwrap())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        RpcError::Status {
            code: tonic::Code::Unimplemented,
            message: "from generated".to_string(),
        }
    );
}

#[test(tokio::test)]
async fn generated_client_talks_to_dynamic_server() {
    let server = TestServer::start().await.unwrap();
    let mut client = TestServiceClient::connect(server.target()).await.unwrap();

    let reply = client
        .test_method(SimpleStringMessage {
            test_field_string: "dynamic".to_string(),
        })
        .await
        .unwrap()
        .into_inner();
    assert_eq!(reply.test_field_string, "dynamic");

    let reply = client
        .test_method_non_compatible_arg_ret(SimpleIntMessage {
            test_field_int: i32::MIN,
        })
        .await
        .unwrap()
        .into_inner();
    assert_eq!(reply.test_field_string, i32::MIN.to_string());

    let mut stream = client
        .test_method_server_stream(SimpleStringMessage {
            test_field_string: "D".to_string(),
        })
        .await
        .unwrap()
        .into_inner();
    let mut texts = Vec::new();
    while let Some(reply) = stream.message().await.unwrap() {
        texts.push(reply.test_field_string);
    }
    assert_eq!(texts, vec!["D1", "D2", "D3", "D4"]);

    let status = client
        .test_method_status_message(SimpleStringMessage {
            test_field_string: "from dynamic".to_string(),
        })
        .await
        .unwrap_err();
    assert_eq!(status.code(), tonic::Code::Unimplemented);
    assert_eq!(status.message(), "from dynamic");
}
