use std::time::Duration;

use futures_util::StreamExt;
use super::test_utilities::*;
use test_log::test;
use wirebind_grpc::RpcError;
use wirebind_grpc::testservice::{TEST_BYTES, blob_message, string_message, text_of};

#[test(tokio::test)]
async fn server_stream_delivers_replies_in_order() {
    let server = TestServer::start().await.unwrap();
    let client = server.client().await;

    let replies: Vec<String> = client
        .server_stream("testMethodServerStream", &string_message("Stream").unwrap())
        .await
        .unwrap()
        .map(|reply| text_of(&reply.unwrap()))
        .collect()
        .await;
    assert_eq!(replies, vec!["Stream1", "Stream2", "Stream3", "Stream4"]);
}

#[test(tokio::test)]
async fn blob_stream_echoes_large_payload() {
    let server = TestServer::start().await.unwrap();
    let client = server.client().await;
    let blob: Vec<u8> = (0..2 * 1024 * 1024).map(|i| (i % 251) as u8).collect();

    let mut replies = client
        .server_stream("testMethodBlobServerStream", &blob_message(blob.clone()).unwrap())
        .await
        .unwrap();
    let reply = replies.next().await.unwrap().unwrap();
    assert_eq!(
        reply.get_field(TEST_BYTES).unwrap().as_bytes().map(|b| b.to_vec()),
        Some(blob)
    );
    assert!(replies.next().await.is_none());
}

#[test(tokio::test)]
async fn cancelled_subscription_stops_delivering() {
    let server = TestServer::start().await.unwrap();
    let client = server.client().await;

    let mut replies = client
        .server_stream("testMethodServerStream", &string_message("Stream").unwrap())
        .await
        .unwrap();
    let first = replies.next().await.unwrap().unwrap();
    assert_eq!(text_of(&first), "Stream1");

    replies.cancel();
    assert!(replies.next().await.is_none());
    tokio::time::sleep(STREAM_INTERVAL * 2).await;
    assert!(replies.next().await.is_none());
}

#[test(tokio::test)]
async fn unary_method_cannot_be_streamed() {
    let server = TestServer::start().await.unwrap();
    let client = server.client().await;

    let err = client
        .server_stream("testMethod", &string_message("x").unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::Unsupported { .. }));

    let err = client
        .call("testMethodServerStream", &string_message("x").unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::Unsupported { .. }));
}

#[test(tokio::test)]
async fn stream_survives_beyond_call_deadline() {
    let server = TestServer::start().await.unwrap();
    let client = server
        .client_with(server.config().with_timeout(Duration::from_millis(80)))
        .await;

    let replies: Vec<_> = client
        .server_stream("testMethodServerStream", &string_message("Slow").unwrap())
        .await
        .unwrap()
        .collect()
        .await;
    assert_eq!(replies.len(), 4);
    assert!(replies.iter().all(Result::is_ok));
}
