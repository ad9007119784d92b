use std::sync::Arc;
use std::thread;

use super::test_utilities::*;
use test_log::test;
use wirebind_grpc::testservice::{TEST_SERVICE, string_message, text_of};
use wirebind_grpc::{BlockingClient, RpcError};

fn server_runtime() -> (tokio::runtime::Runtime, TestServer) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let server = runtime.block_on(TestServer::start()).unwrap();
    (runtime, server)
}

#[test]
fn blocking_unary_call() {
    let (_runtime, server) = server_runtime();
    let client = BlockingClient::new(&TEST_SERVICE, server.config()).unwrap();

    let reply = client.call("testMethod", &string_message("sync").unwrap()).unwrap();
    assert_eq!(text_of(&reply), "sync");

    let mut into = string_message("old").unwrap();
    client
        .call_into("testMethod", &string_message("new").unwrap(), &mut into)
        .unwrap();
    assert_eq!(text_of(&into), "new");
}

#[test]
fn blocking_server_stream_collects_replies() {
    let (_runtime, server) = server_runtime();
    let client = BlockingClient::new(&TEST_SERVICE, server.config()).unwrap();

    let replies = client
        .server_stream("testMethodServerStream", &string_message("Sync").unwrap())
        .unwrap();
    let texts: Vec<String> = replies.iter().map(text_of).collect();
    assert_eq!(texts, vec!["Sync1", "Sync2", "Sync3", "Sync4"]);
}

#[test]
fn blocking_errors_match_async_errors() {
    let (_runtime, server) = server_runtime();
    let client = BlockingClient::new(&TEST_SERVICE, server.config()).unwrap();

    let err = client
        .call("testMethodStatusMessage", &string_message("nope").unwrap())
        .unwrap_err();
    assert!(matches!(err, RpcError::Status { .. }));

    let err = client.call("noSuchMethod", &string_message("x").unwrap()).unwrap_err();
    assert!(matches!(err, RpcError::UnknownMethod { .. }));
}

#[test]
fn blocking_calls_from_many_threads() {
    let (_runtime, server) = server_runtime();
    let client = Arc::new(BlockingClient::new(&TEST_SERVICE, server.config()).unwrap());

    let workers: Vec<_> = (0..8)
        .map(|i| {
            let client = Arc::clone(&client);
            thread::spawn(move || {
                let reply = client
                    .call("testMethod", &string_message(format!("thread-{i}")).unwrap())
                    .unwrap();
                text_of(&reply)
            })
        })
        .collect();

    for (i, worker) in workers.into_iter().enumerate() {
        assert_eq!(worker.join().unwrap(), format!("thread-{i}"));
    }
}
