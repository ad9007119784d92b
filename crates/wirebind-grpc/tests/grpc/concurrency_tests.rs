use std::time::{Duration, Instant};

use super::test_utilities::*;
use test_log::test;
use wirebind_grpc::testservice::{string_message, text_of};

#[test(tokio::test)]
async fn slow_call_does_not_block_fast_call() {
    let server = TestServer::start().await.unwrap();
    let client = server.client().await;

    let started = Instant::now();
    let slow = client.call_async("testMethod", &string_message("sleep").unwrap());
    tokio::time::sleep(Duration::from_millis(100)).await;

    let fast = client
        .call("testMethod", &string_message("Hello beach!").unwrap())
        .await
        .unwrap();
    let fast_elapsed = started.elapsed();
    assert_eq!(text_of(&fast), "Hello beach!");
    assert!(
        fast_elapsed < SLEEP_DELAY,
        "fast call waited {fast_elapsed:?} behind the slow one"
    );

    let slow = slow.await.unwrap();
    assert_eq!(text_of(&slow), "sleep");
    assert!(started.elapsed() >= SLEEP_DELAY);
}

#[test(tokio::test)]
async fn concurrent_calls_get_their_own_replies() {
    let server = TestServer::start().await.unwrap();
    let client = server.client().await;

    let handles: Vec<_> = (0..32)
        .map(|i| client.call_async("testMethod", &string_message(format!("request-{i}")).unwrap()))
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let reply = handle.await.unwrap();
        assert_eq!(text_of(&reply), format!("request-{i}"));
    }
}

#[test(tokio::test)]
async fn clients_share_one_channel() {
    let server = TestServer::start().await.unwrap();
    let first = server.client().await;
    let channel = first.channel().unwrap();
    let second = wirebind_grpc::Client::with_channel(first.service(), channel);

    let msg_a = string_message("a").unwrap();
    let msg_b = string_message("b").unwrap();
    let (a, b) = tokio::join!(
        first.call("testMethod", &msg_a),
        second.call("testMethod", &msg_b),
    );
    assert_eq!(text_of(&a.unwrap()), "a");
    assert_eq!(text_of(&b.unwrap()), "b");
}
