//! Backpressure across the whole call path.

mod helpers;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::SinkExt;
use helpers::*;
use nagare::config::TransportSettings;
use nagare::{
    CallOptions, ResponseSink, Streaming, bidi_streaming_call, bidi_streaming_method_definition,
    server_streaming_call, server_streaming_method_definition,
};

const SETTLE: Duration = Duration::from_millis(100);

#[tokio::test]
async fn slow_client_holds_back_server_sends() {
    let sent = Arc::new(AtomicUsize::new(0));
    let sent_by_server = Arc::clone(&sent);
    let definition = server_streaming_method_definition(
        &context_with(1, 1),
        &count_up(),
        move |_call, n: u32, responses: ResponseSink<u32>| {
            let sent = Arc::clone(&sent_by_server);
            async move {
                for i in 0..n {
                    responses.send(i).await?;
                    sent.fetch_add(1, Ordering::SeqCst);
                }
                Ok(())
            }
        },
    )
    .unwrap();
    let harness = serve_with(vec![definition], TransportSettings { window: 0 });

    let mut responses = server_streaming_call(
        &harness.channel,
        &count_up(),
        100,
        CallOptions::default().with_response_buffer_size(1),
    )
    .unwrap();

    // The first response fills the client's single slot; the second send
    // stays pending for as long as nobody reads.
    eventually(|| sent.load(Ordering::SeqCst) == 1).await;
    tokio::time::sleep(SETTLE).await;
    assert_eq!(sent.load(Ordering::SeqCst), 1, "server ran ahead of the client");

    assert_eq!(within(responses.message()).await.unwrap(), Some(0));
    eventually(|| sent.load(Ordering::SeqCst) == 2).await;
    tokio::time::sleep(SETTLE).await;
    assert_eq!(
        sent.load(Ordering::SeqCst),
        2,
        "one pull released more than one send"
    );

    let mut expected = 1;
    while let Some(n) = within(responses.message()).await.unwrap() {
        assert_eq!(n, expected);
        expected += 1;
    }
    assert_eq!(expected, 100);
    assert_eq!(sent.load(Ordering::SeqCst), 100);
}

/// Each request is answered twice; with every buffer at capacity 1 the
/// client's request producer stalls until the client reads responses.
#[tokio::test]
async fn unread_responses_stall_the_request_producer() {
    let sent = Arc::new(AtomicUsize::new(0));
    let sent_by_server = Arc::clone(&sent);
    let definition = bidi_streaming_method_definition(
        &context_with(1, 1),
        &echo(),
        move |_call, mut requests: Streaming<String>, responses: ResponseSink<String>| {
            let sent = Arc::clone(&sent_by_server);
            async move {
                while let Some(line) = requests.message().await? {
                    responses.send(format!("{line} once")).await?;
                    sent.fetch_add(1, Ordering::SeqCst);
                    responses.send(format!("{line} twice")).await?;
                    sent.fetch_add(1, Ordering::SeqCst);
                }
                Ok(())
            }
        },
    )
    .unwrap();
    let harness = serve_with(vec![definition], TransportSettings { window: 0 });

    let (mut tx, rx) = futures::channel::mpsc::channel::<String>(0);
    let mut responses = bidi_streaming_call(
        &harness.channel,
        &echo(),
        rx,
        CallOptions::default().with_response_buffer_size(1),
    )
    .unwrap();

    let accepted = Arc::new(AtomicUsize::new(0));
    let accepted_by_producer = Arc::clone(&accepted);
    let producer = tokio::spawn(async move {
        for i in 0..50 {
            if tx.send(format!("r{i}")).await.is_err() {
                return;
            }
            accepted_by_producer.fetch_add(1, Ordering::SeqCst);
        }
    });

    eventually(|| sent.load(Ordering::SeqCst) == 1).await;
    tokio::time::sleep(SETTLE).await;
    assert_eq!(sent.load(Ordering::SeqCst), 1, "server ran ahead of the client");
    assert!(!producer.is_finished(), "producer should be held back");
    let stalled_at = accepted.load(Ordering::SeqCst);
    assert!(stalled_at < 50);

    tokio::time::sleep(SETTLE).await;
    assert_eq!(
        accepted.load(Ordering::SeqCst),
        stalled_at,
        "producer advanced without the client reading"
    );

    // One pull lets "r0 twice" through, so the implementation reads the next
    // request and frees room for the producer.
    assert_eq!(
        within(responses.message()).await.unwrap().as_deref(),
        Some("r0 once")
    );
    eventually(|| accepted.load(Ordering::SeqCst) > stalled_at).await;
    assert_eq!(sent.load(Ordering::SeqCst), 2);

    assert_eq!(
        within(responses.message()).await.unwrap().as_deref(),
        Some("r0 twice")
    );
    for i in 1..50 {
        assert_eq!(
            within(responses.message()).await.unwrap(),
            Some(format!("r{i} once"))
        );
        assert_eq!(
            within(responses.message()).await.unwrap(),
            Some(format!("r{i} twice"))
        );
    }
    within(producer).await.unwrap();
    assert_eq!(within(responses.message()).await.unwrap(), None);
}
