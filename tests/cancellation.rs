//! Cancellation in both directions and transport shutdown.

mod helpers;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use helpers::*;
use nagare::{
    CallOptions, Code, ResponseSink, Streaming, bidi_streaming_call,
    bidi_streaming_method_definition, server_streaming_call, server_streaming_method_definition,
    unary_call, unary_method_definition,
};

/// A counter that streams forever and reports when it is torn down.
fn endless_counter() -> (Harness, tokio::sync::oneshot::Receiver<()>) {
    let (signal, dropped) = DropSignal::new();
    let definition = server_streaming_method_definition(
        &context(),
        &count_up(),
        move |_call, _n: u32, responses: ResponseSink<u32>| {
            let guard = signal.guard();
            async move {
                let _guard = guard;
                let mut i = 0;
                loop {
                    responses.send(i).await?;
                    i += 1;
                }
            }
        },
    )
    .unwrap();
    (serve(vec![definition]), dropped)
}

#[tokio::test]
async fn dropping_responses_cancels_the_server_implementation() {
    let (harness, dropped) = endless_counter();

    let mut responses =
        server_streaming_call(&harness.channel, &count_up(), 0, CallOptions::default()).unwrap();
    assert_eq!(within(responses.message()).await.unwrap(), Some(0));
    assert_eq!(within(responses.message()).await.unwrap(), Some(1));
    drop(responses);

    within(dropped).await.unwrap();
    eventually(|| harness.server.active_calls() == 0).await;
}

#[tokio::test]
async fn abandoning_a_unary_call_cancels_the_server_implementation() {
    let (signal, dropped) = DropSignal::new();
    let definition = unary_method_definition(
        &context(),
        &say_hello(),
        move |_call, _request: HelloRequest| {
            let guard = signal.guard();
            async move {
                let _guard = guard;
                std::future::pending::<nagare::HandlerResult<HelloReply>>().await
            }
        },
    )
    .unwrap();
    let harness = serve(vec![definition]);

    let method = say_hello();
    let call = unary_call(
        &harness.channel,
        &method,
        hello("nobody answers"),
        CallOptions::default(),
    );
    assert!(
        tokio::time::timeout(Duration::from_millis(50), call)
            .await
            .is_err()
    );

    within(dropped).await.unwrap();
    eventually(|| harness.server.active_calls() == 0).await;
}

#[tokio::test]
async fn cancel_is_idempotent() {
    let (harness, dropped) = endless_counter();

    let mut responses =
        server_streaming_call(&harness.channel, &count_up(), 0, CallOptions::default()).unwrap();
    assert_eq!(within(responses.message()).await.unwrap(), Some(0));

    responses.cancel();
    responses.cancel();
    assert_eq!(within(responses.message()).await.unwrap(), None);
    responses.cancel();
    drop(responses);

    within(dropped).await.unwrap();
    eventually(|| harness.server.active_calls() == 0).await;
}

#[tokio::test]
async fn server_observes_cancellation_through_its_context() {
    let observed = Arc::new(Mutex::new(None::<bool>));
    let observed_by_server = Arc::clone(&observed);
    let (signal, dropped) = DropSignal::new();
    let definition = bidi_streaming_method_definition(
        &context(),
        &echo(),
        move |call, mut requests: Streaming<String>, responses: ResponseSink<String>| {
            let observed = Arc::clone(&observed_by_server);
            let guard = signal.guard();
            async move {
                let _guard = guard;
                if let Some(first) = requests.message().await? {
                    responses.send(first).await?;
                }
                tokio::select! {
                    _ = call.cancelled() => {}
                    _ = tokio::time::sleep(Duration::from_secs(60)) => {}
                }
                *observed.lock().unwrap() = Some(call.is_cancelled());
                Ok(())
            }
        },
    )
    .unwrap();
    let harness = serve(vec![definition]);

    let (tx, rx) = futures::channel::mpsc::unbounded::<String>();
    tx.unbounded_send("hello".to_string()).unwrap();
    let mut responses =
        bidi_streaming_call(&harness.channel, &echo(), rx, CallOptions::default()).unwrap();
    assert_eq!(
        within(responses.message()).await.unwrap().as_deref(),
        Some("hello")
    );

    responses.cancel();

    // The implementation is either aborted outright or sees the token first.
    within(dropped).await.unwrap();
    let outcome = *observed.lock().unwrap();
    assert!(matches!(outcome, None | Some(true)), "{outcome:?}");
    eventually(|| harness.server.active_calls() == 0).await;

    // The request channel is closed once the call is gone.
    eventually(|| tx.is_closed()).await;
}

#[tokio::test]
async fn shutdown_aborts_calls_with_unavailable() {
    let (harness, dropped) = endless_counter();

    let mut responses =
        server_streaming_call(&harness.channel, &count_up(), 0, CallOptions::default()).unwrap();
    assert_eq!(within(responses.message()).await.unwrap(), Some(0));

    harness.server.shutdown_now();

    let err = within(async {
        loop {
            match responses.message().await {
                Ok(Some(_)) => continue,
                Ok(None) => panic!("stream ended cleanly after shutdown"),
                Err(status) => return status,
            }
        }
    })
    .await;
    assert_eq!(err.code(), Code::Unavailable);
    within(dropped).await.unwrap();
    assert_eq!(harness.server.active_calls(), 0);
}
