//! Shared fixtures for the integration tests.
//!
//! Note: We use `helpers/mod.rs` instead of the modern `helpers.rs` + `helpers/` pattern
//! because Cargo auto-discovers top-level `.rs` files in `tests/` as integration tests.
//! A `tests/helpers.rs` file would be compiled as a standalone test, which we don't want.

// Shared across several test binaries; not every binary uses every item.
#![allow(dead_code)]

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use nagare::config::TransportSettings;
use nagare::transport::MethodDefinition;
use nagare::{
    ExecutionContext, HandlerRegistry, InProcessChannel, InProcessServer, MethodDescriptor,
    MethodType, ServerOptions, ServiceDefinition,
};
use serde::{Deserialize, Serialize};

pub const SERVICE: &str = "helloworld.Greeter";

/// How long any single step of a test may take before it counts as a hang.
pub const STEP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelloRequest {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelloReply {
    pub message: String,
}

pub fn hello(name: &str) -> HelloRequest {
    HelloRequest {
        name: name.to_string(),
    }
}

pub fn say_hello() -> MethodDescriptor<HelloRequest, HelloReply> {
    MethodDescriptor::new("helloworld.Greeter/SayHello", MethodType::Unary)
}

/// Numbers `0..n` streamed back for a request `n`.
pub fn count_up() -> MethodDescriptor<u32, u32> {
    MethodDescriptor::new("helloworld.Greeter/CountUp", MethodType::ServerStreaming)
}

pub fn sum() -> MethodDescriptor<u32, u32> {
    MethodDescriptor::new("helloworld.Greeter/Sum", MethodType::ClientStreaming)
}

pub fn echo() -> MethodDescriptor<String, String> {
    MethodDescriptor::new("helloworld.Greeter/Echo", MethodType::BidiStreaming)
}

/// A running in-process server and a channel to it.
pub struct Harness {
    pub server: InProcessServer,
    pub channel: InProcessChannel,
}

/// Serve `methods` as one service over a transport with the default window.
pub fn serve(methods: Vec<MethodDefinition>) -> Harness {
    serve_with(methods, TransportSettings::default())
}

pub fn serve_with(methods: Vec<MethodDefinition>, settings: TransportSettings) -> Harness {
    let mut service = ServiceDefinition::new(SERVICE);
    for method in methods {
        service = service.with_method(method).expect("method belongs to service");
    }
    let mut registry = HandlerRegistry::new();
    registry.add_service(service).expect("fresh registry");
    let server = InProcessServer::new(registry, &settings);
    let channel = server.channel();
    Harness { server, channel }
}

pub fn context() -> ExecutionContext {
    ExecutionContext::current().expect("tests run inside a tokio runtime")
}

pub fn context_with(request_buffer_size: usize, response_buffer_size: usize) -> ExecutionContext {
    context().with_options(ServerOptions {
        request_buffer_size,
        response_buffer_size,
    })
}

/// Fails the test instead of hanging it.
pub async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(STEP_TIMEOUT, future)
        .await
        .expect("step did not finish in time")
}

/// Poll `condition` until it holds, failing the test after [`STEP_TIMEOUT`].
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    within(async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
}

/// Fires a oneshot when dropped; lets a test observe that an
/// implementation future was torn down.
pub struct DropSignal(Arc<Mutex<Option<tokio::sync::oneshot::Sender<()>>>>);

impl DropSignal {
    pub fn new() -> (Self, tokio::sync::oneshot::Receiver<()>) {
        let (tx, rx) = tokio::sync::oneshot::channel();
        (Self(Arc::new(Mutex::new(Some(tx)))), rx)
    }

    /// A guard sharing this signal; whichever drops first fires it.
    pub fn guard(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl Drop for DropSignal {
    fn drop(&mut self) {
        if let Some(tx) = self.0.lock().unwrap().take() {
            let _ = tx.send(());
        }
    }
}
