//! Method definitions built from suspendable implementations.
//!
//! Each helper adapts one method shape to the transport's callback-driven
//! `ServerCallHandler`. Implementations report failure through
//! [`HandlerResult`]: returning a [`Status`] closes the call with it, and
//! any other error closes it with `UNKNOWN` while the error itself stays
//! local.

mod context;
mod driver;
mod phase;
mod sink;

pub use context::{CallContext, ExecutionContext, ServerOptions};
pub use sink::ResponseSink;

use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{HandlerResult, Status};
use crate::streaming::{Streaming, expect_single};
use crate::transport::{MethodDefinition, MethodDescriptor, MethodType};

/// Bind a unary implementation: one request in, one response out.
pub fn unary_method_definition<Req, Resp, F, Fut>(
    context: &ExecutionContext,
    method: &MethodDescriptor<Req, Resp>,
    implementation: F,
) -> Result<MethodDefinition, Status>
where
    Req: DeserializeOwned + Send + 'static,
    Resp: Serialize + Send + 'static,
    F: Fn(CallContext, Req) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult<Resp>> + Send + 'static,
{
    method.check_type(MethodType::Unary)?;
    let implementation = Arc::new(implementation);
    let name = method.full_name().to_string();
    Ok(driver::bind(
        context,
        method,
        move |call, requests, sink| {
            let implementation = Arc::clone(&implementation);
            let name = name.clone();
            async move {
                let request = expect_single(requests, "request", &name).await?;
                let response = implementation(call, request)
                    .await
                    .map_err(Status::from_error)?;
                sink.send(response).await
            }
            .boxed()
        },
    ))
}

/// Bind a client-streaming implementation: it reads the request sequence
/// and returns one response. It may return before reading everything.
pub fn client_streaming_method_definition<Req, Resp, F, Fut>(
    context: &ExecutionContext,
    method: &MethodDescriptor<Req, Resp>,
    implementation: F,
) -> Result<MethodDefinition, Status>
where
    Req: DeserializeOwned + Send + 'static,
    Resp: Serialize + Send + 'static,
    F: Fn(CallContext, Streaming<Req>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult<Resp>> + Send + 'static,
{
    method.check_type(MethodType::ClientStreaming)?;
    let implementation = Arc::new(implementation);
    Ok(driver::bind(
        context,
        method,
        move |call, requests, sink| {
            let implementation = Arc::clone(&implementation);
            async move {
                let response = implementation(call, requests)
                    .await
                    .map_err(Status::from_error)?;
                sink.send(response).await
            }
            .boxed()
        },
    ))
}

/// Bind a server-streaming implementation: one request in, responses pushed
/// into the sink before returning.
pub fn server_streaming_method_definition<Req, Resp, F, Fut>(
    context: &ExecutionContext,
    method: &MethodDescriptor<Req, Resp>,
    implementation: F,
) -> Result<MethodDefinition, Status>
where
    Req: DeserializeOwned + Send + 'static,
    Resp: Serialize + Send + 'static,
    F: Fn(CallContext, Req, ResponseSink<Resp>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult<()>> + Send + 'static,
{
    method.check_type(MethodType::ServerStreaming)?;
    let implementation = Arc::new(implementation);
    let name = method.full_name().to_string();
    Ok(driver::bind(
        context,
        method,
        move |call, requests, sink| {
            let implementation = Arc::clone(&implementation);
            let name = name.clone();
            async move {
                let request = expect_single(requests, "request", &name).await?;
                implementation(call, request, sink)
                    .await
                    .map_err(Status::from_error)
            }
            .boxed()
        },
    ))
}

/// Bind a bidirectional implementation: it reads requests and pushes
/// responses independently.
pub fn bidi_streaming_method_definition<Req, Resp, F, Fut>(
    context: &ExecutionContext,
    method: &MethodDescriptor<Req, Resp>,
    implementation: F,
) -> Result<MethodDefinition, Status>
where
    Req: DeserializeOwned + Send + 'static,
    Resp: Serialize + Send + 'static,
    F: Fn(CallContext, Streaming<Req>, ResponseSink<Resp>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult<()>> + Send + 'static,
{
    method.check_type(MethodType::BidiStreaming)?;
    let implementation = Arc::new(implementation);
    Ok(driver::bind(
        context,
        method,
        move |call, requests, sink| {
            let implementation = Arc::clone(&implementation);
            async move {
                implementation(call, requests, sink)
                    .await
                    .map_err(Status::from_error)
            }
            .boxed()
        },
    ))
}
