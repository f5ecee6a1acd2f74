//! Suspendable client helpers, one per method kind.
//!
//! Each helper checks that the descriptor's method type matches the helper
//! before touching the transport. A mismatch fails with
//! `INVALID_ARGUMENT` and starts no call.

mod driver;
mod options;

pub use options::CallOptions;

use futures::{Stream, StreamExt};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::Status;
use crate::streaming::{Streaming, expect_single};
use crate::transport::{Channel, MethodDescriptor, MethodType};

use driver::{RequestSource, start_call};

/// Send one request and wait for the single response.
///
/// A transport that delivers no response, or more than one, fails the call
/// with `INTERNAL`.
pub async fn unary_call<C, Req, Resp>(
    channel: &C,
    method: &MethodDescriptor<Req, Resp>,
    request: Req,
    options: CallOptions,
) -> Result<Resp, Status>
where
    C: Channel + ?Sized,
    Req: Serialize + Send + 'static,
    Resp: DeserializeOwned + Send + 'static,
{
    method.check_type(MethodType::Unary)?;
    let responses = start_call(channel, method, RequestSource::Single(request), options)?;
    expect_single(responses, "response", method.full_name()).await
}

/// Stream requests to the server and wait for the single response.
///
/// Requests are pulled from `requests` only while the transport is ready,
/// so a slow server holds the producer back. If the server answers before
/// the stream ends, the rest of the stream is dropped.
pub async fn client_streaming_call<C, Req, Resp, S>(
    channel: &C,
    method: &MethodDescriptor<Req, Resp>,
    requests: S,
    options: CallOptions,
) -> Result<Resp, Status>
where
    C: Channel + ?Sized,
    Req: Serialize + Send + 'static,
    Resp: DeserializeOwned + Send + 'static,
    S: Stream<Item = Req> + Send + 'static,
{
    method.check_type(MethodType::ClientStreaming)?;
    let responses = start_call(
        channel,
        method,
        RequestSource::Stream(requests.boxed()),
        options,
    )?;
    expect_single(responses, "response", method.full_name()).await
}

/// Send one request and return the response sequence.
///
/// The call starts immediately. Responses are buffered up to
/// `options.response_buffer_size` and the transport is held back beyond
/// that until the caller reads more.
pub fn server_streaming_call<C, Req, Resp>(
    channel: &C,
    method: &MethodDescriptor<Req, Resp>,
    request: Req,
    options: CallOptions,
) -> Result<Streaming<Resp>, Status>
where
    C: Channel + ?Sized,
    Req: Serialize + Send + 'static,
    Resp: DeserializeOwned + Send + 'static,
{
    method.check_type(MethodType::ServerStreaming)?;
    start_call(channel, method, RequestSource::Single(request), options)
}

/// Stream requests and responses independently.
pub fn bidi_streaming_call<C, Req, Resp, S>(
    channel: &C,
    method: &MethodDescriptor<Req, Resp>,
    requests: S,
    options: CallOptions,
) -> Result<Streaming<Resp>, Status>
where
    C: Channel + ?Sized,
    Req: Serialize + Send + 'static,
    Resp: DeserializeOwned + Send + 'static,
    S: Stream<Item = Req> + Send + 'static,
{
    method.check_type(MethodType::BidiStreaming)?;
    start_call(
        channel,
        method,
        RequestSource::Stream(requests.boxed()),
        options,
    )
}
