//! Call and listener traits consumed from the underlying transport.
//!
//! Every listener callback is invoked by the transport and must return
//! without suspending. Implementations hand work off to buffers or signals
//! and leave waiting to the call drivers' own tasks.

use std::sync::Arc;

use crate::client::CallOptions;
use crate::codec::Payload;
use crate::error::Status;
use crate::metadata::Metadata;

use super::MethodInfo;

/// Callbacks the transport invokes for a client call.
pub trait ClientCallListener: Send + Sync {
    /// Response headers arrived.
    fn on_headers(&self, _headers: Metadata) {}

    /// One response message arrived. Only called against granted credit.
    fn on_message(&self, message: Payload);

    /// The call finished. Called exactly once, after every message.
    fn on_close(&self, status: Status, trailers: Metadata);

    /// The call can accept more outbound messages.
    fn on_ready(&self) {}
}

/// Client side of one RPC on the transport.
pub trait ClientCall: Send + Sync {
    fn start(&self, listener: Arc<dyn ClientCallListener>, headers: Metadata);

    /// Grant credit for `n` more response messages.
    fn request(&self, n: usize);

    fn send_message(&self, message: Payload);

    /// No more requests will be sent.
    fn half_close(&self);

    /// Abort the call. The listener still observes `on_close`.
    fn cancel(&self, status: Status);

    /// Whether a message can be sent without queueing past the receiver's
    /// credit and the transport's window.
    fn is_ready(&self) -> bool;
}

/// Creates client calls.
pub trait Channel: Send + Sync {
    fn new_call(&self, method: &MethodInfo, options: &CallOptions) -> Arc<dyn ClientCall>;
}

/// Callbacks the transport invokes for a server call.
pub trait ServerCallListener: Send + Sync {
    /// One request message arrived. Only called against granted credit.
    fn on_message(&self, message: Payload);

    /// The client will send no more requests.
    fn on_half_close(&self);

    /// The call was cancelled by the client, a deadline, or the transport.
    fn on_cancel(&self);

    /// The call closed after `ServerCall::close`.
    fn on_complete(&self) {}

    /// The call can accept more outbound messages.
    fn on_ready(&self) {}
}

/// Server side of one RPC on the transport.
pub trait ServerCall: Send + Sync {
    fn method(&self) -> &MethodInfo;

    /// Grant credit for `n` more request messages.
    fn request(&self, n: usize);

    fn send_headers(&self, headers: Metadata);

    fn send_message(&self, message: Payload);

    fn is_ready(&self) -> bool;

    /// Finish the call. The status cause stays local; transports only
    /// forward `Status::for_wire` to the peer.
    fn close(&self, status: Status, trailers: Metadata);

    fn is_cancelled(&self) -> bool;
}

/// Entry point the transport calls for each incoming RPC of a method.
pub trait ServerCallHandler: Send + Sync {
    fn start_call(
        &self,
        call: Arc<dyn ServerCall>,
        headers: Metadata,
    ) -> Arc<dyn ServerCallListener>;
}
