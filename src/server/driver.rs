//! Server-side call driver.
//!
//! For every incoming call the driver wires three pieces together:
//!
//! ```text
//! transport ──RequestListener──► credit buffer ──► implementation task
//!                                                        │ ResponseSink
//!                                                        ▼
//! transport ◄──────── drain task (awaits Readiness) ◄── mpsc + ack
//! ```
//!
//! The drain task takes a response only while the transport is ready and
//! acknowledges it once `send_message` returned, so a `send` never completes
//! ahead of the transport's flow control. The supervising task closes the
//! transport call exactly once, after the implementation has finished and
//! the drain task has wound down.

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::future::BoxFuture;
use log::{debug, warn};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::codec::{self, Payload};
use crate::error::Status;
use crate::flow::{CreditSender, Readiness, credit_buffer};
use crate::metadata::Metadata;
use crate::streaming::Streaming;
use crate::transport::{
    MethodDefinition, MethodDescriptor, MethodInfo, ServerCall, ServerCallHandler,
    ServerCallListener,
};

use super::phase::{CallPhase, PhaseCell};
use super::sink::Outgoing;
use super::{CallContext, ExecutionContext, ResponseSink, ServerOptions};

const LOG_TARGET: &str = "nagare::server";

/// Credits granted once the implementation stops reading requests, so the
/// transport can deliver and discard the rest without stalling the client.
const DISCARD_CREDITS: usize = u32::MAX as usize;

/// Uniform shape every method kind is adapted to.
type CallBody<Req, Resp> = Arc<
    dyn Fn(CallContext, Streaming<Req>, ResponseSink<Resp>) -> BoxFuture<'static, Result<(), Status>>
        + Send
        + Sync,
>;

/// A panic raised by an implementation, kept as the local cause of `UNKNOWN`.
#[derive(Debug, thiserror::Error)]
#[error("implementation panicked: {0}")]
pub(crate) struct ImplementationPanic(String);

impl ImplementationPanic {
    fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self(message)
    }
}

/// Bind a uniform call body to a transport method definition.
pub(crate) fn bind<Req, Resp, B>(
    context: &ExecutionContext,
    method: &MethodDescriptor<Req, Resp>,
    body: B,
) -> MethodDefinition
where
    Req: DeserializeOwned + Send + 'static,
    Resp: Serialize + Send + 'static,
    B: Fn(CallContext, Streaming<Req>, ResponseSink<Resp>) -> BoxFuture<'static, Result<(), Status>>
        + Send
        + Sync
        + 'static,
{
    let handler = MethodHandler {
        handle: context.handle().clone(),
        options: context.options(),
        method: method.info().clone(),
        body: Arc::new(body),
    };
    MethodDefinition::new(method.info().clone(), Arc::new(handler))
}

struct MethodHandler<Req, Resp> {
    handle: Handle,
    options: ServerOptions,
    method: MethodInfo,
    body: CallBody<Req, Resp>,
}

/// Per-call state shared by the listener, the drain task and the supervisor.
struct ServerCallRecord {
    call: Arc<dyn ServerCall>,
    method: MethodInfo,
    readiness: Readiness,
    /// Cancelled when the transport reports the call cancelled.
    cancel: CancellationToken,
    phase: PhaseCell,
    headers_sent: AtomicBool,
}

impl ServerCallRecord {
    fn new(call: Arc<dyn ServerCall>, method: MethodInfo) -> Self {
        Self {
            call,
            method,
            readiness: Readiness::new(),
            cancel: CancellationToken::new(),
            phase: PhaseCell::new(),
            headers_sent: AtomicBool::new(false),
        }
    }

    /// Send (empty) response headers if nothing has been sent yet.
    fn send_headers_once(&self) {
        if self.headers_sent.swap(true, Ordering::AcqRel) {
            return;
        }
        self.call.send_headers(Metadata::new());
        let advanced = self.phase.advance(CallPhase::Streaming);
        debug_assert!(advanced, "headers sent in phase {:?}", self.phase.get());
    }

    /// Finish the call with `status`: headers first unless the call was
    /// cancelled, then `Completing`, then the single transport close.
    fn complete(&self, status: Status) {
        if !self.cancel.is_cancelled() && !self.call.is_cancelled() {
            self.send_headers_once();
        }
        self.phase.advance(CallPhase::Completing);
        self.close_once(status);
    }

    fn close_once(&self, status: Status) {
        if !self.phase.close_once() {
            debug!(
                target: LOG_TARGET,
                "Call {} already closed, dropping status {}",
                self.method.full_name(),
                status
            );
            return;
        }
        if let Some(cause) = status.cause() {
            warn!(
                target: LOG_TARGET,
                "Call {} failed with {}: {}",
                self.method.full_name(),
                status,
                cause
            );
        } else {
            debug!(
                target: LOG_TARGET,
                "Closing call {} with {}",
                self.method.full_name(),
                status
            );
        }
        self.call.close(status, Metadata::new());
    }
}

impl<Req, Resp> ServerCallHandler for MethodHandler<Req, Resp>
where
    Req: DeserializeOwned + Send + 'static,
    Resp: Serialize + Send + 'static,
{
    fn start_call(
        &self,
        call: Arc<dyn ServerCall>,
        headers: Metadata,
    ) -> Arc<dyn ServerCallListener> {
        let record = Arc::new(ServerCallRecord::new(
            Arc::clone(&call),
            self.method.clone(),
        ));

        let request_capacity = self.options.request_buffer_size.max(1);
        let credit_call = Arc::clone(&call);
        let discard_call = Arc::clone(&call);
        let (sender, receiver) = credit_buffer(
            request_capacity,
            move || credit_call.request(1),
            move || discard_call.request(DISCARD_CREDITS),
        );
        call.request(request_capacity);

        let (response_tx, response_rx) =
            mpsc::channel(self.options.response_buffer_size.max(1));
        let context = CallContext::new(self.method.clone(), headers, record.cancel.clone());
        let body = (self.body)(
            context,
            Streaming::new(receiver),
            ResponseSink::new(response_tx),
        );
        self.handle.spawn(run_call(
            self.handle.clone(),
            Arc::clone(&record),
            body,
            response_rx,
        ));

        Arc::new(RequestListener { sender, record })
    }
}

/// Supervise one call from implementation start to transport close.
async fn run_call(
    handle: Handle,
    record: Arc<ServerCallRecord>,
    body: BoxFuture<'static, Result<(), Status>>,
    responses: mpsc::Receiver<Outgoing>,
) {
    if record.cancel.is_cancelled() {
        debug!(
            target: LOG_TARGET,
            "Call {} cancelled before the implementation started",
            record.method.full_name()
        );
        record.close_once(Status::cancelled("call cancelled before start"));
        return;
    }
    record.phase.advance(CallPhase::HeadersPending);

    let finished = CancellationToken::new();
    let drain = handle.spawn(drain_responses(
        Arc::clone(&record),
        responses,
        finished.clone(),
    ));
    let mut implementation = handle.spawn(body);

    let status = tokio::select! {
        biased;
        _ = record.cancel.cancelled() => {
            implementation.abort();
            Status::cancelled("call cancelled by client")
        }
        joined = &mut implementation => match joined {
            Ok(Ok(())) => Status::ok(),
            Ok(Err(status)) => status,
            Err(e) if e.is_panic() => Status::unknown("implementation panicked")
                .with_cause(ImplementationPanic::from_payload(e.into_panic())),
            Err(_) => Status::cancelled("implementation task cancelled"),
        },
    };

    // Every acknowledged response already reached the transport; anything
    // still queued belongs to a sender that outlived the implementation.
    finished.cancel();
    if let Err(e) = drain.await {
        if e.is_panic() {
            warn!(
                target: LOG_TARGET,
                "Response drain for {} panicked",
                record.method.full_name()
            );
        }
    }

    record.complete(status);
}

/// Hand responses to the transport one at a time, each only once the
/// transport is ready for it.
///
/// Stops when the call is cancelled or `finished` fires; responses left in
/// the channel are dropped and their senders see `CANCELLED`.
async fn drain_responses(
    record: Arc<ServerCallRecord>,
    mut responses: mpsc::Receiver<Outgoing>,
    finished: CancellationToken,
) {
    loop {
        while !record.call.is_ready() {
            tokio::select! {
                biased;
                _ = record.cancel.cancelled() => return,
                _ = finished.cancelled() => return,
                _ = record.readiness.await_ready() => {}
            }
        }

        let outgoing = tokio::select! {
            biased;
            _ = record.cancel.cancelled() => return,
            _ = finished.cancelled() => return,
            next = responses.recv() => match next {
                Some(outgoing) => outgoing,
                None => return,
            },
        };

        record.send_headers_once();
        record.call.send_message(outgoing.payload);
        let _ = outgoing.accepted.send(());
    }
}

/// Transport callbacks for one server call. Never suspends.
struct RequestListener<Req> {
    sender: CreditSender<Req>,
    record: Arc<ServerCallRecord>,
}

impl<Req: DeserializeOwned + Send> ServerCallListener for RequestListener<Req> {
    fn on_message(&self, message: Payload) {
        match codec::decode::<Req>(&message) {
            Ok(request) => self.sender.offer(request),
            Err(status) => {
                warn!(
                    target: LOG_TARGET,
                    "Failed to decode request for {}: {}",
                    self.record.method.full_name(),
                    status
                );
                self.sender.close(Err(status));
            }
        }
    }

    fn on_half_close(&self) {
        self.sender.close(Ok(()));
    }

    fn on_cancel(&self) {
        debug!(
            target: LOG_TARGET,
            "Call {} cancelled by transport",
            self.record.method.full_name()
        );
        self.record.cancel.cancel();
        self.sender
            .close(Err(Status::cancelled("call cancelled by client")));
    }

    fn on_complete(&self) {
        debug!(
            target: LOG_TARGET,
            "Call {} completed",
            self.record.method.full_name()
        );
    }

    fn on_ready(&self) {
        self.record.readiness.signal_ready();
    }
}
