//! Client-side call driver.
//!
//! One driver instance runs per RPC:
//!
//! ```text
//! request source ──send task──► ClientCall ──► transport
//!                     ▲  (waits on Readiness while !is_ready)
//!                     │
//! transport ──ResponseListener──► credit buffer ──► Streaming<Resp>
//!              on_message / on_close / on_ready
//! ```
//!
//! The call record is torn down exactly once, by whichever comes first:
//! the transport closing the call, or the caller cancelling the response
//! sequence.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use futures::StreamExt;
use futures::stream::BoxStream;
use log::{debug, warn};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use crate::codec::{self, Payload};
use crate::error::Status;
use crate::flow::{CreditSender, Readiness, credit_buffer};
use crate::metadata::Metadata;
use crate::streaming::{Exchange, Streaming};
use crate::transport::{Channel, ClientCall, ClientCallListener, MethodDescriptor, MethodInfo};

use super::CallOptions;

const LOG_TARGET: &str = "nagare::client";

/// Where the requests of a call come from.
pub(crate) enum RequestSource<Req> {
    Single(Req),
    Stream(BoxStream<'static, Req>),
}

/// Per-call state shared by the listener, the send task and the caller.
struct CallRecord {
    method: MethodInfo,
    call: Arc<dyn ClientCall>,
    /// Terminal status; the first writer wins.
    completion: OnceLock<Status>,
    readiness: Readiness,
    /// Stops the send task and drops the request source.
    cancel: CancellationToken,
    torn_down: AtomicBool,
    exchange: Arc<Exchange>,
}

impl CallRecord {
    /// Record a local failure and cancel the call with it.
    fn fail(&self, status: Status) {
        let _ = self.completion.set(status.clone());
        self.teardown(status);
    }

    /// Cancel the transport call and the send task. Runs once.
    fn teardown(&self, status: Status) {
        if self.torn_down.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!(
            target: LOG_TARGET,
            "Cancelling call {}: {}",
            self.method.full_name(),
            status
        );
        self.cancel.cancel();
        self.call.cancel(status);
    }
}

/// Start a call and return its response sequence.
///
/// The send task runs on the runtime of the calling context. Outside a
/// runtime this fails with `FAILED_PRECONDITION` before any call is opened.
pub(crate) fn start_call<C, Req, Resp>(
    channel: &C,
    method: &MethodDescriptor<Req, Resp>,
    source: RequestSource<Req>,
    options: CallOptions,
) -> Result<Streaming<Resp>, Status>
where
    C: Channel + ?Sized,
    Req: Serialize + Send + 'static,
    Resp: DeserializeOwned + Send + 'static,
{
    let handle = Handle::try_current().map_err(|e| {
        Status::failed_precondition(format!(
            "client call {} started outside a tokio runtime",
            method.full_name()
        ))
        .with_cause(e)
    })?;
    let call = channel.new_call(method.info(), &options);
    let capacity = options.response_buffer_size.max(1);
    let exchange = Arc::new(Exchange::default());
    let record = Arc::new(CallRecord {
        method: method.info().clone(),
        call: Arc::clone(&call),
        completion: OnceLock::new(),
        readiness: Readiness::new(),
        cancel: CancellationToken::new(),
        torn_down: AtomicBool::new(false),
        exchange: Arc::clone(&exchange),
    });

    let credit_call = Arc::clone(&call);
    let cancel_record = Arc::clone(&record);
    let (sender, receiver) = credit_buffer(
        capacity,
        move || credit_call.request(1),
        move || cancel_record.teardown(Status::cancelled("response stream cancelled by client")),
    );

    debug!(
        target: LOG_TARGET,
        "Starting {} call {}",
        method.method_type(),
        method.full_name()
    );
    call.start(
        Arc::new(ResponseListener {
            sender,
            record: Arc::clone(&record),
        }),
        options.headers,
    );
    call.request(capacity);

    handle.spawn(send_requests(record, source));

    Ok(Streaming::with_exchange(receiver, exchange))
}

/// Forward the request source to the transport, then half-close.
async fn send_requests<Req: Serialize>(record: Arc<CallRecord>, source: RequestSource<Req>) {
    let cancel = record.cancel.clone();
    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            debug!(
                target: LOG_TARGET,
                "Request sending for {} stopped by call teardown",
                record.method.full_name()
            );
            return;
        }
        outcome = forward_requests(&record, source) => outcome,
    };

    match outcome {
        Ok(()) => record.call.half_close(),
        Err(status) => {
            warn!(
                target: LOG_TARGET,
                "Request sending for {} failed: {}",
                record.method.full_name(),
                status
            );
            record.fail(status);
        }
    }
}

async fn forward_requests<Req: Serialize>(
    record: &CallRecord,
    source: RequestSource<Req>,
) -> Result<(), Status> {
    match source {
        RequestSource::Single(request) => {
            record.call.send_message(codec::encode(&request)?);
        }
        RequestSource::Stream(mut requests) => loop {
            while !record.call.is_ready() {
                record.readiness.await_ready().await;
            }
            let Some(request) = requests.next().await else {
                break;
            };
            record.call.send_message(codec::encode(&request)?);
        },
    }
    Ok(())
}

/// Transport callbacks for one client call. Never suspends.
struct ResponseListener<Resp> {
    sender: CreditSender<Resp>,
    record: Arc<CallRecord>,
}

impl<Resp: DeserializeOwned + Send> ClientCallListener for ResponseListener<Resp> {
    fn on_headers(&self, headers: Metadata) {
        let _ = self.record.exchange.headers.set(headers);
    }

    fn on_message(&self, message: Payload) {
        match codec::decode::<Resp>(&message) {
            Ok(response) => self.sender.offer(response),
            Err(status) => {
                warn!(
                    target: LOG_TARGET,
                    "Failed to decode response for {}: {}",
                    self.record.method.full_name(),
                    status
                );
                self.record.fail(status);
            }
        }
    }

    fn on_close(&self, status: Status, trailers: Metadata) {
        let _ = self.record.exchange.trailers.set(trailers);
        let _ = self.record.completion.set(status);
        let terminal = self
            .record
            .completion
            .get()
            .cloned()
            .unwrap_or_else(Status::ok);
        debug!(
            target: LOG_TARGET,
            "Call {} closed: {}",
            self.record.method.full_name(),
            terminal
        );

        // The transport is done with this call: nothing left to cancel.
        self.record.torn_down.store(true, Ordering::Release);
        self.record.cancel.cancel();
        if terminal.is_ok() {
            self.sender.close(Ok(()));
        } else {
            self.sender.close(Err(terminal));
        }
    }

    fn on_ready(&self) {
        self.record.readiness.signal_ready();
    }
}
