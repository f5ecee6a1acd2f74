//! Pull-based message sequences handed to application code.

use std::sync::{Arc, OnceLock};

use futures::Stream;

use crate::error::Status;
use crate::flow::CreditReceiver;
use crate::metadata::Metadata;

/// Headers and trailers the peer sent for a client call.
#[derive(Debug, Default)]
pub(crate) struct Exchange {
    pub(crate) headers: OnceLock<Metadata>,
    pub(crate) trailers: OnceLock<Metadata>,
}

/// A single-pass sequence of messages from the peer.
///
/// On the client this is the response side of a call; on the server it is
/// the request side given to the implementation. The sequence is owned by
/// one reader: it cannot be cloned, and reading it consumes it.
///
/// Dropping an unfinished sequence cancels it. On the client that cancels
/// the call; on the server it tells the transport to stop holding requests
/// back.
pub struct Streaming<T> {
    receiver: CreditReceiver<T>,
    exchange: Option<Arc<Exchange>>,
}

impl<T> Streaming<T> {
    pub(crate) fn new(receiver: CreditReceiver<T>) -> Self {
        Self {
            receiver,
            exchange: None,
        }
    }

    pub(crate) fn with_exchange(receiver: CreditReceiver<T>, exchange: Arc<Exchange>) -> Self {
        Self {
            receiver,
            exchange: Some(exchange),
        }
    }

    /// Next message, `Ok(None)` at the clean end, or the status that ended
    /// the sequence.
    pub async fn message(&mut self) -> Result<Option<T>, Status> {
        match self.receiver.next().await {
            Some(Ok(message)) => Ok(Some(message)),
            Some(Err(status)) => Err(status),
            None => Ok(None),
        }
    }

    /// Stop consuming. Idempotent.
    pub fn cancel(&mut self) {
        self.receiver.cancel();
    }

    /// Response headers, once the peer sent them. Always `None` on the server.
    pub fn headers(&self) -> Option<&Metadata> {
        self.exchange.as_ref().and_then(|e| e.headers.get())
    }

    /// Trailers, once the call closed. Always `None` on the server.
    pub fn trailers(&self) -> Option<&Metadata> {
        self.exchange.as_ref().and_then(|e| e.trailers.get())
    }

    /// Read the remaining messages into a vector.
    pub async fn collect(mut self) -> Result<Vec<T>, Status> {
        let mut messages = Vec::new();
        while let Some(message) = self.message().await? {
            messages.push(message);
        }
        Ok(messages)
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<T, Status>> + Send
    where
        T: Send + 'static,
    {
        futures::stream::unfold(self, |mut streaming| async move {
            match streaming.message().await {
                Ok(Some(message)) => Some((Ok(message), streaming)),
                Ok(None) => None,
                Err(status) => Some((Err(status), streaming)),
            }
        })
    }
}

/// Read exactly one message, failing with `INTERNAL` on zero or several.
///
/// `what` names the message kind ("request" or "response") for the error.
/// The sequence is cancelled when a second message shows up.
pub(crate) async fn expect_single<T>(
    mut streaming: Streaming<T>,
    what: &str,
    method: &str,
) -> Result<T, Status> {
    let Some(first) = streaming.message().await? else {
        return Err(Status::internal(format!(
            "Expected one {what} for method {method} but received none"
        )));
    };
    match streaming.message().await? {
        None => Ok(first),
        Some(_) => {
            streaming.cancel();
            Err(Status::internal(format!(
                "Expected one {what} for method {method} but received two"
            )))
        }
    }
}
