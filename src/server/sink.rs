use std::marker::PhantomData;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

use crate::codec::{self, Payload};
use crate::error::Status;

/// One response waiting for the drain task, with the acknowledgement that
/// completes the sender's `send`.
pub(crate) struct Outgoing {
    pub(crate) payload: Payload,
    pub(crate) accepted: oneshot::Sender<()>,
}

/// Output side of a streaming server call.
///
/// `send` completes only after the transport accepted the response, and the
/// transport accepts only while the client has room for it. A slow client
/// therefore holds a fast implementation back one response at a time.
pub struct ResponseSink<T> {
    tx: mpsc::Sender<Outgoing>,
    _marker: PhantomData<fn(T)>,
}

impl<T: Serialize> ResponseSink<T> {
    pub(crate) fn new(tx: mpsc::Sender<Outgoing>) -> Self {
        Self {
            tx,
            _marker: PhantomData,
        }
    }

    /// Send one response. Fails with `CANCELLED` once the call is over.
    pub async fn send(&self, message: T) -> Result<(), Status> {
        let payload = codec::encode(&message)?;
        let (accepted, on_accepted) = oneshot::channel();
        self.tx
            .send(Outgoing { payload, accepted })
            .await
            .map_err(|_| no_longer_accepting())?;
        on_accepted.await.map_err(|_| no_longer_accepting())
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

fn no_longer_accepting() -> Status {
    Status::cancelled("call is no longer accepting responses")
}
