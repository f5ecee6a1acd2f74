//! Message serialisation.
//!
//! Transports move opaque byte payloads; typed messages are encoded with
//! `serde_json` at the edges of the call drivers.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::Status;

/// Opaque message payload carried by transports.
pub type Payload = Vec<u8>;

/// Encode a message. Failures are `INTERNAL`.
pub fn encode<T: Serialize>(message: &T) -> Result<Payload, Status> {
    serde_json::to_vec(message)
        .map_err(|e| Status::internal("failed to encode message").with_cause(e))
}

/// Decode a message. Failures are `INTERNAL`.
pub fn decode<T: DeserializeOwned>(payload: &[u8]) -> Result<T, Status> {
    serde_json::from_slice(payload)
        .map_err(|e| Status::internal("failed to decode message").with_cause(e))
}
