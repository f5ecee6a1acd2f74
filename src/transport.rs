//! Transport-facing surface.
//!
//! The adapter drives an external RPC transport through the traits in
//! `call`: the transport delivers messages through non-suspending listener
//! callbacks and accepts credit grants, while the call drivers in `client`
//! and `server` turn that into async sequences.
//!
//! # Components
//!
//! - `call`: client/server call and listener traits, `Channel`
//! - `method`: method descriptors and streaming cardinality
//! - `registry`: method/service definitions and handler lookup
//! - `in_process`: credit-respecting in-memory transport

mod call;
pub mod in_process;
mod method;
mod registry;

pub use call::{
    Channel, ClientCall, ClientCallListener, ServerCall, ServerCallHandler, ServerCallListener,
};
pub use in_process::{InProcessChannel, InProcessServer};
pub use method::{MethodDescriptor, MethodInfo, MethodType};
pub use registry::{HandlerRegistry, MethodDefinition, ServiceDefinition};
