pub mod client;
pub mod codec;
pub mod codegen;
pub mod config;
pub mod error;
pub mod flow;
pub mod metadata;
pub mod server;
pub mod streaming;
pub mod transport;

pub use client::{
    CallOptions, bidi_streaming_call, client_streaming_call, server_streaming_call, unary_call,
};
pub use error::{BoxError, Code, ConfigError, HandlerResult, Status};
pub use futures::Stream;
pub use metadata::Metadata;
pub use server::{
    CallContext, ExecutionContext, ResponseSink, ServerOptions, bidi_streaming_method_definition,
    client_streaming_method_definition, server_streaming_method_definition,
    unary_method_definition,
};
pub use streaming::Streaming;
pub use transport::{
    Channel, HandlerRegistry, InProcessChannel, InProcessServer, MethodDescriptor, MethodType,
    ServiceDefinition,
};
