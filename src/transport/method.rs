use std::fmt;
use std::marker::PhantomData;

use crate::error::Status;

/// Streaming cardinality of a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodType {
    Unary,
    ClientStreaming,
    ServerStreaming,
    BidiStreaming,
}

impl MethodType {
    pub fn client_sends_one(self) -> bool {
        matches!(self, MethodType::Unary | MethodType::ServerStreaming)
    }

    pub fn server_sends_one(self) -> bool {
        matches!(self, MethodType::Unary | MethodType::ClientStreaming)
    }

    pub fn from_streaming(client_streaming: bool, server_streaming: bool) -> Self {
        match (client_streaming, server_streaming) {
            (false, false) => MethodType::Unary,
            (true, false) => MethodType::ClientStreaming,
            (false, true) => MethodType::ServerStreaming,
            (true, true) => MethodType::BidiStreaming,
        }
    }
}

impl fmt::Display for MethodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MethodType::Unary => "unary",
            MethodType::ClientStreaming => "client-streaming",
            MethodType::ServerStreaming => "server-streaming",
            MethodType::BidiStreaming => "bidi-streaming",
        };
        f.write_str(name)
    }
}

/// Untyped method identity as seen by transports.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodInfo {
    full_name: String,
    method_type: MethodType,
}

impl MethodInfo {
    /// `full_name` has the form `package.Service/Method`.
    pub fn new(full_name: impl Into<String>, method_type: MethodType) -> Self {
        Self {
            full_name: full_name.into(),
            method_type,
        }
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn method_type(&self) -> MethodType {
        self.method_type
    }

    /// Part before the last `/`, or the whole name if there is none.
    pub fn service_name(&self) -> &str {
        self.full_name
            .rsplit_once('/')
            .map(|(service, _)| service)
            .unwrap_or(&self.full_name)
    }

    pub fn method_name(&self) -> &str {
        self.full_name
            .rsplit_once('/')
            .map(|(_, method)| method)
            .unwrap_or("")
    }
}

/// Method identity typed by its request and response messages.
pub struct MethodDescriptor<Req, Resp> {
    info: MethodInfo,
    _marker: PhantomData<fn(Req) -> Resp>,
}

impl<Req, Resp> MethodDescriptor<Req, Resp> {
    pub fn new(full_name: impl Into<String>, method_type: MethodType) -> Self {
        Self {
            info: MethodInfo::new(full_name, method_type),
            _marker: PhantomData,
        }
    }

    pub fn info(&self) -> &MethodInfo {
        &self.info
    }

    pub fn full_name(&self) -> &str {
        self.info.full_name()
    }

    pub fn method_type(&self) -> MethodType {
        self.info.method_type()
    }

    /// Fail with `INVALID_ARGUMENT` unless this method has type `expected`.
    pub fn check_type(&self, expected: MethodType) -> Result<(), Status> {
        if self.method_type() == expected {
            return Ok(());
        }
        Err(Status::invalid_argument(format!(
            "method {} is {}, not {}",
            self.full_name(),
            self.method_type(),
            expected
        )))
    }
}

impl<Req, Resp> Clone for MethodDescriptor<Req, Resp> {
    fn clone(&self) -> Self {
        Self {
            info: self.info.clone(),
            _marker: PhantomData,
        }
    }
}

impl<Req, Resp> fmt::Debug for MethodDescriptor<Req, Resp> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MethodDescriptor").field(&self.info).finish()
    }
}
