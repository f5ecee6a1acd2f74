use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use crate::config::ServerSettings;
use crate::config::settings::DEFAULT_BUFFER_SIZE;
use crate::error::Status;
use crate::metadata::Metadata;
use crate::transport::MethodInfo;

/// Buffer sizes for every call of a bound method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerOptions {
    /// Capacity of the credit-bounded request buffer. At least 1.
    pub request_buffer_size: usize,
    /// Responses that may wait for the drain task at once. Each `send` still
    /// completes only after the transport accepted its response.
    pub response_buffer_size: usize,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            request_buffer_size: DEFAULT_BUFFER_SIZE,
            response_buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

impl ServerOptions {
    pub fn from_settings(settings: &ServerSettings) -> Self {
        Self {
            request_buffer_size: settings.request_buffer_size.max(1),
            response_buffer_size: settings.response_buffer_size.max(1),
        }
    }
}

/// Where server calls run, and with which buffer sizes.
///
/// Every task a call spawns goes onto `handle`; nothing is taken from
/// ambient runtime state once the method is bound.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    handle: Handle,
    options: ServerOptions,
}

impl ExecutionContext {
    pub fn new(handle: Handle, options: ServerOptions) -> Self {
        Self { handle, options }
    }

    /// Context on the runtime the caller is running in.
    pub fn current() -> Result<Self, Status> {
        let handle = Handle::try_current().map_err(|e| {
            Status::failed_precondition("no tokio runtime to run server calls on").with_cause(e)
        })?;
        Ok(Self::new(handle, ServerOptions::default()))
    }

    pub fn with_options(mut self, options: ServerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub fn options(&self) -> ServerOptions {
        self.options
    }
}

/// Per-call context handed to every implementation.
#[derive(Debug, Clone)]
pub struct CallContext {
    method: MethodInfo,
    headers: Metadata,
    cancel: CancellationToken,
}

impl CallContext {
    pub(crate) fn new(method: MethodInfo, headers: Metadata, cancel: CancellationToken) -> Self {
        Self {
            method,
            headers,
            cancel,
        }
    }

    pub fn method(&self) -> &MethodInfo {
        &self.method
    }

    /// Headers the client sent with the call.
    pub fn headers(&self) -> &Metadata {
        &self.headers
    }

    /// Whether the call was cancelled by the client or the transport.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the call is cancelled.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MethodType;

    #[test]
    fn options_from_settings_raise_zero() {
        let settings = ServerSettings {
            request_buffer_size: 0,
            response_buffer_size: 4,
        };
        let options = ServerOptions::from_settings(&settings);
        assert_eq!(options.request_buffer_size, 1);
        assert_eq!(options.response_buffer_size, 4);
    }

    #[test]
    fn current_fails_outside_runtime() {
        let err = ExecutionContext::current().unwrap_err();
        assert_eq!(err.code(), crate::error::Code::FailedPrecondition);
    }

    #[tokio::test]
    async fn call_context_observes_cancellation() {
        let token = CancellationToken::new();
        let context = CallContext::new(
            MethodInfo::new("pkg.S/M", MethodType::Unary),
            Metadata::new(),
            token.clone(),
        );
        assert!(!context.is_cancelled());
        token.cancel();
        context.cancelled().await;
        assert!(context.is_cancelled());
    }
}
