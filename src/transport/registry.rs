use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{Code, Status};

use super::{MethodInfo, ServerCallHandler};

/// One method bound to the handler that serves it.
#[derive(Clone)]
pub struct MethodDefinition {
    info: MethodInfo,
    handler: Arc<dyn ServerCallHandler>,
}

impl MethodDefinition {
    pub fn new(info: MethodInfo, handler: Arc<dyn ServerCallHandler>) -> Self {
        Self { info, handler }
    }

    pub fn info(&self) -> &MethodInfo {
        &self.info
    }

    pub fn handler(&self) -> &Arc<dyn ServerCallHandler> {
        &self.handler
    }
}

impl fmt::Debug for MethodDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDefinition")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

/// All methods of one service.
#[derive(Debug, Clone)]
pub struct ServiceDefinition {
    name: String,
    methods: Vec<MethodDefinition>,
}

impl ServiceDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: Vec::new(),
        }
    }

    /// Add a method. Its full name must belong to this service.
    pub fn with_method(mut self, method: MethodDefinition) -> Result<Self, Status> {
        if method.info().service_name() != self.name {
            return Err(Status::invalid_argument(format!(
                "method {} does not belong to service {}",
                method.info().full_name(),
                self.name
            )));
        }
        if self
            .methods
            .iter()
            .any(|m| m.info().full_name() == method.info().full_name())
        {
            return Err(Status::new(
                Code::AlreadyExists,
                format!("method {} added twice", method.info().full_name()),
            ));
        }
        self.methods.push(method);
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn methods(&self) -> &[MethodDefinition] {
        &self.methods
    }
}

/// Lookup table from full method name to definition.
#[derive(Debug, Clone, Default)]
pub struct HandlerRegistry {
    methods: HashMap<String, MethodDefinition>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every method of a service. Fails without partial
    /// registration if any method name is already taken.
    pub fn add_service(&mut self, service: ServiceDefinition) -> Result<(), Status> {
        if let Some(taken) = service
            .methods()
            .iter()
            .find(|m| self.methods.contains_key(m.info().full_name()))
        {
            return Err(Status::new(
                Code::AlreadyExists,
                format!("method {} already registered", taken.info().full_name()),
            ));
        }
        for method in service.methods {
            self.methods
                .insert(method.info().full_name().to_string(), method);
        }
        Ok(())
    }

    pub fn lookup(&self, full_name: &str) -> Option<&MethodDefinition> {
        self.methods.get(full_name)
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}
