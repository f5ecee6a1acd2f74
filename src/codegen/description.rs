use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::transport::MethodType;

/// A service to generate stubs for, as written in a `service.toml`.
///
/// ```toml
/// package = "helloworld"
/// name = "Greeter"
///
/// [[methods]]
/// name = "SayHello"
/// request = "HelloRequest"
/// response = "HelloReply"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ServiceDescription {
    pub package: String,
    pub name: String,
    #[serde(default)]
    pub methods: Vec<MethodDescription>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct MethodDescription {
    pub name: String,
    /// Rust path of the request message type.
    pub request: String,
    /// Rust path of the response message type.
    pub response: String,
    #[serde(default)]
    pub client_streaming: bool,
    #[serde(default)]
    pub server_streaming: bool,
}

impl MethodDescription {
    pub fn method_type(&self) -> MethodType {
        MethodType::from_streaming(self.client_streaming, self.server_streaming)
    }
}

impl ServiceDescription {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let description: Self = toml::from_str(content)?;
        description.validate()?;
        Ok(description)
    }

    /// `package.Name`, the prefix of every method's full name.
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.package, self.name)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.package.is_empty() || !self.package.split('.').all(is_identifier) {
            return Err(ConfigError::invalid(format!(
                "package '{}' must be dot-separated identifiers",
                self.package
            )));
        }
        if !is_identifier(&self.name) {
            return Err(ConfigError::invalid(format!(
                "service name '{}' is not an identifier",
                self.name
            )));
        }

        let mut seen = HashSet::new();
        for method in &self.methods {
            if !is_identifier(&method.name) {
                return Err(ConfigError::invalid(format!(
                    "method name '{}' is not an identifier",
                    method.name
                )));
            }
            for (role, path) in [("request", &method.request), ("response", &method.response)] {
                if !is_type_path(path) {
                    return Err(ConfigError::invalid(format!(
                        "{role} type '{path}' of method {} is not a type path",
                        method.name
                    )));
                }
            }
            if !seen.insert(method.name.as_str()) {
                return Err(ConfigError::invalid(format!(
                    "method {} is declared twice",
                    method.name
                )));
            }
        }
        Ok(())
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// `Foo`, `crate::pb::Foo` or `::pb::Foo`.
fn is_type_path(s: &str) -> bool {
    let s = s.strip_prefix("::").unwrap_or(s);
    !s.is_empty() && s.split("::").all(is_identifier)
}
