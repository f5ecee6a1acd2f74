//! Rust stub generation from service descriptions.
//!
//! A `service.toml` names a service and its methods; [`generate`] renders
//! the method descriptors, a typed client stub, a server trait and the
//! function that binds a trait implementation to a `ServiceDefinition`.

mod description;
mod emit;

pub use description::{MethodDescription, ServiceDescription};
pub use emit::generate;

use std::path::Path;

use crate::error::ConfigError;

const LOG_TARGET: &str = "nagare::codegen";

/// Load a service description and render its Rust source.
pub fn generate_from_file(path: &Path) -> Result<String, ConfigError> {
    let description = ServiceDescription::load(path)?;
    log::debug!(
        target: LOG_TARGET,
        "Generating {} methods for {}",
        description.methods.len(),
        description.full_name()
    );
    Ok(generate(&description))
}
