//! Infrastructure adapters and runtime bootstrap.

pub mod error;
pub mod memory;
pub mod telemetry;

use std::path::Path;

use tracing::info;

use crate::config::{self, Settings};

use self::error::InfraError;

/// Load settings and install logging, the startup sequence of a host process.
pub fn bootstrap(config_file: Option<&Path>) -> Result<Settings, InfraError> {
    let settings = config::load(config_file)?;
    telemetry::init(&settings.logging)?;
    info!(
        source = "infra",
        cache_enabled = settings.cache.enabled,
        solid = settings.cache.solid,
        memory_capacity = settings.cache.memory_capacity,
        "Blog cache settings loaded"
    );
    Ok(settings)
}
