//! Error types for tenant routing and registration.

use sbase_core::DriverError;
use thiserror::Error;

/// Errors raised while registering or routing models.
#[derive(Debug, Error)]
pub enum Error {
    /// Composition of a declaration failed.
    #[error(transparent)]
    Compose(#[from] sbase_core::Error),

    /// The storage driver failed.
    #[error(transparent)]
    Driver(#[from] DriverError),

    /// The tenancy function named a tenant that has no physical model.
    #[error("unknown tenant `{0}`")]
    UnknownTenant(String),

    /// An operation was routed with the wrong call shape.
    #[error("operation `{0}` cannot be routed this way")]
    Unroutable(&'static str),

    /// Invalid multi-tenancy settings.
    #[error("invalid multi-tenancy config: {0}")]
    InvalidConfig(String),

    /// Settings could not be parsed.
    #[error("failed to parse settings: {0}")]
    Settings(#[from] serde_json::Error),
}

/// Result type for tenancy operations.
pub type Result<T> = std::result::Result<T, Error>;
