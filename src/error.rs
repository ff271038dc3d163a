//! Error types for ocean construction and per-frame resource resolution.

use thiserror::Error;

/// Ocean system errors
#[derive(Debug, Error)]
pub enum OceanError {
    #[error("Invalid configuration: {field}: {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    #[error("GPU device error: {message}")]
    Device { message: String },

    #[error("Resource not found in frame graph: {name}")]
    MissingResource { name: String },

    #[error("Resource {name} has the wrong kind (expected {expected})")]
    ResourceKind { name: String, expected: &'static str },

    #[error("Readback failed: {0}")]
    Readback(String),

    #[error("Failed to write {path}: {message}")]
    Capture { path: String, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl OceanError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }
}

impl From<wgpu::Error> for OceanError {
    fn from(err: wgpu::Error) -> Self {
        Self::Device {
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, OceanError>;
