//! The remote API surface resource adapters talk to.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A resource as returned by a describe call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Server-assigned identifier
    pub id: String,
    /// Resource kind, e.g. `"volume"`
    pub kind: String,
    /// Lifecycle state at the time of the call
    pub state: String,
}

/// Errors returned by the control plane API.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    /// The resource does not exist, or is not visible to reads yet.
    #[error("{id}: resource not found")]
    NotFound {
        /// Identifier that was looked up
        id: String,
    },

    /// Request rate exceeded.
    #[error("request limit exceeded")]
    Throttled,

    /// Request was rejected as invalid.
    #[error("invalid parameter value: {0}")]
    InvalidParameter(String),

    /// Caller is not allowed to perform the request.
    #[error("access denied")]
    AccessDenied,
}

impl ApiError {
    /// Whether the error means the resource does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound { .. })
    }

    /// Whether the request was throttled.
    pub fn is_throttled(&self) -> bool {
        matches!(self, ApiError::Throttled)
    }
}

/// Minimal CRUD surface of an eventually consistent control plane.
///
/// Mutations are acknowledged immediately; their effects become visible to
/// `describe` some time later.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Submit creation of a resource of `kind`.
    async fn create(&self, kind: &str) -> Result<Resource, ApiError>;

    /// Read the current state of `id`.
    async fn describe(&self, id: &str) -> Result<Resource, ApiError>;

    /// Submit deletion of `id`.
    async fn delete(&self, id: &str) -> Result<(), ApiError>;

    /// Create a function that executes as `role`.
    ///
    /// Fails while the role has not propagated to the function service.
    async fn create_function(&self, name: &str, role: &str) -> Result<Resource, ApiError>;
}
