//! Error types for the RBAC engine

use crate::graph::GraphError;
use crate::resource::{Permission, Resource};
use thiserror::Error;

/// RBAC engine errors
///
/// Every variant is terminal for the request that produced it. None of them
/// describe a transient fault, so callers should surface them as-is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RbacError {
    /// Referenced role does not exist
    #[error("{0} doesn't exist")]
    NotFound(String),

    /// Role already exists
    #[error("{0} already exists")]
    AlreadyExists(String),

    /// Requester lacks the privilege for the operation
    #[error("{0}")]
    Unauthorized(String),

    /// Permission is not legal for the resource kind
    #[error("Resource type {resource_type} does not support any of the requested permissions")]
    UnsupportedPermission {
        resource_type: &'static str,
        permission: Permission,
    },

    /// Membership change would create a cycle or duplicate an existing membership
    #[error("{0}")]
    InvalidGrant(String),

    /// Login rejected for the role being authenticated
    #[error("{0}")]
    AuthenticationFailed(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// External persistence rejected the mutation
    #[error("Storage error: {0}")]
    Storage(String),
}

impl RbacError {
    /// Generic rejection for role management statements
    pub fn insufficient_privileges(user: &str) -> Self {
        Self::Unauthorized(format!(
            "User {} does not have sufficient privileges to perform the requested operation",
            user
        ))
    }

    /// Rejection naming the missing permission and the resource it was checked on
    pub fn missing_permission(user: &str, permission: Permission, resource: &Resource) -> Self {
        Self::Unauthorized(format!(
            "{} has no {} permission on {} or any of its parents",
            user, permission, resource
        ))
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }
}

impl From<GraphError> for RbacError {
    fn from(err: GraphError) -> Self {
        match err {
            GraphError::UnknownRole(name) => Self::NotFound(name),
            GraphError::DuplicateRole(name) => Self::AlreadyExists(name),
            GraphError::AlreadyMember { .. } | GraphError::CircularMembership { .. } => {
                Self::InvalidGrant(err.to_string())
            }
        }
    }
}

/// Result type for RBAC operations
pub type Result<T> = std::result::Result<T, RbacError>;
