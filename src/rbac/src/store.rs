//! Persistence seam
//!
//! Every structural write is handed to an [`AuthStore`] before it is applied
//! to the in-memory state. If the store rejects the mutation, nothing is
//! applied locally, so a grant that never committed is never visible.

use crate::error::{RbacError, Result};
use crate::permissions::Grant;
use crate::resource::{Permission, Resource};
use crate::types::{Role, RoleChanges};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A committed change to roles, memberships or grants
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Mutation {
    CreateRole {
        role: Role,
        /// Creator permissions granted alongside the role
        grants: Vec<Grant>,
    },
    AlterRole {
        name: String,
        changes: RoleChanges,
    },
    DropRole {
        name: String,
    },
    GrantRole {
        member: String,
        role: String,
    },
    RevokeRole {
        member: String,
        role: String,
    },
    GrantPermissions {
        grantee: String,
        resource: Resource,
        permissions: BTreeSet<Permission>,
    },
    RevokePermissions {
        grantee: String,
        resource: Resource,
        permissions: BTreeSet<Permission>,
    },
    DropResource {
        resource: Resource,
    },
}

impl Mutation {
    /// Short operation name for logs
    pub fn op(&self) -> &'static str {
        match self {
            Self::CreateRole { .. } => "create_role",
            Self::AlterRole { .. } => "alter_role",
            Self::DropRole { .. } => "drop_role",
            Self::GrantRole { .. } => "grant_role",
            Self::RevokeRole { .. } => "revoke_role",
            Self::GrantPermissions { .. } => "grant_permissions",
            Self::RevokePermissions { .. } => "revoke_permissions",
            Self::DropResource { .. } => "drop_resource",
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| RbacError::Storage(e.to_string()))
    }
}

/// Durable storage for role and permission changes
#[async_trait]
pub trait AuthStore: Send + Sync {
    /// Persist a mutation. Returning an error aborts the write.
    async fn persist(&self, mutation: &Mutation) -> Result<()>;
}

/// In-memory store keeping an append-only log of mutations
pub struct InMemoryAuthStore {
    log: Arc<RwLock<Vec<Mutation>>>,
}

impl InMemoryAuthStore {
    pub fn new() -> Self {
        Self {
            log: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Snapshot of the committed mutations, oldest first
    pub async fn mutations(&self) -> Vec<Mutation> {
        self.log.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.log.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.log.read().await.is_empty()
    }
}

impl Default for InMemoryAuthStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthStore for InMemoryAuthStore {
    async fn persist(&self, mutation: &Mutation) -> Result<()> {
        let mut log = self.log.write().await;
        log.push(mutation.clone());
        Ok(())
    }
}
