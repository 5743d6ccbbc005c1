//! Shared RBAC state
//!
//! The role table (role records plus the membership graph) and the
//! permission store are each guarded by a single-writer, multi-reader lock.
//! Writers that need both always take the role table first.

use crate::cache::ResolvedPrincipal;
use crate::error::{RbacError, Result};
use crate::graph::RoleGraph;
use crate::permissions::PermissionStore;
use crate::store::{AuthStore, Mutation};
use crate::types::Role;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Role records and their membership graph
#[derive(Debug, Default)]
pub struct RoleTable {
    roles: HashMap<String, Role>,
    graph: RoleGraph,
}

impl RoleTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.roles.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Role> {
        self.roles.get(name)
    }

    /// Look up a role, failing with `NotFound`
    pub fn require(&self, name: &str) -> Result<&Role> {
        self.roles
            .get(name)
            .ok_or_else(|| RbacError::NotFound(name.to_string()))
    }

    pub fn graph(&self) -> &RoleGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut RoleGraph {
        &mut self.graph
    }

    pub fn names(&self) -> BTreeSet<String> {
        self.graph.roles()
    }

    pub fn insert(&mut self, role: Role) -> Result<()> {
        self.graph.add_role(&role.name)?;
        self.roles.insert(role.name.clone(), role);
        Ok(())
    }

    pub fn get_mut(&mut self, name: &str) -> Result<&mut Role> {
        self.roles
            .get_mut(name)
            .ok_or_else(|| RbacError::NotFound(name.to_string()))
    }

    /// Remove a role and every membership edge touching it
    pub fn remove(&mut self, name: &str) -> Result<Role> {
        self.graph.remove_role(name)?;
        self.roles
            .remove(name)
            .ok_or_else(|| RbacError::NotFound(name.to_string()))
    }

    /// Superuser status through the role's own closure
    pub fn is_superuser(&self, name: &str) -> Result<bool> {
        let closure = self.graph.members_of(name, true)?;
        Ok(closure
            .iter()
            .filter_map(|r| self.roles.get(r))
            .any(|r| r.is_superuser))
    }

    /// Resolve a principal's effective role set and superuser status
    pub fn resolve(&self, name: &str) -> Result<ResolvedPrincipal> {
        let roles = self.graph.members_of(name, true)?;
        let is_superuser = roles
            .iter()
            .filter_map(|r| self.roles.get(r))
            .any(|r| r.is_superuser);

        Ok(ResolvedPrincipal {
            name: name.to_string(),
            roles,
            is_superuser,
        })
    }
}

/// Role table, permission store and the persistence seam behind them
pub struct Catalog {
    pub(crate) roles: RwLock<RoleTable>,
    pub(crate) permissions: RwLock<PermissionStore>,
    store: Arc<dyn AuthStore>,
}

impl Catalog {
    pub fn new(store: Arc<dyn AuthStore>) -> Self {
        Self {
            roles: RwLock::new(RoleTable::new()),
            permissions: RwLock::new(PermissionStore::new()),
            store,
        }
    }

    /// Hand a mutation to durable storage. Callers apply it locally only
    /// after this returns `Ok`, while still holding their write locks.
    pub(crate) async fn persist(&self, mutation: &Mutation) -> Result<()> {
        debug!("Persisting {} mutation", mutation.op());
        self.store.persist(mutation).await
    }
}
