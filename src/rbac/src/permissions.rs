//! Permission grant storage
//!
//! Grants are a set of (grantee, resource, permission) triples, indexed by
//! grantee and then resource. Granting a held permission is a no-op.

use crate::resource::{Permission, Resource};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// A single stored grant
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Grant {
    pub grantee: String,
    pub resource: Resource,
    pub permission: Permission,
}

impl Grant {
    pub fn new(grantee: impl Into<String>, resource: Resource, permission: Permission) -> Self {
        Self {
            grantee: grantee.into(),
            resource,
            permission,
        }
    }
}

/// Optional filters for listing grants, combined conjunctively
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionFilter {
    pub grantee: Option<String>,
    pub resource: Option<Resource>,
    pub permission: Option<Permission>,
}

impl PermissionFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of(mut self, grantee: impl Into<String>) -> Self {
        self.grantee = Some(grantee.into());
        self
    }

    pub fn on(mut self, resource: Resource) -> Self {
        self.resource = Some(resource);
        self
    }

    pub fn permission(mut self, permission: Permission) -> Self {
        self.permission = Some(permission);
        self
    }

    fn matches_target(&self, resource: &Resource, permission: Permission) -> bool {
        self.resource.as_ref().map_or(true, |r| r == resource)
            && self.permission.map_or(true, |p| p == permission)
    }
}

/// In-memory grant set
#[derive(Debug, Clone, Default)]
pub struct PermissionStore {
    grants: HashMap<String, HashMap<Resource, BTreeSet<Permission>>>,
}

impl PermissionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored grants
    pub fn len(&self) -> usize {
        self.grants
            .values()
            .flat_map(|by_resource| by_resource.values())
            .map(|permissions| permissions.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }

    /// Returns `true` if the grant was not already held
    pub fn grant(&mut self, grantee: &str, resource: &Resource, permission: Permission) -> bool {
        self.grants
            .entry(grantee.to_string())
            .or_default()
            .entry(resource.clone())
            .or_default()
            .insert(permission)
    }

    /// Returns `true` if the grant existed
    pub fn revoke(&mut self, grantee: &str, resource: &Resource, permission: Permission) -> bool {
        let Some(by_resource) = self.grants.get_mut(grantee) else {
            return false;
        };
        let Some(permissions) = by_resource.get_mut(resource) else {
            return false;
        };

        let removed = permissions.remove(&permission);
        if permissions.is_empty() {
            by_resource.remove(resource);
        }
        if by_resource.is_empty() {
            self.grants.remove(grantee);
        }
        removed
    }

    /// Direct grant check, no hierarchy walk
    pub fn has(&self, grantee: &str, resource: &Resource, permission: Permission) -> bool {
        self.grants
            .get(grantee)
            .and_then(|by_resource| by_resource.get(resource))
            .map_or(false, |permissions| permissions.contains(&permission))
    }

    /// Drop every grant on `resource` and on anything that goes away with it.
    /// Returns the number of grants removed.
    pub fn revoke_all_on(&mut self, resource: &Resource) -> usize {
        let mut removed = 0;
        for by_resource in self.grants.values_mut() {
            by_resource.retain(|r, permissions| {
                if r.falls_under(resource) {
                    removed += permissions.len();
                    false
                } else {
                    true
                }
            });
        }
        self.grants.retain(|_, by_resource| !by_resource.is_empty());
        removed
    }

    /// Drop grants held by `role` and grants on `<role role>`.
    /// Returns the number of grants removed.
    pub fn revoke_all_by_or_of(&mut self, role: &str) -> usize {
        let mut removed = self
            .grants
            .remove(role)
            .map(|by_resource| by_resource.values().map(|p| p.len()).sum())
            .unwrap_or(0);
        removed += self.revoke_all_on(&Resource::role(role));
        removed
    }

    /// Grants matching `filter`, sorted
    pub fn list(&self, filter: &PermissionFilter) -> Vec<Grant> {
        match &filter.grantee {
            Some(grantee) => self.list_for(std::iter::once(grantee.as_str()), filter),
            None => self.list_for(self.grants.keys().map(String::as_str), filter),
        }
    }

    /// Grants held by any of `grantees` that match the resource and
    /// permission parts of `filter`. The filter's own grantee is ignored.
    pub fn list_for<'a, I>(&self, grantees: I, filter: &PermissionFilter) -> Vec<Grant>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut out: Vec<Grant> = grantees
            .into_iter()
            .filter_map(|grantee| self.grants.get(grantee).map(|g| (grantee, g)))
            .flat_map(|(grantee, by_resource)| {
                by_resource.iter().flat_map(move |(resource, permissions)| {
                    permissions
                        .iter()
                        .map(move |permission| Grant::new(grantee, resource.clone(), *permission))
                })
            })
            .filter(|grant| filter.matches_target(&grant.resource, grant.permission))
            .collect();
        out.sort();
        out.dedup();
        out
    }
}
