//! Resource hierarchy and permission tables
//!
//! Resources form three independent trees, each rooted at an "ALL" node:
//!
//! ```text
//! <all roles>      → <role r>
//! <all keyspaces>  → <keyspace ks>          → <table ks.cf>
//! <all functions>  → <all functions in ks>  → <function ks.f(int, int)>
//! ```
//!
//! Parents are computed from a resource's identity and never stored. Every
//! resource kind carries a fixed set of legal permissions, looked up from the
//! tables at the bottom of this file.

use crate::error::{RbacError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Permission kinds understood by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Permission {
    Create,
    Alter,
    Drop,
    Select,
    Modify,
    Authorize,
    Describe,
    Execute,
}

impl Permission {
    pub const ALL: [Permission; 8] = [
        Permission::Create,
        Permission::Alter,
        Permission::Drop,
        Permission::Select,
        Permission::Modify,
        Permission::Authorize,
        Permission::Describe,
        Permission::Execute,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Alter => "ALTER",
            Self::Drop => "DROP",
            Self::Select => "SELECT",
            Self::Modify => "MODIFY",
            Self::Authorize => "AUTHORIZE",
            Self::Describe => "DESCRIBE",
            Self::Execute => "EXECUTE",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = RbacError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| RbacError::InvalidInput(format!("Unknown permission: {}", s)))
    }
}

/// Whether a function resource is a scalar function or an aggregate
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionKind {
    #[default]
    Scalar,
    Aggregate,
}

/// Kind of a resource, used to look up its permission tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    AllRoles,
    Role,
    AllKeyspaces,
    Keyspace,
    Table,
    AllFunctions,
    KeyspaceFunctions,
    Function(FunctionKind),
}

impl ResourceKind {
    /// Name of the resource family, as reported in validation errors
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::AllRoles | Self::Role => "RoleResource",
            Self::AllKeyspaces | Self::Keyspace | Self::Table => "DataResource",
            Self::AllFunctions | Self::KeyspaceFunctions | Self::Function(_) => "FunctionResource",
        }
    }
}

/// A function identified by keyspace, name and argument types.
///
/// `kind` is carried for permission lookups but is not part of the identity:
/// a scalar function and an aggregate can never share a signature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionRef {
    pub keyspace: String,
    pub name: String,
    pub arg_types: Vec<String>,
    #[serde(default)]
    pub kind: FunctionKind,
}

impl FunctionRef {
    fn key(&self) -> (&str, &str, &[String]) {
        (&self.keyspace, &self.name, &self.arg_types)
    }
}

impl PartialEq for FunctionRef {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for FunctionRef {}

impl Hash for FunctionRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl PartialOrd for FunctionRef {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FunctionRef {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

/// A securable entity
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Resource {
    AllRoles,
    Role { name: String },
    AllKeyspaces,
    Keyspace { name: String },
    Table { keyspace: String, name: String },
    AllFunctions,
    KeyspaceFunctions { keyspace: String },
    Function(FunctionRef),
}

impl Resource {
    pub fn role(name: impl Into<String>) -> Self {
        Self::Role { name: name.into() }
    }

    pub fn keyspace(name: impl Into<String>) -> Self {
        Self::Keyspace { name: name.into() }
    }

    pub fn table(keyspace: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Table {
            keyspace: keyspace.into(),
            name: name.into(),
        }
    }

    pub fn keyspace_functions(keyspace: impl Into<String>) -> Self {
        Self::KeyspaceFunctions {
            keyspace: keyspace.into(),
        }
    }

    /// Scalar function with the given argument types
    pub fn function(keyspace: impl Into<String>, name: impl Into<String>, arg_types: &[&str]) -> Self {
        Self::function_of_kind(keyspace, name, arg_types, FunctionKind::Scalar)
    }

    /// Aggregate function with the given argument types
    pub fn aggregate(keyspace: impl Into<String>, name: impl Into<String>, arg_types: &[&str]) -> Self {
        Self::function_of_kind(keyspace, name, arg_types, FunctionKind::Aggregate)
    }

    fn function_of_kind(
        keyspace: impl Into<String>,
        name: impl Into<String>,
        arg_types: &[&str],
        kind: FunctionKind,
    ) -> Self {
        Self::Function(FunctionRef {
            keyspace: keyspace.into(),
            name: name.into(),
            arg_types: arg_types.iter().map(|t| t.to_string()).collect(),
            kind,
        })
    }

    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::AllRoles => ResourceKind::AllRoles,
            Self::Role { .. } => ResourceKind::Role,
            Self::AllKeyspaces => ResourceKind::AllKeyspaces,
            Self::Keyspace { .. } => ResourceKind::Keyspace,
            Self::Table { .. } => ResourceKind::Table,
            Self::AllFunctions => ResourceKind::AllFunctions,
            Self::KeyspaceFunctions { .. } => ResourceKind::KeyspaceFunctions,
            Self::Function(f) => ResourceKind::Function(f.kind),
        }
    }

    /// Structural parent; `None` for the three roots
    pub fn parent(&self) -> Option<Resource> {
        match self {
            Self::AllRoles | Self::AllKeyspaces | Self::AllFunctions => None,
            Self::Role { .. } => Some(Self::AllRoles),
            Self::Keyspace { .. } => Some(Self::AllKeyspaces),
            Self::Table { keyspace, .. } => Some(Self::keyspace(keyspace.clone())),
            Self::KeyspaceFunctions { .. } => Some(Self::AllFunctions),
            Self::Function(f) => Some(Self::keyspace_functions(f.keyspace.clone())),
        }
    }

    /// This resource followed by each of its ancestors up to the root
    pub fn chain(&self) -> impl Iterator<Item = Resource> {
        std::iter::successors(Some(self.clone()), |r| r.parent())
    }

    pub fn is_root(&self) -> bool {
        self.parent().is_none()
    }

    /// Name of the role when this is a `<role r>` resource
    pub fn role_name(&self) -> Option<&str> {
        match self {
            Self::Role { name } => Some(name),
            _ => None,
        }
    }

    /// Keyspace this resource lives in, if any
    pub fn keyspace_name(&self) -> Option<&str> {
        match self {
            Self::Keyspace { name } => Some(name),
            Self::Table { keyspace, .. } | Self::KeyspaceFunctions { keyspace } => Some(keyspace),
            Self::Function(f) => Some(&f.keyspace),
            _ => None,
        }
    }

    /// Whether dropping `dropped` also removes this resource.
    ///
    /// Covers the resource itself, its structural descendants, and for a
    /// keyspace the function collection and functions declared in it, which
    /// live in a separate tree.
    pub fn falls_under(&self, dropped: &Resource) -> bool {
        if self.chain().any(|r| &r == dropped) {
            return true;
        }
        match (dropped, self) {
            (Self::Keyspace { name }, Self::KeyspaceFunctions { .. } | Self::Function(_)) => {
                self.keyspace_name() == Some(name.as_str())
            }
            _ => false,
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllRoles => write!(f, "<all roles>"),
            Self::Role { name } => write!(f, "<role {}>", name),
            Self::AllKeyspaces => write!(f, "<all keyspaces>"),
            Self::Keyspace { name } => write!(f, "<keyspace {}>", name),
            Self::Table { keyspace, name } => write!(f, "<table {}.{}>", keyspace, name),
            Self::AllFunctions => write!(f, "<all functions>"),
            Self::KeyspaceFunctions { keyspace } => write!(f, "<all functions in {}>", keyspace),
            Self::Function(func) => write!(
                f,
                "<function {}.{}({})>",
                func.keyspace,
                func.name,
                func.arg_types.join(", ")
            ),
        }
    }
}

/// Permissions requested by a GRANT or REVOKE
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PermissionSet {
    /// The `ALL` keyword, expanded per resource kind
    All,
    Only(BTreeSet<Permission>),
}

impl PermissionSet {
    /// Resolve to concrete permissions for `resource`, rejecting any that the
    /// resource kind does not accept
    pub fn resolve(&self, resource: &Resource) -> Result<BTreeSet<Permission>> {
        match self {
            Self::All => Ok(ResourceHierarchy::all_permission_expansion(resource.kind())),
            Self::Only(permissions) => {
                if permissions.is_empty() {
                    return Err(RbacError::InvalidInput("No permissions requested".to_string()));
                }
                for permission in permissions {
                    ResourceHierarchy::validate(resource, *permission)?;
                }
                Ok(permissions.clone())
            }
        }
    }
}

impl From<Permission> for PermissionSet {
    fn from(permission: Permission) -> Self {
        Self::Only(BTreeSet::from([permission]))
    }
}

impl<const N: usize> From<[Permission; N]> for PermissionSet {
    fn from(permissions: [Permission; N]) -> Self {
        Self::Only(permissions.into_iter().collect())
    }
}

use Permission::*;

const DATA_COLLECTION: &[Permission] = &[Create, Alter, Drop, Select, Modify, Authorize];
const DATA_TABLE: &[Permission] = &[Alter, Drop, Select, Modify, Authorize];
const ROLE_COLLECTION: &[Permission] = &[Create, Alter, Drop, Describe, Authorize];
const ROLE_SINGLE: &[Permission] = &[Alter, Drop, Authorize];
const FUNCTION_COLLECTION: &[Permission] = &[Create, Alter, Drop, Authorize, Execute];
const FUNCTION_SINGLE: &[Permission] = &[Alter, Drop, Authorize, Execute];

/// Static typing of resources: parents, legal permissions and ALL expansion
pub struct ResourceHierarchy;

impl ResourceHierarchy {
    pub fn parent_of(resource: &Resource) -> Option<Resource> {
        resource.parent()
    }

    /// Permissions a resource kind accepts in GRANT and REVOKE
    pub fn legal_permissions(kind: ResourceKind) -> &'static [Permission] {
        match kind {
            ResourceKind::AllKeyspaces | ResourceKind::Keyspace => DATA_COLLECTION,
            ResourceKind::Table => DATA_TABLE,
            ResourceKind::AllRoles => ROLE_COLLECTION,
            ResourceKind::Role => ROLE_SINGLE,
            ResourceKind::AllFunctions | ResourceKind::KeyspaceFunctions => FUNCTION_COLLECTION,
            // Aggregates take the same set; EXECUTE on the aggregate does not
            // extend to its state or final functions.
            ResourceKind::Function(FunctionKind::Scalar)
            | ResourceKind::Function(FunctionKind::Aggregate) => FUNCTION_SINGLE,
        }
    }

    /// Meaning of the `ALL` keyword for a resource kind.
    ///
    /// Single objects never expand to CREATE since they already exist, and the
    /// role tree names its read permission DESCRIBE rather than SELECT.
    pub fn all_permission_expansion(kind: ResourceKind) -> BTreeSet<Permission> {
        Self::legal_permissions(kind).iter().copied().collect()
    }

    /// Permissions automatically granted to whoever creates `resource`
    pub fn creator_permissions(resource: &Resource) -> BTreeSet<Permission> {
        Self::all_permission_expansion(resource.kind())
    }

    pub fn validate(resource: &Resource, permission: Permission) -> Result<()> {
        let kind = resource.kind();
        if Self::legal_permissions(kind).contains(&permission) {
            Ok(())
        } else {
            Err(RbacError::UnsupportedPermission {
                resource_type: kind.type_name(),
                permission,
            })
        }
    }
}
