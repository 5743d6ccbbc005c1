//! Core role types and listing rows

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Opaque password credential. Verification happens outside the engine, so
/// the value is only stored and checked for presence.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// A role record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Unique role name
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<Credential>,

    /// Whether this role may be used to log in. Never inherited.
    pub can_login: bool,

    /// The role's own superuser flag, before membership is considered
    pub is_superuser: bool,

    /// Free-form options, reported by role listings
    #[serde(default)]
    pub options: BTreeMap<String, String>,

    pub created_at: DateTime<Utc>,
}

impl Role {
    pub fn new(name: impl Into<String>, options: RoleOptions) -> Self {
        Self {
            name: name.into(),
            password: options.password,
            can_login: options.login,
            is_superuser: options.superuser,
            options: options.custom,
            created_at: Utc::now(),
        }
    }

    /// Apply the fields present in `changes`
    pub fn apply(&mut self, changes: &RoleChanges) {
        if let Some(password) = &changes.password {
            self.password = Some(password.clone());
        }
        if let Some(login) = changes.login {
            self.can_login = login;
        }
        if let Some(superuser) = changes.superuser {
            self.is_superuser = superuser;
        }
        if let Some(custom) = &changes.custom {
            self.options = custom.clone();
        }
    }
}

/// Options for CREATE ROLE. Roles default to no login and no superuser.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleOptions {
    pub password: Option<Credential>,
    pub login: bool,
    pub superuser: bool,
    #[serde(default)]
    pub custom: BTreeMap<String, String>,
}

impl RoleOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(Credential::new(password));
        self
    }

    pub fn with_login(mut self, login: bool) -> Self {
        self.login = login;
        self
    }

    pub fn with_superuser(mut self, superuser: bool) -> Self {
        self.superuser = superuser;
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom.insert(key.into(), value.into());
        self
    }
}

/// Fields changed by ALTER ROLE; `None` leaves a field untouched
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleChanges {
    pub password: Option<Credential>,
    pub login: Option<bool>,
    pub superuser: Option<bool>,
    pub custom: Option<BTreeMap<String, String>>,
}

impl RoleChanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(Credential::new(password));
        self
    }

    pub fn login(mut self, login: bool) -> Self {
        self.login = Some(login);
        self
    }

    pub fn superuser(mut self, superuser: bool) -> Self {
        self.superuser = Some(superuser);
        self
    }

    pub fn custom(mut self, custom: BTreeMap<String, String>) -> Self {
        self.custom = Some(custom);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.password.is_none() && self.login.is_none() && self.superuser.is_none() && self.custom.is_none()
    }

    /// True when the only change is a new password
    pub fn is_password_only(&self) -> bool {
        self.password.is_some() && self.login.is_none() && self.superuser.is_none() && self.custom.is_none()
    }
}

/// Row of LIST ROLES
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRow {
    pub name: String,

    /// Superuser status inherited through the listed role's own memberships
    pub is_superuser: bool,

    /// The listed role's own login flag
    pub can_login: bool,

    pub options: BTreeMap<String, String>,
}

/// Row of LIST USERS
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRow {
    pub name: String,
    pub is_superuser: bool,
}

/// Row of LIST PERMISSIONS
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PermissionRow {
    pub role: String,
    pub resource: String,
    pub permission: String,
}

impl PermissionRow {
    pub fn new(role: impl Into<String>, resource: impl Into<String>, permission: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            resource: resource.into(),
            permission: permission.into(),
        }
    }
}
