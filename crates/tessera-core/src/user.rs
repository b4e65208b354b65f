use crate::tenant::TenantId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Staff role attached to a user account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Editor,
    Author,
    Contributor,
}

impl Role {
    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Admin => "admin",
            Role::Editor => "editor",
            Role::Author => "author",
            Role::Contributor => "contributor",
        };
        write!(f, "{s}")
    }
}

impl FromStr for Role {
    type Err = crate::error::CoreError;

    fn from_str(s: &str) -> crate::error::Result<Self> {
        match s {
            "admin" => Ok(Role::Admin),
            "editor" => Ok(Role::Editor),
            "author" => Ok(Role::Author),
            "contributor" => Ok(Role::Contributor),
            other => Err(crate::error::CoreError::invalid_role(other)),
        }
    }
}

/// Authenticated user snapshot carried through the request pipeline.
///
/// This is the value cached against a session id. It deliberately excludes
/// credentials; password hashes never leave the auth backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Stable account id
    pub id: Uuid,
    /// Login email, unique per tenant
    pub email: String,
    /// Display name, if the account has one
    pub name: Option<String>,
    /// Tenant the account belongs to. `None` for platform-level accounts
    /// that are not scoped to a single tenant.
    pub tenant_id: Option<TenantId>,
    /// Staff role
    pub role: Role,
    /// Fine-grained permission keys granted in addition to the role
    pub permissions: Vec<String>,
}

impl User {
    pub fn new(id: Uuid, email: impl Into<String>, role: Role) -> Self {
        Self {
            id,
            email: email.into(),
            name: None,
            tenant_id: None,
            role,
            permissions: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_tenant(mut self, tenant: TenantId) -> Self {
        self.tenant_id = Some(tenant);
        self
    }

    pub fn with_permissions(mut self, permissions: Vec<String>) -> Self {
        self.permissions = permissions;
        self
    }

    /// Admins hold every permission; everyone else needs an explicit grant.
    pub fn has_permission(&self, permission: &str) -> bool {
        self.role.is_admin() || self.permissions.iter().any(|p| p == permission)
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}
