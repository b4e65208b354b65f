use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Tenant id used when a deployment runs without explicit tenants.
pub const DEFAULT_TENANT: &str = "default";

/// Identifier of a tenant site.
///
/// Tenant ids double as subdomain labels, so they follow DNS label rules:
/// lowercase alphanumerics and hyphens, no leading or trailing hyphen,
/// at most 63 characters.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantId(String);

impl TenantId {
    /// Create a tenant id, validating the label rules.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        validate_label(&id)?;
        Ok(Self(id))
    }

    /// The tenant id for single-site deployments and local hosts.
    pub fn default_tenant() -> Self {
        Self(DEFAULT_TENANT.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_default(&self) -> bool {
        self.0 == DEFAULT_TENANT
    }
}

fn validate_label(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(CoreError::invalid_tenant_id("tenant id cannot be empty"));
    }
    if id.len() > 63 {
        return Err(CoreError::invalid_tenant_id(format!(
            "tenant id '{id}' exceeds 63 characters"
        )));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(CoreError::invalid_tenant_id(format!(
            "tenant id '{id}' contains characters outside [a-z0-9-]"
        )));
    }
    if id.starts_with('-') || id.ends_with('-') {
        return Err(CoreError::invalid_tenant_id(format!(
            "tenant id '{id}' cannot start or end with a hyphen"
        )));
    }
    Ok(())
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TenantId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for TenantId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<TenantId> for String {
    fn from(id: TenantId) -> Self {
        id.0
    }
}

impl AsRef<str> for TenantId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
