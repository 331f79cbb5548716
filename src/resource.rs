//! Resource rows, request context and caller roles

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::kind::{ResourceId, ResourceKind};
use crate::metadata::{EffectiveMetadata, MetadataPair};
use crate::{Error, Result};

/// Field values keyed by canonical name. Forward edges hold the target ID.
pub type Fields = BTreeMap<String, Value>;

/// A persisted resource of any kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub tenant_id: String,
    pub fields: Fields,
    /// Local metadata (hierarchical kinds only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metadata: Vec<MetadataPair>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Resource {
    pub fn kind(&self) -> ResourceKind {
        self.id.kind()
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name).filter(|v| !v.is_null())
    }

    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.field(name).and_then(Value::as_str)
    }

    /// Target of a forward edge, if set
    pub fn edge_target(&self, edge: &str) -> Option<&str> {
        self.str_field(edge)
    }
}

/// A resource together with its computed metadata
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceView {
    #[serde(flatten)]
    pub resource: Resource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effective: Option<EffectiveMetadata>,
}

/// Client payload for create and update.
///
/// Keys may be given in either declared or JSON casing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Draft {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Vec<MetadataPair>>,
    #[serde(flatten)]
    pub fields: Fields,
}

impl Draft {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    pub fn with_metadata(mut self, pairs: Vec<MetadataPair>) -> Self {
        self.metadata = Some(pairs);
        self
    }
}

/// Caller role. Only `Manager` may write privileged fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Member,
    Manager,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Member => "member",
            Role::Manager => "manager",
        }
    }

    pub fn is_privileged(&self) -> bool {
        matches!(self, Role::Manager)
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "member" => Ok(Role::Member),
            "manager" => Ok(Role::Manager),
            _ => Err(Error::invalid(format!("unknown role: {}", s))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-request context: tenant scope, caller role and deadline
#[derive(Debug, Clone)]
pub struct Context {
    tenant_id: String,
    role: Role,
    deadline: Option<Instant>,
}

impl Context {
    pub fn new(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            role: Role::Member,
            deadline: None,
        }
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Fail if the tenant is missing or the deadline has passed
    pub fn check(&self) -> Result<()> {
        if self.tenant_id.is_empty() {
            return Err(Error::invalid("tenant ID must not be empty"));
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(Error::Cancelled(format!(
                    "deadline exceeded for tenant {}",
                    self.tenant_id
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn test_context_checks() {
        assert!(Context::new("t1").check().is_ok());
        assert_eq!(
            Context::new("").check().unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );

        let expired = Context::new("t1").with_deadline(Instant::now() - Duration::from_millis(1));
        assert_eq!(expired.check().unwrap_err().kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!("manager".parse::<Role>().unwrap(), Role::Manager);
        assert!(Role::Manager.is_privileged());
        assert!(!Role::default().is_privileged());
        assert!("root".parse::<Role>().is_err());
    }

    #[test]
    fn test_draft_from_json() {
        let draft: Draft = serde_json::from_value(serde_json::json!({
            "name": "edge-1",
            "desiredState": "HOST_STATE_ONBOARDED",
            "metadata": [{"key": "env", "value": "prod"}]
        }))
        .unwrap();
        assert_eq!(draft.fields.len(), 2);
        assert_eq!(draft.metadata.unwrap()[0].key, "env");
    }

    #[test]
    fn test_null_fields_read_as_unset() {
        let resource = Resource {
            id: ResourceId::generate(ResourceKind::Host),
            tenant_id: "t1".into(),
            fields: Fields::from([("site".to_string(), Value::Null)]),
            metadata: Vec::new(),
            created_at: 0,
            updated_at: 0,
        };
        assert!(resource.edge_target("site").is_none());
    }
}
