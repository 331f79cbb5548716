//! Resource kinds and resource identifiers
//!
//! The kind set is closed and process-wide constant. Every resource ID
//! carries its kind as a prefix: `<prefix>-<8 hex>`, e.g. `host-1a2b3c4d`.

use crate::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Enumerated type tag for every persisted resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// Physical hierarchy node, may nest under another region
    Region,
    /// Organizational unit, logical hierarchy node
    Ou,
    /// A location that belongs to one region and one OU
    Site,
    /// Infrastructure provider (bare metal, cloud)
    Provider,
    /// A physical machine placed at a site
    Host,
    /// A workload running on a host
    Instance,
    /// Operating system image
    Os,
    /// Network endpoint attached to a host
    Endpoint,
}

impl ResourceKind {
    /// Get the string representation of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Region => "region",
            ResourceKind::Ou => "ou",
            ResourceKind::Site => "site",
            ResourceKind::Provider => "provider",
            ResourceKind::Host => "host",
            ResourceKind::Instance => "instance",
            ResourceKind::Os => "os",
            ResourceKind::Endpoint => "endpoint",
        }
    }

    /// Prefix used when generating resource IDs of this kind
    pub fn id_prefix(&self) -> &'static str {
        match self {
            ResourceKind::Instance => "inst",
            other => other.as_str(),
        }
    }

    /// Message type name used in filter declarations, e.g. `has(Site)`
    pub fn message_name(&self) -> &'static str {
        match self {
            ResourceKind::Region => "Region",
            ResourceKind::Ou => "Ou",
            ResourceKind::Site => "Site",
            ResourceKind::Provider => "Provider",
            ResourceKind::Host => "Host",
            ResourceKind::Instance => "Instance",
            ResourceKind::Os => "OperatingSystem",
            ResourceKind::Endpoint => "Endpoint",
        }
    }

    /// Backing table name
    pub fn table(&self) -> &'static str {
        match self {
            ResourceKind::Region => "regions",
            ResourceKind::Ou => "ous",
            ResourceKind::Site => "sites",
            ResourceKind::Provider => "providers",
            ResourceKind::Host => "hosts",
            ResourceKind::Instance => "instances",
            ResourceKind::Os => "operating_systems",
            ResourceKind::Endpoint => "endpoints",
        }
    }

    /// Kinds that carry local metadata and take part in inheritance
    pub fn is_hierarchical(&self) -> bool {
        matches!(
            self,
            ResourceKind::Region | ResourceKind::Ou | ResourceKind::Site | ResourceKind::Host
        )
    }

    /// Kinds that carry a desired/current lifecycle state pair
    pub fn is_stateful(&self) -> bool {
        matches!(self, ResourceKind::Host | ResourceKind::Instance)
    }

    /// Get all resource kinds
    pub fn all() -> &'static [ResourceKind] {
        &[
            ResourceKind::Region,
            ResourceKind::Ou,
            ResourceKind::Site,
            ResourceKind::Provider,
            ResourceKind::Host,
            ResourceKind::Instance,
            ResourceKind::Os,
            ResourceKind::Endpoint,
        ]
    }

    fn from_prefix(prefix: &str) -> Option<ResourceKind> {
        ResourceKind::all()
            .iter()
            .copied()
            .find(|kind| kind.id_prefix() == prefix)
    }
}

impl FromStr for ResourceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "region" | "regions" => Ok(ResourceKind::Region),
            "ou" | "ous" => Ok(ResourceKind::Ou),
            "site" | "sites" => Ok(ResourceKind::Site),
            "provider" | "providers" => Ok(ResourceKind::Provider),
            "host" | "hosts" => Ok(ResourceKind::Host),
            "instance" | "instances" | "inst" => Ok(ResourceKind::Instance),
            "os" | "operatingsystem" | "operating_system" => Ok(ResourceKind::Os),
            "endpoint" | "endpoints" => Ok(ResourceKind::Endpoint),
            _ => Err(Error::NotFound(format!("unknown resource kind: {}", s))),
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^([a-z]+)-([0-9a-f]{8})$").expect("static regex"))
}

/// Opaque, kind-prefixed resource identifier.
///
/// Assigned by the system on creation and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId {
    kind: ResourceKind,
    value: String,
}

impl ResourceId {
    /// Generate a fresh ID for a kind
    pub fn generate(kind: ResourceKind) -> Self {
        let hex = uuid::Uuid::new_v4().simple().to_string();
        Self {
            kind,
            value: format!("{}-{}", kind.id_prefix(), &hex[..8]),
        }
    }

    /// Parse an ID string, deriving its kind from the prefix
    pub fn parse(id: &str) -> Result<Self> {
        let caps = id_pattern()
            .captures(id)
            .ok_or_else(|| Error::invalid(format!("malformed resource id: {}", id)))?;

        let kind = ResourceKind::from_prefix(&caps[1])
            .ok_or_else(|| Error::invalid(format!("unknown resource id prefix: {}", id)))?;

        Ok(Self {
            kind,
            value: id.to_string(),
        })
    }

    /// Parse an ID string that must belong to `kind`
    pub fn parse_for(kind: ResourceKind, id: &str) -> Result<Self> {
        let parsed = Self::parse(id)?;
        if parsed.kind != kind {
            return Err(Error::invalid(format!(
                "resource id {} is not a {} id",
                id, kind
            )));
        }
        Ok(parsed)
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl FromStr for ResourceId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for ResourceId {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.value)
    }
}

impl<'de> Deserialize<'de> for ResourceId {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ResourceId::parse(&s).map_err(serde::de::Error::custom)
    }
}
