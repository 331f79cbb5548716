//! Metadata inheritance along the physical and logical axes.
//!
//! Regions form the physical hierarchy and OUs the logical one. A site
//! references at most one of each and a host inherits through its site.
//! Effective metadata is computed at read time, root first, so that nearer
//! ancestors override farther ones and local metadata wins over all.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use rusqlite::Transaction;
use serde::{Deserialize, Serialize};

use crate::kind::ResourceKind;
use crate::resource::{Resource, ResourceView};
use crate::storage::rows;
use crate::{Error, Result};

/// One local metadata entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetadataPair {
    pub key: String,
    pub value: String,
}

impl MetadataPair {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl FromStr for MetadataPair {
    type Err = Error;

    /// Parse `key=value`
    fn from_str(s: &str) -> Result<Self> {
        let (key, value) = s
            .split_once('=')
            .ok_or_else(|| Error::invalid(format!("metadata must be key=value, got {:?}", s)))?;
        let pair = MetadataPair::new(key.trim(), value.trim());
        validate(std::slice::from_ref(&pair))?;
        Ok(pair)
    }
}

impl fmt::Display for MetadataPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// Reject empty or duplicated keys
pub fn validate(pairs: &[MetadataPair]) -> Result<()> {
    let mut seen = HashSet::new();
    for pair in pairs {
        if pair.key.is_empty() {
            return Err(Error::invalid("metadata key must not be empty"));
        }
        if !seen.insert(pair.key.as_str()) {
            return Err(Error::invalid(format!("duplicate metadata key {:?}", pair.key)));
        }
    }
    Ok(())
}

/// Inherited metadata per axis.
///
/// An axis that applies to the kind is always `Some`, and is the empty list
/// when no ancestor and no local pair contributes. `None` is reserved for
/// the axis a kind is not part of: regions have no logical parent and OUs
/// have no physical one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EffectiveMetadata {
    pub physical: Option<Vec<MetadataPair>>,
    pub logical: Option<Vec<MetadataPair>>,
}

impl EffectiveMetadata {
    /// Pair present on either axis
    pub fn contains(&self, pair: &MetadataPair) -> bool {
        [&self.physical, &self.logical]
            .into_iter()
            .flatten()
            .any(|pairs| pairs.contains(pair))
    }

    pub fn matches_all(&self, pairs: &[MetadataPair]) -> bool {
        pairs.iter().all(|pair| self.contains(pair))
    }
}

/// Merges metadata lists; later lists override earlier ones per key
#[derive(Debug, Default)]
struct Accumulator(BTreeMap<String, String>);

impl Accumulator {
    fn merge(&mut self, pairs: &[MetadataPair]) {
        for pair in pairs {
            self.0.insert(pair.key.clone(), pair.value.clone());
        }
    }

    fn into_pairs(self) -> Vec<MetadataPair> {
        self.0
            .into_iter()
            .map(|(key, value)| MetadataPair { key, value })
            .collect()
    }
}

#[derive(Debug)]
struct Node {
    parent: Option<String>,
    metadata: Vec<MetadataPair>,
}

#[derive(Debug)]
struct SiteNode {
    region: Option<String>,
    ou: Option<String>,
    metadata: Vec<MetadataPair>,
}

/// Tenant-wide snapshot of the region, OU and site hierarchy
#[derive(Debug, Default)]
pub struct Hierarchy {
    regions: HashMap<String, Node>,
    ous: HashMap<String, Node>,
    sites: HashMap<String, SiteNode>,
}

impl Hierarchy {
    /// Batch-load every region, OU and site of a tenant
    pub fn load(tx: &Transaction, tenant_id: &str) -> Result<Self> {
        let mut resources = rows::fetch_all(tx, ResourceKind::Region, tenant_id)?;
        resources.extend(rows::fetch_all(tx, ResourceKind::Ou, tenant_id)?);
        resources.extend(rows::fetch_all(tx, ResourceKind::Site, tenant_id)?);
        Ok(Self::from_resources(resources))
    }

    pub fn from_resources(resources: impl IntoIterator<Item = Resource>) -> Self {
        let mut hierarchy = Self::default();
        for resource in resources {
            let id = resource.id.to_string();
            let node = |edge: &str| Node {
                parent: resource.edge_target(edge).map(str::to_string),
                metadata: resource.metadata.clone(),
            };
            match resource.kind() {
                ResourceKind::Region => {
                    hierarchy.regions.insert(id, node("parent_region"));
                }
                ResourceKind::Ou => {
                    hierarchy.ous.insert(id, node("parent_ou"));
                }
                ResourceKind::Site => {
                    let site = SiteNode {
                        region: resource.edge_target("region").map(str::to_string),
                        ou: resource.edge_target("ou").map(str::to_string),
                        metadata: resource.metadata.clone(),
                    };
                    hierarchy.sites.insert(id, site);
                }
                _ => {}
            }
        }
        hierarchy
    }

    fn nodes(&self, kind: ResourceKind) -> Result<&HashMap<String, Node>> {
        match kind {
            ResourceKind::Region => Ok(&self.regions),
            ResourceKind::Ou => Ok(&self.ous),
            other => Err(Error::Internal(format!("{} is not a hierarchy axis", other))),
        }
    }

    /// Ancestor chain starting at `start`, ordered root first
    fn chain(&self, kind: ResourceKind, start: Option<&str>) -> Result<Vec<&Node>> {
        let nodes = self.nodes(kind)?;
        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        let mut cursor = start;

        while let Some(id) = cursor {
            if !visited.insert(id) {
                return Err(Error::Internal(format!(
                    "cycle in {} hierarchy at {}",
                    kind, id
                )));
            }
            let Some(node) = nodes.get(id) else {
                tracing::warn!(%kind, id, "dangling hierarchy reference");
                break;
            };
            chain.push(node);
            cursor = node.parent.as_deref();
        }

        chain.reverse();
        Ok(chain)
    }

    fn inherit(&self, kind: ResourceKind, start: Option<&str>) -> Result<Accumulator> {
        let mut acc = Accumulator::default();
        for node in self.chain(kind, start)? {
            acc.merge(&node.metadata);
        }
        Ok(acc)
    }

    /// Effective metadata for one resource; `None` for non-hierarchical kinds
    pub fn resolve(&self, resource: &Resource) -> Result<Option<EffectiveMetadata>> {
        let local = resource.metadata.as_slice();
        let effective = match resource.kind() {
            ResourceKind::Region => {
                let mut physical = self.inherit(ResourceKind::Region, resource.edge_target("parent_region"))?;
                physical.merge(local);
                EffectiveMetadata {
                    physical: Some(physical.into_pairs()),
                    logical: None,
                }
            }
            ResourceKind::Ou => {
                let mut logical = self.inherit(ResourceKind::Ou, resource.edge_target("parent_ou"))?;
                logical.merge(local);
                EffectiveMetadata {
                    physical: None,
                    logical: Some(logical.into_pairs()),
                }
            }
            ResourceKind::Site => {
                let mut physical = self.inherit(ResourceKind::Region, resource.edge_target("region"))?;
                physical.merge(local);
                let logical = self.inherit(ResourceKind::Ou, resource.edge_target("ou"))?;
                EffectiveMetadata {
                    physical: Some(physical.into_pairs()),
                    logical: Some(logical.into_pairs()),
                }
            }
            ResourceKind::Host => {
                let site = resource
                    .edge_target("site")
                    .and_then(|id| self.sites.get(id));
                let (mut physical, mut logical) = match site {
                    Some(site) => {
                        let mut physical = self.inherit(ResourceKind::Region, site.region.as_deref())?;
                        physical.merge(&site.metadata);
                        (physical, self.inherit(ResourceKind::Ou, site.ou.as_deref())?)
                    }
                    None => (Accumulator::default(), Accumulator::default()),
                };
                physical.merge(local);
                logical.merge(local);
                EffectiveMetadata {
                    physical: Some(physical.into_pairs()),
                    logical: Some(logical.into_pairs()),
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(effective))
    }

    /// Attach effective metadata to every resource
    pub fn resolve_all(&self, resources: Vec<Resource>) -> Result<Vec<ResourceView>> {
        resources
            .into_iter()
            .map(|resource| {
                let effective = self.resolve(&resource)?;
                Ok(ResourceView {
                    resource,
                    effective,
                })
            })
            .collect()
    }

    /// Whether making `parent` the parent of `child` would close a loop
    pub fn creates_cycle(&self, kind: ResourceKind, child: &str, parent: &str) -> Result<bool> {
        if child == parent {
            return Ok(true);
        }
        let nodes = self.nodes(kind)?;
        let mut visited = HashSet::new();
        let mut cursor = Some(parent);
        while let Some(id) = cursor {
            if id == child {
                return Ok(true);
            }
            if !visited.insert(id) {
                break;
            }
            cursor = nodes.get(id).and_then(|n| n.parent.as_deref());
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::ResourceId;
    use crate::resource::Fields;
    use crate::ErrorKind;
    use serde_json::Value;

    fn pairs(items: &[(&str, &str)]) -> Vec<MetadataPair> {
        items.iter().map(|(k, v)| MetadataPair::new(*k, *v)).collect()
    }

    fn resource(kind: ResourceKind, edges: &[(&str, &ResourceId)], metadata: &[(&str, &str)]) -> Resource {
        let fields: Fields = edges
            .iter()
            .map(|(name, id)| (name.to_string(), Value::String(id.to_string())))
            .collect();
        Resource {
            id: ResourceId::generate(kind),
            tenant_id: "t1".into(),
            fields,
            metadata: pairs(metadata),
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn test_nearest_ancestor_wins() {
        let r1 = resource(ResourceKind::Region, &[], &[("k1", "v1"), ("zone", "eu")]);
        let r2 = resource(ResourceKind::Region, &[("parent_region", &r1.id)], &[("k1", "v2")]);
        let site = resource(ResourceKind::Site, &[("region", &r2.id)], &[]);
        let host = resource(ResourceKind::Host, &[("site", &site.id)], &[("k1", "v3")]);

        let hierarchy = Hierarchy::from_resources([r1, r2, site.clone()]);

        let site_meta = hierarchy.resolve(&site).unwrap().unwrap();
        assert_eq!(
            site_meta.physical.unwrap(),
            pairs(&[("k1", "v2"), ("zone", "eu")])
        );

        let host_meta = hierarchy.resolve(&host).unwrap().unwrap();
        assert_eq!(
            host_meta.physical.unwrap(),
            pairs(&[("k1", "v3"), ("zone", "eu")])
        );
    }

    #[test]
    fn test_axes_are_independent() {
        let region = resource(ResourceKind::Region, &[], &[("k", "physical")]);
        let ou = resource(ResourceKind::Ou, &[], &[("k", "logical"), ("team", "infra")]);
        let site = resource(
            ResourceKind::Site,
            &[("region", &region.id), ("ou", &ou.id)],
            &[],
        );
        let host = resource(ResourceKind::Host, &[("site", &site.id)], &[]);
        let hierarchy = Hierarchy::from_resources([region, ou, site]);

        let meta = hierarchy.resolve(&host).unwrap().unwrap();
        assert_eq!(meta.physical.unwrap(), pairs(&[("k", "physical")]));
        assert_eq!(
            meta.logical.unwrap(),
            pairs(&[("k", "logical"), ("team", "infra")])
        );
    }

    #[test]
    fn test_roots_leave_the_foreign_axis_unset() {
        let hierarchy = Hierarchy::default();
        let region = resource(ResourceKind::Region, &[], &[]);
        let ou = resource(ResourceKind::Ou, &[], &[]);

        let meta = hierarchy.resolve(&region).unwrap().unwrap();
        assert_eq!(meta.physical, Some(Vec::new()));
        assert_eq!(meta.logical, None);

        let meta = hierarchy.resolve(&ou).unwrap().unwrap();
        assert_eq!(meta.physical, None);
        assert_eq!(meta.logical, Some(Vec::new()));
    }

    #[test]
    fn test_no_ancestors_is_empty_not_unset() {
        let hierarchy = Hierarchy::default();
        let host = resource(ResourceKind::Host, &[], &[]);
        let meta = hierarchy.resolve(&host).unwrap().unwrap();
        assert_eq!(meta.physical, Some(Vec::new()));
        assert_eq!(meta.logical, Some(Vec::new()));

        let region = resource(ResourceKind::Region, &[], &[]);
        let meta = hierarchy.resolve(&region).unwrap().unwrap();
        assert_eq!(meta.logical, None);

        let os = resource(ResourceKind::Os, &[], &[]);
        assert!(hierarchy.resolve(&os).unwrap().is_none());
    }

    #[test]
    fn test_cycle_is_internal_error() {
        let mut a = resource(ResourceKind::Region, &[], &[]);
        let b = resource(ResourceKind::Region, &[("parent_region", &a.id)], &[]);
        a.fields
            .insert("parent_region".into(), Value::String(b.id.to_string()));
        let child = resource(ResourceKind::Region, &[("parent_region", &b.id)], &[]);

        let hierarchy = Hierarchy::from_resources([a, b]);
        let err = hierarchy.resolve(&child).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_creates_cycle() {
        let root = resource(ResourceKind::Ou, &[], &[]);
        let mid = resource(ResourceKind::Ou, &[("parent_ou", &root.id)], &[]);
        let leaf = resource(ResourceKind::Ou, &[("parent_ou", &mid.id)], &[]);
        let (root_id, leaf_id) = (root.id.to_string(), leaf.id.to_string());
        let hierarchy = Hierarchy::from_resources([root, mid, leaf]);

        assert!(hierarchy.creates_cycle(ResourceKind::Ou, &root_id, &leaf_id).unwrap());
        assert!(hierarchy.creates_cycle(ResourceKind::Ou, &root_id, &root_id).unwrap());
        assert!(!hierarchy.creates_cycle(ResourceKind::Ou, &leaf_id, &root_id).unwrap());
    }

    #[test]
    fn test_matches_either_axis() {
        let meta = EffectiveMetadata {
            physical: Some(pairs(&[("zone", "eu")])),
            logical: Some(pairs(&[("team", "infra")])),
        };
        assert!(meta.matches_all(&pairs(&[("zone", "eu"), ("team", "infra")])));
        assert!(!meta.matches_all(&pairs(&[("zone", "us")])));
        assert!(meta.matches_all(&[]));
    }

    #[test]
    fn test_pair_parsing_and_validation() {
        assert_eq!("env=prod".parse::<MetadataPair>().unwrap(), MetadataPair::new("env", "prod"));
        assert!("envprod".parse::<MetadataPair>().is_err());
        assert!("=x".parse::<MetadataPair>().is_err());
        assert!(validate(&pairs(&[("a", "1"), ("a", "2")])).is_err());
    }
}
