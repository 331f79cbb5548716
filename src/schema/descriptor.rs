//! Static per-kind field and edge tables.
//!
//! Each kind declares its scalar fields, its relationships and its
//! uniqueness constraints here. The declaration registry, the transpiler
//! registry and the SQL schema are all derived from these tables.

use crate::kind::ResourceKind;

/// Enumerated field types. Values are stored as their full upper-case name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnumType {
    HostState,
    InstanceState,
    InstanceKind,
    ProviderKind,
}

impl EnumType {
    /// Type name used for overload registration
    pub fn name(&self) -> &'static str {
        match self {
            EnumType::HostState => "HostState",
            EnumType::InstanceState => "InstanceState",
            EnumType::InstanceKind => "InstanceKind",
            EnumType::ProviderKind => "ProviderKind",
        }
    }

    pub fn values(&self) -> &'static [&'static str] {
        match self {
            EnumType::HostState => &[
                "HOST_STATE_UNSPECIFIED",
                "HOST_STATE_REGISTERED",
                "HOST_STATE_ONBOARDED",
                "HOST_STATE_UNTRUSTED",
                "HOST_STATE_DELETED",
            ],
            EnumType::InstanceState => &[
                "INSTANCE_STATE_UNSPECIFIED",
                "INSTANCE_STATE_RUNNING",
                "INSTANCE_STATE_STOPPED",
                "INSTANCE_STATE_UNTRUSTED",
                "INSTANCE_STATE_DELETED",
            ],
            EnumType::InstanceKind => &[
                "INSTANCE_KIND_UNSPECIFIED",
                "INSTANCE_KIND_VM",
                "INSTANCE_KIND_METAL",
            ],
            EnumType::ProviderKind => &[
                "PROVIDER_KIND_UNSPECIFIED",
                "PROVIDER_KIND_BAREMETAL",
                "PROVIDER_KIND_CLOUD",
            ],
        }
    }

    pub fn contains(&self, value: &str) -> bool {
        self.values().contains(&value)
    }
}

/// Scalar type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    String,
    Int,
    Bool,
    Enum(EnumType),
}

impl FieldType {
    /// Type name used for overload registration
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Int => "int",
            FieldType::Bool => "bool",
            FieldType::Enum(e) => e.name(),
        }
    }

    /// SQLite column affinity
    pub fn sql_type(&self) -> &'static str {
        match self {
            FieldType::String | FieldType::Enum(_) => "TEXT",
            FieldType::Int | FieldType::Bool => "INTEGER",
        }
    }
}

/// A scalar column of a kind
#[derive(Debug, Clone, Copy)]
pub struct FieldDescriptor {
    /// Declared (canonical, snake case) name, also the column name
    pub name: &'static str,
    /// Alternate JSON-style name
    pub json_name: &'static str,
    pub ty: FieldType,
    /// Only the privileged caller role may write this field
    pub privileged: bool,
    /// Maintained by the system, never written by callers
    pub system: bool,
}

const fn field(name: &'static str, json_name: &'static str, ty: FieldType) -> FieldDescriptor {
    FieldDescriptor {
        name,
        json_name,
        ty,
        privileged: false,
        system: false,
    }
}

const fn privileged(name: &'static str, json_name: &'static str, ty: FieldType) -> FieldDescriptor {
    FieldDescriptor {
        name,
        json_name,
        ty,
        privileged: true,
        system: false,
    }
}

const fn system(name: &'static str, json_name: &'static str, ty: FieldType) -> FieldDescriptor {
    FieldDescriptor {
        name,
        json_name,
        ty,
        privileged: false,
        system: true,
    }
}

/// How an edge is physically linked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeLink {
    /// `this.column` holds the target's resource ID
    Forward { column: &'static str },
    /// `target.column` holds this resource's ID (back-reference)
    Reverse { column: &'static str },
}

/// A named relationship from one kind to another
#[derive(Debug, Clone, Copy)]
pub struct EdgeDescriptor {
    pub name: &'static str,
    pub json_name: &'static str,
    pub target: ResourceKind,
    pub link: EdgeLink,
}

impl EdgeDescriptor {
    /// Foreign-key column on the owning table, if this is a forward edge
    pub fn forward_column(&self) -> Option<&'static str> {
        match self.link {
            EdgeLink::Forward { column } => Some(column),
            EdgeLink::Reverse { .. } => None,
        }
    }
}

const fn forward(
    name: &'static str,
    json_name: &'static str,
    target: ResourceKind,
    column: &'static str,
) -> EdgeDescriptor {
    EdgeDescriptor {
        name,
        json_name,
        target,
        link: EdgeLink::Forward { column },
    }
}

const fn reverse(
    name: &'static str,
    json_name: &'static str,
    target: ResourceKind,
    column: &'static str,
) -> EdgeDescriptor {
    EdgeDescriptor {
        name,
        json_name,
        target,
        link: EdgeLink::Reverse { column },
    }
}

/// Everything the core knows statically about one kind
#[derive(Debug)]
pub struct KindDescriptor {
    pub kind: ResourceKind,
    pub fields: &'static [FieldDescriptor],
    pub edges: &'static [EdgeDescriptor],
    /// Column sets that must be unique
    pub unique: &'static [&'static [&'static str]],
}

/// Columns present on every table
pub const COMMON_FIELDS: &[FieldDescriptor] = &[
    system("resource_id", "resourceId", FieldType::String),
    system("created_at", "createdAt", FieldType::Int),
    system("updated_at", "updatedAt", FieldType::Int),
];

/// Name of the metadata column on hierarchical kinds
pub const METADATA_COLUMN: &str = "metadata";

const HOST_STATE: FieldType = FieldType::Enum(EnumType::HostState);
const INSTANCE_STATE: FieldType = FieldType::Enum(EnumType::InstanceState);

static REGION: KindDescriptor = KindDescriptor {
    kind: ResourceKind::Region,
    fields: &[field("name", "name", FieldType::String)],
    edges: &[forward(
        "parent_region",
        "parentRegion",
        ResourceKind::Region,
        "parent_region_id",
    )],
    unique: &[&["tenant_id", "name"]],
};

static OU: KindDescriptor = KindDescriptor {
    kind: ResourceKind::Ou,
    fields: &[
        field("name", "name", FieldType::String),
        field("ou_kind", "ouKind", FieldType::String),
    ],
    edges: &[forward("parent_ou", "parentOu", ResourceKind::Ou, "parent_ou_id")],
    unique: &[&["tenant_id", "name"]],
};

static SITE: KindDescriptor = KindDescriptor {
    kind: ResourceKind::Site,
    fields: &[
        field("name", "name", FieldType::String),
        field("address", "address", FieldType::String),
        field("site_lat", "siteLat", FieldType::Int),
        field("site_lng", "siteLng", FieldType::Int),
        field("dns_enabled", "dnsEnabled", FieldType::Bool),
    ],
    edges: &[
        forward("region", "region", ResourceKind::Region, "region_id"),
        forward("ou", "ou", ResourceKind::Ou, "ou_id"),
        forward("provider", "provider", ResourceKind::Provider, "provider_id"),
    ],
    unique: &[&["tenant_id", "name"]],
};

static PROVIDER: KindDescriptor = KindDescriptor {
    kind: ResourceKind::Provider,
    fields: &[
        field("name", "name", FieldType::String),
        field(
            "provider_kind",
            "providerKind",
            FieldType::Enum(EnumType::ProviderKind),
        ),
        field("api_endpoint", "apiEndpoint", FieldType::String),
    ],
    edges: &[],
    unique: &[&["tenant_id", "name"]],
};

static HOST: KindDescriptor = KindDescriptor {
    kind: ResourceKind::Host,
    fields: &[
        field("name", "name", FieldType::String),
        field("uuid", "uuid", FieldType::String),
        field("serial_number", "serialNumber", FieldType::String),
        field("hostname", "hostname", FieldType::String),
        field("note", "note", FieldType::String),
        field("memory_bytes", "memoryBytes", FieldType::Int),
        field("bmc_enabled", "bmcEnabled", FieldType::Bool),
        field("desired_state", "desiredState", HOST_STATE),
        privileged("current_state", "currentState", HOST_STATE),
    ],
    edges: &[
        forward("site", "site", ResourceKind::Site, "site_id"),
        forward("provider", "provider", ResourceKind::Provider, "provider_id"),
        reverse("instance", "instance", ResourceKind::Instance, "host_id"),
    ],
    unique: &[&["tenant_id", "uuid"]],
};

static INSTANCE: KindDescriptor = KindDescriptor {
    kind: ResourceKind::Instance,
    fields: &[
        field("name", "name", FieldType::String),
        field(
            "instance_kind",
            "instanceKind",
            FieldType::Enum(EnumType::InstanceKind),
        ),
        field("vm_memory_bytes", "vmMemoryBytes", FieldType::Int),
        field("vm_cpu_cores", "vmCpuCores", FieldType::Int),
        field("secure_boot", "secureBoot", FieldType::Bool),
        field("desired_state", "desiredState", INSTANCE_STATE),
        privileged("current_state", "currentState", INSTANCE_STATE),
    ],
    edges: &[
        forward("host", "host", ResourceKind::Host, "host_id"),
        forward("os", "os", ResourceKind::Os, "os_id"),
    ],
    unique: &[&["host_id"]],
};

static OS: KindDescriptor = KindDescriptor {
    kind: ResourceKind::Os,
    fields: &[
        field("name", "name", FieldType::String),
        field("image_url", "imageUrl", FieldType::String),
        field("sha256", "sha256", FieldType::String),
        field("kernel_sha256", "kernelSha256", FieldType::String),
        field("kernel_command", "kernelCommand", FieldType::String),
    ],
    edges: &[],
    unique: &[],
};

static ENDPOINT: KindDescriptor = KindDescriptor {
    kind: ResourceKind::Endpoint,
    fields: &[
        field("name", "name", FieldType::String),
        field("endpoint_kind", "endpointKind", FieldType::String),
        field("mac_address", "macAddress", FieldType::String),
    ],
    edges: &[forward("host", "host", ResourceKind::Host, "host_id")],
    unique: &[],
};

/// Static descriptor for a kind
pub fn descriptor(kind: ResourceKind) -> &'static KindDescriptor {
    match kind {
        ResourceKind::Region => &REGION,
        ResourceKind::Ou => &OU,
        ResourceKind::Site => &SITE,
        ResourceKind::Provider => &PROVIDER,
        ResourceKind::Host => &HOST,
        ResourceKind::Instance => &INSTANCE,
        ResourceKind::Os => &OS,
        ResourceKind::Endpoint => &ENDPOINT,
    }
}

impl KindDescriptor {
    /// All scalar columns, common ones first
    pub fn columns(&self) -> impl Iterator<Item = &'static FieldDescriptor> + '_ {
        COMMON_FIELDS.iter().chain(self.fields.iter())
    }

    /// Look up a scalar column by its canonical name
    pub fn column(&self, name: &str) -> Option<&'static FieldDescriptor> {
        self.columns().find(|f| f.name == name)
    }

    /// Look up an edge by its canonical name
    pub fn edge(&self, name: &str) -> Option<&'static EdgeDescriptor> {
        self.edges.iter().find(|e| e.name == name)
    }

    pub fn has_metadata(&self) -> bool {
        self.kind.is_hierarchical()
    }

    /// Edges elsewhere in the catalog whose foreign key points at this kind.
    ///
    /// Each entry is `(owning kind, fk column)`. A row with any such
    /// dependent cannot be hard-deleted.
    pub fn dependents(&self) -> Vec<(ResourceKind, &'static str)> {
        ResourceKind::all()
            .iter()
            .flat_map(|owner| {
                descriptor(*owner).edges.iter().filter_map(move |edge| {
                    match edge.link {
                        EdgeLink::Forward { column } if edge.target == self.kind => {
                            Some((*owner, column))
                        }
                        _ => None,
                    }
                })
            })
            .collect()
    }
}
