use crate::kind::ResourceKind;

pub struct Icons;

impl Icons {
    pub const ROCKET: &str = "🚀";
    pub const SEARCH: &str = "🔍";
    pub const CHECK: &str = "✅";
    pub const CROSS: &str = "❌";
    pub const WARN: &str = "⚠️";
    pub const INFO: &str = "ℹ️";
    pub const STATS: &str = "📊";
    pub const NEW: &str = "✨";
    pub const MOD: &str = "📝";
    pub const DEL: &str = "🗑️";
    pub const DATABASE: &str = "🗄️";

    /// Icon shown next to resources of a kind
    pub fn for_kind(kind: ResourceKind) -> &'static str {
        match kind {
            ResourceKind::Region => "🌍",
            ResourceKind::Ou => "🏢",
            ResourceKind::Site => "📍",
            ResourceKind::Provider => "☁️",
            ResourceKind::Host => "🖥️",
            ResourceKind::Instance => "📦",
            ResourceKind::Os => "💿",
            ResourceKind::Endpoint => "🔌",
        }
    }
}
