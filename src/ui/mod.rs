pub mod icons;
pub mod output;
pub mod table;
pub mod theme;

pub use icons::Icons;
pub use output::{
    dim, error, header, id, info, muted, page_summary, resource_created, resource_deleted,
    resource_updated, section, state, success, warn,
};
pub use table::{resource_table, resources_table, stats_table, TableBuilder};
pub use theme::{theme, Theme};
