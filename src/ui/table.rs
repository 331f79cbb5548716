use serde_json::Value;
use tabled::{builder::Builder, settings::Style, Table, Tabled};

use crate::resource::ResourceView;

#[derive(Tabled)]
pub struct TableRow {
    #[tabled(rename = "Field")]
    pub field: String,
    #[tabled(rename = "Value")]
    pub value: String,
}

pub struct TableBuilder {
    rows: Vec<TableRow>,
}

impl Default for TableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TableBuilder {
    pub fn new() -> Self {
        Self { rows: Vec::new() }
    }

    pub fn add_row(&mut self, label: &str, value: &str) {
        self.rows.push(TableRow {
            field: label.to_string(),
            value: value.to_string(),
        });
    }

    pub fn build(&self) -> String {
        if self.rows.is_empty() {
            return String::new();
        }

        Table::new(&self.rows).with(Style::rounded()).to_string()
    }
}

/// Render a JSON value for a table cell
pub fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Key/value table of a single resource, effective metadata included
pub fn resource_table(view: &ResourceView) -> String {
    let resource = &view.resource;
    let mut builder = TableBuilder::new();
    builder.add_row("resource_id", resource.id.as_str());
    for (name, value) in &resource.fields {
        builder.add_row(name, &cell(value));
    }
    for pair in &resource.metadata {
        builder.add_row("metadata", &pair.to_string());
    }
    if let Some(effective) = &view.effective {
        let axes = [("physical", &effective.physical), ("logical", &effective.logical)];
        for (axis, pairs) in axes {
            for pair in pairs.iter().flatten() {
                builder.add_row(&format!("{} metadata", axis), &pair.to_string());
            }
        }
    }
    builder.build()
}

/// One row per resource, columns are the union of present fields
pub fn resources_table(views: &[ResourceView]) -> String {
    if views.is_empty() {
        return String::new();
    }

    let mut columns: Vec<&str> = Vec::new();
    for view in views {
        for name in view.resource.fields.keys() {
            if !columns.contains(&name.as_str()) {
                columns.push(name);
            }
        }
    }

    let mut builder = Builder::default();
    builder.push_record(std::iter::once("resource_id").chain(columns.iter().copied()));
    for view in views {
        let resource = &view.resource;
        let row = std::iter::once(resource.id.to_string()).chain(
            columns
                .iter()
                .map(|c| resource.fields.get(*c).map(cell).unwrap_or_default()),
        );
        builder.push_record(row);
    }
    builder.build().with(Style::rounded()).to_string()
}

pub fn stats_table(stats: &[(&str, &str)]) -> String {
    let mut builder = TableBuilder::new();
    for (label, value) in stats {
        builder.add_row(label, value);
    }
    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::{ResourceId, ResourceKind};
    use crate::resource::Resource;
    use serde_json::json;

    fn view(name: &str, extra: Option<(&str, Value)>) -> ResourceView {
        let mut fields = crate::resource::Fields::new();
        fields.insert("name".into(), json!(name));
        if let Some((k, v)) = extra {
            fields.insert(k.into(), v);
        }
        ResourceView {
            resource: Resource {
                id: ResourceId::generate(ResourceKind::Provider),
                tenant_id: "t1".into(),
                fields,
                metadata: Vec::new(),
                created_at: 0,
                updated_at: 0,
            },
            effective: None,
        }
    }

    #[test]
    fn test_resources_table_unions_columns() {
        let out = resources_table(&[view("a", None), view("b", Some(("api_endpoint", json!("x"))))]);
        assert!(out.contains("resource_id"));
        assert!(out.contains("api_endpoint"));
        assert!(out.contains("b"));
    }

    #[test]
    fn test_empty_tables_render_nothing() {
        assert!(resources_table(&[]).is_empty());
        assert!(TableBuilder::new().build().is_empty());
    }

    #[test]
    fn test_cell_unquotes_strings() {
        assert_eq!(cell(&json!("x")), "x");
        assert_eq!(cell(&json!(true)), "true");
        assert_eq!(cell(&Value::Null), "");
    }
}
