use crate::kind::{ResourceId, ResourceKind};
use crate::ui::{theme, Icons};
use owo_colors::OwoColorize;

pub fn header(text: &str) {
    println!("{} {}", Icons::ROCKET, text.style(theme().header.clone()));
}

pub fn success(label: &str) {
    println!("{} {}", Icons::CHECK, label.style(theme().success.clone()));
}

pub fn error(label: &str) {
    eprintln!("{} {}", Icons::CROSS, label.style(theme().error.clone()));
}

pub fn warn(label: &str) {
    eprintln!("{} {}", Icons::WARN, label.style(theme().warn.clone()));
}

pub fn info(label: &str, value: &str) {
    println!(
        "{} {}: {}",
        Icons::INFO.style(theme().info.clone()),
        label.style(theme().dim.clone()),
        value
    );
}

pub fn section(title: &str) {
    println!();
    println!("━{}━", title.style(theme().header.clone()));
}

pub fn dim(text: &str) -> String {
    text.style(theme().dim.clone()).to_string()
}

pub fn muted(text: &str) -> String {
    text.style(theme().muted.clone()).to_string()
}

/// Resource ID styled for display
pub fn id(id: &ResourceId) -> String {
    id.as_str().style(theme().id.clone()).to_string()
}

/// Lifecycle state value colored by how far along it is
pub fn state(value: &str) -> String {
    value.style(theme().state(value)).to_string()
}

pub fn resource_created(id: &ResourceId) {
    println!(
        "{} {} {}",
        Icons::NEW.style(theme().success.clone()),
        Icons::for_kind(id.kind()),
        self::id(id)
    );
}

pub fn resource_updated(id: &ResourceId) {
    println!(
        "{} {} {}",
        Icons::MOD.style(theme().warn.clone()),
        Icons::for_kind(id.kind()),
        self::id(id)
    );
}

pub fn resource_deleted(id: &ResourceId, hard: bool) {
    let how = if hard { "removed" } else { "marked for deletion" };
    println!(
        "{} {} {} {}",
        Icons::DEL.style(theme().error.clone()),
        Icons::for_kind(id.kind()),
        self::id(id),
        muted(how)
    );
}

/// Footer line for a page of results
pub fn page_summary(kind: ResourceKind, shown: usize, total: usize, has_next: bool) {
    let more = if has_next { " (more available)" } else { "" };
    println!(
        "{} {}",
        Icons::STATS,
        dim(&format!("{} of {} {} resources{}", shown, total, kind, more))
    );
}
