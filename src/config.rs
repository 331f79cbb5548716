use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default page size for `list`/`find` when none is given
pub const DEFAULT_PAGE_SIZE: usize = 50;

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct InventoryConfig {
    pub database: Option<String>,
    pub tenant: Option<String>,
    pub page_size: Option<usize>,
}

impl InventoryConfig {
    pub fn page_size(&self) -> usize {
        self.page_size.unwrap_or(DEFAULT_PAGE_SIZE)
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("invctl.toml")
}

pub fn default_database_path_in(base: &Path) -> PathBuf {
    base.join(".invctl").join("inventory.db")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<InventoryConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: InventoryConfig = toml::from_str(&contents)?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &InventoryConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use --force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

pub fn ensure_db_dir(db_path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
