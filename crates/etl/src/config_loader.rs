//! TOML config file → `CoreConfig` (§6). Reading disk is explicitly the
//! launcher's job, not the core's — `etl_config::CoreConfig` itself never
//! touches a filesystem.

use std::path::Path;

use anyhow::{Context, Result};
use etl_config::CoreConfig;

pub fn load(path: &Path) -> Result<CoreConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: CoreConfig =
        toml::from_str(&raw).with_context(|| format!("failed to parse config file at {}", path.display()))?;
    config.validate().context("config failed validation")?;
    Ok(config)
}
