use std::path::Path;
use std::sync::OnceLock;

use anyhow::{Context, Result};
use syntest_config::SyntestConfig;

const DEFAULT_CONFIG_RAW: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/assets/default_config.toml"));

static DEFAULT_CONFIG: OnceLock<SyntestConfig> = OnceLock::new();

/// Raw text of the bundled config, for `syntest default-config`.
pub fn default_config_text() -> &'static str {
    DEFAULT_CONFIG_RAW
}

/// The bundled config, parsed once.
pub fn default_config() -> Result<&'static SyntestConfig> {
    if let Some(config) = DEFAULT_CONFIG.get() {
        return Ok(config);
    }
    let parsed = SyntestConfig::from_toml_str(DEFAULT_CONFIG_RAW, Path::new("<bundled>"))
        .context("bundled default config is invalid")?;
    Ok(DEFAULT_CONFIG.get_or_init(|| parsed))
}
