//! Configuration for Syntest.
//!
//! Loaded from `~/.syntest/config.toml` (or the file named by `SYNTEST_CONFIG`).
//! Every section is optional; missing values fall back to the defaults below.
//! Stimulus catalogs are plain data under `[catalogs.<name>]`.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::{env, fs};

use serde::Deserialize;
use syntest_types::{CatalogError, StimulusCatalog, StimulusDomain};
use thiserror::Error;

pub const CONFIG_ENV_VAR: &str = "SYNTEST_CONFIG";

const DEFAULT_TITLE: &str = "Synesthesia consistency test";
const DEFAULT_CATALOG: &str = "letters";
const DEFAULT_REPEATS: usize = 3;
const DEFAULT_CUTOFF: f64 = 100.0;
const DEFAULT_SUBMIT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("catalog {name:?} is not defined")]
    UnknownCatalog { name: String },
    #[error("catalog {name:?} is invalid: {source}")]
    Catalog { name: String, source: CatalogError },
}

const fn default_repeats() -> usize {
    DEFAULT_REPEATS
}

const fn default_one() -> usize {
    1
}

fn default_title() -> String {
    DEFAULT_TITLE.to_string()
}

fn default_catalog() -> String {
    DEFAULT_CATALOG.to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyntestConfig {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub catalogs: BTreeMap<String, CatalogConfig>,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub forced_choice: ForcedChoiceConfig,
    #[serde(default)]
    pub submission: SubmissionConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_title")]
    pub title: String,
    /// Shown before the first deck; no intro screen when absent.
    pub intro: Option<String>,
    #[serde(default = "default_catalog")]
    pub catalog: String,
    #[serde(default = "default_repeats")]
    pub repeats: usize,
    pub practice_catalog: Option<String>,
    #[serde(default = "default_one")]
    pub practice_repeats: usize,
    #[serde(default)]
    pub submit_practice: bool,
    /// Fixed RNG seed for reproducible decks.
    pub seed: Option<u64>,
    /// Enables `[` / `]` block navigation.
    #[serde(default)]
    pub dev_navigation: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            title: default_title(),
            intro: None,
            catalog: default_catalog(),
            repeats: DEFAULT_REPEATS,
            practice_catalog: None,
            practice_repeats: 1,
            submit_practice: false,
            seed: None,
            dev_navigation: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogConfig {
    /// Applies to every item; inferred per label when absent.
    pub domain: Option<StimulusDomain>,
    #[serde(default)]
    pub items: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsufficientItems {
    #[default]
    Exclude,
    Fail,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScoringConfig {
    /// Pass threshold on the mean pairwise RGB distance (0-255 channel units).
    #[serde(default = "ScoringConfig::default_cutoff")]
    pub cutoff: f64,
    #[serde(default)]
    pub insufficient_items: InsufficientItems,
}

impl ScoringConfig {
    const fn default_cutoff() -> f64 {
        DEFAULT_CUTOFF
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            cutoff: DEFAULT_CUTOFF,
            insufficient_items: InsufficientItems::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptureConfig {
    #[serde(default = "CaptureConfig::default_saturation")]
    pub saturation: f64,
}

impl CaptureConfig {
    const fn default_saturation() -> f64 {
        1.0
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self { saturation: 1.0 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ForcedChoiceConfig {
    pub candidates: usize,
    pub min_distance: f64,
    pub max_attempts: u32,
    pub countdown_seconds: u32,
}

impl Default for ForcedChoiceConfig {
    fn default() -> Self {
        Self {
            candidates: 4,
            min_distance: 50.0,
            max_attempts: 200,
            countdown_seconds: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmissionConfig {
    /// HTTP endpoint receiving JSON payload arrays. `${VAR}` is expanded.
    pub endpoint: Option<String>,
    /// Base URL of a remote forced-choice trial source. `${VAR}` is expanded.
    pub trial_source: Option<String>,
    #[serde(default = "SubmissionConfig::default_timeout")]
    pub timeout_secs: u64,
    /// Local JSON-lines copy of every payload.
    pub jsonl_path: Option<PathBuf>,
    /// Where skipped payloads wait for `syntest resync`.
    pub pending_path: Option<PathBuf>,
}

impl SubmissionConfig {
    const fn default_timeout() -> u64 {
        DEFAULT_SUBMIT_TIMEOUT_SECS
    }

    #[must_use]
    pub fn endpoint(&self) -> Option<String> {
        self.endpoint.as_deref().map(expand_env_vars)
    }

    #[must_use]
    pub fn trial_source(&self) -> Option<String> {
        self.trial_source.as_deref().map(expand_env_vars)
    }

    /// Configured pending-queue path, else `~/.syntest/pending.json`.
    #[must_use]
    pub fn pending_path(&self) -> PathBuf {
        self.pending_path
            .clone()
            .unwrap_or_else(|| data_dir().join("pending.json"))
    }
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            trial_source: None,
            timeout_secs: DEFAULT_SUBMIT_TIMEOUT_SECS,
            jsonl_path: None,
            pending_path: None,
        }
    }
}

impl SyntestConfig {
    /// Load the user config. `Ok(None)` when no file exists.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        let Some(path) = config_path() else {
            return Ok(None);
        };
        if !path.exists() {
            return Ok(None);
        }
        Self::load_from(&path).map(Some)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(source) => {
                tracing::warn!("Failed to read config at {}: {source}", path.display());
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        Self::from_toml_str(&content, path)
    }

    /// Parse `content`; `origin` is only used in error messages.
    pub fn from_toml_str(content: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| {
            tracing::warn!("Failed to parse config at {}: {source}", origin.display());
            ConfigError::Parse {
                path: origin.to_path_buf(),
                source,
            }
        })
    }

    /// Fill in anything `self` leaves undefined from `fallback` (catalogs only).
    #[must_use]
    pub fn with_fallback_catalogs(mut self, fallback: &SyntestConfig) -> Self {
        for (name, catalog) in &fallback.catalogs {
            self.catalogs
                .entry(name.clone())
                .or_insert_with(|| catalog.clone());
        }
        self
    }

    pub fn catalog(&self, name: &str) -> Result<StimulusCatalog, ConfigError> {
        let raw = self
            .catalogs
            .get(name)
            .ok_or_else(|| ConfigError::UnknownCatalog {
                name: name.to_string(),
            })?;
        StimulusCatalog::from_labels(raw.items.iter().cloned(), raw.domain).map_err(|source| {
            ConfigError::Catalog {
                name: name.to_string(),
                source,
            }
        })
    }

    pub fn testing_catalog(&self) -> Result<StimulusCatalog, ConfigError> {
        self.catalog(&self.session.catalog)
    }

    pub fn practice_catalog(&self) -> Result<Option<StimulusCatalog>, ConfigError> {
        self.session
            .practice_catalog
            .as_deref()
            .map(|name| self.catalog(name))
            .transpose()
    }

    #[must_use]
    pub fn path() -> Option<PathBuf> {
        config_path()
    }
}

/// `~/.syntest`, or `./.syntest` when no home directory is known.
#[must_use]
pub fn data_dir() -> PathBuf {
    dirs::home_dir().map_or_else(|| PathBuf::from(".syntest"), |home| home.join(".syntest"))
}

#[must_use]
pub fn config_path() -> Option<PathBuf> {
    config_path_from(env::var_os(CONFIG_ENV_VAR), dirs::home_dir())
}

fn config_path_from(env_override: Option<OsString>, home: Option<PathBuf>) -> Option<PathBuf> {
    match env_override {
        Some(value) if !value.is_empty() => Some(PathBuf::from(value)),
        _ => home.map(|home| home.join(".syntest").join("config.toml")),
    }
}

/// Replace `${VAR}` with the variable's value (empty when unset).
#[must_use]
pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let var = &after[..end];
                if !var.is_empty() {
                    out.push_str(&env::var(var).unwrap_or_default());
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
