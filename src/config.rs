//! TOML configuration.
//!
//! ```toml
//! [db]
//! path = "./data/kb.sqlite"
//!
//! [scanner]
//! extension = "md"
//! exclude_globs = ["**/drafts/**"]
//! follow_symlinks = false
//!
//! [similarity]
//! warn_threshold = 0.5
//! reject_threshold = 0.6
//!
//! [projects]
//! root = "./projects"
//! ```
//!
//! Only `[db]` is required.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub scanner: ScannerConfig,
    #[serde(default)]
    pub similarity: SimilarityConfig,
    #[serde(default)]
    pub projects: ProjectsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScannerConfig {
    /// Document file extension, without the dot.
    #[serde(default = "default_extension")]
    pub extension: String,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            extension: default_extension(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        }
    }
}

fn default_extension() -> String {
    "md".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct SimilarityConfig {
    /// Matches at or above this score are reported to the author.
    #[serde(default = "default_warn_threshold")]
    pub warn_threshold: f64,
    /// Matches at or above this score block admission.
    #[serde(default = "default_reject_threshold")]
    pub reject_threshold: f64,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            warn_threshold: default_warn_threshold(),
            reject_threshold: default_reject_threshold(),
        }
    }
}

fn default_warn_threshold() -> f64 {
    0.5
}
fn default_reject_threshold() -> f64 {
    0.6
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ProjectsConfig {
    /// Default corpus for `kb projects index`.
    pub root: Option<PathBuf>,
}

impl Config {
    /// Defaults for commands that can run without a config file.
    pub fn minimal() -> Self {
        Self {
            db: DbConfig {
                path: PathBuf::from("./data/kb.sqlite"),
            },
            scanner: ScannerConfig::default(),
            similarity: SimilarityConfig::default(),
            projects: ProjectsConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    let extension = config.scanner.extension.trim_start_matches('.');
    if extension.is_empty() {
        anyhow::bail!("scanner.extension must not be empty");
    }

    for glob in &config.scanner.exclude_globs {
        globset::Glob::new(glob)
            .with_context(|| format!("Invalid scanner.exclude_globs pattern: '{}'", glob))?;
    }

    let sim = &config.similarity;
    if !(0.0..=1.0).contains(&sim.warn_threshold) {
        anyhow::bail!("similarity.warn_threshold must be in [0.0, 1.0]");
    }
    if !(0.0..=1.0).contains(&sim.reject_threshold) {
        anyhow::bail!("similarity.reject_threshold must be in [0.0, 1.0]");
    }
    if sim.warn_threshold > sim.reject_threshold {
        anyhow::bail!(
            "similarity.warn_threshold ({}) must not exceed similarity.reject_threshold ({})",
            sim.warn_threshold,
            sim.reject_threshold
        );
    }

    Ok(())
}
