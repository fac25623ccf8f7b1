use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Store name used when a request or CLI invocation does not name one.
pub const DEFAULT_STORE: &str = "default";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Named embedding stores: collection name → SQLite path.
    pub stores: HashMap<String, PathBuf>,
    #[serde(default)]
    pub curation: CurationConfig,
    pub server: ServerConfig,
}

impl Config {
    /// Resolve a store name to its database path.
    pub fn store_path(&self, name: &str) -> Result<&PathBuf> {
        self.stores
            .get(name)
            .with_context(|| format!("Unknown store: {}", name))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CurationConfig {
    /// Cap on consensus iterations per job. Requests above this are clamped.
    /// Must not exceed the engine's hard limit of 30.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Iterations used when a request does not specify a count.
    #[serde(default = "default_iterations")]
    pub default_iterations: u32,
    /// Lloyd iteration cap for the K-Means selector.
    #[serde(default = "default_kmeans_max_iter")]
    pub kmeans_max_iter: u32,
    /// Seconds a completed or errored job stays pollable before eviction.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
}

impl Default for CurationConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            default_iterations: default_iterations(),
            kmeans_max_iter: default_kmeans_max_iter(),
            retention_secs: default_retention_secs(),
        }
    }
}

fn default_max_iterations() -> u32 {
    30
}
fn default_iterations() -> u32 {
    5
}
fn default_kmeans_max_iter() -> u32 {
    50
}
fn default_retention_secs() -> u64 {
    600
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.stores.is_empty() {
        anyhow::bail!("[stores] must define at least one store");
    }

    if config.curation.max_iterations == 0
        || config.curation.max_iterations > crate::consensus::MAX_ITERATIONS
    {
        anyhow::bail!(
            "curation.max_iterations must be in [1, {}]",
            crate::consensus::MAX_ITERATIONS
        );
    }

    if config.curation.default_iterations == 0
        || config.curation.default_iterations > config.curation.max_iterations
    {
        anyhow::bail!(
            "curation.default_iterations must be in [1, {}]",
            config.curation.max_iterations
        );
    }

    if config.curation.kmeans_max_iter == 0 {
        anyhow::bail!("curation.kmeans_max_iter must be > 0");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn load_minimal_config_applies_defaults() {
        let f = write_config(
            r#"
[stores]
default = "data/images.sqlite"

[server]
bind = "127.0.0.1:8650"
"#,
        );
        let cfg = load_config(f.path()).unwrap();
        assert_eq!(cfg.curation.max_iterations, 30);
        assert_eq!(cfg.curation.default_iterations, 5);
        assert_eq!(cfg.curation.retention_secs, 600);
        assert!(cfg.store_path(DEFAULT_STORE).is_ok());
        assert!(cfg.store_path("portraits").is_err());
    }

    #[test]
    fn reject_empty_stores() {
        let f = write_config(
            r#"
[stores]

[server]
bind = "127.0.0.1:8650"
"#,
        );
        assert!(load_config(f.path()).is_err());
    }

    #[test]
    fn reject_zero_max_iterations() {
        let f = write_config(
            r#"
[stores]
default = "data/images.sqlite"

[curation]
max_iterations = 0

[server]
bind = "127.0.0.1:8650"
"#,
        );
        assert!(load_config(f.path()).is_err());
    }

    #[test]
    fn reject_max_iterations_above_engine_cap() {
        let f = write_config(
            r#"
[stores]
default = "data/images.sqlite"

[curation]
max_iterations = 100

[server]
bind = "127.0.0.1:8650"
"#,
        );
        let err = load_config(f.path()).unwrap_err();
        assert!(err.to_string().contains("[1, 30]"));
    }

    #[test]
    fn reject_default_iterations_above_cap() {
        let f = write_config(
            r#"
[stores]
default = "data/images.sqlite"

[curation]
max_iterations = 10
default_iterations = 20

[server]
bind = "127.0.0.1:8650"
"#,
        );
        assert!(load_config(f.path()).is_err());
    }
}
