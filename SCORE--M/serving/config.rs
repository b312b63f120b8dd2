use std::{
    fs,
    net::SocketAddr,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use score_learning::config::{config_dir, resolve, ArtifactSection, ArtifactStore};
use serde::Deserialize;

/// Settings for the prediction web server.
#[derive(Debug, Clone)]
pub struct ServingConfig {
    /// Listen address.
    pub bind: SocketAddr,
    /// Artifacts read on every prediction.
    pub artifacts: ArtifactStore,
    /// Feed the form's writing score into the reading column and vice versa.
    pub swap_score_fields: bool,
    /// JSON-lines request log; `None` logs to stderr only.
    pub log_path: Option<PathBuf>,
}

impl Default for ServingConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            artifacts: ArtifactStore::default(),
            swap_score_fields: true,
            log_path: None,
        }
    }
}

impl ServingConfig {
    /// Reads the `[artifacts]` and `[serving]` tables of a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading serving config {}", path.display()))?;
        Self::from_toml_str(&raw, config_dir(path))
            .with_context(|| format!("parsing {}", path.display()))
    }

    /// Parses TOML text, resolving relative paths against `base_dir`.
    pub fn from_toml_str(raw: &str, base_dir: impl AsRef<Path>) -> Result<Self> {
        let base_dir = base_dir.as_ref();
        let document: ServingDocument = toml::from_str(raw)?;
        Ok(Self {
            bind: document.serving.bind,
            artifacts: ArtifactStore::under(resolve(base_dir, &document.artifacts.root)),
            swap_score_fields: document.serving.swap_score_fields,
            log_path: document.serving.log_path.map(|p| resolve(base_dir, &p)),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
struct ServingDocument {
    #[serde(default)]
    artifacts: ArtifactSection,
    #[serde(default)]
    serving: ServingSection,
}

#[derive(Debug, Deserialize)]
struct ServingSection {
    #[serde(default = "default_bind")]
    bind: SocketAddr,
    #[serde(default = "default_swap")]
    swap_score_fields: bool,
    #[serde(default)]
    log_path: Option<PathBuf>,
}

impl Default for ServingSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            swap_score_fields: default_swap(),
            log_path: None,
        }
    }
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 5000))
}

const fn default_swap() -> bool {
    true
}
