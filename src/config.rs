//! TOML configuration.
//!
//! Every section and field is optional; a missing config file yields
//! [`Config::minimal`]. Credentials never appear here: providers read them
//! from the environment.

use anyhow::{bail, Context, Result};
use lectern_core::chunk::ChunkingPreset;
use lectern_core::models::FileType;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// `index.vec` + `index.json` inside the corpus root.
    #[default]
    File,
    /// A SQLite database, `index.sqlite` inside the corpus root by default.
    Sqlite,
}

impl StoreBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            StoreBackend::File => "file",
            StoreBackend::Sqlite => "sqlite",
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    /// Override for the SQLite database path.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Base URL override for HTTP providers.
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            url: None,
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

/// Per-filetype chunk window presets.
#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_pptx_preset")]
    pub pptx: ChunkingPreset,
    #[serde(default = "default_pdf_preset")]
    pub pdf: ChunkingPreset,
    #[serde(default = "default_html_preset")]
    pub html: ChunkingPreset,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            pptx: default_pptx_preset(),
            pdf: default_pdf_preset(),
            html: default_html_preset(),
        }
    }
}

fn default_pptx_preset() -> ChunkingPreset {
    ChunkingPreset::new(300, 0)
}
fn default_pdf_preset() -> ChunkingPreset {
    ChunkingPreset::new(500, 0)
}
fn default_html_preset() -> ChunkingPreset {
    ChunkingPreset::new(1000, 0)
}

impl ChunkingConfig {
    pub fn preset_for(&self, filetype: FileType) -> &ChunkingPreset {
        match filetype {
            FileType::Pptx => &self.pptx,
            FileType::Pdf => &self.pdf,
            FileType::Html => &self.html,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexingConfig {
    /// Files extracted concurrently.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Deepest directory level searched below the corpus root.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            max_depth: default_max_depth(),
            max_file_bytes: default_max_file_bytes(),
            exclude_globs: Vec::new(),
        }
    }
}

fn default_workers() -> usize {
    4
}
fn default_max_depth() -> usize {
    3
}
fn default_max_file_bytes() -> u64 {
    100 * 1024 * 1024
}

impl Config {
    /// Built-in defaults, used when no config file exists.
    pub fn minimal() -> Self {
        Self::default()
    }

    fn validate(&self) -> Result<()> {
        for filetype in FileType::ALL {
            if let Err(e) = self.chunking.preset_for(filetype).validate() {
                bail!("chunking.{}: {}", &filetype.tag()[1..], e);
            }
        }

        if self.indexing.workers == 0 {
            bail!("indexing.workers must be >= 1");
        }
        if self.indexing.max_depth < 2 {
            bail!("indexing.max_depth must be >= 2 (root/<course>/<file>)");
        }
        if self.embedding.batch_size == 0 {
            bail!("embedding.batch_size must be >= 1");
        }
        if self.embedding.dims == Some(0) {
            bail!("embedding.dims must be > 0");
        }

        match self.embedding.provider.as_str() {
            "openai" | "local" | "hash" | "disabled" => {}
            "ollama" => {
                if self.embedding.model.is_none() || self.embedding.dims.is_none() {
                    bail!("embedding.model and embedding.dims must be specified when provider is 'ollama'");
                }
            }
            other => bail!(
                "Unknown embedding provider: '{}'. Must be openai, ollama, local, hash, or disabled.",
                other
            ),
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    config.validate()?;
    Ok(config)
}

/// Load `path` if it exists, otherwise fall back to [`Config::minimal`].
pub fn load_config_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        Ok(Config::minimal())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("lectern.toml");
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn empty_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let cfg = load_config(&write(&dir, "")).unwrap();
        assert_eq!(cfg.store.backend, StoreBackend::File);
        assert_eq!(cfg.embedding.provider, "openai");
        assert_eq!(cfg.chunking.pptx, ChunkingPreset::new(300, 0));
        assert_eq!(cfg.chunking.pdf, ChunkingPreset::new(500, 0));
        assert_eq!(cfg.chunking.html, ChunkingPreset::new(1000, 0));
        assert_eq!(cfg.indexing.max_depth, 3);
    }

    #[test]
    fn parses_full_config() {
        let dir = TempDir::new().unwrap();
        let cfg = load_config(&write(
            &dir,
            r#"
[store]
backend = "sqlite"
path = "/tmp/idx.sqlite"

[embedding]
provider = "hash"
dims = 64

[chunking.pptx]
chunk_size = 1000
chunk_overlap = 200

[indexing]
workers = 2
exclude_globs = ["**/drafts/**"]
"#,
        ))
        .unwrap();
        assert_eq!(cfg.store.backend, StoreBackend::Sqlite);
        assert_eq!(cfg.store.path, Some(PathBuf::from("/tmp/idx.sqlite")));
        assert_eq!(cfg.embedding.dims, Some(64));
        assert_eq!(cfg.chunking.preset_for(FileType::Pptx).chunk_overlap, 200);
        assert_eq!(cfg.chunking.pdf.chunk_size, 500);
        assert_eq!(cfg.indexing.exclude_globs, vec!["**/drafts/**"]);
    }

    #[test]
    fn rejects_overlap_not_smaller_than_size() {
        let dir = TempDir::new().unwrap();
        let err = load_config(&write(
            &dir,
            "[chunking.pdf]\nchunk_size = 100\nchunk_overlap = 100\n",
        ))
        .unwrap_err();
        assert!(err.to_string().contains("chunking.pdf"));
    }

    #[test]
    fn rejects_unknown_provider() {
        let dir = TempDir::new().unwrap();
        let err = load_config(&write(&dir, "[embedding]\nprovider = \"magic\"\n")).unwrap_err();
        assert!(err.to_string().contains("Unknown embedding provider"));
    }

    #[test]
    fn ollama_requires_model_and_dims() {
        let dir = TempDir::new().unwrap();
        assert!(load_config(&write(&dir, "[embedding]\nprovider = \"ollama\"\n")).is_err());
    }

    #[test]
    fn missing_file_falls_back_to_minimal() {
        let dir = TempDir::new().unwrap();
        let cfg = load_config_or_default(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(cfg.indexing.workers, 4);
    }
}
