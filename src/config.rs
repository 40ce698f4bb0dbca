//! TOML configuration parsing and validation.
//!
//! Endpoints, model names, and pool sizing live in the config file selected
//! by `--config`; API keys are read from the environment by the service
//! clients at construction time (`OPENAI_API_KEY`, `QDRANT_API_KEY`,
//! `STORAGE_SERVICE_KEY`). Missing or inconsistent settings fail here, at
//! startup — never per-request.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub embedding: EmbeddingConfig,
    pub index: IndexConfig,
    pub storage: StorageConfig,
    pub db: DbConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// OpenAI-compatible API base URL.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Vision-capable chat model used for image captioning.
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    /// Text embedding model.
    #[serde(default = "default_embed_model")]
    pub embed_model: String,
    /// Embedding dimensionality; must agree with the index collection.
    pub dims: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_endpoint() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_chat_model() -> String {
    "gpt-4o".to_string()
}
fn default_embed_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// Qdrant base URL.
    pub url: String,
    #[serde(default = "default_collection")]
    pub collection: String,
}

fn default_collection() -> String {
    "items".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Storage service base URL (Supabase project URL).
    pub url: String,
    #[serde(default = "default_bucket")]
    pub bucket: String,
}

fn default_bucket() -> String {
    "found_item_images".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    /// Direct Postgres DSN, tried first unless `force_pooler` is set.
    #[serde(default)]
    pub direct_url: Option<String>,
    /// Pooler DSN fallback.
    #[serde(default)]
    pub pooler_url: Option<String>,
    #[serde(default)]
    pub force_pooler: bool,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
}

fn default_pool_size() -> u32 {
    10
}

impl DbConfig {
    /// DSNs in connection-attempt order: direct first (unless forced to
    /// the pooler), then the pooler.
    pub fn urls_to_try(&self) -> Vec<&str> {
        let mut urls = Vec::new();
        if !self.force_pooler {
            if let Some(direct) = self.direct_url.as_deref() {
                urls.push(direct);
            }
        }
        if let Some(pooler) = self.pooler_url.as_deref() {
            urls.push(pooler);
        }
        urls
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MatchingConfig {
    /// Default number of candidate matches returned per submission.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    5
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.embedding.dims == 0 {
        anyhow::bail!("embedding.dims must be > 0");
    }

    if config.matching.top_k < 1 {
        anyhow::bail!("matching.top_k must be >= 1");
    }

    if config.db.pool_size < 1 {
        anyhow::bail!("db.pool_size must be >= 1");
    }

    if config.db.urls_to_try().is_empty() {
        anyhow::bail!(
            "No database DSN configured. Set db.direct_url or db.pooler_url \
             (db.force_pooler = true ignores direct_url)."
        );
    }

    if config.index.url.is_empty() {
        anyhow::bail!("index.url must not be empty");
    }
    if config.index.collection.is_empty() {
        anyhow::bail!("index.collection must not be empty");
    }

    if config.storage.url.is_empty() {
        anyhow::bail!("storage.url must not be empty");
    }
    if config.storage.bucket.is_empty() {
        anyhow::bail!("storage.bucket must not be empty");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(body: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(body.as_bytes()).unwrap();
        f
    }

    const VALID: &str = r#"
[embedding]
dims = 1536

[index]
url = "http://localhost:6333"

[storage]
url = "https://example.supabase.co"

[db]
direct_url = "postgres://localhost/reclaim"

[server]
bind = "127.0.0.1:8080"
"#;

    #[test]
    fn test_load_valid_config_with_defaults() {
        let f = write_config(VALID);
        let config = load_config(f.path()).unwrap();
        assert_eq!(config.embedding.chat_model, "gpt-4o");
        assert_eq!(config.embedding.embed_model, "text-embedding-3-small");
        assert_eq!(config.index.collection, "items");
        assert_eq!(config.storage.bucket, "found_item_images");
        assert_eq!(config.matching.top_k, 5);
        assert_eq!(config.db.pool_size, 10);
    }

    #[test]
    fn test_zero_dims_rejected() {
        let f = write_config(&VALID.replace("dims = 1536", "dims = 0"));
        assert!(load_config(f.path()).is_err());
    }

    #[test]
    fn test_missing_dsn_rejected() {
        let f = write_config(&VALID.replace(
            "direct_url = \"postgres://localhost/reclaim\"",
            "force_pooler = true",
        ));
        let err = load_config(f.path()).unwrap_err().to_string();
        assert!(err.contains("No database DSN configured"), "{}", err);
    }

    #[test]
    fn test_dsn_fallback_order() {
        let cfg = DbConfig {
            direct_url: Some("postgres://direct".to_string()),
            pooler_url: Some("postgres://pooler".to_string()),
            force_pooler: false,
            pool_size: 10,
        };
        assert_eq!(
            cfg.urls_to_try(),
            vec!["postgres://direct", "postgres://pooler"]
        );

        let forced = DbConfig {
            force_pooler: true,
            ..cfg
        };
        assert_eq!(forced.urls_to_try(), vec!["postgres://pooler"]);
    }
}
