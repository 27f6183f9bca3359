//! Configuration management
//!
//! Settings come from an optional YAML file and are then overridden by
//! environment variables. Environment access goes through a lookup closure
//! so that callers (and tests) can supply their own source.

use crate::error::{RagError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub vector_store: VectorStoreConfig,

    #[serde(default)]
    pub chunking: ChunkingConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub filings: FilingsConfig,

    /// Path of the SQLite metadata database
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

/// Language model provider selection and per-provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Default provider used when a caller does not name one
    #[serde(default = "default_llm_provider")]
    pub provider: String,

    #[serde(default = "ProviderSettings::openai")]
    pub openai: ProviderSettings,

    #[serde(default = "ProviderSettings::anthropic")]
    pub anthropic: ProviderSettings,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            openai: ProviderSettings::openai(),
            anthropic: ProviderSettings::anthropic(),
            timeout_secs: default_timeout(),
        }
    }
}

/// Credential, model and endpoint for one vendor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default)]
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
}

impl ProviderSettings {
    pub fn openai() -> Self {
        Self {
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
        }
    }

    pub fn anthropic() -> Self {
        Self {
            api_key: None,
            model: "claude-3-haiku-20240307".to_string(),
            base_url: "https://api.anthropic.com/v1".to_string(),
        }
    }

    /// The configured key, treating blank strings as absent
    pub fn credential(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }
}

/// Embedding backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// `openai` or `hash`
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Overrides the dimension table of the selected model
    #[serde(default)]
    pub dimensions: Option<usize>,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            dimensions: None,
            api_key: None,
            base_url: default_openai_base_url(),
        }
    }
}

/// Vector store backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    /// `sqlite` or `local`
    #[serde(default = "default_vector_store_provider")]
    pub provider: String,

    /// Database file (sqlite) or index directory (local). Unset means the
    /// backend's own default under the data dir.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl VectorStoreConfig {
    /// Configured path, or the default for the selected backend
    pub fn resolved_path(&self) -> PathBuf {
        match &self.path {
            Some(path) => path.clone(),
            None if self.provider == "local" => data_dir().join("vectors"),
            None => data_dir().join("vectors.sqlite"),
        }
    }
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            provider: default_vector_store_provider(),
            path: None,
        }
    }
}

/// Default chunking parameters for document ingestion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// `sentence`, `fixed` or `token`
    #[serde(default = "default_chunk_strategy")]
    pub strategy: String,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            strategy: default_chunk_strategy(),
        }
    }
}

/// Retrieval defaults for RAG queries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Maximum characters of retrieved context handed to the model
    #[serde(default = "default_context_window")]
    pub context_window: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            context_window: default_context_window(),
        }
    }
}

/// EDGAR filings source settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilingsConfig {
    #[serde(default = "default_sec_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_sec_rate_limit")]
    pub rate_limit_per_sec: f64,

    #[serde(default = "default_sec_cache_dir")]
    pub cache_dir: PathBuf,
}

impl Default for FilingsConfig {
    fn default() -> Self {
        Self {
            user_agent: default_sec_user_agent(),
            rate_limit_per_sec: default_sec_rate_limit(),
            cache_dir: default_sec_cache_dir(),
        }
    }
}

fn default_llm_provider() -> String {
    "anthropic".to_string()
}

fn default_timeout() -> u64 {
    60
}

fn default_embedding_provider() -> String {
    "openai".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_vector_store_provider() -> String {
    "sqlite".to_string()
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(crate::DATA_DIR_NAME)
}

fn default_database_path() -> PathBuf {
    crate::db::Database::default_path()
}

fn default_chunk_size() -> usize {
    1000
}

fn default_chunk_overlap() -> usize {
    200
}

fn default_chunk_strategy() -> String {
    "sentence".to_string()
}

fn default_top_k() -> usize {
    5
}

fn default_context_window() -> usize {
    4000
}

fn default_sec_user_agent() -> String {
    concat!("ragroute/", env!("CARGO_PKG_VERSION"), " admin@example.com").to_string()
}

fn default_sec_rate_limit() -> f64 {
    5.0
}

fn default_sec_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(crate::DATA_DIR_NAME)
        .join("sec")
}

impl Config {
    /// Load config from the file named by `RAGROUTE_CONFIG` (or the default
    /// path), then apply environment overrides
    pub fn load() -> Result<Self> {
        let mut config = Self::from_file_or_default(&Self::config_path())?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Defaults plus environment overrides, ignoring any config file
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults plus overrides from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();
        config.apply_env(lookup)?;
        Ok(config)
    }

    fn from_file_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Ok(serde_yaml::from_str(&content)?)
        } else {
            Ok(Config::default())
        }
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Save config as YAML
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_yaml()?)?;
        Ok(())
    }

    /// Config file in effect: `RAGROUTE_CONFIG`, else [`default_path`](Self::default_path)
    pub fn config_path() -> PathBuf {
        std::env::var("RAGROUTE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::default_path())
    }

    /// Get default config path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(crate::CONFIG_DIR_NAME)
            .join("config.yml")
    }

    /// Override fields from environment-style keys
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("LLM_PROVIDER") {
            self.llm.provider = v.trim().to_lowercase();
        }
        if let Some(v) = get("OPENAI_API_KEY") {
            self.llm.openai.api_key = Some(v.clone());
            self.embedding.api_key = Some(v);
        }
        if let Some(v) = get("ANTHROPIC_API_KEY") {
            self.llm.anthropic.api_key = Some(v);
        }
        if let Some(v) = get("OPENAI_MODEL") {
            self.llm.openai.model = v;
        }
        if let Some(v) = get("ANTHROPIC_MODEL") {
            self.llm.anthropic.model = v;
        }
        if let Some(v) = get("OPENAI_BASE_URL") {
            self.llm.openai.base_url = v.clone();
            self.embedding.base_url = v;
        }
        if let Some(v) = get("ANTHROPIC_BASE_URL") {
            self.llm.anthropic.base_url = v;
        }
        if let Some(v) = get("LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_setting("LLM_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("EMBEDDING_PROVIDER") {
            self.embedding.provider = v.trim().to_lowercase();
        }
        if let Some(v) = get("EMBEDDING_MODEL") {
            self.embedding.model = v;
        }
        if let Some(v) = get("EMBEDDING_DIMENSIONS") {
            self.embedding.dimensions = Some(parse_setting("EMBEDDING_DIMENSIONS", &v)?);
        }
        if let Some(v) = get("VECTOR_STORE_PROVIDER") {
            self.vector_store.provider = v.trim().to_lowercase();
        }
        if let Some(v) = get("VECTOR_STORE_PATH") {
            self.vector_store.path = Some(PathBuf::from(v));
        }
        if let Some(v) = get("DATABASE_PATH") {
            self.database_path = PathBuf::from(v);
        }
        if let Some(v) = get("CHUNK_SIZE") {
            self.chunking.chunk_size = parse_setting("CHUNK_SIZE", &v)?;
        }
        if let Some(v) = get("CHUNK_OVERLAP") {
            self.chunking.chunk_overlap = parse_setting("CHUNK_OVERLAP", &v)?;
        }
        if let Some(v) = get("CHUNK_STRATEGY") {
            self.chunking.strategy = v.trim().to_lowercase();
        }
        if let Some(v) = get("TOP_K") {
            self.retrieval.top_k = parse_setting("TOP_K", &v)?;
        }
        if let Some(v) = get("CONTEXT_WINDOW") {
            self.retrieval.context_window = parse_setting("CONTEXT_WINDOW", &v)?;
        }
        if let Some(v) = get("SEC_USER_AGENT") {
            self.filings.user_agent = v;
        }
        if let Some(v) = get("SEC_RATE_LIMIT_PER_SEC") {
            self.filings.rate_limit_per_sec = parse_setting("SEC_RATE_LIMIT_PER_SEC", &v)?;
        }
        if let Some(v) = get("SEC_CACHE_DIR") {
            self.filings.cache_dir = PathBuf::from(v);
        }

        Ok(())
    }

    /// Copy of the config with credentials masked, for display
    pub fn redacted(&self) -> Self {
        let mask = |key: &Option<String>| key.as_ref().map(|_| "********".to_string());
        let mut copy = self.clone();
        copy.llm.openai.api_key = mask(&self.llm.openai.api_key);
        copy.llm.anthropic.api_key = mask(&self.llm.anthropic.api_key);
        copy.embedding.api_key = mask(&self.embedding.api_key);
        copy
    }
}

fn parse_setting<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim().parse().map_err(|_| {
        RagError::config(format!("{} has an invalid value: {:?}", key, raw))
            .with_details(serde_json::json!({ "setting": key }))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(|_| None).unwrap();
        assert_eq!(config.llm.provider, "anthropic");
        assert_eq!(config.chunking.chunk_size, 1000);
        assert_eq!(config.chunking.chunk_overlap, 200);
        assert_eq!(config.retrieval.top_k, 5);
        assert!(config.llm.openai.credential().is_none());
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("LLM_PROVIDER", "OpenAI"),
            ("OPENAI_API_KEY", "sk-test"),
            ("CHUNK_SIZE", "500"),
            ("VECTOR_STORE_PROVIDER", "local"),
        ]))
        .unwrap();
        assert_eq!(config.llm.provider, "openai");
        assert_eq!(config.llm.openai.credential(), Some("sk-test"));
        assert_eq!(config.embedding.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.chunking.chunk_size, 500);
        assert_eq!(config.vector_store.provider, "local");
    }

    #[test]
    fn test_each_backend_has_its_own_default_path() {
        let mut store = VectorStoreConfig::default();
        let sqlite = store.resolved_path();
        store.provider = "local".into();
        let local = store.resolved_path();
        assert_ne!(sqlite, local);
        assert!(sqlite.ends_with("vectors.sqlite"));
        assert!(local.ends_with("vectors"));

        store.path = Some(PathBuf::from("/tmp/custom"));
        assert_eq!(store.resolved_path(), PathBuf::from("/tmp/custom"));
    }

    #[test]
    fn test_invalid_number_is_configuration_error() {
        let err = Config::from_lookup(lookup(&[("TOP_K", "five")])).unwrap_err();
        assert!(matches!(err, RagError::Configuration { .. }));
        assert!(err.to_string().contains("TOP_K"));
    }

    #[test]
    fn test_blank_key_is_absent() {
        let config = Config::from_lookup(lookup(&[("OPENAI_API_KEY", "   ")])).unwrap();
        assert!(config.llm.openai.credential().is_none());
    }

    #[test]
    fn test_yaml_roundtrip_and_redaction() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        let mut config = Config::default();
        config.llm.anthropic.api_key = Some("secret".to_string());
        config.save(&path).unwrap();

        let loaded = Config::from_file_or_default(&path).unwrap();
        assert_eq!(loaded.llm.anthropic.api_key.as_deref(), Some("secret"));
        assert_eq!(
            loaded.redacted().llm.anthropic.api_key.as_deref(),
            Some("********")
        );
    }
}
