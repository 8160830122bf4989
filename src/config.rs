use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server bind address
    pub bind_addr: String,
    /// Path prefix stripped from `metadata.source` before documents reach the client
    pub source_prefix: String,
    /// Seconds to wait for the next generated token before giving up
    pub idle_timeout_secs: u64,
    /// LLM provider configuration
    pub llm: LlmConfig,
    /// Vector index configuration
    pub vector: VectorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "ollama" or "openai"
    pub provider: String,
    /// Base URL for the LLM API
    pub base_url: String,
    /// Model name for answer generation
    pub chat_model: String,
    /// Model name for embeddings
    pub embedding_model: String,
    /// API key (only needed for cloud providers)
    pub api_key: Option<String>,
    /// Sampling temperature for answer generation
    pub temperature: f32,
}

/// Configuration for the hosted vector index (Pinecone data plane).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorConfig {
    pub api_key: Option<String>,
    /// Index name, used to look up the data-plane host when `index_host` is unset.
    pub index_name: Option<String>,
    /// Data-plane host, e.g. "https://pdf-index-abc123.svc.us-east1-gcp.pinecone.io".
    pub index_host: Option<String>,
    /// Control-plane base URL used to resolve `index_name`.
    pub control_plane_url: String,
    pub namespace: String,
    /// Metadata key holding the chunk text.
    pub text_key: String,
    /// Number of documents retrieved per question.
    pub top_k: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3000".to_string(),
            source_prefix: "docs/".to_string(),
            idle_timeout_secs: 60,
            llm: LlmConfig::default(),
            vector: VectorConfig::default(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            base_url: "https://api.openai.com".to_string(),
            chat_model: "gpt-3.5-turbo".to_string(),
            embedding_model: "text-embedding-ada-002".to_string(),
            api_key: None,
            temperature: 0.0,
        }
    }
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            index_name: None,
            index_host: None,
            control_plane_url: "https://api.pinecone.io".to_string(),
            namespace: "pdf-test".to_string(),
            text_key: "text".to_string(),
            top_k: 4,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary variable lookup. Values that fail to
    /// parse keep their defaults.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = var("PDF_CHAT_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Some(prefix) = var("PDF_CHAT_SOURCE_PREFIX") {
            config.source_prefix = prefix;
        }
        if let Some(v) = var("PDF_CHAT_IDLE_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            config.idle_timeout_secs = v;
        }

        if let Some(provider) = var("LLM_PROVIDER") {
            config.llm.provider = provider;
        }
        if let Some(url) = var("LLM_BASE_URL") {
            config.llm.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(model) = var("LLM_CHAT_MODEL") {
            config.llm.chat_model = model;
        }
        if let Some(model) = var("LLM_EMBEDDING_MODEL") {
            config.llm.embedding_model = model;
        }
        if let Some(key) = var("LLM_API_KEY").or_else(|| var("OPENAI_API_KEY")) {
            config.llm.api_key = Some(key);
        }
        if let Some(t) = var("LLM_TEMPERATURE").and_then(|v| v.parse().ok()) {
            config.llm.temperature = t;
        }

        // Vector index
        if let Some(key) = var("PINECONE_API_KEY") {
            config.vector.api_key = Some(key);
        }
        if let Some(name) = var("PINECONE_INDEX_NAME") {
            config.vector.index_name = Some(name);
        }
        if let Some(host) = var("PINECONE_INDEX_HOST") {
            config.vector.index_host = Some(host);
        }
        if let Some(url) = var("PINECONE_CONTROL_PLANE_URL") {
            config.vector.control_plane_url = url.trim_end_matches('/').to_string();
        }
        if let Some(ns) = var("PINECONE_NAME_SPACE") {
            config.vector.namespace = ns;
        }
        if let Some(key) = var("PINECONE_TEXT_KEY") {
            config.vector.text_key = key;
        }
        if let Some(k) = var("RETRIEVER_TOP_K").and_then(|v| v.parse().ok()) {
            config.vector.top_k = k;
        }

        config
    }
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
    fn test_defaults_without_env() {
        let config = Config::from_lookup(lookup(&[]));
        assert_eq!(config.bind_addr, "127.0.0.1:3000");
        assert_eq!(config.vector.namespace, "pdf-test");
        assert_eq!(config.vector.text_key, "text");
        assert_eq!(config.vector.top_k, 4);
        assert!(config.llm.api_key.is_none());
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("LLM_PROVIDER", "ollama"),
            ("LLM_BASE_URL", "http://localhost:11434/"),
            ("PINECONE_INDEX_HOST", "https://idx.pinecone.io"),
            ("RETRIEVER_TOP_K", "2"),
            ("PDF_CHAT_SOURCE_PREFIX", "/srv/docs/"),
        ]));
        assert_eq!(config.llm.provider, "ollama");
        assert_eq!(config.llm.base_url, "http://localhost:11434");
        assert_eq!(config.vector.index_host.as_deref(), Some("https://idx.pinecone.io"));
        assert_eq!(config.vector.top_k, 2);
        assert_eq!(config.source_prefix, "/srv/docs/");
    }

    #[test]
    fn test_openai_key_fallback() {
        let config = Config::from_lookup(lookup(&[("OPENAI_API_KEY", "sk-test")]));
        assert_eq!(config.llm.api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn test_unparseable_numbers_keep_defaults() {
        let config = Config::from_lookup(lookup(&[
            ("RETRIEVER_TOP_K", "many"),
            ("PDF_CHAT_IDLE_TIMEOUT_SECS", "-1"),
        ]));
        assert_eq!(config.vector.top_k, 4);
        assert_eq!(config.idle_timeout_secs, 60);
    }
}
