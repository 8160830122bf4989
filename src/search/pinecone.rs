use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::VectorConfig;
use crate::llm::{Embedder, Retriever};
use crate::models::{DocumentMetadata, SourceDocument};

const API_VERSION: &str = "2024-07";

/// Retriever over a hosted Pinecone index: embeds the query, then asks the
/// index for its nearest neighbours in the configured namespace.
pub struct PineconeRetriever {
    client: reqwest::Client,
    embedder: Arc<dyn Embedder>,
    config: VectorConfig,
}

impl PineconeRetriever {
    pub fn new(client: reqwest::Client, embedder: Arc<dyn Embedder>, config: VectorConfig) -> Self {
        Self {
            client,
            embedder,
            config,
        }
    }

    fn api_key(&self) -> &str {
        self.config.api_key.as_deref().unwrap_or_default()
    }

    /// Data-plane host for the index, looked up by name when not configured.
    async fn index_host(&self) -> Result<String> {
        if let Some(host) = &self.config.index_host {
            return Ok(normalize_host(host));
        }

        let name = self
            .config
            .index_name
            .as_deref()
            .context("Neither PINECONE_INDEX_HOST nor PINECONE_INDEX_NAME is set")?;
        let url = format!("{}/indexes/{name}", self.config.control_plane_url);

        let resp = self
            .client
            .get(&url)
            .header("Api-Key", self.api_key())
            .header("X-Pinecone-API-Version", API_VERSION)
            .send()
            .await
            .context("Failed to call Pinecone describe_index")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Pinecone describe_index returned {status}: {body}");
        }

        let body: DescribeIndexResponse = resp
            .json()
            .await
            .context("Failed to parse Pinecone describe_index response")?;
        Ok(normalize_host(&body.host))
    }
}

#[async_trait]
impl Retriever for PineconeRetriever {
    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<SourceDocument>> {
        let vector = self
            .embedder
            .embed(query)
            .await
            .context("Failed to embed query")?;

        let url = format!("{}/query", self.index_host().await?);
        let req = QueryRequest {
            namespace: &self.config.namespace,
            vector,
            top_k,
            include_metadata: true,
            include_values: false,
        };

        let resp = self
            .client
            .post(&url)
            .header("Api-Key", self.api_key())
            .header("X-Pinecone-API-Version", API_VERSION)
            .json(&req)
            .send()
            .await
            .context("Failed to call Pinecone query API")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Pinecone query API returned {status}: {body}");
        }

        let body: QueryResponse = resp
            .json()
            .await
            .context("Failed to parse Pinecone query response")?;

        Ok(matches_to_documents(body.matches, &self.config.text_key))
    }
}

fn normalize_host(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{host}")
    }
}

/// Map index matches to documents. Matches without text under `text_key` are skipped.
fn matches_to_documents(matches: Vec<QueryMatch>, text_key: &str) -> Vec<SourceDocument> {
    matches
        .into_iter()
        .filter_map(|m| {
            let metadata = m.metadata.unwrap_or_default();
            let Some(text) = metadata.get(text_key).and_then(Value::as_str) else {
                tracing::warn!("Skipping match {} without '{text_key}' metadata", m.id);
                return None;
            };
            Some(SourceDocument {
                page_content: text.to_string(),
                metadata: DocumentMetadata {
                    page_count: page_count(&metadata),
                    source: metadata
                        .get("source")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                },
            })
        })
        .collect()
}

fn page_count(metadata: &Map<String, Value>) -> Option<u64> {
    ["pdf_numpages", "pdf.totalPages", "pageCount"]
        .iter()
        .find_map(|key| metadata.get(*key).and_then(Value::as_f64))
        .filter(|n| *n >= 0.0)
        .map(|n| n as u64)
}

// ─── Request/Response types ────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    namespace: &'a str,
    vector: Vec<f32>,
    top_k: usize,
    include_metadata: bool,
    include_values: bool,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Deserialize)]
struct QueryMatch {
    id: String,
    #[serde(default)]
    metadata: Option<Map<String, Value>>,
}

#[derive(Deserialize)]
struct DescribeIndexResponse {
    host: String,
}
