//! Capability interfaces for the external services behind the chat pipeline,
//! plus the HTTP-backed implementations and the conversational chain that
//! composes them.

pub mod chain;
pub mod chat_stream;
pub mod embeddings;
pub mod prompt;

use std::pin::Pin;

use anyhow::Result;
use async_trait::async_trait;
use futures_util::stream::{Stream, StreamExt};

use crate::models::{ChatMessage, SourceDocument};

/// A lazy, finite stream of content deltas from a language model.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Converts text into embedding vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        if vectors.is_empty() {
            anyhow::bail!("No embedding returned");
        }
        Ok(vectors.swap_remove(0))
    }
}

/// Returns the documents most relevant to a query.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<SourceDocument>>;
}

/// Generates chat completions.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Start a streaming completion. Tokens arrive in generation order.
    async fn stream(&self, messages: Vec<ChatMessage>) -> Result<TokenStream>;

    /// Run a completion to the end and return the full text.
    async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String> {
        let mut tokens = self.stream(messages).await?;
        let mut text = String::new();
        while let Some(token) = tokens.next().await {
            text.push_str(&token?);
        }
        Ok(text)
    }
}
