use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::llm::chain::ConversationalChain;
use crate::llm::chat_stream::HttpGenerator;
use crate::llm::embeddings::HttpEmbedder;
use crate::llm::{Embedder, Generator, Retriever};
use crate::search::pinecone::PineconeRetriever;

/// Shared application state. Everything here is read-only after startup.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub retriever: Arc<dyn Retriever>,
    pub generator: Arc<dyn Generator>,
}

impl AppState {
    /// Wire up the HTTP-backed providers described by `config`.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(120))
            .build()?;

        let embedder: Arc<dyn Embedder> =
            Arc::new(HttpEmbedder::new(http_client.clone(), config.llm.clone()));
        let retriever = Arc::new(PineconeRetriever::new(
            http_client.clone(),
            embedder,
            config.vector.clone(),
        ));
        let generator = Arc::new(HttpGenerator::new(http_client, config.llm.clone()));

        Ok(Self::with_providers(config, retriever, generator))
    }

    pub fn with_providers(
        config: Config,
        retriever: Arc<dyn Retriever>,
        generator: Arc<dyn Generator>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            retriever,
            generator,
        }
    }

    /// Bind a fresh chain to the configured providers for one request.
    pub fn chain(&self) -> ConversationalChain {
        ConversationalChain::new(
            self.retriever.clone(),
            self.generator.clone(),
            self.config.vector.top_k,
            Duration::from_secs(self.config.idle_timeout_secs),
        )
    }
}
