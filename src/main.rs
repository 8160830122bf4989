use tracing_subscriber::EnvFilter;

use pdf_chat::api;
use pdf_chat::config::Config;
use pdf_chat::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    tracing::info!("LLM provider: {} ({})", config.llm.provider, config.llm.base_url);
    tracing::info!(
        "Vector index: {} (namespace '{}', top_k {})",
        config
            .vector
            .index_host
            .as_deref()
            .or(config.vector.index_name.as_deref())
            .unwrap_or("<unset>"),
        config.vector.namespace,
        config.vector.top_k
    );
    if config.vector.api_key.is_none() {
        tracing::warn!("PINECONE_API_KEY is not set; retrieval requests will be rejected");
    }

    let bind_addr = config.bind_addr.clone();
    let state = AppState::new(config)?;
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Server listening on {}", bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}
