//! Conversational retrieval chain: condense → retrieve → stream answer.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures_util::stream::StreamExt;

use crate::llm::prompt::{build_condense_messages, build_qa_messages};
use crate::llm::{Generator, Retriever, TokenStream};
use crate::models::{HistoryEntry, SourceDocument};

/// Final record of a chain run.
#[derive(Debug, Clone)]
pub struct ChainOutput {
    pub answer: String,
    pub source_documents: Vec<SourceDocument>,
}

/// An in-progress answer. Tokens are pulled with [`ChainRun::next_token`]
/// until it returns `None`; [`ChainRun::finish`] then yields the final record.
pub struct ChainRun {
    tokens: TokenStream,
    idle_timeout: Duration,
    answer: String,
    source_documents: Vec<SourceDocument>,
}

impl ChainRun {
    pub async fn next_token(&mut self) -> Option<Result<String>> {
        match tokio::time::timeout(self.idle_timeout, self.tokens.next()).await {
            Ok(Some(Ok(token))) => {
                self.answer.push_str(&token);
                Some(Ok(token))
            }
            Ok(Some(Err(e))) => Some(Err(e)),
            Ok(None) => None,
            Err(_) => Some(Err(anyhow::anyhow!(
                "LLM response timed out (idle for {}s)",
                self.idle_timeout.as_secs()
            ))),
        }
    }

    pub fn finish(self) -> ChainOutput {
        ChainOutput {
            answer: self.answer,
            source_documents: self.source_documents,
        }
    }
}

/// A retrieval chain bound to one retriever and one generator.
#[derive(Clone)]
pub struct ConversationalChain {
    retriever: Arc<dyn Retriever>,
    generator: Arc<dyn Generator>,
    top_k: usize,
    idle_timeout: Duration,
}

impl ConversationalChain {
    pub fn new(
        retriever: Arc<dyn Retriever>,
        generator: Arc<dyn Generator>,
        top_k: usize,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            retriever,
            generator,
            top_k,
            idle_timeout,
        }
    }

    /// Start answering `question`. Retrieval completes before this returns;
    /// the answer itself arrives through the returned run.
    pub async fn call(&self, question: &str, history: &[HistoryEntry]) -> Result<ChainRun> {
        let standalone = self.standalone_question(question, history).await?;
        tracing::debug!("Standalone question: {standalone}");

        let source_documents = self
            .retriever
            .retrieve(&standalone, self.top_k)
            .await
            .context("Document retrieval failed")?;
        tracing::debug!("Retrieved {} source documents", source_documents.len());

        let tokens = self
            .generator
            .stream(build_qa_messages(&source_documents, &standalone))
            .await
            .context("Failed to start answer generation")?;

        Ok(ChainRun {
            tokens,
            idle_timeout: self.idle_timeout,
            answer: String::new(),
            source_documents,
        })
    }

    async fn standalone_question(&self, question: &str, history: &[HistoryEntry]) -> Result<String> {
        if history.is_empty() {
            return Ok(question.to_string());
        }

        let condensed = self
            .generator
            .complete(build_condense_messages(history, question))
            .await
            .context("Failed to condense follow-up question")?;
        let condensed = condensed.trim();

        if condensed.is_empty() {
            tracing::warn!("Condense step returned nothing, using the original question");
            return Ok(question.to_string());
        }
        Ok(condensed.replace('\n', " "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChatMessage, DocumentMetadata};
    use async_trait::async_trait;
    use futures_util::stream;
    use std::sync::Mutex;

    struct FixedRetriever {
        queries: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Retriever for FixedRetriever {
        async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<SourceDocument>> {
            self.queries.lock().unwrap().push(query.to_string());
            Ok((0..top_k)
                .map(|i| SourceDocument {
                    page_content: format!("chunk {i}"),
                    metadata: DocumentMetadata::default(),
                })
                .collect())
        }
    }

    /// Streams the configured tokens; `complete` always answers with a fixed rephrasing.
    struct ScriptedGenerator {
        tokens: Vec<&'static str>,
        calls: Mutex<Vec<Vec<ChatMessage>>>,
    }

    #[async_trait]
    impl Generator for ScriptedGenerator {
        async fn stream(&self, messages: Vec<ChatMessage>) -> Result<TokenStream> {
            self.calls.lock().unwrap().push(messages);
            let tokens: Vec<Result<String>> =
                self.tokens.iter().map(|t| Ok(t.to_string())).collect();
            Ok(Box::pin(stream::iter(tokens)))
        }

        async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String> {
            self.calls.lock().unwrap().push(messages);
            Ok("standalone\nquestion?".to_string())
        }
    }

    struct StalledGenerator;

    #[async_trait]
    impl Generator for StalledGenerator {
        async fn stream(&self, _messages: Vec<ChatMessage>) -> Result<TokenStream> {
            Ok(Box::pin(stream::pending::<Result<String>>()))
        }
    }

    fn chain(
        retriever: Arc<FixedRetriever>,
        generator: Arc<dyn Generator>,
    ) -> ConversationalChain {
        ConversationalChain::new(retriever, generator, 2, Duration::from_secs(5))
    }

    fn retriever() -> Arc<FixedRetriever> {
        Arc::new(FixedRetriever {
            queries: Mutex::new(Vec::new()),
        })
    }

    fn generator(tokens: Vec<&'static str>) -> Arc<ScriptedGenerator> {
        Arc::new(ScriptedGenerator {
            tokens,
            calls: Mutex::new(Vec::new()),
        })
    }

    #[tokio::test]
    async fn test_run_yields_tokens_then_output() {
        let retriever = retriever();
        let chain = chain(retriever.clone(), generator(vec!["X", " is", " Y."]));

        let mut run = chain.call("What is X?", &[]).await.unwrap();

        let mut seen = Vec::new();
        while let Some(token) = run.next_token().await {
            seen.push(token.unwrap());
        }
        assert_eq!(seen, vec!["X", " is", " Y."]);

        let output = run.finish();
        assert_eq!(output.answer, "X is Y.");
        assert_eq!(output.source_documents.len(), 2);
        assert_eq!(retriever.queries.lock().unwrap().as_slice(), ["What is X?"]);
    }

    #[tokio::test]
    async fn test_history_triggers_condense_step() {
        let retriever = retriever();
        let generator = generator(vec!["ok"]);
        let chain = chain(retriever.clone(), generator.clone());

        let history = vec![HistoryEntry::Turn("q1".into(), "a1".into())];
        let mut run = chain.call("and then?", &history).await.unwrap();
        while run.next_token().await.is_some() {}

        assert_eq!(
            retriever.queries.lock().unwrap().as_slice(),
            ["standalone question?"]
        );
        let calls = generator.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert!(calls[0][0].content.contains("Follow Up Input: and then?"));
        assert!(calls[1][1].content.contains("Question: standalone question?"));
    }

    #[tokio::test]
    async fn test_idle_timeout_surfaces_as_error() {
        let chain = ConversationalChain::new(
            retriever(),
            Arc::new(StalledGenerator),
            2,
            Duration::from_millis(20),
        );
        let mut run = chain.call("q", &[]).await.unwrap();
        let err = run.next_token().await.unwrap().unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
