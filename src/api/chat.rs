use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::header::{CACHE_CONTROL, CONNECTION};
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::IntoResponse;
use axum::Json;
use futures_util::future;
use futures_util::stream::{self, Stream, StreamExt};
use serde::Serialize;

use crate::llm::chain::{ChainRun, ConversationalChain};
use crate::llm::prompt::{
    sanitize_for_prompt, sanitize_history, truncate_to_char_boundary, MAX_QUESTION_LEN,
};
use crate::models::{
    ChatRequest, DocumentMetadata, ErrorResponse, HistoryEntry, SourceDocsEvent, SourceDocument,
    TokenEvent,
};
use crate::state::AppState;

const DONE_SENTINEL: &str = "[DONE]";

/// POST /api/chat: answer a question about the indexed documents, streamed as SSE.
///
/// Frame order: one empty token, the answer tokens, one `sourceDocs` event,
/// then `[DONE]`. If the pipeline fails the stream goes straight to `[DONE]`.
pub async fn chat(
    State(state): State<AppState>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorResponse>)> {
    // ── Step 1: Validate and normalize input ──────────────
    let req = match body {
        Ok(Json(req)) => req,
        Err(rejection) => {
            tracing::warn!("Unreadable chat request: {}", rejection.body_text());
            ChatRequest::default()
        }
    };
    let question = req.question.as_deref().map(normalize_question).unwrap_or_default();
    if question.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                message: "No question in the request".to_string(),
            }),
        ));
    }
    let history = sanitize_history(req.history.unwrap_or_default());

    tracing::info!(
        "Chat request: {} chars, {} history turns",
        question.len(),
        history.len()
    );

    // ── Step 2: Bind a chain for this request ─────────────
    let chain = state.chain();
    let source_prefix: Arc<str> = Arc::from(state.config.source_prefix.as_str());

    // ── Step 3: Assemble the event stream ─────────────────
    let events = stream::once(future::ready(json_event(&TokenEvent { data: "" })))
        .chain(answer_events(chain, question, history, source_prefix))
        .chain(stream::once(future::ready(Event::default().data(DONE_SENTINEL))))
        .map(Ok::<_, Infallible>);

    Ok((
        [
            (CACHE_CONTROL, "no-cache, no-transform"),
            (CONNECTION, "keep-alive"),
        ],
        Sse::new(events),
    ))
}

enum Phase {
    Pending {
        chain: ConversationalChain,
        question: String,
        history: Vec<HistoryEntry>,
    },
    Streaming(ChainRun),
    Finished,
}

/// Token events followed by the source-documents event. Ends early, without
/// an error event, when any pipeline step fails.
fn answer_events(
    chain: ConversationalChain,
    question: String,
    history: Vec<HistoryEntry>,
    source_prefix: Arc<str>,
) -> impl Stream<Item = Event> + Send {
    let start = Phase::Pending {
        chain,
        question,
        history,
    };
    stream::unfold(start, move |phase| {
        let source_prefix = source_prefix.clone();
        async move { next_answer_event(phase, &source_prefix).await }
    })
}

async fn next_answer_event(mut phase: Phase, source_prefix: &str) -> Option<(Event, Phase)> {
    loop {
        phase = match phase {
            Phase::Pending {
                chain,
                question,
                history,
            } => match chain.call(&question, &history).await {
                Ok(run) => Phase::Streaming(run),
                Err(e) => {
                    tracing::error!("Chat pipeline failed: {e:#}");
                    return None;
                }
            },
            Phase::Streaming(mut run) => match run.next_token().await {
                Some(Ok(token)) => {
                    let event = json_event(&TokenEvent { data: &token });
                    return Some((event, Phase::Streaming(run)));
                }
                Some(Err(e)) => {
                    tracing::error!("Answer stream failed: {e:#}");
                    return None;
                }
                None => {
                    let output = run.finish();
                    tracing::info!(
                        "Answer complete: {} chars, {} source documents",
                        output.answer.len(),
                        output.source_documents.len()
                    );
                    let docs = format_source_documents(output.source_documents, source_prefix);
                    let event = json_event(&SourceDocsEvent { source_docs: &docs });
                    return Some((event, Phase::Finished));
                }
            },
            Phase::Finished => return None,
        };
    }
}

fn json_event<T: Serialize>(payload: &T) -> Event {
    match serde_json::to_string(payload) {
        Ok(data) => Event::default().data(data),
        Err(e) => {
            tracing::error!("Failed to serialize SSE payload: {e}");
            Event::default().comment("serialization failed")
        }
    }
}

// ─── Helper functions ────────────────────────────────────

/// Flatten newlines to spaces, strip prompt control tokens and trim.
/// An empty result means there is no usable question.
fn normalize_question(question: &str) -> String {
    let flattened = question.trim().replace('\n', " ");
    sanitize_for_prompt(&truncate_to_char_boundary(&flattened, MAX_QUESTION_LEN))
        .trim()
        .to_string()
}

/// Trim every line and drop the blank ones.
pub fn format_page_content(content: &str) -> String {
    content
        .split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Drop `prefix` from the start of `source`; other paths pass through unchanged.
pub fn strip_source_prefix(source: &str, prefix: &str) -> String {
    if prefix.is_empty() {
        return source.to_string();
    }
    source.strip_prefix(prefix).unwrap_or(source).to_string()
}

pub fn format_source_document(doc: SourceDocument, source_prefix: &str) -> SourceDocument {
    SourceDocument {
        page_content: format_page_content(&doc.page_content),
        metadata: DocumentMetadata {
            page_count: doc.metadata.page_count,
            source: strip_source_prefix(&doc.metadata.source, source_prefix),
        },
    }
}

fn format_source_documents(docs: Vec<SourceDocument>, source_prefix: &str) -> Vec<SourceDocument> {
    docs.into_iter()
        .map(|d| format_source_document(d, source_prefix))
        .collect()
}
