//! Prompt construction for the two chain steps: condensing a follow-up into a
//! standalone question, and answering from retrieved context.

use std::fmt::Write;

use crate::models::{ChatMessage, HistoryEntry, SourceDocument};

pub const MAX_QUESTION_LEN: usize = 2000;
pub const MAX_HISTORY_TURNS: usize = 10;

const CONTROL_TOKENS: [&str; 3] = ["<|im_start|>", "<|im_end|>", "<|endoftext|>"];

/// Strip chat-template control tokens so user text and document content
/// cannot open or close a turn in the rendered prompt.
pub fn sanitize_for_prompt(text: &str) -> String {
    let mut out = text.to_string();
    for token in CONTROL_TOKENS {
        out = out.replace(token, "");
    }
    out
}

pub fn truncate_to_char_boundary(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    s.char_indices()
        .take_while(|(i, c)| i + c.len_utf8() <= max_len)
        .map(|(_, c)| c)
        .collect()
}

fn clean(text: &str) -> String {
    sanitize_for_prompt(&truncate_to_char_boundary(text, MAX_QUESTION_LEN))
}

/// Keep the most recent turns and sanitize their text.
pub fn sanitize_history(history: Vec<HistoryEntry>) -> Vec<HistoryEntry> {
    let skip = history.len().saturating_sub(MAX_HISTORY_TURNS);
    history
        .into_iter()
        .skip(skip)
        .map(|entry| match entry {
            HistoryEntry::Turn(q, a) => HistoryEntry::Turn(clean(&q), clean(&a)),
            HistoryEntry::Message(m) => HistoryEntry::Message(ChatMessage {
                role: m.role,
                content: clean(&m.content),
            }),
            HistoryEntry::Text(t) => HistoryEntry::Text(clean(&t)),
        })
        .collect()
}

/// Render history as a plain transcript.
pub fn format_history(history: &[HistoryEntry]) -> String {
    let mut out = String::new();
    for entry in history {
        match entry {
            HistoryEntry::Turn(q, a) => {
                let _ = writeln!(out, "Human: {q}\nAssistant: {a}");
            }
            HistoryEntry::Message(m) => {
                let speaker = if m.role == "assistant" { "Assistant" } else { "Human" };
                let _ = writeln!(out, "{speaker}: {}", m.content);
            }
            HistoryEntry::Text(t) => {
                let _ = writeln!(out, "{t}");
            }
        }
    }
    out.trim_end().to_string()
}

pub fn build_condense_messages(history: &[HistoryEntry], question: &str) -> Vec<ChatMessage> {
    let prompt = format!(
        "Given the following conversation and a follow up question, rephrase the follow up \
         question to be a standalone question.\n\n\
         Chat History:\n{}\n\
         Follow Up Input: {}\n\
         Standalone question:",
        format_history(history),
        question
    );
    vec![ChatMessage::user(prompt)]
}

fn build_system_prompt() -> String {
    String::from(
        "You are a helpful AI assistant. Use the following pieces of context to answer the \
         question at the end.\n\
         If you don't know the answer, just say you don't know. DO NOT try to make up an answer.\n\
         If the question is not related to the context, politely respond that you are tuned to \
         only answer questions that are related to the context.",
    )
}

fn build_context_block(docs: &[SourceDocument]) -> String {
    if docs.is_empty() {
        return "(No relevant context was found for this question.)\n".to_string();
    }
    let mut ctx = String::new();
    for doc in docs {
        let _ = write!(ctx, "{}\n\n", sanitize_for_prompt(&doc.page_content));
    }
    ctx
}

pub fn build_qa_messages(docs: &[SourceDocument], question: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(build_system_prompt()),
        ChatMessage::user(format!(
            "{}Question: {question}\nHelpful answer in markdown:",
            build_context_block(docs)
        )),
    ]
}
