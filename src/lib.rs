//! # pdf-chat
//!
//! An HTTP service that answers questions about a set of PDF documents that
//! were previously embedded into a hosted vector index. Answers stream back to
//! the browser as server-sent events.
//!
//! ## Request flow
//!
//! ```text
//!   POST /api/chat { question, history }
//!            │
//!            ▼
//!   validate + normalize ──── blank ───▶ 400 { message }
//!            │
//!            ▼
//!   open SSE stream, send data: {"data":""}
//!            │
//!            ▼
//!   ┌──────────────────────────────────────┐
//!   │ ConversationalChain                  │
//!   │  history? ─▶ condense to standalone  │
//!   │  Retriever: embed + vector query     │
//!   │  Generator: stream answer tokens ────┼──▶ data: {"data":"<token>"}
//!   └──────────────────┬───────────────────┘
//!                      ▼
//!   reformat source documents ──────────────▶ data: {"sourceDocs":[...]}
//!                      │
//!                      ▼
//!   data: [DONE]   (always, also after a failure)
//! ```
//!
//! ## Module Overview
//!
//! - [`config`] - Environment-based configuration for the server, LLM and vector index
//! - [`models`] - Request, document and SSE payload types
//! - [`llm`] - `Embedder` / `Retriever` / `Generator` traits, HTTP providers, prompts and the chain
//! - [`search::pinecone`] - Retriever backed by a hosted Pinecone index
//! - [`api`] - Axum router and the streaming chat handler
//! - [`state`] - Shared, read-only application state

pub mod api;
pub mod config;
pub mod llm;
pub mod models;
pub mod search;
pub mod state;
