use serde::{Deserialize, Deserializer, Serialize};

/// Chat request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default, deserialize_with = "lenient_history")]
    pub history: Option<Vec<HistoryEntry>>,
}

/// History is best-effort context: a non-array value counts as no history
/// and entries of an unknown shape are dropped.
fn lenient_history<'de, D>(deserializer: D) -> Result<Option<Vec<HistoryEntry>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    let Some(serde_json::Value::Array(items)) = value else {
        return Ok(None);
    };
    let entries: Vec<HistoryEntry> = items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect();
    Ok(Some(entries))
}

/// One prior turn of the conversation as sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HistoryEntry {
    /// `[question, answer]`
    Turn(String, String),
    /// `{ "role": "...", "content": "..." }`
    Message(ChatMessage),
    /// A pre-formatted line of history
    Text(String),
}

/// A single chat message sent to the language model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// A retrieved document chunk, as returned to the client in the `sourceDocs` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceDocument {
    pub page_content: String,
    pub metadata: DocumentMetadata,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    #[serde(default, alias = "pdf_numpages")]
    pub page_count: Option<u64>,
    #[serde(default)]
    pub source: String,
}

/// SSE payload carrying one generated token
#[derive(Debug, Clone, Serialize)]
pub struct TokenEvent<'a> {
    pub data: &'a str,
}

/// SSE payload carrying the reformatted source documents
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceDocsEvent<'a> {
    pub source_docs: &'a [SourceDocument],
}

/// JSON body for client errors
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_without_history() {
        let req: ChatRequest = serde_json::from_str(r#"{"question":"hi"}"#).unwrap();
        assert_eq!(req.question.as_deref(), Some("hi"));
        assert!(req.history.is_none());
    }

    #[test]
    fn test_request_without_question() {
        let req: ChatRequest = serde_json::from_str(r#"{"history":[]}"#).unwrap();
        assert!(req.question.is_none());
    }

    #[test]
    fn test_null_history() {
        let req: ChatRequest =
            serde_json::from_str(r#"{"question":"hi","history":null}"#).unwrap();
        assert!(req.history.is_none());
    }

    #[test]
    fn test_history_entry_shapes() {
        let req: ChatRequest = serde_json::from_str(
            r#"{"question":"q","history":[["q1","a1"],"raw line",{"role":"user","content":"c"}]}"#,
        )
        .unwrap();
        let history = req.history.unwrap();
        assert_eq!(history[0], HistoryEntry::Turn("q1".into(), "a1".into()));
        assert_eq!(history[1], HistoryEntry::Text("raw line".into()));
        assert_eq!(history[2], HistoryEntry::Message(ChatMessage::user("c")));
    }

    #[test]
    fn test_malformed_history_entries_are_dropped() {
        let req: ChatRequest = serde_json::from_str(
            r#"{"question":"q","history":[["a",null],["only-one"],42,["q1","a1"]]}"#,
        )
        .unwrap();
        assert_eq!(
            req.history.unwrap(),
            vec![HistoryEntry::Turn("q1".into(), "a1".into())]
        );
    }

    #[test]
    fn test_non_array_history_is_ignored() {
        let req: ChatRequest =
            serde_json::from_str(r#"{"question":"q","history":"not-an-array"}"#).unwrap();
        assert_eq!(req.question.as_deref(), Some("q"));
        assert!(req.history.is_none());
    }

    #[test]
    fn test_source_document_wire_format() {
        let doc = SourceDocument {
            page_content: "text".into(),
            metadata: DocumentMetadata {
                page_count: Some(3),
                source: "doc.pdf".into(),
            },
        };
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "pageContent": "text",
                "metadata": { "pageCount": 3, "source": "doc.pdf" }
            })
        );
    }

    #[test]
    fn test_metadata_accepts_pdf_numpages_alias() {
        let meta: DocumentMetadata =
            serde_json::from_str(r#"{"pdf_numpages":12,"source":"a.pdf"}"#).unwrap();
        assert_eq!(meta.page_count, Some(12));
    }

    #[test]
    fn test_source_docs_event_key() {
        let json = serde_json::to_string(&SourceDocsEvent { source_docs: &[] }).unwrap();
        assert_eq!(json, r#"{"sourceDocs":[]}"#);
    }
}
