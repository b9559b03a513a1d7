//! JSON frames exchanged over the chat WebSocket.
//!
//! Inbound frames carry a `type` discriminator and decode into [`ServerEvent`].
//! Types this client does not know decode to [`ServerEvent::Unknown`] so a
//! newer server never breaks an older client.

use serde::{Deserialize, Serialize};

use crate::citations::CitationRecord;

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),
    #[error("frame has no `type` field")]
    MissingType,
}

/// Document ids are integers on some endpoints and strings on others.
pub mod flexible_id {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Int(i64),
        Uint(u64),
    }

    impl From<Raw> for String {
        fn from(raw: Raw) -> Self {
            match raw {
                Raw::Text(s) => s,
                Raw::Int(n) => n.to_string(),
                Raw::Uint(n) => n.to_string(),
            }
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
        Raw::deserialize(deserializer).map(String::from)
    }

    pub fn option<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
        Option::<Raw>::deserialize(deserializer).map(|raw| raw.map(String::from))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DocumentState {
    #[default]
    Pending,
    InProgress,
    Complete,
    Error,
}

impl DocumentState {
    pub fn parse(status: &str) -> Option<Self> {
        match status {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "complete" => Some(Self::Complete),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// A document as announced in an analysis `start` roster.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RosterDocument {
    #[serde(deserialize_with = "flexible_id::deserialize")]
    pub document_id: String,
    #[serde(default)]
    pub document_filename: String,
    #[serde(default)]
    pub document_date: String,
    #[serde(default)]
    pub status: DocumentState,
}

/// Raw `document_analysis` frame body. Use [`AnalysisPayload::classify`] to
/// get the typed update it represents.
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
pub struct AnalysisPayload {
    pub status: String,
    #[serde(default, deserialize_with = "flexible_id::option")]
    pub document_id: Option<String>,
    #[serde(default)]
    pub document_date: Option<String>,
    #[serde(default)]
    pub document_filename: Option<String>,
    #[serde(default)]
    pub documents: Option<Vec<RosterDocument>>,
    #[serde(default)]
    pub total_documents: Option<usize>,
    #[serde(default)]
    pub completed_documents: Option<usize>,
    #[serde(default)]
    pub citations: Vec<CitationRecord>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisUpdate {
    Start {
        documents: Vec<RosterDocument>,
        total: Option<usize>,
    },
    Document {
        document_id: String,
        status: DocumentState,
        document_date: Option<String>,
        document_filename: Option<String>,
    },
    /// Final snapshot of a run, optionally with the full roster and citations.
    Summary {
        status: DocumentState,
        documents: Option<Vec<RosterDocument>>,
        total: Option<usize>,
        completed: Option<usize>,
        citations: Vec<CitationRecord>,
    },
    NoDocuments,
    Invalid(String),
}

impl AnalysisPayload {
    pub fn classify(self) -> AnalysisUpdate {
        if self.status == "start" {
            return AnalysisUpdate::Start {
                documents: self.documents.unwrap_or_default(),
                total: self.total_documents,
            };
        }
        if self.status == "no_documents_found" {
            return AnalysisUpdate::NoDocuments;
        }
        let Some(status) = DocumentState::parse(&self.status) else {
            return AnalysisUpdate::Invalid(self.status);
        };
        match self.document_id {
            Some(document_id) => AnalysisUpdate::Document {
                document_id,
                status,
                document_date: self.document_date,
                document_filename: self.document_filename,
            },
            None if matches!(status, DocumentState::Complete | DocumentState::Error) => {
                AnalysisUpdate::Summary {
                    status,
                    documents: self.documents,
                    total: self.total_documents,
                    completed: self.completed_documents,
                    citations: self.citations,
                }
            }
            None => AnalysisUpdate::Invalid(self.status),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
pub struct ToolResult {
    #[serde(default)]
    pub is_error: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryRole {
    User,
    Assistant,
    DocumentAnalysis,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum HistoryContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
    Analysis(Box<AnalysisPayload>),
}

/// One persisted message replayed in `conversation_history`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HistoryEntry {
    pub role: HistoryRole,
    pub content: HistoryContent,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Entries stay raw so one malformed row cannot sink the whole replay.
    ConversationHistory {
        content: Vec<serde_json::Value>,
    },
    AssistantMessage {
        content: String,
    },
    ToolCallStart {
        tool_name: String,
    },
    ToolCallEnd {
        #[serde(default)]
        tool_name: Option<String>,
        #[serde(default)]
        tool_result: Option<ToolResult>,
    },
    DocumentAnalysis(AnalysisPayload),
    DocumentAnalysisComplete {
        #[serde(default)]
        total_documents: Option<usize>,
        #[serde(default)]
        completed_documents: Option<usize>,
    },
    EndOfResponse {},
    Citations {
        citations: Vec<CitationRecord>,
    },
    ConversationCreated {
        #[serde(deserialize_with = "flexible_id::deserialize")]
        id: String,
    },
    #[serde(other)]
    Unknown,
}

/// Decode one inbound text frame.
pub fn decode(frame: &str) -> Result<ServerEvent, ProtocolError> {
    let value: serde_json::Value = serde_json::from_str(frame)?;
    let kind = value
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or(ProtocolError::MissingType)?
        .to_string();
    let event = ServerEvent::deserialize(value)?;
    if event == ServerEvent::Unknown {
        log::warn!("Ignoring unknown event type: {}", kind);
    }
    Ok(event)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagSelection {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedDocument {
    pub id: i64,
    pub filename: String,
}

/// The user's corpus selection sent along with every message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct MessageContext {
    pub selected_documents: Vec<SelectedDocument>,
    pub selected_tags: Vec<TagSelection>,
    pub reasoning_mode: bool,
}

/// Outbound frame: a user message plus its context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientFrame<'a> {
    pub message: &'a str,
    pub context: &'a MessageContext,
}

impl ClientFrame<'_> {
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_decode_simple_events() {
        assert_eq!(
            decode(r#"{"type":"assistant_message","content":"Hel"}"#).unwrap(),
            ServerEvent::AssistantMessage {
                content: "Hel".into()
            }
        );
        assert_eq!(
            decode(r#"{"type":"end_of_response"}"#).unwrap(),
            ServerEvent::EndOfResponse {}
        );
        assert_eq!(
            decode(r#"{"type":"tool_call_start","tool_name":"analyze_documents","tool_input":{"user_question":"q"}}"#).unwrap(),
            ServerEvent::ToolCallStart {
                tool_name: "analyze_documents".into()
            }
        );
        assert_eq!(
            decode(r#"{"type":"conversation_created","id":17}"#).unwrap(),
            ServerEvent::ConversationCreated { id: "17".into() }
        );
    }

    #[test]
    fn test_decode_unknown_type_is_not_an_error() {
        assert_eq!(
            decode(r#"{"type":"typing_indicator","who":"assistant"}"#).unwrap(),
            ServerEvent::Unknown
        );
    }

    #[test]
    fn test_decode_rejects_malformed_frames() {
        assert!(matches!(decode("not json"), Err(ProtocolError::Json(_))));
        assert!(matches!(
            decode(r#"{"content":"x"}"#),
            Err(ProtocolError::MissingType)
        ));
        assert!(matches!(
            decode(r#"{"type":"assistant_message"}"#),
            Err(ProtocolError::Json(_))
        ));
    }

    #[test]
    fn test_classify_analysis_frames() {
        let start = r#"{"type":"document_analysis","status":"start","total_documents":2,
            "documents":[{"document_id":1,"document_filename":"a.txt","status":"pending"},
                         {"document_id":2,"document_filename":"b.txt","status":"pending"}]}"#;
        let ServerEvent::DocumentAnalysis(payload) = decode(start).unwrap() else {
            panic!("expected analysis frame");
        };
        match payload.classify() {
            AnalysisUpdate::Start { documents, total } => {
                assert_eq!(total, Some(2));
                assert_eq!(documents[1].document_id, "2");
                assert_eq!(documents[1].status, DocumentState::Pending);
            }
            other => panic!("unexpected {:?}", other),
        }

        let update = r#"{"type":"document_analysis","status":"in_progress","document_id":2,
            "document_date":"2024-02-01","document_filename":"b.txt"}"#;
        let ServerEvent::DocumentAnalysis(payload) = decode(update).unwrap() else {
            panic!("expected analysis frame");
        };
        assert_eq!(
            payload.classify(),
            AnalysisUpdate::Document {
                document_id: "2".into(),
                status: DocumentState::InProgress,
                document_date: Some("2024-02-01".into()),
                document_filename: Some("b.txt".into()),
            }
        );

        let none = AnalysisPayload {
            status: "no_documents_found".into(),
            ..Default::default()
        };
        assert_eq!(none.classify(), AnalysisUpdate::NoDocuments);

        let odd = AnalysisPayload {
            status: "queued".into(),
            document_id: Some("1".into()),
            ..Default::default()
        };
        assert_eq!(odd.classify(), AnalysisUpdate::Invalid("queued".into()));
    }

    #[test]
    fn test_history_content_shapes() {
        let frame = r#"{"type":"conversation_history","content":[
            {"id":1,"role":"user","content":[{"type":"text","text":"hi"}]},
            {"id":2,"role":"assistant","content":"plain"},
            {"id":3,"role":"document_analysis","content":{"status":"complete","total_documents":0}},
            {"id":4,"role":"document_analysis","content":"{\"status\":\"complete\"}"}
        ]}"#;
        let ServerEvent::ConversationHistory { content } = decode(frame).unwrap() else {
            panic!("expected history");
        };
        let content: Vec<HistoryEntry> = content
            .into_iter()
            .map(|entry| serde_json::from_value(entry).unwrap())
            .collect();
        assert_eq!(content.len(), 4);
        assert_eq!(content[0].role, HistoryRole::User);
        assert_eq!(
            content[0].content,
            HistoryContent::Blocks(vec![ContentBlock::Text { text: "hi".into() }])
        );
        assert_eq!(content[1].content, HistoryContent::Text("plain".into()));
        assert!(matches!(content[2].content, HistoryContent::Analysis(_)));
        assert!(matches!(content[3].content, HistoryContent::Text(_)));
    }

    #[test]
    fn test_history_frame_survives_malformed_entry() {
        let frame = r#"{"type":"conversation_history","content":[
            {"role":"user","content":"hello"},
            {"role":"document_analysis","content":{"status":"complete","documents":[{"document_filename":"a.txt"}]}}
        ]}"#;
        let ServerEvent::ConversationHistory { content } = decode(frame).unwrap() else {
            panic!("expected history");
        };
        assert_eq!(content.len(), 2);
        assert!(serde_json::from_value::<HistoryEntry>(content[1].clone()).is_err());
    }

    #[test]
    fn test_client_frame_shape() {
        let context = MessageContext {
            selected_documents: vec![SelectedDocument {
                id: 3,
                filename: "q1.txt".into(),
            }],
            selected_tags: vec![TagSelection {
                key: "ticker".into(),
                value: "ACME".into(),
            }],
            reasoning_mode: true,
        };
        let encoded = ClientFrame {
            message: "What was Q1 revenue?",
            context: &context,
        }
        .encode()
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(value["message"], "What was Q1 revenue?");
        assert_eq!(value["context"]["reasoningMode"], true);
        assert_eq!(value["context"]["selectedTags"][0]["value"], "ACME");
        assert_eq!(value["context"]["selectedDocuments"][0]["id"], 3);
    }
}
