use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

use crate::protocol::flexible_id;

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Conversation {
    #[serde(deserialize_with = "flexible_id::deserialize")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// A tag is a single `{key: value}` object.
pub type Tag = BTreeMap<String, String>;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Document {
    #[serde(deserialize_with = "flexible_id::deserialize")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub date: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub document_filename: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<Tag>,
}

/// Entry of the document listing, which omits content.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct DocumentSummary {
    #[serde(deserialize_with = "flexible_id::deserialize")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub filename: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<Tag>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DocumentList {
    pub documents: Vec<DocumentSummary>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TagList {
    pub tags: Vec<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct TitleUpdate<'a> {
    pub title: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_tolerates_nulls_and_numeric_ids() {
        let json = r#"{"id":12,"date":"2024-05-02","content":"Operator: Hello.","document_filename":"acme_q1.txt","tags":null}"#;
        let doc: Document = serde_json::from_str(json).unwrap();
        assert_eq!(doc.id, "12");
        assert!(doc.tags.is_empty());

        let json = r#"{"id":"9","tags":[{"ticker":"ACME"}]}"#;
        let doc: Document = serde_json::from_str(json).unwrap();
        assert_eq!(doc.tags[0].get("ticker").map(String::as_str), Some("ACME"));
        assert_eq!(doc.content, "");
    }

    #[test]
    fn test_conversation() {
        let json = r#"{"id":3,"title":"New Conversation","created_at":"2024-06-01T10:00:00","updated_at":"2024-06-01T10:05:00","user_id":1}"#;
        let conversation: Conversation = serde_json::from_str(json).unwrap();
        assert_eq!(conversation.id, "3");
        assert_eq!(conversation.title, "New Conversation");
    }
}
