use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::protocol::flexible_id;

/// A quoted span the assistant claims exists in a source document.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct CitationRecord {
    pub id: String,
    #[serde(deserialize_with = "flexible_id::deserialize")]
    pub document_id: String,
    #[serde(default)]
    pub document_date: String,
    #[serde(default)]
    pub document_filename: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

/// Citation lookup and footnote numbering for one conversation.
///
/// Records are replaced wholesale whenever a new citation table arrives, but
/// display numbers survive those replacements: an id keeps the number it got
/// on first reference until [`CitationRegistry::reset`] is called.
#[derive(Debug, Default, Clone)]
pub struct CitationRegistry {
    records: HashMap<String, CitationRecord>,
    by_document: HashMap<String, Vec<CitationRecord>>,
    used: Vec<String>,
}

impl CitationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve(&self, id: &str) -> Option<&CitationRecord> {
        self.records.get(id)
    }

    /// 1-based footnote number for `id`, assigned on first call.
    pub fn display_number(&mut self, id: &str) -> usize {
        if let Some(pos) = self.used.iter().position(|used| used == id) {
            return pos + 1;
        }
        self.used.push(id.to_string());
        self.used.len()
    }

    /// Inverse of [`CitationRegistry::display_number`].
    pub fn id_for_number(&self, number: usize) -> Option<&str> {
        self.used.get(number.checked_sub(1)?).map(String::as_str)
    }

    pub fn citations_for_document(&self, document_id: &str) -> &[CitationRecord] {
        self.by_document
            .get(document_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Replace the record mapping. Display numbers are kept.
    pub fn replace(&mut self, records: impl IntoIterator<Item = CitationRecord>) {
        self.records = records
            .into_iter()
            .map(|record| (record.id.clone(), record))
            .collect();
        self.reindex();
    }

    /// Add records on top of the current mapping; later records win.
    pub fn merge(&mut self, records: impl IntoIterator<Item = CitationRecord>) {
        for record in records {
            self.records.insert(record.id.clone(), record);
        }
        self.reindex();
    }

    pub fn reset(&mut self) {
        self.records.clear();
        self.by_document.clear();
        self.used.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn used_count(&self) -> usize {
        self.used.len()
    }

    fn reindex(&mut self) {
        let mut by_document: HashMap<String, Vec<CitationRecord>> = HashMap::new();
        for record in self.records.values() {
            by_document
                .entry(record.document_id.clone())
                .or_default()
                .push(record.clone());
        }
        // HashMap iteration order is arbitrary; keep sibling lists stable.
        for list in by_document.values_mut() {
            list.sort_by(|a, b| a.id.cmp(&b.id));
        }
        self.by_document = by_document;
    }
}
