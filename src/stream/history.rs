use log::warn;
use serde_json::Value;

use super::state::{count_complete, AnalysisProgress, AnalysisStatus, DocumentStatus, TranscriptEntry};
use crate::citations::CitationRecord;
use crate::protocol::{AnalysisPayload, ContentBlock, HistoryContent, HistoryEntry, HistoryRole};

/// Rebuild a transcript from persisted history, collecting the citation
/// tables stored on past analysis entries along the way. Entries that do not
/// decode are logged and skipped.
pub fn rebuild(entries: Vec<Value>) -> (Vec<TranscriptEntry>, Vec<CitationRecord>) {
    let mut transcript = Vec::with_capacity(entries.len());
    let mut citations = Vec::new();

    for (index, raw) in entries.into_iter().enumerate() {
        let entry: HistoryEntry = match serde_json::from_value(raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping undecodable history entry {}: {}", index, e);
                continue;
            }
        };
        match entry.role {
            HistoryRole::User => {
                if let Some(text) = message_text(entry.content) {
                    transcript.push(TranscriptEntry::User(text));
                }
            }
            HistoryRole::Assistant => {
                if let Some(text) = message_text(entry.content) {
                    transcript.push(TranscriptEntry::Assistant(text));
                }
            }
            HistoryRole::DocumentAnalysis => {
                if let Some(payload) = analysis_payload(entry.content) {
                    let (progress, records) = replay_analysis(payload);
                    transcript.push(TranscriptEntry::DocumentAnalysis(progress));
                    citations.extend(records);
                }
            }
            HistoryRole::Other => warn!("Skipping history entry with unknown role"),
        }
    }

    (transcript, citations)
}

fn message_text(content: HistoryContent) -> Option<String> {
    match content {
        HistoryContent::Text(text) => Some(text),
        HistoryContent::Blocks(blocks) => {
            let texts: Vec<String> = blocks
                .into_iter()
                .filter_map(|block| match block {
                    ContentBlock::Text { text } => Some(text),
                    ContentBlock::Other => None,
                })
                .collect();
            if texts.is_empty() {
                None
            } else {
                Some(texts.join("\n\n"))
            }
        }
        HistoryContent::Analysis(_) => {
            warn!("Skipping message whose content is an analysis record");
            None
        }
    }
}

fn analysis_payload(content: HistoryContent) -> Option<AnalysisPayload> {
    match content {
        HistoryContent::Analysis(payload) => Some(*payload),
        // Older rows store the analysis record as a JSON string.
        HistoryContent::Text(raw) => match serde_json::from_str(&raw) {
            Ok(payload) => Some(payload),
            Err(e) => {
                warn!("Skipping undecodable analysis entry: {}", e);
                None
            }
        },
        HistoryContent::Blocks(_) => {
            warn!("Skipping analysis entry with message blocks");
            None
        }
    }
}

fn replay_analysis(payload: AnalysisPayload) -> (AnalysisProgress, Vec<CitationRecord>) {
    let documents: Vec<DocumentStatus> = payload
        .documents
        .unwrap_or_default()
        .into_iter()
        .map(DocumentStatus::from)
        .collect();
    let status = match payload.status.as_str() {
        "start" => AnalysisStatus::Start,
        "in_progress" => AnalysisStatus::InProgress,
        "error" => AnalysisStatus::Error,
        "complete" | "no_documents_found" => AnalysisStatus::Complete,
        other => {
            warn!("Replaying analysis entry with unknown status {:?} as complete", other);
            AnalysisStatus::Complete
        }
    };
    let completed = payload
        .completed_documents
        .unwrap_or_else(|| count_complete(&documents));
    let total = payload
        .total_documents
        .unwrap_or(0)
        .max(documents.len())
        .max(completed);

    let progress = AnalysisProgress {
        status,
        total,
        completed,
        documents,
        closed: true,
    };
    (progress, payload.citations)
}
