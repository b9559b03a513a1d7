use log::{debug, warn};

use super::history;
use super::state::{AnalysisProgress, AnalysisStatus, DocumentStatus, StreamState, TranscriptEntry};
use crate::citations::CitationRegistry;
use crate::protocol::{AnalysisUpdate, DocumentState, ServerEvent};

pub const DEFAULT_ANALYSIS_TOOL: &str = "analyze_documents";

/// Folds server events into transcript state.
///
/// `apply` consumes the previous state and returns the next one; the citation
/// registry is the only other thing it touches and is passed in explicitly.
#[derive(Debug, Clone)]
pub struct StreamReducer {
    analysis_tool: String,
}

impl Default for StreamReducer {
    fn default() -> Self {
        Self::new(DEFAULT_ANALYSIS_TOOL)
    }
}

impl StreamReducer {
    pub fn new(analysis_tool: impl Into<String>) -> Self {
        Self {
            analysis_tool: analysis_tool.into(),
        }
    }

    pub fn apply(
        &self,
        mut state: StreamState,
        event: ServerEvent,
        citations: &mut CitationRegistry,
    ) -> StreamState {
        match event {
            ServerEvent::ConversationHistory { content } => {
                // The roster survives: a run may still be streaming after a
                // reconnect replays history.
                let (transcript, records) = history::rebuild(content);
                citations.replace(records);
                state.transcript = transcript;
                state.pending.clear();
            }
            ServerEvent::AssistantMessage { content } => state.pending.push_str(&content),
            ServerEvent::ToolCallStart { tool_name } => {
                if tool_name == self.analysis_tool {
                    let narration = std::mem::take(&mut state.pending);
                    state.transcript.push(TranscriptEntry::Assistant(narration));
                    state
                        .transcript
                        .push(TranscriptEntry::DocumentAnalysis(AnalysisProgress::started()));
                    state.roster.clear();
                } else {
                    debug!("Ignoring start of tool call {}", tool_name);
                }
            }
            ServerEvent::ToolCallEnd {
                tool_name,
                tool_result,
            } => {
                state.pending.clear();
                let is_analysis = tool_name.map_or(true, |name| name == self.analysis_tool);
                if is_analysis {
                    if let Some(progress) = state.open_analysis_mut() {
                        let failed = tool_result.is_some_and(|result| result.is_error);
                        let status = if failed || progress.status == AnalysisStatus::Error {
                            AnalysisStatus::Error
                        } else {
                            AnalysisStatus::Complete
                        };
                        progress.close(status);
                    }
                }
            }
            ServerEvent::DocumentAnalysis(payload) => {
                state = self.apply_analysis(state, payload.classify(), citations);
            }
            ServerEvent::DocumentAnalysisComplete {
                total_documents,
                completed_documents,
            } => {
                if let Some(progress) = state.open_analysis_mut() {
                    let completed = completed_documents.unwrap_or(progress.completed);
                    progress.completed = progress.completed.max(completed);
                    progress.total = progress
                        .total
                        .max(total_documents.unwrap_or(0))
                        .max(progress.completed);
                    progress.status = AnalysisStatus::Complete;
                }
            }
            ServerEvent::EndOfResponse {} => {
                if !state.pending.is_empty() {
                    let text = std::mem::take(&mut state.pending);
                    state.transcript.push(TranscriptEntry::Assistant(text));
                }
            }
            ServerEvent::Citations { citations: table } => citations.replace(table),
            ServerEvent::ConversationCreated { id } => {
                debug!("Server confirmed conversation {}", id);
            }
            ServerEvent::Unknown => debug!("Dropped unrecognized event"),
        }
        state
    }

    fn apply_analysis(
        &self,
        mut state: StreamState,
        update: AnalysisUpdate,
        citations: &mut CitationRegistry,
    ) -> StreamState {
        match update {
            AnalysisUpdate::Start { documents, total } => {
                let roster: Vec<DocumentStatus> =
                    documents.into_iter().map(DocumentStatus::from).collect();
                let progress = state.open_analysis_or_insert();
                progress.status = AnalysisStatus::Start;
                progress.total = progress.total.max(total.unwrap_or(0));
                progress.set_roster(&roster);
                state.roster = roster;
            }
            AnalysisUpdate::Document {
                document_id,
                status,
                document_date,
                document_filename,
            } => {
                let Some(doc) = state
                    .roster
                    .iter_mut()
                    .find(|doc| doc.document_id == document_id)
                else {
                    debug!("Dropping update for document {} not in roster", document_id);
                    return state;
                };
                doc.status = status;
                if let Some(date) = document_date {
                    doc.document_date = date;
                }
                if let Some(filename) = document_filename {
                    doc.document_filename = filename;
                }

                let roster = state.roster.clone();
                let progress = state.open_analysis_or_insert();
                progress.set_roster(&roster);
                if progress.status == AnalysisStatus::Start {
                    progress.status = AnalysisStatus::InProgress;
                }
            }
            AnalysisUpdate::Summary {
                status,
                documents,
                total,
                completed,
                citations: records,
            } => {
                if let Some(documents) = documents {
                    state.roster = documents.into_iter().map(DocumentStatus::from).collect();
                }
                let roster = state.roster.clone();
                let progress = state.open_analysis_or_insert();
                progress.set_roster(&roster);
                if let Some(completed) = completed {
                    progress.completed = progress.completed.max(completed);
                }
                progress.total = progress
                    .total
                    .max(total.unwrap_or(0))
                    .max(progress.completed);
                let status = if status == DocumentState::Error {
                    AnalysisStatus::Error
                } else {
                    AnalysisStatus::Complete
                };
                progress.close(status);
                if !records.is_empty() {
                    citations.merge(records);
                }
            }
            AnalysisUpdate::NoDocuments => {
                state.open_analysis_or_insert().close(AnalysisStatus::Complete);
            }
            AnalysisUpdate::Invalid(status) => {
                warn!("Ignoring analysis update with status {:?}", status);
            }
        }
        state
    }
}
