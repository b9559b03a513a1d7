use serde::Serialize;

use crate::protocol::{DocumentState, RosterDocument};

/// Progress of one document inside an analysis run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentStatus {
    pub id: String,
    pub document_id: String,
    pub document_filename: String,
    pub document_date: String,
    pub status: DocumentState,
}

impl From<RosterDocument> for DocumentStatus {
    fn from(doc: RosterDocument) -> Self {
        Self {
            id: doc.document_id.clone(),
            document_id: doc.document_id,
            document_filename: doc.document_filename,
            document_date: doc.document_date,
            status: doc.status,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    Start,
    InProgress,
    Complete,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisProgress {
    pub status: AnalysisStatus,
    /// Best known document count; only ever corrected upward during a run.
    pub total: usize,
    pub completed: usize,
    pub documents: Vec<DocumentStatus>,
    /// Closed entries are never mutated by later progress events.
    pub closed: bool,
}

impl AnalysisProgress {
    pub fn started() -> Self {
        Self {
            status: AnalysisStatus::Start,
            total: 0,
            completed: 0,
            documents: Vec::new(),
            closed: false,
        }
    }

    /// Completion ratio for display, clamped to `0..=100`.
    pub fn progress_percent(&self) -> u8 {
        if self.total == 0 {
            return if self.status == AnalysisStatus::Complete { 100 } else { 0 };
        }
        let percent = self.completed.saturating_mul(100) / self.total;
        percent.min(100) as u8
    }

    pub(crate) fn set_roster(&mut self, roster: &[DocumentStatus]) {
        self.documents = roster.to_vec();
        self.completed = count_complete(roster);
        self.total = self.total.max(roster.len()).max(self.completed);
    }

    pub(crate) fn close(&mut self, status: AnalysisStatus) {
        self.status = status;
        self.closed = true;
    }
}

pub(crate) fn count_complete(roster: &[DocumentStatus]) -> usize {
    roster
        .iter()
        .filter(|doc| doc.status == DocumentState::Complete)
        .count()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "role", content = "content", rename_all = "snake_case")]
pub enum TranscriptEntry {
    User(String),
    Assistant(String),
    DocumentAnalysis(AnalysisProgress),
}

/// Everything the reducer folds events into.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamState {
    pub transcript: Vec<TranscriptEntry>,
    /// Assistant text received since the last flush.
    pub pending: String,
    /// Roster of the current analysis run.
    pub roster: Vec<DocumentStatus>,
}

impl StreamState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.transcript.push(TranscriptEntry::User(text.into()));
    }

    /// The most recent analysis entry, if it is still open.
    pub fn open_analysis(&self) -> Option<&AnalysisProgress> {
        self.transcript.iter().rev().find_map(|entry| match entry {
            TranscriptEntry::DocumentAnalysis(progress) => Some(progress),
            _ => None,
        })
        .filter(|progress| !progress.closed)
    }

    pub(crate) fn open_analysis_mut(&mut self) -> Option<&mut AnalysisProgress> {
        self.transcript
            .iter_mut()
            .rev()
            .find_map(|entry| match entry {
                TranscriptEntry::DocumentAnalysis(progress) => Some(progress),
                _ => None,
            })
            .filter(|progress| !progress.closed)
    }

    pub(crate) fn open_analysis_or_insert(&mut self) -> &mut AnalysisProgress {
        if self.open_analysis().is_none() {
            let mut progress = AnalysisProgress::started();
            progress.status = AnalysisStatus::InProgress;
            self.transcript
                .push(TranscriptEntry::DocumentAnalysis(progress));
        }
        match self.open_analysis_mut() {
            Some(progress) => progress,
            None => unreachable!("an open analysis entry was just ensured"),
        }
    }
}
