pub mod history;
pub mod reducer;
pub mod state;

pub use reducer::{StreamReducer, DEFAULT_ANALYSIS_TOOL};
pub use state::{AnalysisProgress, AnalysisStatus, DocumentStatus, StreamState, TranscriptEntry};
