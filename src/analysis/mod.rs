//! Feed repetition analysis
//!
//! Tokenizes feed texts, scores how self-similar the feed is and wraps the
//! outcome in change-detected reports. Everything here is pure computation;
//! no I/O happens in this module.

mod report;
mod scorer;
mod state;
mod tokenizer;

pub use report::{emit, AnalysisReport, Digest, ReportContext, Trigger};
pub use scorer::{score, RepetitionResult, SIMILARITY_THRESHOLD, TOP_TERMS};
pub use state::AnalyzerState;
pub use tokenizer::{normalize_text, tokenize, Signature};
