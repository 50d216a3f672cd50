// Change detection and report emission
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::analysis::scorer::RepetitionResult;

/// What caused an analysis pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    /// Periodic timer
    Interval,
    /// Debounced scroll event
    Scroll,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Interval => write!(f, "interval"),
            Trigger::Scroll => write!(f, "scroll"),
        }
    }
}

/// Stable fingerprint of the change-relevant part of a result
///
/// BLAKE3 over the canonical JSON of `{repetitive, bubbleIndex, topTerms}`.
/// `topTerms` is order sensitive since it is already rank ordered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Digest(String);

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DigestFields<'a> {
    repetitive: bool,
    bubble_index: u8,
    top_terms: &'a [String],
}

impl Digest {
    pub fn of(result: &RepetitionResult) -> Self {
        let fields = DigestFields {
            repetitive: result.repetitive,
            bubble_index: result.bubble_index,
            top_terms: &result.top_terms,
        };
        // Serializing a struct of bools, ints and strings cannot fail
        let canonical = serde_json::to_vec(&fields).unwrap_or_default();
        Self(blake3::hash(&canonical).to_hex().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Provenance of a pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportContext {
    pub url: String,
    pub feed_size: usize,
    pub trigger: Trigger,
    pub analysis_tick: u64,
}

/// Immutable record handed to report consumers after every pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    #[serde(flatten)]
    pub result: RepetitionResult,
    pub url: String,
    pub feed_size: usize,
    /// Digest differs from the preceding report of the same context
    pub changed: bool,
    pub trigger: Trigger,
    pub analysis_tick: u64,
}

/// Wrap a result into a report and compute its digest
///
/// The caller threads the returned digest into the next call as `previous`.
pub fn emit(
    previous: Option<&Digest>,
    result: RepetitionResult,
    context: ReportContext,
) -> (AnalysisReport, Digest) {
    let digest = Digest::of(&result);
    let changed = previous != Some(&digest);

    let report = AnalysisReport {
        result,
        url: context.url,
        feed_size: context.feed_size,
        changed,
        trigger: context.trigger,
        analysis_tick: context.analysis_tick,
    };

    (report, digest)
}
