// Repetition scoring: turns a batch of feed texts into a bounded bubble index
use ahash::{HashMap, HashMapExt};
use serde::{Deserialize, Serialize};

use crate::analysis::tokenizer::Signature;

/// Number of globally dominant terms reported and used for coverage
pub const TOP_TERMS: usize = 5;

/// Jaccard similarity at or above which an item counts as similar to the baseline
pub const SIMILARITY_THRESHOLD: f64 = 0.5;

/// Outcome of one scoring pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepetitionResult {
    /// Bubble index reached the sensitivity threshold
    pub repetitive: bool,
    /// Integer percentage in [0, 100]
    pub bubble_index: u8,
    /// Fraction of items similar to the first item, in [0, 1]
    pub similarity_score: f64,
    /// Up to five most frequent tokens, highest count first
    pub top_terms: Vec<String>,
}

impl RepetitionResult {
    /// Result for an empty feed
    pub fn zero() -> Self {
        Self {
            repetitive: false,
            bubble_index: 0,
            similarity_score: 0.0,
            top_terms: Vec::new(),
        }
    }
}

impl Default for RepetitionResult {
    fn default() -> Self {
        Self::zero()
    }
}

/// Document-frequency table that remembers first appearance order
///
/// Counts the number of items containing each token, not raw occurrences.
#[derive(Debug, Default)]
struct TermFrequencies {
    terms: Vec<(String, u32)>,
    index: HashMap<String, usize>,
}

impl TermFrequencies {
    fn new() -> Self {
        Self {
            terms: Vec::new(),
            index: HashMap::new(),
        }
    }

    fn add_signature(&mut self, signature: &Signature) {
        for token in signature.tokens() {
            match self.index.get(token) {
                Some(&slot) => self.terms[slot].1 += 1,
                None => {
                    self.index.insert(token.clone(), self.terms.len());
                    self.terms.push((token.clone(), 1));
                }
            }
        }
    }

    /// Terms by descending count; ties keep first-appearance order
    fn ranked(mut self) -> Vec<(String, u32)> {
        self.terms.sort_by(|a, b| b.1.cmp(&a.1));
        self.terms
    }
}

/// Score a batch of feed texts
///
/// `sensitivity` is the repetitive threshold as a fraction; the bubble index
/// is compared against `round(sensitivity * 100)`.
pub fn score<S: AsRef<str>>(items: &[S], sensitivity: f64) -> RepetitionResult {
    if items.is_empty() {
        return RepetitionResult::zero();
    }

    let mut frequencies = TermFrequencies::new();
    let signatures: Vec<Signature> = items
        .iter()
        .map(|item| {
            let signature = Signature::from_text(item.as_ref());
            frequencies.add_signature(&signature);
            signature
        })
        .collect();

    let ranked = frequencies.ranked();
    let top = &ranked[..ranked.len().min(TOP_TERMS)];
    let top_terms: Vec<String> = top.iter().map(|(term, _)| term.clone()).collect();

    // Denominator always uses TOP_TERMS so low term diversity discounts coverage
    let top_votes: u32 = top.iter().map(|(_, count)| count).sum();
    let dominant_coverage = top_votes as f64 / (items.len() * TOP_TERMS).max(1) as f64;

    let similarity_score = baseline_similarity(&signatures);

    let combined = (dominant_coverage + similarity_score) / 2.0 * 100.0;
    let bubble_index = combined.min(100.0).max(0.0).round() as u8;
    let threshold = (sensitivity * 100.0).round();
    let repetitive = f64::from(bubble_index) >= threshold;

    RepetitionResult {
        repetitive,
        bubble_index,
        similarity_score,
        top_terms,
    }
}

/// Fraction of items (after the first) whose signature is similar to the first
fn baseline_similarity(signatures: &[Signature]) -> f64 {
    let Some((base, rest)) = signatures.split_first() else {
        return 0.0;
    };
    if rest.is_empty() {
        return 0.0;
    }

    let similar = rest
        .iter()
        .filter(|signature| base.jaccard(signature) >= SIMILARITY_THRESHOLD)
        .count();

    similar as f64 / rest.len() as f64
}
