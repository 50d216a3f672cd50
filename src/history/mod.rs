//! Keyword history aggregation
//!
//! Accumulates the dominant terms of changed reports across all monitored
//! contexts, prunes by age and count, and summarizes over a time window.

pub mod store;

pub use store::HistoryStore;

use ahash::{HashMap, HashMapExt, HashSet, HashSetExt};
use serde::{Deserialize, Serialize};

use crate::analysis::AnalysisReport;

/// Fixed storage key of the persisted history
pub const KEYWORD_STATS_KEY: &str = "keywordStatsHistory";

pub const HOUR_MS: i64 = 60 * 60 * 1000;
pub const DAY_MS: i64 = 24 * HOUR_MS;
pub const WEEK_MS: i64 = 7 * DAY_MS;

/// Entries older than this are dropped on every append
pub const MAX_HISTORY_AGE_MS: i64 = WEEK_MS;
/// Most recent entries kept after age pruning
pub const MAX_HISTORY_ENTRIES: usize = 3000;

pub const DEFAULT_WINDOW_MS: i64 = HOUR_MS;
pub const MIN_WINDOW_MS: i64 = HOUR_MS;
pub const MAX_WINDOW_MS: i64 = MAX_HISTORY_AGE_MS;

const TOP_KEYWORDS: usize = 10;
const TOP_DOMAINS: usize = 5;

/// One recorded set of dominant terms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeywordHistoryEntry {
    /// Unix epoch milliseconds
    pub timestamp: i64,
    pub terms: Vec<String>,
    #[serde(default)]
    pub source_url: String,
    #[serde(default)]
    pub source_domain: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordCount {
    pub keyword: String,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainCount {
    pub domain: String,
    pub count: u32,
}

/// Windowed aggregation over the history, computed on demand
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeywordStatsSummary {
    pub time_window_ms: i64,
    pub samples: usize,
    pub top_keywords: Vec<KeywordCount>,
    pub top_domains: Vec<DomainCount>,
}

/// Age and count limits applied on every append
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub max_age_ms: i64,
    pub max_entries: usize,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_age_ms: MAX_HISTORY_AGE_MS,
            max_entries: MAX_HISTORY_ENTRIES,
        }
    }
}

/// Bounded collection of keyword history entries
#[derive(Debug, Clone, Default)]
pub struct KeywordHistory {
    entries: Vec<KeywordHistoryEntry>,
    retention: RetentionPolicy,
}

impl KeywordHistory {
    pub fn new(retention: RetentionPolicy) -> Self {
        Self {
            entries: Vec::new(),
            retention,
        }
    }

    /// Wrap previously stored entries without pruning them
    pub fn from_entries(entries: Vec<KeywordHistoryEntry>, retention: RetentionPolicy) -> Self {
        Self { entries, retention }
    }

    pub fn entries(&self) -> &[KeywordHistoryEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<KeywordHistoryEntry> {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record the top terms of a report
    ///
    /// No-op unless the report is `changed` and has at least one non-empty
    /// term after normalization. Retention is applied after every successful
    /// append. Returns whether an entry was added.
    pub fn append(&mut self, report: &AnalysisReport, now_ms: i64) -> bool {
        if !report.changed || report.result.top_terms.is_empty() {
            return false;
        }

        let mut seen = HashSet::new();
        let terms: Vec<String> = report
            .result
            .top_terms
            .iter()
            .map(|term| normalize_keyword(term))
            .filter(|term| !term.is_empty() && seen.insert(term.clone()))
            .collect();

        if terms.is_empty() {
            return false;
        }

        self.entries.push(KeywordHistoryEntry {
            timestamp: now_ms,
            terms,
            source_url: report.url.clone(),
            source_domain: source_domain(&report.url),
        });
        self.prune(now_ms);
        true
    }

    /// Drop entries older than the max age, then keep only the newest `max_entries`
    pub fn prune(&mut self, now_ms: i64) {
        let max_age = self.retention.max_age_ms;
        self.entries
            .retain(|entry| now_ms.saturating_sub(entry.timestamp) <= max_age);

        if self.entries.len() > self.retention.max_entries {
            self.entries.sort_by_key(|entry| entry.timestamp);
            let excess = self.entries.len() - self.retention.max_entries;
            self.entries.drain(..excess);
        }
    }

    /// Aggregate entries with `timestamp >= now - window_ms`
    ///
    /// Callers clamp the window; see [`clamp_window_ms`].
    pub fn summarize(&self, window_ms: i64, now_ms: i64) -> KeywordStatsSummary {
        let cutoff = now_ms.saturating_sub(window_ms);
        let mut keywords = RankedCounter::new();
        let mut domains = RankedCounter::new();
        let mut samples = 0;

        for entry in self.entries.iter().filter(|e| e.timestamp >= cutoff) {
            samples += 1;
            for term in &entry.terms {
                keywords.add(term);
            }
            if !entry.source_domain.is_empty() {
                domains.add(&entry.source_domain);
            }
        }

        KeywordStatsSummary {
            time_window_ms: window_ms,
            samples,
            top_keywords: keywords
                .top(TOP_KEYWORDS)
                .into_iter()
                .map(|(keyword, count)| KeywordCount { keyword, count })
                .collect(),
            top_domains: domains
                .top(TOP_DOMAINS)
                .into_iter()
                .map(|(domain, count)| DomainCount { domain, count })
                .collect(),
        }
    }
}

/// Counter ranking by descending count, ties in first-seen order
struct RankedCounter {
    counts: Vec<(String, u32)>,
    index: HashMap<String, usize>,
}

impl RankedCounter {
    fn new() -> Self {
        Self {
            counts: Vec::new(),
            index: HashMap::new(),
        }
    }

    fn add(&mut self, key: &str) {
        match self.index.get(key) {
            Some(&slot) => self.counts[slot].1 += 1,
            None => {
                self.index.insert(key.to_string(), self.counts.len());
                self.counts.push((key.to_string(), 1));
            }
        }
    }

    fn top(mut self, limit: usize) -> Vec<(String, u32)> {
        self.counts.sort_by(|a, b| b.1.cmp(&a.1));
        self.counts.truncate(limit);
        self.counts
    }
}

/// Trim and lowercase a keyword
pub fn normalize_keyword(term: &str) -> String {
    term.trim().to_lowercase()
}

/// Best-effort host of a URL; empty when the URL does not parse or has no host
pub fn source_domain(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(str::to_string))
        .unwrap_or_default()
}

/// Clamp a requested stats window to [1 hour, 7 days]
///
/// Missing, non-finite and non-positive requests fall back to one hour.
pub fn clamp_window_ms(requested: Option<f64>) -> i64 {
    let requested = match requested {
        Some(ms) if ms.is_finite() && ms > 0.0 => ms as i64,
        _ => DEFAULT_WINDOW_MS,
    };
    requested.clamp(MIN_WINDOW_MS, MAX_WINDOW_MS)
}

/// Named window presets used by the stats views
pub fn window_preset(name: &str) -> Option<i64> {
    match name {
        "hour" => Some(HOUR_MS),
        "day" => Some(DAY_MS),
        "week" => Some(WEEK_MS),
        _ => None,
    }
}
