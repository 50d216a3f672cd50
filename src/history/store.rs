// Persisted keyword history, read and written wholesale under a fixed key
use crate::analysis::AnalysisReport;
use crate::error::{BubbleError, Result};
use crate::history::{
    KeywordHistory, KeywordHistoryEntry, KeywordStatsSummary, RetentionPolicy, KEYWORD_STATS_KEY,
};
use crate::storage::{Database, DbStats};

/// Keyword history backed by the key-value database
///
/// Appends run as a single read-modify-write transaction so that reports
/// arriving from several contexts at once are never lost.
#[derive(Clone)]
pub struct HistoryStore {
    database: Database,
    retention: RetentionPolicy,
}

impl HistoryStore {
    pub fn new(database: Database, retention: RetentionPolicy) -> Self {
        Self {
            database,
            retention,
        }
    }

    pub fn retention(&self) -> RetentionPolicy {
        self.retention
    }

    /// Load the full history
    pub fn load(&self) -> Result<KeywordHistory> {
        let raw = self.database.get_value(KEYWORD_STATS_KEY)?;
        Ok(self.decode(raw))
    }

    /// Append the top terms of a changed report and prune
    ///
    /// Returns whether an entry was written.
    pub fn append_report(&self, report: &AnalysisReport, now_ms: i64) -> Result<bool> {
        // Skip the transaction entirely for reports that cannot produce an entry
        if !report.changed || report.result.top_terms.is_empty() {
            return Ok(false);
        }

        self.database.update_value(KEYWORD_STATS_KEY, |raw| {
            let mut history = self.decode(raw);
            if !history.append(report, now_ms) {
                return Ok((None, false));
            }

            let encoded = serde_json::to_string(history.entries()).map_err(|e| BubbleError::Json {
                source: e,
                context: "Failed to serialize keyword history".to_string(),
            })?;
            tracing::debug!(entries = history.len(), url = %report.url, "keyword history appended");
            Ok((Some(encoded), true))
        })
    }

    /// Summarize entries inside the window ending at `now_ms`
    pub fn summarize(&self, window_ms: i64, now_ms: i64) -> Result<KeywordStatsSummary> {
        Ok(self.load()?.summarize(window_ms, now_ms))
    }

    /// Size of the backing key-value store
    pub fn store_stats(&self) -> Result<DbStats> {
        self.database.stats()
    }

    /// Drop all stored history
    pub fn clear(&self) -> Result<()> {
        self.database.delete_value(KEYWORD_STATS_KEY)
    }

    /// Decode a stored value; anything that is not a list of entries reads as empty
    fn decode(&self, raw: Option<String>) -> KeywordHistory {
        let entries = match raw {
            Some(raw) => match serde_json::from_str::<Vec<KeywordHistoryEntry>>(&raw) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!("Stored keyword history is unreadable, starting fresh: {}", e);
                    Vec::new()
                }
            },
            None => Vec::new(),
        };
        KeywordHistory::from_entries(entries, self.retention)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{RepetitionResult, Trigger};
    use tempfile::TempDir;

    const NOW: i64 = 1_760_000_000_000;

    fn report(terms: &[&str], changed: bool) -> AnalysisReport {
        AnalysisReport {
            result: RepetitionResult {
                repetitive: false,
                bubble_index: 42,
                similarity_score: 0.5,
                top_terms: terms.iter().map(|t| t.to_string()).collect(),
            },
            url: "https://www.tiktok.com/@x".to_string(),
            feed_size: 3,
            changed,
            trigger: Trigger::Scroll,
            analysis_tick: 4,
        }
    }

    fn store(dir: &TempDir) -> HistoryStore {
        let db = Database::new(&dir.path().join("db.sqlite")).unwrap();
        HistoryStore::new(db, RetentionPolicy::default())
    }

    #[test]
    fn test_append_and_load() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        assert!(store.append_report(&report(&["cats"], true), NOW).unwrap());
        assert!(!store.append_report(&report(&["dogs"], false), NOW).unwrap());
        assert!(store.append_report(&report(&["dogs"], true), NOW + 1).unwrap());

        let history = store.load().unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history.entries()[0].source_domain, "www.tiktok.com");
    }

    #[test]
    fn test_corrupt_value_reads_as_empty() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store
            .database
            .set_value(KEYWORD_STATS_KEY, "{\"not\":\"a list\"}")
            .unwrap();

        assert!(store.load().unwrap().is_empty());
        assert!(store.append_report(&report(&["cats"], true), NOW).unwrap());
        assert_eq!(store.load().unwrap().len(), 1);
    }

    #[test]
    fn test_summarize_and_clear() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.append_report(&report(&["cats", "dogs"], true), NOW).unwrap();
        store.append_report(&report(&["cats"], true), NOW).unwrap();

        let summary = store.summarize(crate::history::HOUR_MS, NOW).unwrap();
        assert_eq!(summary.samples, 2);
        assert_eq!(summary.top_keywords[0].keyword, "cats");
        assert_eq!(summary.top_keywords[0].count, 2);

        store.clear().unwrap();
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_concurrent_appends_are_not_lost() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let handles: Vec<_> = (0..4)
            .map(|worker| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..10 {
                        let term = format!("w{}t{}", worker, i);
                        store
                            .append_report(&report(&[term.as_str()], true), NOW)
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.load().unwrap().len(), 40);
    }
}
