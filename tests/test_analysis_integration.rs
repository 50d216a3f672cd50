use bubblewatch::analysis::{score, tokenize, AnalyzerState, Trigger};
use bubblewatch::explore::{resolve_target, SearchSite};
use bubblewatch::history::{HistoryStore, RetentionPolicy, DAY_MS, HOUR_MS};
use bubblewatch::storage::StorageManager;
use tempfile::TempDir;

const NOW: i64 = 1_760_000_000_000;

#[test]
fn test_identical_feed_end_to_end() {
    let feed = ["cats are great"; 5];
    let mut state = AnalyzerState::new();

    let report = state.run_pass(&feed, "https://www.youtube.com/", 0.8, Trigger::Interval);
    assert!(report.result.repetitive);
    assert_eq!(report.result.similarity_score, 1.0);
    // Three distinct tokens cover 15 of 25 possible votes: (0.6 + 1.0) / 2
    assert_eq!(report.result.bubble_index, 80);
    assert_eq!(report.result.top_terms, vec!["cats", "are", "great"]);
    assert!(report.changed);

    let again = state.run_pass(&feed, "https://www.youtube.com/", 0.8, Trigger::Scroll);
    assert!(!again.changed);
    assert_eq!(again.analysis_tick, 2);
}

#[test]
fn test_rich_identical_feed_reaches_full_index() {
    let feed = ["new trailer breakdown reaction review"; 6];
    let result = score(&feed, 0.8);
    assert_eq!(result.bubble_index, 100);
    assert!(result.repetitive);
}

#[test]
fn test_disjoint_feed_end_to_end() {
    let feed = ["alpha one", "beta two", "gamma three", "delta four", "epsilon five"];
    let result = score(&feed, 0.8);
    assert_eq!(result.similarity_score, 0.0);
    assert!(!result.repetitive);
    assert!(result.bubble_index <= 100);
}

#[test]
fn test_tokenizer_edges() {
    assert!(tokenize("").is_empty());
    let tokens = tokenize("ab #c");
    assert!(tokens.contains(&"#c".to_string()));
    assert!(!tokens.contains(&"ab".to_string()));
}

#[test]
fn test_reports_feed_history_across_contexts() {
    let temp_dir = TempDir::new().unwrap();
    let storage = StorageManager::new(temp_dir.path().to_path_buf()).unwrap();
    let history = HistoryStore::new(storage.database.clone(), RetentionPolicy::default());

    let mut youtube = AnalyzerState::new();
    let mut tiktok = AnalyzerState::new();

    let report = youtube.run_pass(
        &["cats are great"; 5],
        "https://www.youtube.com/",
        0.8,
        Trigger::Interval,
    );
    assert!(history.append_report(&report, NOW - 2 * HOUR_MS).unwrap());

    // Unchanged report is not recorded
    let report = youtube.run_pass(
        &["cats are great"; 5],
        "https://www.youtube.com/",
        0.8,
        Trigger::Interval,
    );
    assert!(!history.append_report(&report, NOW - HOUR_MS).unwrap());

    let report = tiktok.run_pass(
        &["dogs are cute"; 4],
        "https://www.tiktok.com/@x",
        0.8,
        Trigger::Scroll,
    );
    assert!(history.append_report(&report, NOW - 10 * 60 * 1000).unwrap());

    let last_hour = history.summarize(HOUR_MS, NOW).unwrap();
    assert_eq!(last_hour.samples, 1);
    assert_eq!(last_hour.top_domains[0].domain, "www.tiktok.com");

    let last_day = history.summarize(DAY_MS, NOW).unwrap();
    assert_eq!(last_day.samples, 2);
    // "are" appears in both entries
    assert_eq!(last_day.top_keywords[0].keyword, "are");
    assert_eq!(last_day.top_keywords[0].count, 2);
}

#[test]
fn test_exploration_target() {
    let target = resolve_target("shoes", Some("https://www.tiktok.com/@x")).unwrap();
    assert_eq!(target.site, SearchSite::Tiktok);
    assert_eq!(target.target, "https://www.tiktok.com/search?q=shoes");

    let target = resolve_target("rock & roll", None).unwrap();
    assert_eq!(target.target, "https://www.google.com/search?q=rock%20%26%20roll");

    assert!(resolve_target("   ", None).is_err());
}
