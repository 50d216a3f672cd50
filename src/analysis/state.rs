// Per-context analysis state threaded through successive passes
use crate::analysis::report::{emit, AnalysisReport, Digest, ReportContext, Trigger};
use crate::analysis::scorer::{score, RepetitionResult};

/// State of one monitored context between passes
///
/// Owned by whoever drives the context; nothing here is shared between contexts.
#[derive(Debug, Clone, Default)]
pub struct AnalyzerState {
    last_digest: Option<Digest>,
    tick: u64,
}

impl AnalyzerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of passes run so far
    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn last_digest(&self) -> Option<&Digest> {
        self.last_digest.as_ref()
    }

    /// Score a feed sample, advance the tick and remember the new digest
    pub fn run_pass<S: AsRef<str>>(
        &mut self,
        texts: &[S],
        url: &str,
        sensitivity: f64,
        trigger: Trigger,
    ) -> AnalysisReport {
        let result = score(texts, sensitivity);
        self.record(result, url, texts.len(), trigger)
    }

    /// Advance with a result computed elsewhere
    pub fn record(
        &mut self,
        result: RepetitionResult,
        url: &str,
        feed_size: usize,
        trigger: Trigger,
    ) -> AnalysisReport {
        self.tick += 1;
        let context = ReportContext {
            url: url.to_string(),
            feed_size,
            trigger,
            analysis_tick: self.tick,
        };

        let (report, digest) = emit(self.last_digest.as_ref(), result, context);
        tracing::trace!(
            tick = self.tick,
            digest = %digest,
            changed = report.changed,
            "analysis pass"
        );
        self.last_digest = Some(digest);
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticks_are_monotonic() {
        let mut state = AnalyzerState::new();
        let a = state.run_pass(&["one item here"], "https://a", 0.8, Trigger::Interval);
        let b = state.run_pass(&["one item here"], "https://a", 0.8, Trigger::Scroll);
        assert_eq!(a.analysis_tick, 1);
        assert_eq!(b.analysis_tick, 2);
        assert_eq!(state.tick(), 2);
    }

    #[test]
    fn test_changed_tracks_previous_pass_only() {
        let mut state = AnalyzerState::new();
        let feed_a = ["cats are great"; 5];
        let feed_b = ["dogs are better"; 5];

        assert!(state.run_pass(&feed_a, "u", 0.8, Trigger::Interval).changed);
        assert!(!state.run_pass(&feed_a, "u", 0.8, Trigger::Interval).changed);
        assert!(state.run_pass(&feed_b, "u", 0.8, Trigger::Interval).changed);
        assert!(state.run_pass(&feed_a, "u", 0.8, Trigger::Interval).changed);
    }

    #[test]
    fn test_independent_states() {
        let feed = ["cats are great"; 5];
        let mut first = AnalyzerState::new();
        let mut second = AnalyzerState::new();

        assert!(first.run_pass(&feed, "u", 0.8, Trigger::Interval).changed);
        assert!(second.run_pass(&feed, "u", 0.8, Trigger::Interval).changed);
    }

    #[test]
    fn test_empty_feed_reports_zero_result() {
        let mut state = AnalyzerState::new();
        let empty: [&str; 0] = [];
        let report = state.run_pass(&empty, "u", 0.8, Trigger::Interval);
        assert_eq!(report.result, RepetitionResult::zero());
        assert_eq!(report.feed_size, 0);
        assert!(report.changed);
    }
}
