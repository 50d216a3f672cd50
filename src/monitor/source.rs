// Feed text suppliers for monitored contexts
use std::path::PathBuf;

/// Cap on texts taken from the primary feed selectors
pub const PRIMARY_FEED_CAP: usize = 80;
/// Cap on texts taken from the generic fallback scan
pub const FALLBACK_FEED_CAP: usize = 60;

/// Supplies the visible feed texts of one monitored context
///
/// Implementations are trusted to apply their own caps; see [`cap_feed_texts`].
pub trait TextSource: Send + Sync + 'static {
    /// Ordered feed texts currently visible
    fn collect_feed_texts(&self) -> Vec<String>;

    /// Address of the monitored page
    fn current_url(&self) -> String;
}

/// Trim and cap candidate texts
///
/// Uses up to [`PRIMARY_FEED_CAP`] non-empty primary texts. Only when the
/// primary candidates are all empty is `fallback` evaluated, capped at
/// [`FALLBACK_FEED_CAP`].
pub fn cap_feed_texts<I, F>(primary: I, fallback: F) -> Vec<String>
where
    I: IntoIterator<Item = String>,
    F: FnOnce() -> Vec<String>,
{
    let primary: Vec<String> = non_empty(primary).take(PRIMARY_FEED_CAP).collect();
    if !primary.is_empty() {
        return primary;
    }
    non_empty(fallback()).take(FALLBACK_FEED_CAP).collect()
}

fn non_empty<I: IntoIterator<Item = String>>(texts: I) -> impl Iterator<Item = String> {
    texts
        .into_iter()
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

/// Text file treated as a feed, one item per line
///
/// The file is re-read on every pass; lines starting with `#!` are ignored as
/// comments. A file has no fallback scan, so one holding only comments or
/// blank lines is an empty feed.
pub struct FileTextSource {
    path: PathBuf,
    url: String,
}

impl FileTextSource {
    pub fn new(path: PathBuf) -> Self {
        let url = format!("file://{}", path.display());
        Self { path, url }
    }

    pub fn with_url(path: PathBuf, url: impl Into<String>) -> Self {
        Self {
            path,
            url: url.into(),
        }
    }
}

impl TextSource for FileTextSource {
    fn collect_feed_texts(&self) -> Vec<String> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!("Failed to read feed file {}: {}", self.path.display(), e);
                return Vec::new();
            }
        };

        let lines = content
            .lines()
            .filter(|line| !line.starts_with("#!"))
            .map(str::to_string);
        cap_feed_texts(lines, Vec::new)
    }

    fn current_url(&self) -> String {
        self.url.clone()
    }
}
