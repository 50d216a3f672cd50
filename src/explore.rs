// Keyword exploration: resolve a keyword to an off-site search target
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};

use crate::error::{BubbleError, Result};
use crate::history::source_domain;

/// Characters left unescaped by URI component encoding
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Search site chosen for an exploration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchSite {
    Google,
    Youtube,
    Tiktok,
}

impl SearchSite {
    /// Pick the site matching the domain the keyword was observed on
    pub fn for_domain(domain: &str) -> Self {
        if domain.contains("youtube.com") {
            SearchSite::Youtube
        } else if domain.contains("tiktok.com") {
            SearchSite::Tiktok
        } else {
            SearchSite::Google
        }
    }

    fn search_url(self, encoded: &str) -> String {
        match self {
            SearchSite::Google => format!("https://www.google.com/search?q={}", encoded),
            SearchSite::Youtube => {
                format!("https://www.youtube.com/results?search_query={}", encoded)
            }
            SearchSite::Tiktok => format!("https://www.tiktok.com/search?q={}", encoded),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplorationTarget {
    pub keyword: String,
    pub site: SearchSite,
    pub target: String,
}

/// Resolve the search URL for `keyword`
///
/// The source URL only selects the search site; an unparseable or missing
/// source falls back to a web search.
pub fn resolve_target(keyword: &str, source_url: Option<&str>) -> Result<ExplorationTarget> {
    let keyword = keyword.trim();
    if keyword.is_empty() {
        return Err(BubbleError::EmptyKeyword);
    }

    let domain = source_url.map(source_domain).unwrap_or_default();
    let site = SearchSite::for_domain(&domain);
    let encoded = utf8_percent_encode(keyword, URI_COMPONENT).to_string();

    Ok(ExplorationTarget {
        keyword: keyword.to_string(),
        site,
        target: site.search_url(&encoded),
    })
}
