// Text normalization and tokenization for feed items
use ahash::{HashSet, HashSetExt};
use regex::Regex;
use std::sync::OnceLock;

/// Minimum token length (exclusive) for non-hashtag tokens
const MIN_TOKEN_LEN: usize = 2;

fn url_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"https?://\S+").expect("valid url pattern"))
}

fn non_token_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\p{L}\p{N}# ]").expect("valid token class pattern"))
}

fn whitespace_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("valid whitespace pattern"))
}

/// Canonicalize raw feed text
///
/// Lowercases, blanks out URLs, replaces everything except letters, digits,
/// `#` and spaces with a space, then collapses whitespace and trims.
pub fn normalize_text(text: &str) -> String {
    let lowered = text.to_lowercase();
    let without_urls = url_pattern().replace_all(&lowered, " ");
    let cleaned = non_token_pattern().replace_all(&without_urls, " ");
    whitespace_pattern()
        .replace_all(&cleaned, " ")
        .trim()
        .to_string()
}

/// Split text into its ordered token sequence
///
/// A token survives if it is longer than two characters or starts with `#`.
/// Empty input yields an empty sequence.
pub fn tokenize(text: &str) -> Vec<String> {
    normalize_text(text)
        .split(' ')
        .filter(|token| token.chars().count() > MIN_TOKEN_LEN || token.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Deduplicated token set of a single feed item
///
/// Tokens keep their first-appearance order so that callers iterating a
/// signature see a deterministic sequence.
#[derive(Debug, Clone, Default)]
pub struct Signature {
    tokens: Vec<String>,
    lookup: HashSet<String>,
}

impl Signature {
    /// Build a signature from raw text
    pub fn from_text(text: &str) -> Self {
        Self::from_tokens(tokenize(text))
    }

    /// Build a signature from an already tokenized sequence
    pub fn from_tokens(tokens: impl IntoIterator<Item = String>) -> Self {
        let mut signature = Self {
            tokens: Vec::new(),
            lookup: HashSet::new(),
        };
        for token in tokens {
            if signature.lookup.insert(token.clone()) {
                signature.tokens.push(token);
            }
        }
        signature
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn contains(&self, token: &str) -> bool {
        self.lookup.contains(token)
    }

    /// Jaccard similarity |a ∩ b| / |a ∪ b|
    /// The union size is floored at 1 so two empty signatures score 0.0
    pub fn jaccard(&self, other: &Signature) -> f64 {
        let intersection = other.tokens.iter().filter(|t| self.contains(t)).count();
        let union = (self.len() + other.len() - intersection).max(1);
        intersection as f64 / union as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_empty() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("   \t\n ").is_empty());
    }

    #[test]
    fn test_tokenize_keeps_short_hashtags() {
        let tokens = tokenize("ab #c");
        assert_eq!(tokens, vec!["#c".to_string()]);
        assert!(!tokens.contains(&"ab".to_string()));
    }

    #[test]
    fn test_normalize_strips_urls_and_punctuation() {
        let normalized = normalize_text("Watch THIS: https://example.com/x?y=1 now!!!");
        assert_eq!(normalized, "watch this now");
    }

    #[test]
    fn test_normalize_unicode_letters() {
        let normalized = normalize_text("Café — 다음 영상, №5");
        assert_eq!(normalized, "café 다음 영상 5");
    }

    #[test]
    fn test_tokenize_preserves_order_and_duplicates() {
        let tokens = tokenize("cats and cats and dogs");
        assert_eq!(tokens, vec!["cats", "and", "cats", "and", "dogs"]);
    }

    #[test]
    fn test_signature_dedup() {
        let sig = Signature::from_text("cats and cats and dogs");
        assert_eq!(sig.tokens(), &["cats", "and", "dogs"]);
        assert!(sig.contains("dogs"));
        assert!(!sig.contains("birds"));
    }

    #[test]
    fn test_jaccard() {
        let a = Signature::from_text("red green blue");
        let b = Signature::from_text("red green yellow");
        // 2 shared out of 4 distinct
        assert!((a.jaccard(&b) - 0.5).abs() < f64::EPSILON);

        let empty = Signature::default();
        assert_eq!(empty.jaccard(&Signature::default()), 0.0);
        assert_eq!(a.jaccard(&a), 1.0);
    }
}
