//! Fuzzy wake word matching over recognized transcripts.
//!
//! Decides whether a transcript addresses the assistant by name.
//! Recognition engines routinely mangle short names ("irks" for
//! "iris"), so each token of the configured wake phrase is compared
//! with Damerau–Levenshtein distance against candidate tokens, within
//! a small configured tolerance. Matching is token-boundary aware: the
//! name never matches a substring inside an unrelated word.
//!
//! No external dependencies; the distance computation is a few lines
//! of dynamic programming.

use crate::config::WakeConfig;

/// A wake phrase match located within a transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WakeMatch {
    /// Index of the first matched token.
    pub start_token: usize,
    /// Number of transcript tokens covered by the match.
    pub token_count: usize,
}

/// Token-based fuzzy matcher for the assistant's name and synonyms.
#[derive(Debug, Clone)]
pub struct WakeMatcher {
    /// Each phrase is a sequence of lowercase tokens. The configured
    /// name is always the first entry.
    phrases: Vec<Vec<String>>,
    tolerance: usize,
}

impl WakeMatcher {
    /// Build a matcher from configuration.
    #[must_use]
    pub fn new(config: &WakeConfig) -> Self {
        let mut phrases = Vec::with_capacity(1 + config.synonyms.len());
        phrases.push(tokenize(&config.name));
        for synonym in &config.synonyms {
            let tokens = tokenize(synonym);
            if !tokens.is_empty() {
                phrases.push(tokens);
            }
        }
        phrases.retain(|p| !p.is_empty());
        // Longest phrases first so "good morning iris" wins over "iris".
        phrases.sort_by_key(|p| std::cmp::Reverse(p.len()));
        Self {
            phrases,
            tolerance: config.edit_distance,
        }
    }

    /// Whether the transcript contains the wake word.
    #[must_use]
    pub fn is_wake(&self, transcript: &str) -> bool {
        self.find(transcript).is_some()
    }

    /// Locate the first wake phrase occurrence, if any.
    #[must_use]
    pub fn find(&self, transcript: &str) -> Option<WakeMatch> {
        let tokens = tokenize(transcript);
        if tokens.is_empty() {
            return None;
        }

        for phrase in &self.phrases {
            if phrase.len() > tokens.len() {
                continue;
            }
            for start in 0..=(tokens.len() - phrase.len()) {
                let window = &tokens[start..start + phrase.len()];
                if phrase
                    .iter()
                    .zip(window.iter())
                    .all(|(want, got)| token_matches(want, got, self.tolerance))
                {
                    return Some(WakeMatch {
                        start_token: start,
                        token_count: phrase.len(),
                    });
                }
            }
        }
        None
    }

    /// Extract the user's query from the text surrounding a wake match.
    ///
    /// Prefers text after the wake phrase ("iris what time is it" →
    /// "what time is it"), falls back to text before it, then to
    /// "hello" if the wake phrase was the entire utterance.
    #[must_use]
    pub fn extract_query(&self, transcript: &str, m: WakeMatch) -> String {
        let tokens = tokenize(transcript);
        let after = tokens
            .get(m.start_token + m.token_count..)
            .unwrap_or_default()
            .join(" ");
        if !after.is_empty() {
            return after;
        }
        let before = tokens.get(..m.start_token).unwrap_or_default().join(" ");
        if before.is_empty() {
            "hello".to_owned()
        } else {
            before
        }
    }
}

/// Split text into lowercase tokens, trimming punctuation from token
/// edges so "iris," matches "iris".
fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|t| {
            t.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|t| !t.is_empty())
        .collect()
}

/// Whether a candidate token matches a wake token within tolerance.
fn token_matches(want: &str, got: &str, tolerance: usize) -> bool {
    damerau_levenshtein(want, got) <= tolerance
}

/// Damerau–Levenshtein distance (optimal string alignment variant).
///
/// Counts insertions, deletions, substitutions, and transpositions of
/// adjacent characters, which covers the common single-keystroke-style
/// misrecognitions without the cost of the full algorithm.
fn damerau_levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (n, m) = (a.len(), b.len());
    if n == 0 {
        return m;
    }
    if m == 0 {
        return n;
    }

    // Distance matrix, flat for cache-friendliness.
    let w = m + 1;
    let mut d = vec![0usize; (n + 1) * w];
    for i in 0..=n {
        d[i * w] = i;
    }
    for j in 0..=m {
        d[j] = j;
    }

    for i in 1..=n {
        for j in 1..=m {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            let mut best = (d[(i - 1) * w + j] + 1)
                .min(d[i * w + j - 1] + 1)
                .min(d[(i - 1) * w + j - 1] + cost);
            if i > 1 && j > 1 && a[i - 1] == b[j - 2] && a[i - 2] == b[j - 1] {
                best = best.min(d[(i - 2) * w + j - 2] + 1);
            }
            d[i * w + j] = best;
        }
    }
    d[n * w + m]
}
