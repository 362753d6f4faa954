//! Hallucination filter for raw recognition output.
//!
//! Speech engines emit a small set of spurious strings when fed
//! silence or ambient noise (repeated filler tokens, stray
//! percentages). This module normalizes a raw transcript and rejects
//! those known artifacts, reducing them to an empty cycle.

/// Known spurious outputs correlated with silence.
///
/// Stored in normalized form (lowercase, no terminal punctuation).
const REJECTED: &[&str] = &[
    "15 15 15 15 15 15 15",
    "1.5% 1.5% 1.5% 1.5% 1.5% 1.5% 1.5%",
    "1.5% 1.5% 1.5% 1.5% 1.5% 1.5%",
    "1.5% 1.5% 1.5% 1.5% 1.5%",
    "1.5% 2.5% 1.5% 1.5% 1.5% 1.5% 1.5%",
    "2.5g 2.5g 2.5g 2.5g 2.5g",
    "1,5% 1,5% 1,5% 1,5% 1,5% 1,5%",
    "1.5kg 1.5kg 1.5kg 1.5kg",
    "1 cdc 1 cdc 1 cdc 1 cdc 1 cdc",
    "thank you",
    "thanks for watching",
];

/// Normalize a raw transcript and reject known hallucinations.
///
/// Returns the cleaned transcript, or an empty string when the input
/// is silence or a known artifact. Deterministic; no state across
/// calls beyond the static rejection set.
#[must_use]
pub fn filter(raw: &str) -> String {
    let cleaned = normalize(raw);
    if cleaned.is_empty() || REJECTED.contains(&cleaned.as_str()) {
        return String::new();
    }
    cleaned
}

/// Lowercase, collapse whitespace, and strip terminal punctuation.
fn normalize(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    let collapsed = lowered.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .trim_end_matches(['.', ',', '!', '?', ';', ':'])
        .trim()
        .to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_normal_speech() {
        assert_eq!(filter("What time is it?"), "what time is it");
    }

    #[test]
    fn empty_input_stays_empty() {
        assert_eq!(filter(""), "");
        assert_eq!(filter("   "), "");
        assert_eq!(filter(" . "), "");
    }

    #[test]
    fn rejects_all_known_hallucinations() {
        for artifact in REJECTED {
            assert_eq!(filter(artifact), "", "should reject {artifact:?}");
        }
    }

    #[test]
    fn rejects_regardless_of_case_and_trailing_punctuation() {
        for artifact in REJECTED {
            let upper = artifact.to_uppercase();
            assert_eq!(filter(&upper), "", "should reject {upper:?}");
            let punctuated = format!("{artifact}.");
            assert_eq!(filter(&punctuated), "", "should reject {punctuated:?}");
        }
    }

    #[test]
    fn collapses_internal_whitespace() {
        assert_eq!(filter("  hello   there  "), "hello there");
    }

    #[test]
    fn rejection_is_exact_not_substring() {
        // Real speech that merely contains an artifact must survive.
        assert_eq!(
            filter("she said thank you to the driver"),
            "she said thank you to the driver"
        );
    }
}
