//! Text normalization and fuzzy matching helpers.
//!
//! Vendor price observations and invoice line names arrive as free text
//! (bulleted, numbered, inconsistently cased). Matching is done on a
//! normalized token-set representation.

use std::collections::BTreeSet;

/// Normalize free text for matching: lowercase, strip leading list markers
/// (bullets, numbering, dashes), collapse whitespace.
pub fn normalize_text(text: &str) -> String {
    let lowered = text.to_lowercase();
    let trimmed = lowered.trim();

    // Strip leading bullets/numbering like "• ", "3) ", "- ", "1. ".
    let stripped = trimmed
        .trim_start_matches(|c: char| {
            c.is_whitespace()
                || c.is_ascii_digit()
                || matches!(c, '•' | '-' | '–' | '—' | '*' | ')' | '(' | '.')
        })
        .trim();

    let mut out = String::with_capacity(stripped.len());
    let mut last_space = false;
    for c in stripped.chars() {
        if c.is_whitespace() {
            if !last_space && !out.is_empty() {
                out.push(' ');
            }
            last_space = true;
        } else {
            out.push(c);
            last_space = false;
        }
    }
    out.trim_end().to_string()
}

fn token_set(text: &str) -> BTreeSet<String> {
    normalize_text(text)
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect()
}

/// Token-set similarity in [0, 1]: Jaccard overlap of the normalized token
/// sets of both inputs. 1.0 means identical token sets regardless of order.
pub fn token_set_similarity(a: &str, b: &str) -> f64 {
    let ta = token_set(a);
    let tb = token_set(b);

    if ta.is_empty() && tb.is_empty() {
        return 0.0;
    }

    let intersection = ta.intersection(&tb).count();
    let union = ta.union(&tb).count();
    if union == 0 {
        return 0.0;
    }
    intersection as f64 / union as f64
}

/// Case-insensitive whole-word containment check used by keyword lexicons.
///
/// `"drywall screws"` contains `"drywall"` but `"personable"` does not
/// contain `"personal"`.
pub fn contains_word(haystack: &str, word: &str) -> bool {
    let normalized = normalize_text(haystack);
    normalized
        .split(|c: char| !c.is_alphanumeric())
        .any(|t| t == word.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_strips_list_markers_and_collapses_spaces() {
        assert_eq!(normalize_text("• 2)  Copper   Pipe "), "copper pipe");
        assert_eq!(normalize_text("- Drywall Screws"), "drywall screws");
        assert_eq!(normalize_text(""), "");
    }

    #[test]
    fn identical_token_sets_score_one() {
        assert_eq!(token_set_similarity("Copper Pipe", "pipe copper"), 1.0);
    }

    #[test]
    fn disjoint_token_sets_score_zero() {
        assert_eq!(token_set_similarity("copper pipe", "drywall screws"), 0.0);
    }

    #[test]
    fn partial_overlap_is_between_zero_and_one() {
        let s = token_set_similarity("copper pipe 15mm", "copper pipe");
        assert!(s > 0.0 && s < 1.0);
    }

    #[test]
    fn word_containment_requires_whole_words() {
        assert!(contains_word("Drywall screws, box of 500", "drywall"));
        assert!(!contains_word("personable service fee", "personal"));
    }
}
