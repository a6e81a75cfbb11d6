//! Character-trigram fuzzy token matching.

use std::collections::HashSet;

/// Character trigrams of a token. Tokens shorter than three characters use
/// the whole token as their only gram.
fn trigrams(token: &str) -> HashSet<String> {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() < 3 {
        let mut set = HashSet::new();
        set.insert(token.to_string());
        return set;
    }
    chars
        .windows(3)
        .map(|w| w.iter().collect::<String>())
        .collect()
}

/// Jaccard similarity over character trigrams of two tokens.
pub fn trigram_similarity(a: &str, b: &str) -> f32 {
    if a == b {
        return 1.0;
    }
    let ta = trigrams(a);
    let tb = trigrams(b);
    let inter = ta.intersection(&tb).count();
    let union = ta.union(&tb).count();
    if union == 0 {
        0.0
    } else {
        inter as f32 / union as f32
    }
}

/// Best similarity of a query token against any page token.
pub fn best_similarity(query_token: &str, page_tokens: &[String]) -> f32 {
    page_tokens
        .iter()
        .map(|t| trigram_similarity(query_token, t))
        .fold(0.0, f32::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_tokens() {
        assert_eq!(trigram_similarity("example", "example"), 1.0);
    }

    #[test]
    fn test_close_tokens_pass_default_threshold() {
        // "exampl" vs "example": one missing trailing character.
        assert!(trigram_similarity("exampl", "example") >= 0.6);
    }

    #[test]
    fn test_unrelated_tokens_fail() {
        assert!(trigram_similarity("example", "quartz") < 0.2);
    }

    #[test]
    fn test_short_tokens() {
        assert_eq!(trigram_similarity("us", "us"), 1.0);
        assert!(trigram_similarity("us", "um") < 1.0);
    }

    #[test]
    fn test_best_similarity_picks_max() {
        let page: Vec<String> = ["quartz", "example", "other"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(best_similarity("example", &page), 1.0);
        assert_eq!(best_similarity("anything", &[]), 0.0);
    }
}
