//! Search index row production.
//!
//! A page's searchable text is its normalized text lowercased with
//! punctuation collapsed to single spaces; tokens keep page order and
//! duplicates so phrase and proximity scoring can see positions.

/// Lowercase and replace non-alphanumeric runs with single spaces.
pub fn build_searchable_text(normalized_text: &str) -> String {
    let mut out = String::with_capacity(normalized_text.len());
    let mut pending_space = false;
    for c in normalized_text.chars() {
        if c.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            for lc in c.to_lowercase() {
                out.push(lc);
            }
        } else {
            pending_space = true;
        }
    }
    out
}

/// Tokenize searchable text on whitespace, retaining order and duplicates.
pub fn tokenize(searchable_text: &str) -> Vec<String> {
    searchable_text
        .split_whitespace()
        .map(|t| t.to_string())
        .collect()
}

/// Tokenize a raw query through the same pipeline pages go through.
pub fn tokenize_query(query: &str) -> Vec<String> {
    tokenize(&build_searchable_text(query))
}

/// Tokenize normalized text while recording each token's character span in
/// the original string, so search matches can anchor snippets precisely.
pub fn tokenize_with_offsets(normalized_text: &str) -> Vec<(String, usize, usize)> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut start = 0usize;
    for (idx, c) in normalized_text.chars().enumerate() {
        if c.is_alphanumeric() {
            if current.is_empty() {
                start = idx;
            }
            for lc in c.to_lowercase() {
                current.push(lc);
            }
        } else if !current.is_empty() {
            out.push((std::mem::take(&mut current), start, idx));
        }
    }
    if !current.is_empty() {
        let end = normalized_text.chars().count();
        out.push((current, start, end));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowercases_and_collapses_punctuation() {
        assert_eq!(
            build_searchable_text("The FLIGHT-log, (redacted)!"),
            "the flight log redacted"
        );
    }

    #[test]
    fn test_tokens_keep_order_and_duplicates() {
        let tokens = tokenize(&build_searchable_text("log the log"));
        assert_eq!(tokens, vec!["log", "the", "log"]);
    }

    #[test]
    fn test_query_and_page_tokenize_identically() {
        assert_eq!(tokenize_query("U.S. Records"), vec!["u", "s", "records"]);
        assert_eq!(
            tokenize(&build_searchable_text("U.S. Records")),
            vec!["u", "s", "records"]
        );
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(build_searchable_text(""), "");
        assert!(tokenize_query("???").is_empty());
    }

    #[test]
    fn test_offsets_point_into_original_text() {
        let text = "The FLIGHT-log.";
        let tokens = tokenize_with_offsets(text);
        let words: Vec<&str> = tokens.iter().map(|(t, _, _)| t.as_str()).collect();
        assert_eq!(words, vec!["the", "flight", "log"]);
        let (_, start, end) = &tokens[1];
        let slice: String = text.chars().skip(*start).take(end - start).collect();
        assert_eq!(slice, "FLIGHT");
    }

    #[test]
    fn test_offsets_match_plain_tokenization() {
        let text = "a b,c d";
        let plain = tokenize(&build_searchable_text(text));
        let offsets = tokenize_with_offsets(text);
        assert_eq!(plain.len(), offsets.len());
    }
}
