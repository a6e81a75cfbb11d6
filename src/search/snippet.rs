//! Snippet extraction around a match position.

/// Context kept on each side of a match, in characters.
const CONTEXT_CHARS: usize = 80;

/// Extract a snippet framing the match at `[start, start + len)` (character
/// indices) with up to 80 characters of context on each side, trimmed to
/// word boundaries without ever cutting into the match itself. Texts
/// shorter than 160 characters are returned whole.
pub fn make_snippet(text: &str, start: usize, len: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() < 2 * CONTEXT_CHARS {
        return text.to_string();
    }
    let match_start = start.min(chars.len());
    let match_end = (start + len).min(chars.len());

    let mut window_start = match_start.saturating_sub(CONTEXT_CHARS);
    let mut window_end = (match_end + CONTEXT_CHARS).min(chars.len());

    // Advance past a partial leading word, but never past the match.
    if window_start > 0 && !chars[window_start - 1].is_whitespace() {
        while window_start < match_start && !chars[window_start].is_whitespace() {
            window_start += 1;
        }
        while window_start < match_start && chars[window_start].is_whitespace() {
            window_start += 1;
        }
    }

    // Back off a partial trailing word, but never before the match.
    if window_end < chars.len() && !chars[window_end].is_whitespace() {
        while window_end > match_end && !chars[window_end - 1].is_whitespace() {
            window_end -= 1;
        }
        while window_end > match_end && chars[window_end - 1].is_whitespace() {
            window_end -= 1;
        }
    }

    chars[window_start..window_end].iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_returned_whole() {
        let text = "the flight log showing arrivals";
        assert_eq!(make_snippet(text, 4, 10), text);
    }

    #[test]
    fn test_match_preserved_in_long_text() {
        let filler = "word ".repeat(60);
        let text = format!("{}flight log{}", filler, " trail".repeat(40));
        let chars_before = filler.chars().count();
        let snippet = make_snippet(&text, chars_before, 10);
        assert!(snippet.contains("flight log"));
        // Window is bounded by the context plus one word on each side.
        assert!(snippet.chars().count() <= 2 * CONTEXT_CHARS + 10);
    }

    #[test]
    fn test_snippet_trims_to_word_boundaries() {
        let text = format!("{}needle {}", "alpha ".repeat(40), "omega ".repeat(40));
        let needle_at = "alpha ".repeat(40).chars().count();
        let snippet = make_snippet(&text, needle_at, 6);
        assert!(snippet.contains("needle"));
        assert!(!snippet.starts_with("lpha"), "snippet {:?}", snippet);
        assert!(snippet.split_whitespace().all(|w| w == "alpha" || w == "needle" || w == "omega"));
    }

    #[test]
    fn test_out_of_range_anchor_clamped() {
        let text = "tiny";
        assert_eq!(make_snippet(text, 100, 5), "tiny");
        let long = "word ".repeat(100);
        let snippet = make_snippet(&long, 10_000, 5);
        assert!(!snippet.is_empty());
    }
}
