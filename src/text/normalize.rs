//! OCR text normalization.
//!
//! Raw OCR output keeps scanner artifacts: broken hyphenation across line
//! breaks, typographic ligatures, stray control characters, and ragged
//! whitespace. Normalization produces the text that entity extraction and
//! indexing operate on; the raw text is preserved separately.

use std::sync::OnceLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

fn hyphen_break_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // A letter, a hyphen or soft hyphen, a line break, then a letter.
    RE.get_or_init(|| Regex::new(r"(\p{L})[-\u{00AD}][ \t]*\r?\n[ \t]*(\p{L})").unwrap())
}

/// Normalize OCR text: NFKC (which expands the common ligatures), join
/// hyphenated line breaks, strip control and format characters, collapse
/// whitespace runs. Idempotent.
pub fn normalize(raw: &str) -> String {
    let nfkc: String = raw.nfkc().collect();

    let joined = hyphen_break_re().replace_all(&nfkc, "$1$2");

    let mut cleaned = String::with_capacity(joined.len());
    for c in joined.chars() {
        if c == '\u{00AD}' {
            continue;
        }
        if c.is_control() && !c.is_whitespace() {
            continue;
        }
        cleaned.push(c);
    }

    let mut out = String::with_capacity(cleaned.len());
    let mut in_whitespace = false;
    for c in cleaned.chars() {
        if c.is_whitespace() {
            in_whitespace = true;
            continue;
        }
        if in_whitespace && !out.is_empty() {
            out.push(' ');
        }
        in_whitespace = false;
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hyphenated_line_break_joined() {
        assert_eq!(normalize("flow-\nchart"), "flowchart");
        assert_eq!(normalize("flow-\n  chart"), "flowchart");
        assert_eq!(normalize("flow\u{00AD}\nchart"), "flowchart");
    }

    #[test]
    fn test_hyphen_without_break_kept() {
        assert_eq!(normalize("well-known fact"), "well-known fact");
    }

    #[test]
    fn test_ligatures_expanded() {
        assert_eq!(normalize("e\u{FB03}cient \u{FB02}ow"), "efficient flow");
    }

    #[test]
    fn test_control_chars_stripped() {
        assert_eq!(normalize("a\u{0000}b\u{0007}c"), "abc");
    }

    #[test]
    fn test_whitespace_collapsed() {
        assert_eq!(normalize("  a \t b \n\n c  "), "a b c");
    }

    #[test]
    fn test_idempotent() {
        for input in [
            "flow-\nchart",
            "  spaced   out \n text ",
            "e\u{FB03}cient",
            "plain text",
            "",
        ] {
            let once = normalize(input);
            assert_eq!(normalize(&once), once, "input {:?}", input);
        }
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("   \n\t "), "");
    }
}
