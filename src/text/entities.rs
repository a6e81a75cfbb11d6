//! Entity extraction from normalized page text.
//!
//! Four kinds are detected automatically: emails, US-style phone numbers,
//! dates, and capitalized name sequences. Matches carry their character span
//! in the normalized text so callers can map them back onto word boxes.

use std::collections::HashSet;
use std::sync::OnceLock;

use chrono::{Datelike, NaiveDate, Utc};
use regex::Regex;

use crate::models::{EntityType, OcrText, PageBox, PageEntity, WordBox};

/// An entity match before persistence ids are assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedEntity {
    pub entity_type: EntityType,
    pub value: String,
    pub normalized: Option<String>,
    /// Character span in the normalized text.
    pub span: (usize, usize),
    pub confidence: f32,
}

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}").unwrap()
    })
}

fn phone_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"\(\d{3}\)\s?\d{3}-\d{4}|\+1\s\d{3}\s\d{3}\s\d{4}|\b\d{3}-\d{3}-\d{4}\b|\b\d{3}\.\d{3}\.\d{4}\b|\b\d{10}\b",
        )
        .unwrap()
    })
}

fn date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?x)
            \b\d{4}-\d{2}-\d{2}\b
            | \b\d{1,2}/\d{1,2}/\d{4}\b
            | \b\d{1,2}/\d{1,2}/\d{2}\b
            | (?i)\b(?:January|February|March|April|May|June|July|August|September|October|November|December)\s+\d{1,2},\s*\d{4}\b
            | (?i)\b\d{1,2}\s+(?:January|February|March|April|May|June|July|August|September|October|November|December)\s+\d{4}\b
            ",
        )
        .unwrap()
    })
}

/// Capitalized words that never start or continue a personal name:
/// weekdays, months, titles, geographic and organizational prefixes, and
/// common sentence-initial words.
const NAME_STOP_WORDS: &[&str] = &[
    "Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday", "Sunday",
    "January", "February", "March", "April", "May", "June", "July", "August",
    "September", "October", "November", "December",
    "Mr", "Mrs", "Ms", "Dr", "Prof", "Professor", "Sir", "Madam", "Miss",
    "Judge", "Justice", "Hon", "Honorable", "President", "Senator", "Governor",
    "General", "Colonel", "Captain", "Major", "Lieutenant", "Sergeant",
    "Agent", "Officer", "Director", "Secretary", "Attorney", "Counsel",
    "North", "South", "East", "West", "Northern", "Southern", "Eastern", "Western",
    "New", "Old", "Upper", "Lower", "Lake", "Mount", "Fort", "Port", "Saint",
    "The", "This", "That", "These", "Those", "There", "Then", "Thus", "Therefore",
    "A", "An", "And", "As", "At", "Be", "But", "By", "For", "From", "He", "Her",
    "His", "How", "If", "In", "Is", "It", "Its", "Me", "My", "No", "Not", "Now",
    "Of", "On", "Or", "Our", "Out", "Per", "She", "So", "Some", "Such", "To",
    "Under", "Until", "Up", "Upon", "We", "What", "When", "Where", "Which",
    "While", "Who", "Whom", "Whose", "Why", "With", "You", "Your",
    "Page", "Pages", "Exhibit", "Exhibits", "Appendix", "Section", "Chapter",
    "Table", "Figure", "Volume", "Part", "Item", "Case", "Court", "District",
    "State", "States", "United", "Federal", "National", "Department", "Bureau",
    "Office", "Division", "Agency", "Commission", "Committee", "Congress",
    "House", "Senate", "Act", "Law", "Code", "Rule", "Order", "Report",
    "Document", "Documents", "Record", "Records", "File", "Files", "Date",
    "Dear", "Sincerely", "Regards", "Subject", "Re", "Cc", "Bcc", "To", "From",
    "Inc", "Corp", "Company", "LLC", "Ltd", "Avenue", "Street", "Road", "Drive",
    "Boulevard", "Suite", "Floor", "Room", "Box",
];

fn name_stop_set() -> &'static HashSet<&'static str> {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| NAME_STOP_WORDS.iter().copied().collect())
}

/// Map a byte offset in `text` to a character index.
fn byte_to_char(text: &str, byte: usize) -> usize {
    text[..byte].chars().count()
}

fn push_match(
    out: &mut Vec<ExtractedEntity>,
    text: &str,
    entity_type: EntityType,
    m: &regex::Match<'_>,
    normalized: Option<String>,
) {
    out.push(ExtractedEntity {
        entity_type,
        value: m.as_str().to_string(),
        normalized,
        span: (
            byte_to_char(text, m.start()),
            byte_to_char(text, m.end()),
        ),
        confidence: 1.0,
    });
}

fn normalize_phone(value: &str) -> Option<String> {
    let digits: String = value.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() < 10 {
        return None;
    }
    Some(digits[digits.len() - 10..].to_string())
}

fn month_number(name: &str) -> Option<u32> {
    let lower = name.to_ascii_lowercase();
    let months = [
        "january", "february", "march", "april", "may", "june", "july",
        "august", "september", "october", "november", "december",
    ];
    months.iter().position(|m| *m == lower).map(|i| i as u32 + 1)
}

/// Normalize a date match to ISO-8601 when the year is unambiguous and in
/// range; otherwise None (the original string is kept as the value).
fn normalize_date(value: &str) -> Option<String> {
    let max_year = Utc::now().year() + 1;
    let in_range = |y: i32| (1900..=max_year).contains(&y);

    let valid = |y: i32, m: u32, d: u32| {
        NaiveDate::from_ymd_opt(y, m, d).map(|date| date.format("%Y-%m-%d").to_string())
    };

    if let Some((y, rest)) = value.split_once('-') {
        // YYYY-MM-DD
        let (m, d) = rest.split_once('-')?;
        let y: i32 = y.parse().ok()?;
        if !in_range(y) {
            return None;
        }
        return valid(y, m.parse().ok()?, d.parse().ok()?);
    }

    if value.contains('/') {
        let parts: Vec<&str> = value.split('/').collect();
        if parts.len() != 3 {
            return None;
        }
        let y_raw = parts[2];
        if y_raw.len() < 4 {
            // Two-digit years are ambiguous.
            return None;
        }
        let y: i32 = y_raw.parse().ok()?;
        if !in_range(y) {
            return None;
        }
        return valid(y, parts[0].parse().ok()?, parts[1].parse().ok()?);
    }

    // "Month D, YYYY" or "D Month YYYY"
    let cleaned = value.replace(',', " ");
    let parts: Vec<&str> = cleaned.split_whitespace().collect();
    if parts.len() != 3 {
        return None;
    }
    let (m, d, y) = if let Some(m) = month_number(parts[0]) {
        (m, parts[1].parse().ok()?, parts[2].parse::<i32>().ok()?)
    } else {
        (
            month_number(parts[1])?,
            parts[0].parse().ok()?,
            parts[2].parse::<i32>().ok()?,
        )
    };
    if !in_range(y) {
        return None;
    }
    valid(y, m, d)
}

/// A token counts as capitalized only with an uppercase initial and a
/// lowercase tail, so ALL-CAPS headings never enter name candidates.
fn is_name_token(token: &str) -> bool {
    let trimmed = token.trim_matches(|c: char| !c.is_alphanumeric());
    if trimmed.chars().count() < 2 {
        return false;
    }
    let mut chars = trimmed.chars();
    let first = chars.next().unwrap();
    if !first.is_uppercase() {
        return false;
    }
    if !chars.clone().all(|c| c.is_lowercase() && c.is_alphabetic()) {
        return false;
    }
    !name_stop_set().contains(trimmed)
}

fn extract_names(text: &str, out: &mut Vec<ExtractedEntity>) {
    // Tokens with their char spans.
    let mut tokens: Vec<(usize, usize, &str)> = Vec::new();
    let mut char_idx = 0usize;
    for piece in text.split_inclusive(char::is_whitespace) {
        let word = piece.trim_end_matches(char::is_whitespace);
        let word_chars = word.chars().count();
        if !word.is_empty() {
            tokens.push((char_idx, char_idx + word_chars, word));
        }
        char_idx += piece.chars().count();
    }

    let mut i = 0;
    while i < tokens.len() {
        if !is_name_token(tokens[i].2) {
            i += 1;
            continue;
        }
        let mut j = i + 1;
        while j < tokens.len() && is_name_token(tokens[j].2) {
            j += 1;
        }
        let run = j - i;
        // Single capitalized tokens are not names; longer runs read as headings.
        if (2..=4).contains(&run) {
            let start = tokens[i].0;
            let end = tokens[j - 1].1;
            let value: String = text
                .chars()
                .skip(start)
                .take(end - start)
                .collect();
            let cleaned = value.trim_matches(|c: char| !c.is_alphanumeric()).to_string();
            out.push(ExtractedEntity {
                entity_type: EntityType::Name,
                value: cleaned.clone(),
                normalized: Some(cleaned),
                span: (start, end),
                confidence: 0.7,
            });
        }
        i = j.max(i + 1);
    }
}

/// Extract all supported entity kinds from normalized text, deduplicated by
/// (kind, canonical value) keeping the first occurrence.
pub fn extract_entities(normalized_text: &str) -> Vec<ExtractedEntity> {
    let mut found = Vec::new();

    for m in email_re().find_iter(normalized_text) {
        let normalized = Some(m.as_str().to_lowercase());
        push_match(&mut found, normalized_text, EntityType::Email, &m, normalized);
    }

    for m in phone_re().find_iter(normalized_text) {
        let normalized = normalize_phone(m.as_str());
        push_match(&mut found, normalized_text, EntityType::Phone, &m, normalized);
    }

    for m in date_re().find_iter(normalized_text) {
        let normalized = normalize_date(m.as_str());
        push_match(&mut found, normalized_text, EntityType::Date, &m, normalized);
    }

    extract_names(normalized_text, &mut found);

    // Dedup within the page, first occurrence wins.
    found.sort_by_key(|e| e.span.0);
    let mut seen: HashSet<(EntityType, String)> = HashSet::new();
    found.retain(|e| {
        let key = (
            e.entity_type,
            e.normalized
                .clone()
                .unwrap_or_else(|| e.value.to_lowercase()),
        );
        seen.insert(key)
    });
    found
}

/// Fold a string to its alphanumeric lowercase skeleton for box matching.
fn fold(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// Attach minimum enclosing boxes by locating each entity's tokens as a
/// consecutive run of word boxes. Entities whose tokens cannot be located
/// keep a None box.
pub fn attach_entity_boxes(
    entities: &[ExtractedEntity],
    word_boxes: &[WordBox],
) -> Vec<Option<PageBox>> {
    let folded: Vec<String> = word_boxes.iter().map(|w| fold(&w.text)).collect();

    entities
        .iter()
        .map(|entity| {
            let needles: Vec<String> = entity
                .value
                .split_whitespace()
                .map(fold)
                .filter(|t| !t.is_empty())
                .collect();
            if needles.is_empty() {
                return None;
            }
            let n = needles.len();
            for start in 0..folded.len().saturating_sub(n - 1) {
                if folded[start..start + n] == needles[..] {
                    return PageBox::enclosing(&word_boxes[start..start + n]);
                }
            }
            None
        })
        .collect()
}

/// Assemble persistable entity rows for an OCR text.
pub fn to_page_entities(ocr: &OcrText, extracted: Vec<ExtractedEntity>) -> Vec<PageEntity> {
    let boxes = attach_entity_boxes(&extracted, &ocr.word_boxes);
    extracted
        .into_iter()
        .zip(boxes)
        .map(|(e, bbox)| PageEntity {
            entity_id: uuid::Uuid::new_v4().to_string(),
            ocr_id: ocr.ocr_id.clone(),
            document_id: ocr.document_id.clone(),
            entity_type: e.entity_type,
            entity_value: e.value,
            normalized_value: e.normalized,
            span: e.span,
            bbox,
            confidence: e.confidence,
        })
        .collect()
}
