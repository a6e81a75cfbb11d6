//! Detected entity model.

use serde::{Deserialize, Serialize};

use super::PageBox;

/// Kinds of entities the extractor detects.
///
/// `Keyword` is reserved for curated keywords; no automatic extractor emits it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Name,
    Email,
    Phone,
    Date,
    Keyword,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Email => "email",
            Self::Phone => "phone",
            Self::Date => "date",
            Self::Keyword => "keyword",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "name" => Some(Self::Name),
            "email" => Some(Self::Email),
            "phone" => Some(Self::Phone),
            "date" => Some(Self::Date),
            "keyword" => Some(Self::Keyword),
            _ => None,
        }
    }
}

/// An entity found in a page's normalized text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageEntity {
    pub entity_id: String,
    pub ocr_id: String,
    pub document_id: String,
    pub entity_type: EntityType,
    /// The matched text as found.
    pub entity_value: String,
    /// Canonical form; None when normalization was not possible.
    pub normalized_value: Option<String>,
    /// Character span in the page's normalized text.
    pub span: (usize, usize),
    /// Minimum enclosing box over the matched words, when mappable.
    pub bbox: Option<PageBox>,
    pub confidence: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_type_round_trip() {
        for t in [
            EntityType::Name,
            EntityType::Email,
            EntityType::Phone,
            EntityType::Date,
            EntityType::Keyword,
        ] {
            assert_eq!(EntityType::from_str(t.as_str()), Some(t));
        }
    }
}
