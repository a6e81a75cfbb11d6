//! Crawlers: discovery of candidate files from remote sources.
//!
//! A crawler yields a finite list of file descriptors from a source and is
//! read-only and idempotent: repeated runs against an unchanged source yield
//! the same set. Exclusion policy is data (matchers over section and link
//! text), so rules are testable without touching the crawl loop.

mod http;
mod json_endpoint;
mod justice_gov;

pub use http::{build_client, get_with_backoff};
pub use json_endpoint::{JsonEndpointCrawler, CANDIDATE_LISTING_PATHS};
pub use justice_gov::JusticeGovCrawler;

use async_trait::async_trait;

use crate::error::{CoreError, ErrorDetail};

/// File extensions the pipeline accepts.
pub const ALLOWED_EXTENSIONS: &[&str] = &["pdf", "jpg", "jpeg", "png", "tiff", "tif", "bmp", "gif"];

/// Whether a filename carries an allowed extension.
pub fn has_allowed_extension(filename: &str) -> bool {
    filename
        .rsplit('.')
        .next()
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            ALLOWED_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Derive a filename from the tail of a URL path.
pub fn filename_from_url(url: &str) -> String {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    without_query
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(without_query)
        .to_string()
}

/// A discovered candidate file.
#[derive(Debug, Clone, PartialEq)]
pub struct FileDescriptor {
    pub url: String,
    pub filename: String,
    pub content_type_hint: Option<String>,
    /// Section heading the file was listed under, when the source has one.
    pub section_label: Option<String>,
    /// Set when an exclusion rule matched; excluded files are previewed but
    /// not fetched.
    pub exclude_reason: Option<String>,
}

/// Outcome of a discovery run: descriptors plus per-item errors. The caller
/// decides whether a partial listing is worth ingesting.
#[derive(Debug, Default)]
pub struct Discovery {
    pub descriptors: Vec<FileDescriptor>,
    pub errors: Vec<ErrorDetail>,
}

impl Discovery {
    /// Descriptors that passed the exclusion rules.
    pub fn fetchable(&self) -> impl Iterator<Item = &FileDescriptor> {
        self.descriptors.iter().filter(|d| d.exclude_reason.is_none())
    }

    pub fn excluded_count(&self) -> usize {
        self.descriptors
            .iter()
            .filter(|d| d.exclude_reason.is_some())
            .count()
    }
}

/// Which descriptor field an exclusion rule inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchField {
    Section,
    LinkText,
}

/// A single substring matcher in the exclusion table.
#[derive(Debug, Clone)]
pub struct ExclusionRule {
    pub field: MatchField,
    pub needle: &'static str,
    pub reason: &'static str,
}

/// The deterministic exclusion table for the tracked site.
pub fn default_exclusion_rules() -> Vec<ExclusionRule> {
    vec![
        ExclusionRule {
            field: MatchField::Section,
            needle: "DOJ Disclosure",
            reason: "doj_disclosure_section",
        },
        ExclusionRule {
            field: MatchField::LinkText,
            needle: "Transparency Act",
            reason: "transparency_act_link",
        },
        ExclusionRule {
            field: MatchField::LinkText,
            needle: "EFTA",
            reason: "efta_link",
        },
    ]
}

/// First matching rule's reason, if any.
pub fn evaluate_exclusions(
    rules: &[ExclusionRule],
    section: Option<&str>,
    link_text: &str,
) -> Option<String> {
    rules
        .iter()
        .find(|rule| match rule.field {
            MatchField::Section => section.map(|s| s.contains(rule.needle)).unwrap_or(false),
            MatchField::LinkText => link_text.contains(rule.needle),
        })
        .map(|rule| rule.reason.to_string())
}

/// Discovery capability over a configured source.
#[async_trait]
pub trait Crawler: Send + Sync {
    /// Identifier used in logs and reports.
    fn source_id(&self) -> &str;

    /// Enumerate candidate files. Read-only and idempotent.
    async fn discover(&self) -> Result<Discovery, CoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_extensions() {
        assert!(has_allowed_extension("scan.pdf"));
        assert!(has_allowed_extension("IMG.JPEG"));
        assert!(has_allowed_extension("page.tif"));
        assert!(!has_allowed_extension("notes.txt"));
        assert!(!has_allowed_extension("archive.zip"));
        assert!(!has_allowed_extension("noext"));
    }

    #[test]
    fn test_filename_from_url() {
        assert_eq!(
            filename_from_url("https://example.com/files/scan.pdf?v=2"),
            "scan.pdf"
        );
        assert_eq!(filename_from_url("https://example.com/a/b/"), "b");
    }

    #[test]
    fn test_exclusion_rules_match_section() {
        let rules = default_exclusion_rules();
        let reason = evaluate_exclusions(&rules, Some("DOJ Disclosure Files"), "scan.pdf");
        assert_eq!(reason.as_deref(), Some("doj_disclosure_section"));
    }

    #[test]
    fn test_exclusion_rules_match_link_text() {
        let rules = default_exclusion_rules();
        assert_eq!(
            evaluate_exclusions(&rules, None, "EFTA00000001.pdf").as_deref(),
            Some("efta_link")
        );
        assert_eq!(
            evaluate_exclusions(&rules, Some("Court Records"), "Transparency Act release")
                .as_deref(),
            Some("transparency_act_link")
        );
    }

    #[test]
    fn test_exclusion_rules_pass_ordinary_files() {
        let rules = default_exclusion_rules();
        assert!(evaluate_exclusions(&rules, Some("Court Records"), "scan.pdf").is_none());
    }

    #[test]
    fn test_discovery_partitions() {
        let discovery = Discovery {
            descriptors: vec![
                FileDescriptor {
                    url: "https://x/a.pdf".into(),
                    filename: "a.pdf".into(),
                    content_type_hint: None,
                    section_label: None,
                    exclude_reason: None,
                },
                FileDescriptor {
                    url: "https://x/b.pdf".into(),
                    filename: "b.pdf".into(),
                    content_type_hint: None,
                    section_label: None,
                    exclude_reason: Some("efta_link".into()),
                },
            ],
            errors: Vec::new(),
        };
        assert_eq!(discovery.fetchable().count(), 1);
        assert_eq!(discovery.excluded_count(), 1);
    }
}
