//! Site-specific crawler for the justice.gov media listing.
//!
//! Walks the page's sections in document order, pairing each anchor with the
//! most recent heading, and annotates descriptors against the exclusion
//! table. Excluded files are reported for preview but never fetched.

use async_trait::async_trait;
use scraper::{Html, Selector};
use url::Url;

use super::{
    evaluate_exclusions, filename_from_url, get_with_backoff, has_allowed_extension, Crawler,
    Discovery, ExclusionRule, FileDescriptor,
};
use crate::error::CoreError;

/// Crawler over the tracked justice.gov page.
pub struct JusticeGovCrawler {
    client: reqwest::Client,
    root_url: Url,
    rules: Vec<ExclusionRule>,
}

impl JusticeGovCrawler {
    pub fn new(
        client: reqwest::Client,
        root_url: &str,
        rules: Vec<ExclusionRule>,
    ) -> Result<Self, CoreError> {
        let root_url = Url::parse(root_url)
            .map_err(|e| CoreError::InvalidArgument(format!("root url {}: {}", root_url, e)))?;
        Ok(Self {
            client,
            root_url,
            rules,
        })
    }

    /// Parse the listing HTML into descriptors. Deterministic for identical
    /// input, including the exclusion partition.
    fn parse_listing(&self, html: &str) -> Vec<FileDescriptor> {
        let document = Html::parse_document(html);
        let walker = Selector::parse("h1, h2, h3, h4, a[href]").expect("static selector");

        let mut descriptors = Vec::new();
        let mut current_section: Option<String> = None;

        for element in document.select(&walker) {
            let tag = element.value().name();
            if tag != "a" {
                let heading: String = element.text().collect::<String>().trim().to_string();
                if !heading.is_empty() {
                    current_section = Some(heading);
                }
                continue;
            }

            let Some(href) = element.value().attr("href") else {
                continue;
            };
            let filename = filename_from_url(href);
            if !has_allowed_extension(&filename) {
                continue;
            }
            let Ok(url) = self.root_url.join(href) else {
                continue;
            };

            let link_text: String = element.text().collect::<String>().trim().to_string();
            let exclude_reason = evaluate_exclusions(
                &self.rules,
                current_section.as_deref(),
                if link_text.is_empty() { &filename } else { &link_text },
            );

            descriptors.push(FileDescriptor {
                url: url.into(),
                filename,
                content_type_hint: None,
                section_label: current_section.clone(),
                exclude_reason,
            });
        }
        descriptors
    }
}

#[async_trait]
impl Crawler for JusticeGovCrawler {
    fn source_id(&self) -> &str {
        "justice.gov"
    }

    async fn discover(&self) -> Result<Discovery, CoreError> {
        let response = get_with_backoff(&self.client, self.root_url.as_str(), None).await?;
        let body = response
            .text()
            .await
            .map_err(|e| CoreError::TransientUpstream(format!("read listing: {}", e)))?;

        Ok(Discovery {
            descriptors: self.parse_listing(&body),
            errors: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawlers::default_exclusion_rules;

    fn crawler() -> JusticeGovCrawler {
        JusticeGovCrawler::new(
            reqwest::Client::new(),
            "https://www.justice.gov/media/",
            default_exclusion_rules(),
        )
        .unwrap()
    }

    const LISTING: &str = r#"
        <html><body>
        <h2>Court Records</h2>
        <p><a href="/files/deposition-001.pdf">Deposition 001</a></p>
        <p><a href="/files/exhibit-4.jpg">Exhibit 4</a></p>
        <p><a href="/about">About this release</a></p>
        <h2>DOJ Disclosure Materials</h2>
        <p><a href="/files/disclosure-01.pdf">Disclosure 01</a></p>
        <h2>Other Materials</h2>
        <p><a href="/files/EFTA00000001.pdf">EFTA00000001.pdf</a></p>
        </body></html>
    "#;

    #[test]
    fn test_sections_attached_to_anchors() {
        let descriptors = crawler().parse_listing(LISTING);
        assert_eq!(descriptors.len(), 4);
        assert_eq!(descriptors[0].section_label.as_deref(), Some("Court Records"));
        assert_eq!(descriptors[0].filename, "deposition-001.pdf");
        assert!(descriptors[0].url.starts_with("https://www.justice.gov/"));
        assert_eq!(
            descriptors[2].section_label.as_deref(),
            Some("DOJ Disclosure Materials")
        );
    }

    #[test]
    fn test_exclusions_annotated_not_dropped() {
        let descriptors = crawler().parse_listing(LISTING);
        let excluded: Vec<&FileDescriptor> = descriptors
            .iter()
            .filter(|d| d.exclude_reason.is_some())
            .collect();
        assert_eq!(excluded.len(), 2);
        assert_eq!(
            excluded[0].exclude_reason.as_deref(),
            Some("doj_disclosure_section")
        );
        assert_eq!(excluded[1].exclude_reason.as_deref(), Some("efta_link"));

        let fetchable: Vec<&str> = descriptors
            .iter()
            .filter(|d| d.exclude_reason.is_none())
            .map(|d| d.filename.as_str())
            .collect();
        assert_eq!(fetchable, vec!["deposition-001.pdf", "exhibit-4.jpg"]);
    }

    #[test]
    fn test_non_document_anchors_skipped() {
        let descriptors = crawler().parse_listing(LISTING);
        assert!(descriptors.iter().all(|d| d.filename != "about"));
    }

    #[test]
    fn test_partition_stable_across_runs() {
        let c = crawler();
        let first: Vec<_> = c
            .parse_listing(LISTING)
            .into_iter()
            .map(|d| (d.filename, d.exclude_reason))
            .collect();
        let second: Vec<_> = c
            .parse_listing(LISTING)
            .into_iter()
            .map(|d| (d.filename, d.exclude_reason))
            .collect();
        assert_eq!(first, second);
    }
}
