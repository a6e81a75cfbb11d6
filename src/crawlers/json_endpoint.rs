//! Generic JSON listing crawler.
//!
//! Probes an ordered list of candidate listing paths under a base endpoint
//! and uses the first response whose body parses as JSON. Descriptors are
//! pulled from arrays and the conventional collection fields.

use async_trait::async_trait;
use serde_json::Value;
use url::Url;

use super::{
    filename_from_url, get_with_backoff, has_allowed_extension, Crawler, Discovery,
    FileDescriptor,
};
use crate::error::{CoreError, ErrorDetail};

/// Candidate listing paths probed in order under the base URL.
pub const CANDIDATE_LISTING_PATHS: &[&str] = &["api/all-files", "files.json", "list.json", "api/files", "/"];

/// Object fields treated as nested collections of descriptors.
const COLLECTION_FIELDS: &[&str] = &["files", "items", "data", "results"];

/// Object fields that can carry the file location, probed in order.
const LOCATION_FIELDS: &[&str] = &["key", "url", "href", "path"];

/// Crawler over a generic JSON file-listing endpoint.
pub struct JsonEndpointCrawler {
    client: reqwest::Client,
    base_url: Url,
    source_id: String,
}

impl JsonEndpointCrawler {
    pub fn new(client: reqwest::Client, base_url: &str) -> Result<Self, CoreError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| CoreError::InvalidArgument(format!("base url {}: {}", base_url, e)))?;
        let source_id = base_url.host_str().unwrap_or("json-endpoint").to_string();
        Ok(Self {
            client,
            base_url,
            source_id,
        })
    }

    fn resolve(&self, location: &str) -> Option<String> {
        self.base_url.join(location).ok().map(|u| u.into())
    }

    /// Interpret one JSON value as a descriptor, when it has the shape of one.
    fn value_to_descriptor(&self, value: &Value) -> Option<FileDescriptor> {
        match value {
            Value::String(name) => {
                if !has_allowed_extension(name) {
                    return None;
                }
                Some(FileDescriptor {
                    url: self.resolve(name)?,
                    filename: filename_from_url(name),
                    content_type_hint: None,
                    section_label: None,
                    exclude_reason: None,
                })
            }
            Value::Object(map) => {
                let location = LOCATION_FIELDS
                    .iter()
                    .find_map(|field| map.get(*field).and_then(Value::as_str))?;
                let filename = map
                    .get("filename")
                    .or_else(|| map.get("name"))
                    .and_then(Value::as_str)
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| filename_from_url(location));
                if !has_allowed_extension(&filename) {
                    return None;
                }
                Some(FileDescriptor {
                    url: self.resolve(location)?,
                    filename,
                    content_type_hint: map
                        .get("content_type")
                        .and_then(Value::as_str)
                        .map(|s| s.to_string()),
                    section_label: map
                        .get("section")
                        .or_else(|| map.get("category"))
                        .and_then(Value::as_str)
                        .map(|s| s.to_string()),
                    exclude_reason: None,
                })
            }
            _ => None,
        }
    }

    /// Walk arrays and the conventional collection fields, collecting
    /// descriptors.
    fn walk(&self, value: &Value, out: &mut Vec<FileDescriptor>) {
        match value {
            Value::Array(items) => {
                for item in items {
                    if let Some(descriptor) = self.value_to_descriptor(item) {
                        out.push(descriptor);
                    } else {
                        self.walk(item, out);
                    }
                }
            }
            Value::Object(map) => {
                for field in COLLECTION_FIELDS {
                    if let Some(nested) = map.get(*field) {
                        self.walk(nested, out);
                    }
                }
            }
            _ => {}
        }
    }
}

#[async_trait]
impl Crawler for JsonEndpointCrawler {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    async fn discover(&self) -> Result<Discovery, CoreError> {
        let mut errors = Vec::new();

        for path in CANDIDATE_LISTING_PATHS {
            let listing_url = match self.base_url.join(path) {
                Ok(url) => url,
                Err(_) => continue,
            };

            match get_with_backoff(&self.client, listing_url.as_str(), Some("application/json"))
                .await
            {
                Ok(response) => match response.text().await {
                    Ok(body) => match serde_json::from_str::<Value>(&body) {
                        Ok(json) => {
                            let mut descriptors = Vec::new();
                            self.walk(&json, &mut descriptors);
                            return Ok(Discovery {
                                descriptors,
                                errors,
                            });
                        }
                        Err(_) => {
                            tracing::debug!("Listing at {} is not JSON, trying next", listing_url);
                        }
                    },
                    Err(e) => errors.push(ErrorDetail {
                        kind: "transient_upstream".into(),
                        message: format!("read body: {}", e),
                        item: Some(listing_url.to_string()),
                    }),
                },
                Err(e) => errors.push(ErrorDetail::from_error(&e, Some(listing_url.to_string()))),
            }
        }

        errors.push(ErrorDetail {
            kind: "discovery_failed".into(),
            message: format!(
                "no JSON listing found under {} (tried {} candidates)",
                self.base_url,
                CANDIDATE_LISTING_PATHS.len()
            ),
            item: Some(self.base_url.to_string()),
        });
        Ok(Discovery {
            descriptors: Vec::new(),
            errors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crawler() -> JsonEndpointCrawler {
        JsonEndpointCrawler::new(
            reqwest::Client::new(),
            "https://archive.example.com/corpus/",
        )
        .unwrap()
    }

    #[test]
    fn test_string_elements_become_descriptors() {
        let c = crawler();
        let json: Value = serde_json::json!(["a.pdf", "b.txt", "c.jpg"]);
        let mut out = Vec::new();
        c.walk(&json, &mut out);
        let names: Vec<&str> = out.iter().map(|d| d.filename.as_str()).collect();
        assert_eq!(names, vec!["a.pdf", "c.jpg"]);
        assert!(out[0].url.ends_with("/corpus/a.pdf"));
    }

    #[test]
    fn test_object_elements_with_location_fields() {
        let c = crawler();
        let json: Value = serde_json::json!({
            "files": [
                {"key": "files/scan.pdf", "filename": "scan.pdf", "section": "Records"},
                {"url": "https://cdn.example.com/x/page.png"},
                {"href": "no-extension"},
            ]
        });
        let mut out = Vec::new();
        c.walk(&json, &mut out);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].filename, "scan.pdf");
        assert_eq!(out[0].section_label.as_deref(), Some("Records"));
        assert_eq!(out[1].filename, "page.png");
        assert_eq!(out[1].url, "https://cdn.example.com/x/page.png");
    }

    #[test]
    fn test_nested_collection_fields_walked() {
        let c = crawler();
        let json: Value = serde_json::json!({
            "data": {"results": [{"path": "deep/scan.tif", "name": "scan.tif"}]}
        });
        let mut out = Vec::new();
        c.walk(&json, &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].filename, "scan.tif");
    }

    #[test]
    fn test_unrelated_fields_ignored() {
        let c = crawler();
        let json: Value = serde_json::json!({"meta": ["x.pdf"], "count": 3});
        let mut out = Vec::new();
        c.walk(&json, &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_repeated_walks_are_deterministic() {
        let c = crawler();
        let json: Value = serde_json::json!({"files": ["a.pdf", "b.pdf"]});
        let mut first = Vec::new();
        c.walk(&json, &mut first);
        let mut second = Vec::new();
        c.walk(&json, &mut second);
        assert_eq!(first, second);
    }
}
