//! Data model: [`UrlPattern`], [`ShardId`], [`BoundaryRecord`], [`Crawl`],
//! [`Capture`] and [`WarcResourceRow`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A 6-tuple query: each field is either a literal or absent (wildcard).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct UrlPattern {
    pub tld: Option<String>,
    pub domain: Option<String>,
    pub subdomain: Option<String>,
    pub path: Option<String>,
    pub timestamp: Option<String>,
    pub headers: Option<String>,
}

impl UrlPattern {
    pub fn new(tld: impl Into<String>, domain: impl Into<String>) -> Self {
        UrlPattern {
            tld: Some(tld.into()),
            domain: Some(domain.into()),
            ..Default::default()
        }
    }

    pub fn with_subdomain(mut self, subdomain: impl Into<String>) -> Self {
        self.subdomain = Some(subdomain.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Absent fields compare as the empty string for SURT-style ordering.
    fn sort_key(&self) -> (&str, &str, &str, &str) {
        (
            self.tld.as_deref().unwrap_or(""),
            self.domain.as_deref().unwrap_or(""),
            self.subdomain.as_deref().unwrap_or(""),
            self.path.as_deref().unwrap_or(""),
        )
    }
}

impl PartialOrd for UrlPattern {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for UrlPattern {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

/// Identifies a single CDX shard within a crawl.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ShardId {
    pub crawl_label: String,
    pub cdx_num: u32,
}

impl ShardId {
    pub fn filename(&self) -> String {
        format!("cdx-{:05}.gz", self.cdx_num)
    }
}

/// The first CDX row of a shard, used as a directory key.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryRecord {
    pub crawl_id: i64,
    pub cdx_num: u32,
    pub tld: String,
    pub domain: String,
    pub subdomain: String,
    pub path: String,
    pub timestamp: DateTime<Utc>,
    pub headers_blob: String,
    pub created_at: DateTime<Utc>,
}

impl BoundaryRecord {
    pub fn to_cdx_url(&self, cc_data_hostname: &str, crawl_label: &str) -> String {
        format!(
            "https://{}/cc-index/collections/{}/indexes/cdx-{:05}.gz",
            cc_data_hostname, crawl_label, self.cdx_num
        )
    }

    /// One CSV line for the `--dump-boundaries` debug aid.
    pub fn to_csv(&self) -> String {
        format!(
            "{},{},{},{},{},{}",
            self.cdx_num,
            self.tld,
            self.domain,
            self.subdomain,
            self.path,
            self.timestamp.to_rfc3339()
        )
    }
}

/// A Common Crawl dataset, keyed by its stable "CC-MAIN-YYYY-WW" label.
#[derive(Debug, Clone, PartialEq)]
pub struct Crawl {
    pub id: i64,
    pub label: String,
    pub source_url: String,
    pub created_at: DateTime<Utc>,
}

/// One matching CDX line, parsed and JSON-decoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capture {
    pub url: String,
    pub mime: Option<String>,
    #[serde(rename = "mime-detected")]
    pub mime_detected: Option<String>,
    pub status: Option<String>,
    pub digest: Option<String>,
    pub length: Option<String>,
    pub offset: Option<String>,
    pub filename: String,
    pub charset: Option<String>,
    pub languages: Option<String>,

    // Key fields lifted from the outer SURT match, not the JSON payload.
    #[serde(skip_deserializing, default)]
    pub tld: String,
    #[serde(skip_deserializing, default)]
    pub domain: String,
    #[serde(skip_deserializing, default)]
    pub subdomain: String,
    #[serde(skip_deserializing, default)]
    pub timestamp: String,
}

/// Persisted record of a matched capture's WARC location.
#[derive(Debug, Clone)]
pub struct WarcResourceRow {
    pub crawl_id: i64,
    pub page_url: String,
    pub warc_url: String,
    pub page_metadata: String,
    pub page_length: i64,
    pub warc_length: i64,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_pattern_ordering_treats_absent_as_empty() {
        let a = UrlPattern::new("com", "a");
        let b = UrlPattern {
            tld: Some("com".to_string()),
            domain: None,
            ..Default::default()
        };
        assert!(b < a);
    }

    #[test]
    fn shard_filename_is_zero_padded() {
        let shard = ShardId {
            crawl_label: "CC-MAIN-2024-51".to_string(),
            cdx_num: 42,
        };
        assert_eq!(shard.filename(), "cdx-00042.gz");
    }
}
