//! Persists matched captures as WARC resource locations, with in-memory
//! histograms for a running summary. Grounded in the reference
//! implementation's `dbschema/ccrawl.py` `WarcResource` bookkeeping, reworked
//! onto the `Store`'s idempotent insert and this crate's `HttpFetcher`.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::AppError;
use crate::http::HttpFetcher;
use crate::model::Capture;
use crate::store::Store;

#[derive(Debug, Default, Clone)]
pub struct SinkSnapshot {
    pub warc_counts: HashMap<String, u64>,
    pub domain_counts: HashMap<String, u64>,
    pub inserted: u64,
    pub duplicates: u64,
}

struct Histograms {
    warc: HashMap<String, u64>,
    doms: HashMap<String, u64>,
    inserted: u64,
    duplicates: u64,
}

/// Records matched captures into the `Store`'s `warc_record` table,
/// de-duplicating by WARC URL and tracking per-WARC and per-domain counts
/// for the running summary this crate's CLI reports at the end of a scan.
pub struct CaptureSink<'a> {
    store: &'a Store,
    fetcher: &'a HttpFetcher,
    crawl_id: i64,
    histograms: Mutex<Histograms>,
}

impl<'a> CaptureSink<'a> {
    pub fn new(store: &'a Store, fetcher: &'a HttpFetcher, crawl_id: i64) -> Self {
        CaptureSink {
            store,
            fetcher,
            crawl_id,
            histograms: Mutex::new(Histograms {
                warc: HashMap::new(),
                doms: HashMap::new(),
                inserted: 0,
                duplicates: 0,
            }),
        }
    }

    pub fn exists(&self, warc_url: &str) -> Result<bool, AppError> {
        self.store.warc_exists(warc_url)
    }

    /// Records `capture` against `warc_base_url` (the crawl's WARC path
    /// prefix). A HEAD request fills in the WARC file's total length,
    /// since the CDX line only carries this capture's offset/length
    /// within it. Duplicate WARC URLs are counted but not re-inserted.
    pub fn insert(&self, warc_base_url: &str, capture: &Capture) -> Result<bool, AppError> {
        let warc_url = format!("{}{}", warc_base_url, capture.filename);
        let domain_key = reqwest::Url::parse(&capture.url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| format!("{}.{}", capture.domain, capture.tld));

        if self.store.warc_exists(&warc_url)? {
            let mut hist = self.histograms.lock().unwrap();
            hist.duplicates += 1;
            return Ok(false);
        }

        let warc_length = self
            .fetcher
            .head(&warc_url, &[])
            .ok()
            .and_then(|resp| resp.content_length())
            .unwrap_or(0) as i64;
        let page_length: i64 = capture
            .length
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        let page_metadata = serde_json::to_string(capture)
            .map_err(|e| AppError::Decode(format!("capture re-encode failed: {e}")))?;

        let inserted = self.store.insert_warc_resource(
            self.crawl_id,
            &capture.url,
            &warc_url,
            &page_metadata,
            page_length,
            warc_length,
        )?;

        let mut hist = self.histograms.lock().unwrap();
        if inserted {
            hist.inserted += 1;
            *hist.warc.entry(capture.filename.clone()).or_insert(0) += 1;
            *hist.doms.entry(domain_key).or_insert(0) += 1;
        } else {
            hist.duplicates += 1;
        }
        Ok(inserted)
    }

    pub fn snapshot(&self) -> SinkSnapshot {
        let hist = self.histograms.lock().unwrap();
        SinkSnapshot {
            warc_counts: hist.warc.clone(),
            domain_counts: hist.doms.clone(),
            inserted: hist.inserted,
            duplicates: hist.duplicates,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Capture;

    fn capture(filename: &str) -> Capture {
        Capture {
            url: "http://www.example.com/".to_string(),
            mime: None,
            mime_detected: None,
            status: Some("200".to_string()),
            digest: None,
            length: Some("1024".to_string()),
            offset: Some("0".to_string()),
            filename: filename.to_string(),
            charset: None,
            languages: None,
            tld: "com".to_string(),
            domain: "example".to_string(),
            subdomain: "www".to_string(),
            timestamp: "20240101120000".to_string(),
        }
    }

    #[test]
    fn insert_is_idempotent_and_tracked() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("HEAD", "/crawl-data/X.warc.gz")
            .with_status(200)
            .with_header("content-length", "2048")
            .create();

        let store = Store::open_in_memory().unwrap();
        let crawl = store.insert_crawl("CC-MAIN-2024-51", "https://x").unwrap();
        let fetcher = HttpFetcher::new("test-agent");
        let sink = CaptureSink::new(&store, &fetcher, crawl.id);
        let warc_base = format!("{}/", server.url());

        let c = capture("crawl-data/X.warc.gz");
        let first = sink.insert(&warc_base, &c).unwrap();
        let second = sink.insert(&warc_base, &c).unwrap();

        assert!(first);
        assert!(!second);
        let snapshot = sink.snapshot();
        assert_eq!(snapshot.inserted, 1);
        assert_eq!(snapshot.duplicates, 1);
        assert_eq!(snapshot.warc_counts.get("crawl-data/X.warc.gz"), Some(&1));
        assert_eq!(snapshot.domain_counts.get("www.example.com"), Some(&1));
    }

    #[test]
    fn domain_key_falls_back_when_capture_url_is_unparseable() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("HEAD", "/crawl-data/Y.warc.gz")
            .with_status(200)
            .with_header("content-length", "2048")
            .create();

        let store = Store::open_in_memory().unwrap();
        let crawl = store.insert_crawl("CC-MAIN-2024-51", "https://x").unwrap();
        let fetcher = HttpFetcher::new("test-agent");
        let sink = CaptureSink::new(&store, &fetcher, crawl.id);
        let warc_base = format!("{}/", server.url());

        let mut c = capture("crawl-data/Y.warc.gz");
        c.url = "not a url".to_string();
        sink.insert(&warc_base, &c).unwrap();

        let snapshot = sink.snapshot();
        assert_eq!(snapshot.domain_counts.get("example.com"), Some(&1));
    }
}
