//! For a crawl: enumerate its CDX shards, fetch each shard's first row
//! via [`crate::gzip_partial::partial_gunzip`], and persist the directory
//! into the [`Store`]. Grounded in the reference implementation's
//! `CCIndexBuilder`.

use chrono::{DateTime, NaiveDateTime, Utc};
use rayon::prelude::*;
use regex::Regex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;

use crate::config::Config;
use crate::error::AppError;
use crate::gzip_partial::partial_gunzip;
use crate::http::HttpFetcher;
use crate::model::BoundaryRecord;
use crate::observer::{IndexStatusEvent, IndexStatusSender};
use crate::store::Store;

const MAX_CDX_LENGTH_COMPRESSED: u64 = 2000;
const MAX_CDX_LENGTH_UNCOMPRESSED: usize = 2000;
const CC_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

fn cdx_rx() -> &'static Regex {
    static RX: OnceLock<Regex> = OnceLock::new();
    RX.get_or_init(|| Regex::new(r".*/cdx-(\d{5})\.gz$").unwrap())
}

fn cdx_to_boundary_rx() -> &'static Regex {
    static RX: OnceLock<Regex> = OnceLock::new();
    RX.get_or_init(|| {
        Regex::new(
            r"^(?P<tld>[^,]+?),(?P<domain>[^,]+?),?(?P<subdomain>[^)]*)\)(?P<path>.*?)\s+(?P<timestamp>\d+)\s+(?P<headers>\{.*\}?)$",
        )
        .unwrap()
    })
}

pub struct BootstrapSummary {
    pub shards_total: usize,
    pub rows_added: usize,
}

pub struct IndexBootstrapper<'a> {
    store: &'a Store,
    fetcher: &'a HttpFetcher,
    config: &'a Config,
    observer: Option<IndexStatusSender>,
}

impl<'a> IndexBootstrapper<'a> {
    pub fn new(store: &'a Store, fetcher: &'a HttpFetcher, config: &'a Config) -> Self {
        IndexBootstrapper {
            store,
            fetcher,
            config,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: IndexStatusSender) -> Self {
        self.observer = Some(observer);
        self
    }

    fn emit(&self, label: &str, status_msg: &str, complete: bool, done: usize, total: usize) {
        if let Some(tx) = &self.observer {
            let _ = tx.send(IndexStatusEvent {
                crawl_label: label.to_string(),
                status_msg: status_msg.to_string(),
                complete,
                indices_done: done,
                indices_total: total,
            });
        }
    }

    pub fn run(&self, crawl_label: &str) -> Result<BootstrapSummary, AppError> {
        let crawl = self.store.insert_crawl(
            crawl_label,
            &format!(
                "https://{}/crawl-data/{}/",
                self.config.cc_data_hostname, crawl_label
            ),
        )?;
        self.emit(crawl_label, "Checking crawl index", false, 0, 0);

        let cdx_fragments = self.fetch_cdx_fragments(crawl_label)?;
        let total = cdx_fragments.len();

        let existing = self.store.boundary_count(crawl.id)?;
        if existing >= total as i64 {
            self.emit(crawl_label, "Crawl indices received", true, existing as usize, total);
            return Ok(BootstrapSummary {
                shards_total: total,
                rows_added: 0,
            });
        }

        self.emit(crawl_label, "Fetching crawl indices", false, 0, total);
        let records = self.fetch_first_rows(crawl_label, crawl.id, &cdx_fragments);

        self.emit(crawl_label, "Saving crawl indices", false, records.len(), total);
        if !records.is_empty() {
            self.store.insert_boundaries(&records)?;
        }
        self.emit(crawl_label, "Crawl indices received", true, records.len(), total);

        Ok(BootstrapSummary {
            shards_total: total,
            rows_added: records.len(),
        })
    }

    /// Fetches `cc-index.paths.gz` in full and filters it down to the
    /// `cdx-NNNNN.gz` path fragments.
    fn fetch_cdx_fragments(&self, crawl_label: &str) -> Result<Vec<String>, AppError> {
        let url = self.config.cc_index_paths_url(crawl_label);
        let response = self.fetcher.get(&url, &[("accept-encoding", "gzip")])?;
        let bytes = response
            .bytes()
            .map_err(|e| AppError::Decode(e.to_string()))?;
        let decoded = partial_gunzip(&bytes, usize::MAX);
        let text = String::from_utf8_lossy(&decoded);

        Ok(text
            .lines()
            .filter(|line| cdx_rx().is_match(line))
            .map(|line| line.to_string())
            .collect())
    }

    /// Fetches the first ~2000 uncompressed bytes of each shard in
    /// parallel (this crate's equivalent of the teacher's `par_iter`
    /// shard crawl), parses the first line, and returns the boundary
    /// records that parsed cleanly. A parse failure skips that shard and
    /// is logged, not propagated.
    fn fetch_first_rows(
        &self,
        crawl_label: &str,
        crawl_id: i64,
        fragments: &[String],
    ) -> Vec<BoundaryRecord> {
        let total = fragments.len();
        let done = AtomicUsize::new(0);

        fragments
            .par_iter()
            .filter_map(|fragment| {
                let result = self.fetch_one_first_row(crawl_id, fragment);
                let done_now = done.fetch_add(1, Ordering::SeqCst) + 1;
                self.emit(crawl_label, "Fetching crawl index", false, done_now, total);
                match result {
                    Ok(record) => record,
                    Err(err) => {
                        log::warn!("failed to fetch boundary row for {fragment}: {err}");
                        None
                    }
                }
            })
            .collect()
    }

    fn fetch_one_first_row(
        &self,
        crawl_id: i64,
        fragment: &str,
    ) -> Result<Option<BoundaryRecord>, AppError> {
        let cdx_num = match cdx_rx().captures(fragment) {
            Some(caps) => caps[1].parse::<u32>().unwrap_or(0),
            None => return Ok(None),
        };
        let url = format!("https://{}/{}", self.config.cc_data_hostname, fragment);
        let compressed = self
            .fetcher
            .get_range(&url, 0, MAX_CDX_LENGTH_COMPRESSED - 1)?;
        let decoded = partial_gunzip(&compressed, MAX_CDX_LENGTH_UNCOMPRESSED);
        let text = String::from_utf8_lossy(&decoded);
        let first_line = match text.lines().next() {
            Some(line) if !line.is_empty() => line,
            _ => {
                log::warn!("no records found in {url}");
                return Ok(None);
            }
        };

        let caps = match cdx_to_boundary_rx().captures(first_line) {
            Some(caps) => caps,
            None => return Ok(None),
        };

        let timestamp = parse_cc_timestamp(&caps["timestamp"]);
        let now = Utc::now();
        Ok(Some(BoundaryRecord {
            crawl_id,
            cdx_num,
            tld: caps["tld"].to_string(),
            domain: caps["domain"].to_string(),
            subdomain: caps["subdomain"].to_string(),
            path: caps["path"].to_string(),
            timestamp,
            headers_blob: caps["headers"].to_string(),
            created_at: now,
        }))
    }
}

fn parse_cc_timestamp(raw: &str) -> DateTime<Utc> {
    NaiveDateTime::parse_from_str(raw, CC_TIMESTAMP_FORMAT)
        .map(|naive| DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cdx_regex_matches_shard_paths() {
        assert!(cdx_rx().is_match("cc-index/collections/CC-MAIN-2024-51/indexes/cdx-00042.gz"));
        assert!(!cdx_rx().is_match("cc-index/collections/CC-MAIN-2024-51/indexes/cluster.idx"));
    }

    #[test]
    fn parses_boundary_line() {
        let line = r#"com,example,www)/ 20240101120000 {"url":"http://www.example.com/"}"#;
        let caps = cdx_to_boundary_rx().captures(line).unwrap();
        assert_eq!(&caps["tld"], "com");
        assert_eq!(&caps["domain"], "example");
        assert_eq!(&caps["subdomain"], "www");
    }

    #[test]
    fn parses_cc_timestamp() {
        let ts = parse_cc_timestamp("20240101120000");
        assert_eq!(ts.format("%Y-%m-%d").to_string(), "2024-01-01");
    }
}
