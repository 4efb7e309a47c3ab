//! Ties the components together into one `run()` call: bootstrap the
//! crawl's shard directory, narrow it to the candidate shards for a set of
//! url patterns, scan those shards, and persist matched captures. Grounded
//! in the reference implementation's `ccdownloader.py` top-level driver.

use std::collections::BTreeMap;
use std::sync::mpsc;

use crate::bootstrap::{BootstrapSummary, IndexBootstrapper};
use crate::config::Config;
use crate::error::AppError;
use crate::http::HttpFetcher;
use crate::model::{BoundaryRecord, UrlPattern};
use crate::observer::{IndexStatusSender, ScanProgressSender};
use crate::pattern_regex::PatternRegex;
use crate::scanner::{ScanSummary, ShardScanner};
use crate::sink::{CaptureSink, SinkSnapshot};
use crate::store::Store;

#[derive(Default)]
pub struct PipelineObservers {
    pub index_status: Option<IndexStatusSender>,
    pub scan_progress: Option<ScanProgressSender>,
}

pub struct PipelineSummary {
    pub bootstrap: BootstrapSummary,
    pub candidate_shards: usize,
    pub scan: ScanSummary,
    pub sink: SinkSnapshot,
}

pub struct Pipeline {
    config: Config,
    store: Store,
    fetcher: HttpFetcher,
}

impl Pipeline {
    pub fn new(config: Config) -> Result<Self, AppError> {
        let store = Store::open(&config.store_path)?;
        let fetcher = HttpFetcher::new(config.user_agent.clone());
        Ok(Pipeline {
            config,
            store,
            fetcher,
        })
    }

    pub fn from_parts(config: Config, store: Store, fetcher: HttpFetcher) -> Self {
        Pipeline {
            config,
            store,
            fetcher,
        }
    }

    /// Bootstraps `crawl_label`'s shard directory if it is not already
    /// complete, narrows it to the shards that might contain matches for
    /// `patterns`, scans those shards, and persists every matched capture.
    pub fn run(
        &self,
        crawl_label: &str,
        patterns: &[UrlPattern],
        observers: PipelineObservers,
    ) -> Result<PipelineSummary, AppError> {
        if patterns.is_empty() {
            return Err(AppError::Invariant(
                "run requires at least one url pattern".to_string(),
            ));
        }

        let mut bootstrapper = IndexBootstrapper::new(&self.store, &self.fetcher, &self.config);
        if let Some(tx) = observers.index_status {
            bootstrapper = bootstrapper.with_observer(tx);
        }
        let bootstrap_summary = bootstrapper.run(crawl_label)?;

        let crawl = self.store.get_crawl_by_label(crawl_label)?.ok_or_else(|| {
            AppError::Invariant(format!("crawl {crawl_label} missing immediately after bootstrap"))
        })?;

        let regex = PatternRegex::build(patterns, None)?;
        let shards = self.narrow_to_candidates(crawl.id, patterns)?;

        let sink = CaptureSink::new(&self.store, &self.fetcher, crawl.id);
        let warc_base = format!("https://{}/", self.config.cc_data_hostname);

        let mut scanner = ShardScanner::new(&self.fetcher, &self.config);
        if let Some(tx) = observers.scan_progress {
            scanner = scanner.with_observer(tx);
        }

        let (capture_tx, capture_rx) = mpsc::channel();

        let scan_summary = std::thread::scope(|scope| -> Result<ScanSummary, AppError> {
            let consumer = scope.spawn(|| {
                while let Ok(capture) = capture_rx.recv() {
                    if let Err(err) = sink.insert(&warc_base, &capture) {
                        log::warn!("failed to persist capture for {}: {err}", capture.url);
                    }
                }
            });

            let result = scanner.scan(crawl_label, &shards, &regex, &capture_tx);
            drop(capture_tx);
            consumer.join().expect("capture consumer thread panicked");
            result
        })?;

        Ok(PipelineSummary {
            bootstrap: bootstrap_summary,
            candidate_shards: shards.len(),
            scan: scan_summary,
            sink: sink.snapshot(),
        })
    }

    /// Unions the candidate shards for every pattern, deduplicated by
    /// shard number and returned in shard order.
    fn narrow_to_candidates(
        &self,
        crawl_id: i64,
        patterns: &[UrlPattern],
    ) -> Result<Vec<BoundaryRecord>, AppError> {
        let mut by_shard: BTreeMap<u32, BoundaryRecord> = BTreeMap::new();
        for pattern in patterns {
            for record in self.store.find_candidate_shards(crawl_id, pattern)? {
                by_shard.entry(record.cdx_num).or_insert(record);
            }
        }
        Ok(by_shard.into_values().collect())
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}
