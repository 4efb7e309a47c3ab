//! Streams one candidate shard at a time, matching each CDX line against a
//! [`PatternRegex`] and emitting [`Capture`]s over a channel. Grounded in
//! the reference implementation's `ccdownloader.py` scan loop, reworked
//! onto [`CachedStream`] plus a streaming `MultiGzDecoder` instead of
//! reading the whole shard into memory.

use flate2::read::MultiGzDecoder;
use std::io::Read;

use crate::cached_stream::CachedStream;
use crate::config::Config;
use crate::error::AppError;
use crate::http::HttpFetcher;
use crate::model::{BoundaryRecord, Capture};
use crate::observer::{ScanProgressEvent, ScanProgressSender};
use crate::pattern_regex::PatternRegex;

const READ_BLOCK: usize = 4 * 1024 * 1024;
const SKIP_LOG_INTERVAL: u64 = 1_000_000;

/// Tracks bytes pulled through an arbitrary `Read` for progress reporting,
/// since the direct (uncached) path has no file position to consult.
struct CountingReader {
    inner: Box<dyn Read>,
    count: u64,
}

impl CountingReader {
    fn new(inner: Box<dyn Read>) -> Self {
        CountingReader { inner, count: 0 }
    }

    fn tell(&self) -> u64 {
        self.count
    }
}

impl Read for CountingReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count += n as u64;
        Ok(n)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ScanSummary {
    pub shards_scanned: usize,
    pub lines_matched: usize,
    pub lines_skipped: usize,
}

pub struct ShardScanner<'a> {
    fetcher: &'a HttpFetcher,
    config: &'a Config,
    observer: Option<ScanProgressSender>,
}

impl<'a> ShardScanner<'a> {
    pub fn new(fetcher: &'a HttpFetcher, config: &'a Config) -> Self {
        ShardScanner {
            fetcher,
            config,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: ScanProgressSender) -> Self {
        self.observer = Some(observer);
        self
    }

    fn emit(&self, crawl_label: &str, cdx_num: Option<u32>, status_msg: &str, done: bool, percent: Option<f64>) {
        if let Some(tx) = &self.observer {
            let _ = tx.send(ScanProgressEvent {
                crawl_label: crawl_label.to_string(),
                cdx_num,
                status_msg: status_msg.to_string(),
                done,
                percent,
            });
        }
    }

    /// Scans every shard in `shards` in order, sending matched captures to
    /// `sink`. A shard whose download or decode fails is logged and
    /// skipped; it does not abort the remaining shards.
    pub fn scan(
        &self,
        crawl_label: &str,
        shards: &[BoundaryRecord],
        regex: &PatternRegex,
        sink: &std::sync::mpsc::Sender<Capture>,
    ) -> Result<ScanSummary, AppError> {
        let mut summary = ScanSummary::default();
        for shard in shards {
            match self.scan_one(crawl_label, shard, regex, sink) {
                Ok((matched, skipped)) => {
                    summary.shards_scanned += 1;
                    summary.lines_matched += matched;
                    summary.lines_skipped += skipped;
                }
                Err(err) => {
                    log::warn!(
                        "scan of shard {} in {} aborted: {}",
                        shard.cdx_num,
                        crawl_label,
                        err
                    );
                    self.emit(
                        crawl_label,
                        Some(shard.cdx_num),
                        &format!("shard scan failed: {err}"),
                        true,
                        None,
                    );
                }
            }
        }
        self.emit(crawl_label, None, "scan complete", true, Some(100.0));
        Ok(summary)
    }

    fn scan_one(
        &self,
        crawl_label: &str,
        shard: &BoundaryRecord,
        regex: &PatternRegex,
        sink: &std::sync::mpsc::Sender<Capture>,
    ) -> Result<(usize, usize), AppError> {
        let url = shard.to_cdx_url(&self.config.cc_data_hostname, crawl_label);
        self.emit(crawl_label, Some(shard.cdx_num), "fetching shard", false, Some(0.0));

        let (content_length, body): (u64, Box<dyn Read>) = if self.config.cache_requests {
            let cached = CachedStream::open(self.fetcher, &self.config.cache_dir, &url, false)?;
            let content_length = cached.length().max(1);
            (content_length, Box::new(cached.reader()?))
        } else {
            let response = self.fetcher.get(&url, &[("accept-encoding", "gzip")])?;
            let content_length = response.content_length().unwrap_or(0).max(1);
            (content_length, Box::new(response))
        };
        let counted = CountingReader::new(body);
        let mut gz = MultiGzDecoder::new(counted);

        let mut buf = vec![0u8; READ_BLOCK];
        let mut carry: Vec<u8> = Vec::new();
        let mut matched = 0usize;
        let mut skipped: u64 = 0;
        let mut last_percent = -1i64;

        loop {
            let n = gz
                .read(&mut buf)
                .map_err(|e| AppError::Decode(format!("{url}: {e}")))?;
            if n == 0 {
                break;
            }
            carry.extend_from_slice(&buf[..n]);

            let mut start = 0usize;
            while let Some(rel) = carry[start..].iter().position(|&b| b == b'\n') {
                let end = start + rel;
                self.process_line(&carry[start..end], regex, sink, crawl_label, &mut matched, &mut skipped)?;
                start = end + 1;
            }
            carry.drain(0..start);

            let consumed = gz.get_ref().tell();
            let percent = ((consumed as f64 / content_length as f64) * 100.0).min(100.0);
            if percent as i64 != last_percent {
                last_percent = percent as i64;
                self.emit(crawl_label, Some(shard.cdx_num), "scanning shard", false, Some(percent));
            }
        }

        if !carry.is_empty() {
            self.process_line(&carry, regex, sink, crawl_label, &mut matched, &mut skipped)?;
        }

        self.emit(crawl_label, Some(shard.cdx_num), "shard complete", true, Some(100.0));
        Ok((matched, skipped as usize))
    }

    /// A malformed (non-UTF-8) line aborts the shard via `AppError::Decode`,
    /// same as a `gz.read` failure. Lines that are merely non-matching or
    /// whose headers JSON fails to parse are skipped and counted instead,
    /// since those are expected noise in a CDX shard, not a corrupt stream.
    fn process_line(
        &self,
        line: &[u8],
        regex: &PatternRegex,
        sink: &std::sync::mpsc::Sender<Capture>,
        crawl_label: &str,
        matched: &mut usize,
        skipped: &mut u64,
    ) -> Result<(), AppError> {
        if line.is_empty() {
            return Ok(());
        }
        let text = std::str::from_utf8(line)
            .map_err(|e| AppError::Decode(format!("invalid utf-8 in CDX line: {e}")))?;

        let m = match regex.match_line(text) {
            Some(m) => m,
            None => {
                *skipped += 1;
                if *skipped % SKIP_LOG_INTERVAL == 0 {
                    log::info!("{crawl_label}: skipped {skipped} non-matching lines so far");
                }
                return Ok(());
            }
        };

        let mut capture: Capture = match serde_json::from_str(&m.headers) {
            Ok(capture) => capture,
            Err(err) => {
                log::warn!("{crawl_label}: failed to parse capture headers: {err}");
                *skipped += 1;
                return Ok(());
            }
        };
        capture.tld = m.tld;
        capture.domain = m.domain;
        capture.subdomain = m.subdomain;
        capture.timestamp = m.timestamp;

        *matched += 1;
        let _ = sink.send(capture);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::UrlPattern;
    use std::sync::mpsc;

    #[test]
    fn process_line_sends_matched_capture() {
        let patterns = vec![UrlPattern::new("com", "example")];
        let regex = PatternRegex::build(&patterns, None).unwrap();
        let fetcher = HttpFetcher::new("test-agent");
        let config = Config::default();
        let scanner = ShardScanner::new(&fetcher, &config);
        let (tx, rx) = mpsc::channel();

        let line = br#"com,example,www)/ 20240101120000 {"url":"http://www.example.com/","filename":"crawl-data/X.warc.gz","length":"100","status":"200"}"#;
        let mut matched = 0;
        let mut skipped = 0;
        scanner
            .process_line(line, &regex, &tx, "CC-MAIN-2024-51", &mut matched, &mut skipped)
            .unwrap();

        assert_eq!(matched, 1);
        assert_eq!(skipped, 0);
        let capture = rx.try_recv().unwrap();
        assert_eq!(capture.domain, "example");
        assert_eq!(capture.timestamp, "20240101120000");
    }

    #[test]
    fn process_line_skips_non_matching() {
        let patterns = vec![UrlPattern::new("com", "other")];
        let regex = PatternRegex::build(&patterns, None).unwrap();
        let fetcher = HttpFetcher::new("test-agent");
        let config = Config::default();
        let scanner = ShardScanner::new(&fetcher, &config);
        let (tx, rx) = mpsc::channel();

        let line = br#"com,example,www)/ 20240101120000 {"url":"http://www.example.com/","filename":"crawl-data/X.warc.gz","length":"100","status":"200"}"#;
        let mut matched = 0;
        let mut skipped = 0;
        scanner
            .process_line(line, &regex, &tx, "CC-MAIN-2024-51", &mut matched, &mut skipped)
            .unwrap();

        assert_eq!(matched, 0);
        assert_eq!(skipped, 1);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn counting_reader_tracks_bytes_pulled_through_it() {
        let data: Box<dyn Read> = Box::new(std::io::Cursor::new(b"hello world".to_vec()));
        let mut counted = CountingReader::new(data);
        let mut buf = [0u8; 5];
        counted.read(&mut buf).unwrap();
        assert_eq!(counted.tell(), 5);
        let mut rest = Vec::new();
        counted.read_to_end(&mut rest).unwrap();
        assert_eq!(counted.tell(), 11);
    }

    #[test]
    fn process_line_aborts_shard_on_invalid_utf8() {
        let patterns = vec![UrlPattern::new("com", "example")];
        let regex = PatternRegex::build(&patterns, None).unwrap();
        let fetcher = HttpFetcher::new("test-agent");
        let config = Config::default();
        let scanner = ShardScanner::new(&fetcher, &config);
        let (tx, _rx) = mpsc::channel();

        let line: &[u8] = &[0x66, 0x6f, 0xff, 0x6f];
        let mut matched = 0;
        let mut skipped = 0;
        let err = scanner
            .process_line(line, &regex, &tx, "CC-MAIN-2024-51", &mut matched, &mut skipped)
            .unwrap_err();

        assert!(matches!(err, AppError::Decode(_)));
    }
}
