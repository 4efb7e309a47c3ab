//! Non-blocking observer events, delivered over `std::sync::mpsc` channels
//! rather than callback trait objects — the same idiom the teacher crate
//! uses to drive its progress bar off a background thread.

use crate::model::Capture;

/// Emitted by [`crate::bootstrap::IndexBootstrapper`] after each shard
/// fetch and after persistence.
#[derive(Debug, Clone)]
pub struct IndexStatusEvent {
    pub crawl_label: String,
    pub status_msg: String,
    pub complete: bool,
    pub indices_done: usize,
    pub indices_total: usize,
}

/// Emitted by [`crate::scanner::ShardScanner`] as it works through the
/// candidate shards.
#[derive(Debug, Clone)]
pub struct ScanProgressEvent {
    pub crawl_label: String,
    pub cdx_num: Option<u32>,
    pub status_msg: String,
    pub done: bool,
    pub percent: Option<f64>,
}

pub type IndexStatusSender = std::sync::mpsc::Sender<IndexStatusEvent>;
pub type ScanProgressSender = std::sync::mpsc::Sender<ScanProgressEvent>;
pub type CaptureSender = std::sync::mpsc::Sender<Capture>;
