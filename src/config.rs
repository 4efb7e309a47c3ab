//! Typed configuration record.
//!
//! `Config::from_env()` is the only place this crate reads `std::env`;
//! every other component receives what it needs by construction.

use std::path::PathBuf;

const DEFAULT_USER_AGENT: &str = "cc-locator/0.1 (+https://commoncrawl.org)";

#[derive(Debug, Clone)]
pub struct Config {
    pub cc_data_hostname: String,
    pub cc_index_hostname: String,
    pub store_path: PathBuf,
    pub cache_dir: PathBuf,
    pub user_agent: String,
    pub cache_requests: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            cc_data_hostname: "data.commoncrawl.org".to_string(),
            cc_index_hostname: "index.commoncrawl.org".to_string(),
            store_path: PathBuf::from("./cc-locator.sqlite3"),
            cache_dir: PathBuf::from("./cc-cache"),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            cache_requests: true,
        }
    }
}

impl Config {
    /// Reads the six recognized environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Self {
        let defaults = Config::default();
        Config {
            cc_data_hostname: std::env::var("CC_DATA_HOSTNAME")
                .unwrap_or(defaults.cc_data_hostname),
            cc_index_hostname: std::env::var("CC_INDEX_HOSTNAME")
                .unwrap_or(defaults.cc_index_hostname),
            store_path: std::env::var("CC_STORE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.store_path),
            cache_dir: std::env::var("CC_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_dir),
            user_agent: std::env::var("CC_USER_AGENT").unwrap_or(defaults.user_agent),
            cache_requests: std::env::var("CACHE_REQUESTS")
                .map(|v| v != "0" && v.to_lowercase() != "false")
                .unwrap_or(defaults.cache_requests),
        }
    }

    pub fn cdx_url(&self, label: &str, cdx_num: u32) -> String {
        format!(
            "https://{}/cc-index/collections/{}/indexes/cdx-{:05}.gz",
            self.cc_data_hostname, label, cdx_num
        )
    }

    pub fn cc_index_paths_url(&self, label: &str) -> String {
        format!(
            "https://{}/crawl-data/{}/cc-index.paths.gz",
            self.cc_data_hostname, label
        )
    }

    pub fn collinfo_url(&self) -> String {
        format!("https://{}/collinfo.json", self.cc_index_hostname)
    }

    pub fn warc_url(&self, filename: &str) -> String {
        format!("https://{}/{}", self.cc_data_hostname, filename)
    }
}
