//! One-producer/many-reader local cache of an HTTP body, usable while
//! still being downloaded. Grounded in the reference implementation's
//! `simple_requests_cache.py`, reworked into the thread/channel idiom the
//! rest of this crate uses instead of that file's read-through object.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use crate::error::AppError;
use crate::http::HttpFetcher;

const BLOCK_SIZE: usize = 64 * 1024;
const WAIT_TIMEOUT: Duration = Duration::from_millis(200);

struct CacheState {
    bytes_written: u64,
    content_length: Option<u64>,
    started: bool,
    done: bool,
    error: Option<String>,
}

type SharedState = Arc<(Mutex<CacheState>, Condvar)>;

/// A cache entry for one URL; construction either discovers a valid
/// existing cache file or spawns a producer thread to build one.
pub struct CachedStream {
    path: PathBuf,
    state: SharedState,
}

impl CachedStream {
    /// Deterministic cache path: sanitized leaf + MD5 hex of the URL, so
    /// two independent callers for the same URL share one file.
    pub fn cache_path(cache_dir: &Path, url: &str) -> PathBuf {
        let leaf: String = url
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        let hash = format!("{:x}", md5::compute(url.as_bytes()));
        cache_dir.join(format!("{leaf}-{hash}.cache"))
    }

    pub fn open(
        fetcher: &HttpFetcher,
        cache_dir: &Path,
        url: &str,
        force_rewrite: bool,
    ) -> Result<Self, AppError> {
        fs::create_dir_all(cache_dir)?;
        let path = Self::cache_path(cache_dir, url);

        let head = fetcher.head(url, &[("accept-encoding", "gzip")])?;
        let content_length = head.content_length();

        if !force_rewrite && Self::is_valid_existing(&path, content_length)? {
            let bytes_written = fs::metadata(&path)?.len();
            let state: SharedState = Arc::new((
                Mutex::new(CacheState {
                    bytes_written,
                    content_length,
                    started: true,
                    done: true,
                    error: None,
                }),
                Condvar::new(),
            ));
            return Ok(CachedStream { path, state });
        }

        if path.exists() {
            fs::remove_file(&path)?;
        }

        let state: SharedState = Arc::new((
            Mutex::new(CacheState {
                bytes_written: 0,
                content_length,
                started: false,
                done: false,
                error: None,
            }),
            Condvar::new(),
        ));

        let producer_state = state.clone();
        let producer_fetcher = fetcher.clone();
        let producer_url = url.to_string();
        let producer_path = path.clone();
        thread::spawn(move || {
            if let Err(err) = Self::produce(&producer_fetcher, &producer_url, &producer_path, &producer_state) {
                log::warn!("cache producer for {producer_url} failed: {err}");
                let (lock, cvar) = &*producer_state;
                let mut st = lock.lock().unwrap();
                st.error = Some(err.to_string());
                st.done = true;
                cvar.notify_all();
            }
        });

        // Block until the producer has created the backing file (or already
        // failed) so `reader()` is safe to call the moment `open()` returns.
        let (lock, cvar) = &*state;
        let mut st = lock.lock().unwrap();
        while !st.started && !st.done && st.error.is_none() {
            st = cvar.wait_timeout(st, WAIT_TIMEOUT).unwrap().0;
        }
        drop(st);

        Ok(CachedStream { path, state })
    }

    /// A zero-byte or short-against-`Content-Length` cache file is
    /// discarded rather than trusted.
    fn is_valid_existing(path: &Path, content_length: Option<u64>) -> Result<bool, AppError> {
        if !path.exists() {
            return Ok(false);
        }
        let size = fs::metadata(path)?.len();
        if size == 0 {
            return Ok(false);
        }
        if let Some(expected) = content_length {
            if size < expected {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn produce(
        fetcher: &HttpFetcher,
        url: &str,
        path: &Path,
        state: &SharedState,
    ) -> Result<(), AppError> {
        // Create the file and signal `started` before issuing the network
        // GET, so a blocked `open()` caller can proceed as soon as the file
        // exists, not only once the first bytes land.
        let file = File::create(path)?;
        {
            let (lock, cvar) = &**state;
            let mut st = lock.lock().unwrap();
            st.started = true;
            cvar.notify_all();
        }
        let mut response = fetcher.get(url, &[("accept-encoding", "gzip")])?;
        let mut writer = BufWriter::new(file);
        let mut buf = vec![0u8; BLOCK_SIZE];
        loop {
            let n = response.read(&mut buf)?;
            if n == 0 {
                break;
            }
            writer.write_all(&buf[..n])?;
            writer.flush()?;
            let (lock, cvar) = &**state;
            let mut st = lock.lock().unwrap();
            st.bytes_written += n as u64;
            cvar.notify_all();
        }
        let (lock, cvar) = &**state;
        let mut st = lock.lock().unwrap();
        st.done = true;
        cvar.notify_all();
        Ok(())
    }

    /// Producer's `Content-Length` if known, else current on-disk size.
    pub fn length(&self) -> u64 {
        let (lock, _) = &*self.state;
        let st = lock.lock().unwrap();
        st.content_length.unwrap_or(st.bytes_written)
    }

    /// Opens a fresh sequential reader over the cache file from byte 0.
    pub fn reader(&self) -> Result<CachedStreamReader, AppError> {
        let file = OpenOptions::new().read(true).open(&self.path)?;
        Ok(CachedStreamReader {
            file,
            state: self.state.clone(),
            position: 0,
        })
    }
}

/// A sequential reader over a [`CachedStream`]'s backing file. Reading
/// past the current producer head blocks until more bytes arrive or, if
/// the producer is done, returns EOF. Not seekable.
pub struct CachedStreamReader {
    file: File,
    state: SharedState,
    position: u64,
}

impl CachedStreamReader {
    /// Bytes consumed so far; used only for progress reporting.
    pub fn tell(&self) -> u64 {
        self.position
    }
}

impl Read for CachedStreamReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        loop {
            let (lock, cvar) = &*self.state;
            let st = lock.lock().unwrap();
            if let Some(err) = &st.error {
                return Err(std::io::Error::new(std::io::ErrorKind::Other, err.clone()));
            }
            let available = self.position < st.bytes_written;
            let done = st.done;
            if available || done {
                drop(st);
                let n = self.file.read(buf)?;
                self.position += n as u64;
                return Ok(n);
            }
            let _guard = cvar.wait_timeout(st, WAIT_TIMEOUT).unwrap();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read as _;

    #[test]
    fn cache_path_is_deterministic_and_shared() {
        let dir = Path::new("/tmp/doesnotneedtoexist");
        let a = CachedStream::cache_path(dir, "https://example.com/a");
        let b = CachedStream::cache_path(dir, "https://example.com/a");
        let c = CachedStream::cache_path(dir, "https://example.com/b");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn is_valid_existing_rejects_short_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.cache");
        fs::write(&path, b"1234").unwrap();
        assert!(!CachedStream::is_valid_existing(&path, Some(100)).unwrap());
        assert!(CachedStream::is_valid_existing(&path, Some(4)).unwrap());
        assert!(CachedStream::is_valid_existing(&path, None).unwrap());
    }

    #[test]
    fn is_valid_existing_rejects_zero_byte_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.cache");
        fs::write(&path, b"").unwrap();
        assert!(!CachedStream::is_valid_existing(&path, None).unwrap());
    }

    #[test]
    fn reader_sees_bytes_written_so_far() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.cache");
        fs::write(&path, b"hello world").unwrap();
        let state: SharedState = Arc::new((
            Mutex::new(CacheState {
                bytes_written: 11,
                content_length: Some(11),
                started: true,
                done: true,
                error: None,
            }),
            Condvar::new(),
        ));
        let mut reader = CachedStreamReader {
            file: File::open(&path).unwrap(),
            state,
            position: 0,
        };
        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();
        assert_eq!(out, "hello world");
        assert_eq!(reader.tell(), 11);
    }

    #[test]
    fn open_blocks_until_reader_is_safe_to_open() {
        use crate::http::HttpFetcher;

        let mut server = mockito::Server::new();
        let _head = server
            .mock("HEAD", "/shard.gz")
            .with_status(200)
            .with_header("content-length", "11")
            .create();
        let _get = server
            .mock("GET", "/shard.gz")
            .with_status(200)
            .with_body("hello world")
            .create();

        let fetcher = HttpFetcher::new("test-agent");
        let dir = tempfile::tempdir().unwrap();
        let url = format!("{}/shard.gz", server.url());

        let cached = CachedStream::open(&fetcher, dir.path(), &url, false).unwrap();
        let mut reader = cached.reader().unwrap();
        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();
        assert_eq!(out, "hello world");
    }
}
