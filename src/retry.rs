//! Shared exponential-backoff helper.
//!
//! The distilled spec treats retry/backoff as an external contract; this is
//! its one implementation, reused by [`crate::http::HttpFetcher`] and
//! anything else that calls out over HTTP.

use std::time::{Duration, Instant};

pub const MAX_TRIES: u32 = 25;
pub const MAX_WALL_CLOCK: Duration = Duration::from_secs(60);
const BASE_DELAY: Duration = Duration::from_millis(250);
const MAX_DELAY: Duration = Duration::from_secs(8);

/// An error that `with_backoff` knows how to classify.
pub trait Retryable {
    /// `true` for transport/DNS/timeout/5xx; `false` for a non-retryable
    /// protocol failure like a 4xx.
    fn is_retryable(&self) -> bool;
}

/// Runs `op` until it succeeds, a non-retryable error is returned, or the
/// attempt/wall-clock budget is exhausted.
pub fn with_backoff<T, E, F>(op_name: &str, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Result<T, E>,
    E: Retryable,
{
    let start = Instant::now();
    let mut delay = BASE_DELAY;
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_retryable() => return Err(err),
            Err(err) => {
                if attempt >= MAX_TRIES || start.elapsed() >= MAX_WALL_CLOCK {
                    log::warn!(
                        "{}: giving up after {} attempts ({:?} elapsed)",
                        op_name,
                        attempt,
                        start.elapsed()
                    );
                    return Err(err);
                }
                log::warn!(
                    "{}: attempt {} failed, backing off {:?}",
                    op_name,
                    attempt,
                    delay
                );
                std::thread::sleep(delay);
                delay = std::cmp::min(delay * 2, MAX_DELAY);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Fail(bool);
    impl Retryable for Fail {
        fn is_retryable(&self) -> bool {
            self.0
        }
    }

    #[test]
    fn succeeds_without_retry() {
        let mut calls = 0;
        let result: Result<u32, Fail> = with_backoff("test", || {
            calls += 1;
            Ok(7)
        });
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls, 1);
    }

    #[test]
    fn non_retryable_fails_immediately() {
        let mut calls = 0;
        let result: Result<u32, Fail> = with_backoff("test", || {
            calls += 1;
            Err(Fail(false))
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[test]
    fn retries_then_succeeds() {
        let mut calls = 0;
        let result: Result<u32, Fail> = with_backoff("test", || {
            calls += 1;
            if calls < 3 {
                Err(Fail(true))
            } else {
                Ok(calls)
            }
        });
        assert_eq!(result.unwrap(), 3);
    }
}
