//! Ranged GET/HEAD over a blocking [`reqwest::blocking::Client`], retried
//! under the shared backoff policy in [`crate::retry`].

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, RANGE};
use reqwest::blocking::{Client, Response};
use std::time::Duration;

use crate::error::AppError;
use crate::retry::{with_backoff, Retryable};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

impl Retryable for AppError {
    fn is_retryable(&self) -> bool {
        match self {
            AppError::Transport { .. } => true,
            AppError::Protocol { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    user_agent: String,
}

impl HttpFetcher {
    pub fn new(user_agent: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .expect("failed to build HTTP client");
        HttpFetcher {
            client,
            user_agent: user_agent.into(),
        }
    }

    fn build_headers(&self, extra: &[(&str, &str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            HeaderValue::from_str(&self.user_agent).unwrap(),
        );
        for (k, v) in extra {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(k.as_bytes()),
                HeaderValue::from_str(v),
            ) {
                headers.insert(name, value);
            }
        }
        headers
    }

    fn check_status(url: &str, response: Response) -> Result<Response, AppError> {
        let status = response.status();
        if status.as_u16() > 299 {
            return Err(AppError::Protocol {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }

    /// GET with caller-supplied headers, retried under the shared backoff.
    pub fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<Response, AppError> {
        with_backoff(&format!("GET {url}"), || {
            let response = self
                .client
                .get(url)
                .headers(self.build_headers(headers))
                .send()
                .map_err(|source| AppError::Transport {
                    url: url.to_string(),
                    source,
                })?;
            Self::check_status(url, response)
        })
    }

    /// HEAD with caller-supplied headers, retried under the shared backoff.
    pub fn head(&self, url: &str, headers: &[(&str, &str)]) -> Result<Response, AppError> {
        with_backoff(&format!("HEAD {url}"), || {
            let response = self
                .client
                .head(url)
                .headers(self.build_headers(headers))
                .send()
                .map_err(|source| AppError::Transport {
                    url: url.to_string(),
                    source,
                })?;
            Self::check_status(url, response)
        })
    }

    /// `Range: bytes=first-last`. The result may be shorter than requested
    /// if the server ignored the range; callers must handle both.
    pub fn get_range(&self, url: &str, first: u64, last: u64) -> Result<Vec<u8>, AppError> {
        let range_value = format!("bytes={first}-{last}");
        with_backoff(&format!("GET (range) {url}"), || {
            let response = self
                .client
                .get(url)
                .header(RANGE, range_value.as_str())
                .header(reqwest::header::USER_AGENT, self.user_agent.as_str())
                .send()
                .map_err(|source| AppError::Transport {
                    url: url.to_string(),
                    source,
                })?;
            let response = Self::check_status(url, response)?;
            response.bytes().map(|b| b.to_vec()).map_err(|source| {
                AppError::Transport {
                    url: url.to_string(),
                    source,
                }
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_classification_matches_status() {
        let server_err = AppError::Protocol {
            url: "https://example.com".to_string(),
            status: 503,
        };
        let client_err = AppError::Protocol {
            url: "https://example.com".to_string(),
            status: 404,
        };
        assert!(server_err.is_retryable());
        assert!(!client_err.is_retryable());
    }

    #[test]
    fn get_returns_body_on_200() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("GET", "/hello")
            .with_status(200)
            .with_body("hi there")
            .create();
        let fetcher = HttpFetcher::new("test-agent");
        let url = format!("{}/hello", server.url());
        let response = fetcher.get(&url, &[]).unwrap();
        assert_eq!(response.text().unwrap(), "hi there");
    }

    #[test]
    fn get_maps_4xx_to_non_retryable_protocol_error() {
        let mut server = mockito::Server::new();
        let _mock = server.mock("GET", "/missing").with_status(404).create();
        let fetcher = HttpFetcher::new("test-agent");
        let url = format!("{}/missing", server.url());
        let err = fetcher.get(&url, &[]).unwrap_err();
        assert!(!err.is_retryable());
    }

    #[test]
    fn get_range_sends_range_header() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("GET", "/shard.gz")
            .match_header("range", "bytes=0-1999")
            .with_status(206)
            .with_body(vec![1, 2, 3, 4])
            .create();
        let fetcher = HttpFetcher::new("test-agent");
        let url = format!("{}/shard.gz", server.url());
        let bytes = fetcher.get_range(&url, 0, 1999).unwrap();
        assert_eq!(bytes, vec![1, 2, 3, 4]);
    }
}
