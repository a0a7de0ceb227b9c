//! Blocking HTTP transport with retry, exponential backoff and an optional
//! circuit breaker.
//!
//! Every network call in the pipeline goes through `send_with_retry`; a
//! timeout is just another failed attempt.

use super::circuit_breaker::CircuitBreaker;
use super::provider::{DataError, PageFetcher};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE};
use reqwest::StatusCode;
use std::time::Duration;

pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/124.0 Safari/537.36";

/// Transport settings shared by the quote provider and the page fetcher.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub timeout: Duration,
    pub user_agent: String,
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: BROWSER_USER_AGENT.to_string(),
            max_retries: 2,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl HttpSettings {
    pub fn build_client(&self) -> Result<Client, DataError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9,ja;q=0.8"));
        Client::builder()
            .timeout(self.timeout)
            .user_agent(self.user_agent.clone())
            .default_headers(headers)
            .cookie_store(true)
            .build()
            .map_err(|e| DataError::Other(format!("failed to build HTTP client: {e}")))
    }
}

/// GET `url`, retrying connection failures, timeouts, 429s and 5xx with
/// exponential backoff. A 403 opens the breaker immediately.
pub fn send_with_retry(
    client: &Client,
    url: &str,
    settings: &HttpSettings,
    breaker: Option<&CircuitBreaker>,
) -> Result<Vec<u8>, DataError> {
    let allowed = || breaker.map_or(true, |b| b.is_allowed());
    let mut last_error = None;

    for attempt in 0..=settings.max_retries {
        if attempt > 0 {
            std::thread::sleep(settings.base_delay * 2u32.pow(attempt - 1));
        }
        if !allowed() {
            return Err(DataError::CircuitBreakerTripped);
        }

        let resp = match client.get(url).send() {
            Ok(resp) => resp,
            Err(e) if e.is_connect() || e.is_timeout() => {
                if let Some(b) = breaker {
                    b.record_failure();
                }
                last_error = Some(DataError::NetworkUnreachable(e.to_string()));
                continue;
            }
            Err(e) => return Err(DataError::NetworkUnreachable(e.to_string())),
        };

        let status = resp.status();
        if status == StatusCode::FORBIDDEN {
            if let Some(b) = breaker {
                b.open();
            }
            return Err(DataError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        if status == StatusCode::UNAUTHORIZED {
            return Err(DataError::AuthenticationRequired(url.to_string()));
        }
        if status == StatusCode::NOT_FOUND {
            return Err(DataError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            if let Some(b) = breaker {
                b.record_failure();
            }
            let retry_after_secs = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(60);
            last_error = Some(DataError::RateLimited { retry_after_secs });
            continue;
        }
        if !status.is_success() {
            if let Some(b) = breaker {
                b.record_failure();
            }
            last_error = Some(DataError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
            continue;
        }

        let body = resp
            .bytes()
            .map_err(|e| DataError::NetworkUnreachable(format!("reading body of {url}: {e}")))?;
        if let Some(b) = breaker {
            b.record_success();
        }
        return Ok(body.to_vec());
    }

    Err(last_error.unwrap_or_else(|| DataError::Other("max retries exceeded".into())))
}

/// `PageFetcher` over blocking reqwest.
pub struct HttpPageFetcher {
    client: Client,
    settings: HttpSettings,
}

impl HttpPageFetcher {
    pub fn new(settings: HttpSettings) -> Result<Self, DataError> {
        Ok(Self {
            client: settings.build_client()?,
            settings,
        })
    }
}

impl PageFetcher for HttpPageFetcher {
    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, DataError> {
        tracing::debug!(url, "fetching page");
        send_with_retry(&self.client, url, &self.settings, None)
    }
}
