//! Shared HTTP plumbing for provider extractors: rate limiting, timeouts,
//! and failure snapshots. The per-provider scraping grammar lives with each
//! extractor; this crate only gets bytes onto their desk.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use ratings_core::ExtractionError;
use reqwest::Client;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Scraped providers serve browsers, not APIs; a bare reqwest UA gets
/// blocked quickly.
const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const RETRY_WAIT: Duration = Duration::from_secs(15);
const MAX_ATTEMPTS: u32 = 3;

/// Sliding-window rate limiter: at most `max_requests` per `window`.
#[derive(Clone)]
pub struct RateLimiter {
    timestamps: Arc<Mutex<VecDeque<Instant>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            timestamps: Arc::new(Mutex::new(VecDeque::new())),
            max_requests: max_requests.max(1),
            window,
        }
    }

    pub async fn acquire(&self) {
        loop {
            let mut ts = self.timestamps.lock().await;
            let now = Instant::now();

            while let Some(&front) = ts.front() {
                if now.duration_since(front) >= self.window {
                    ts.pop_front();
                } else {
                    break;
                }
            }

            if ts.len() < self.max_requests {
                ts.push_back(now);
                return;
            }

            // Wait for the oldest request to leave the window.
            let oldest = *ts.front().expect("window non-empty");
            drop(ts);
            let wait = (oldest + self.window).saturating_duration_since(now)
                + Duration::from_millis(50);
            tracing::debug!("rate limiter: waiting {:.1}s for a slot", wait.as_secs_f64());
            tokio::time::sleep(wait).await;
        }
    }
}

/// HTTP client for extractor use: browser user agent, request timeout,
/// per-provider rate limit, and automatic 429 backoff. Failed responses come
/// back as [`ExtractionError`]s carrying the body for forensics.
#[derive(Clone)]
pub struct ProviderClient {
    client: Client,
    rate_limiter: RateLimiter,
}

impl ProviderClient {
    pub fn new(max_requests_per_minute: usize) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            rate_limiter: RateLimiter::new(max_requests_per_minute, Duration::from_secs(60)),
        }
    }

    /// The underlying client, for extractors that need custom requests
    /// (headers, cookies, POST bodies). Rate limiting still applies through
    /// [`ProviderClient::send`].
    pub fn http(&self) -> &Client {
        &self.client
    }

    /// Send a request under the rate limit, retrying 429 responses.
    pub async fn send(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, ExtractionError> {
        let request = builder
            .build()
            .map_err(|e| ExtractionError::new(format!("invalid request: {e}")))?;

        for attempt in 0..MAX_ATTEMPTS {
            self.rate_limiter.acquire().await;
            let clone = request
                .try_clone()
                .ok_or_else(|| ExtractionError::new("request body is not cloneable"))?;
            let response = self
                .client
                .execute(clone)
                .await
                .map_err(|e| ExtractionError::new(format!("request failed: {e}")))?;

            if response.status().as_u16() != 429 {
                return Ok(response);
            }

            tracing::warn!(
                "429 from {}, waiting {}s before retry {}/{}",
                request.url(),
                RETRY_WAIT.as_secs(),
                attempt + 1,
                MAX_ATTEMPTS
            );
            tokio::time::sleep(RETRY_WAIT).await;
        }

        Err(ExtractionError::new(format!(
            "still rate limited by {} after {} attempts",
            request.url(),
            MAX_ATTEMPTS
        )))
    }

    /// GET a page and return its body. A non-success status becomes an
    /// extraction error with the body attached as the forensic snapshot.
    pub async fn get_text(&self, url: &str) -> Result<String, ExtractionError> {
        let response = self.send(self.client.get(url)).await?;
        let status = response.status();
        let content_type = response_content_type(&response, "text/html");
        let body = response
            .bytes()
            .await
            .map_err(|e| ExtractionError::new(format!("reading body from {url}: {e}")))?;

        if !status.is_success() {
            return Err(ExtractionError::with_snapshot(
                format!("HTTP {status} from {url}"),
                body.to_vec(),
                content_type,
            ));
        }

        String::from_utf8(body.to_vec()).map_err(|_| {
            ExtractionError::with_snapshot(
                format!("non-utf8 body from {url}"),
                body.to_vec(),
                content_type,
            )
        })
    }

    /// GET a JSON endpoint. Both HTTP errors and unparseable bodies keep the
    /// raw response for forensics.
    pub async fn get_json(&self, url: &str) -> Result<serde_json::Value, ExtractionError> {
        let response = self.send(self.client.get(url)).await?;
        let status = response.status();
        let content_type = response_content_type(&response, "application/json");
        let body = response
            .bytes()
            .await
            .map_err(|e| ExtractionError::new(format!("reading body from {url}: {e}")))?;

        if !status.is_success() {
            return Err(ExtractionError::with_snapshot(
                format!("HTTP {status} from {url}"),
                body.to_vec(),
                content_type,
            ));
        }

        serde_json::from_slice(&body).map_err(|e| {
            ExtractionError::with_snapshot(
                format!("invalid json from {url}: {e}"),
                body.to_vec(),
                content_type,
            )
        })
    }
}

fn response_content_type(response: &reqwest::Response, fallback: &str) -> String {
    response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(fallback)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn limiter_admits_up_to_the_cap_immediately() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        let before = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert_eq!(Instant::now(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn limiter_delays_past_the_cap_until_the_window_rolls() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        let before = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        // Third caller has to wait for the first slot to expire.
        limiter.acquire().await;
        assert!(Instant::now().duration_since(before) >= Duration::from_secs(60));
    }
}
