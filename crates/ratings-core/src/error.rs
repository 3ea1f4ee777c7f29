use thiserror::Error;

/// Failure of a single provider extraction. Carries the raw response body
/// (when one was received) so operators can inspect what the provider
/// actually served.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ExtractionError {
    pub message: String,
    pub raw_snapshot: Option<Vec<u8>>,
    pub content_type: Option<String>,
}

impl ExtractionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            raw_snapshot: None,
            content_type: None,
        }
    }

    pub fn with_snapshot(
        message: impl Into<String>,
        snapshot: Vec<u8>,
        content_type: impl Into<String>,
    ) -> Self {
        Self {
            message: message.into(),
            raw_snapshot: Some(snapshot),
            content_type: Some(content_type.into()),
        }
    }
}

#[derive(Debug, Error)]
pub enum RatingsError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("extraction failed for {ticker}: {source}")]
    Extraction {
        ticker: String,
        #[source]
        source: ExtractionError,
    },

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("fetch aborted after {failures} failures, {requeued} stocks requeued")]
    Aborted { failures: usize, requeued: usize },

    #[error("store error: {0}")]
    Store(String),

    #[error("notification error: {0}")]
    Notification(String),
}

impl RatingsError {
    pub fn extraction(ticker: impl Into<String>, source: ExtractionError) -> Self {
        Self::Extraction {
            ticker: ticker.into(),
            source,
        }
    }
}
