use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::{ExtractionError, RatingsError};
use crate::patch::StockPatch;
use crate::providers::ProviderId;
use crate::types::Stock;

/// The persistent entity store. Read/write a single row, list what is
/// eligible for a provider, resolve who gets notified about a stock.
#[async_trait]
pub trait StockStore: Send + Sync {
    async fn read(&self, ticker: &str) -> Result<Stock, RatingsError>;

    /// Create a new stock; fails if the ticker already exists.
    async fn insert(&self, stock: Stock) -> Result<(), RatingsError>;

    /// Whole-row replace; fails with NotFound if the ticker is unknown.
    async fn write(&self, stock: &Stock) -> Result<(), RatingsError>;

    /// All stocks carrying a non-empty identifier for the provider, ordered
    /// oldest last-fetch first with never-fetched stocks leading.
    async fn list_eligible(&self, provider: ProviderId) -> Result<Vec<Stock>, RatingsError>;

    /// Recipients subscribed to the stock, directly or through a watchlist
    /// containing it.
    async fn subscribers(&self, ticker: &str) -> Result<Vec<String>, RatingsError>;
}

/// Provider-specific extraction, one network round trip per stock.
#[async_trait]
pub trait IndividualExtractor: Send + Sync {
    async fn fetch_one(&self, stock: &Stock) -> Result<StockPatch, ExtractionError>;
}

/// Provider-specific extraction where one round trip serves the whole stock
/// set. The outer error means the bulk source itself was unreachable; the
/// per-ticker results carry individual extraction outcomes.
#[async_trait]
pub trait BulkExtractor: Send + Sync {
    async fn fetch_many(
        &self,
        stocks: &[Stock],
    ) -> Result<HashMap<String, Result<StockPatch, ExtractionError>>, RatingsError>;
}

/// Outbound messaging sink. Callers treat delivery as fire-and-forget:
/// failures are logged, never propagated.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a change digest to subscribed users.
    async fn send(&self, message: &str, recipients: &[String]) -> Result<(), RatingsError>;

    /// Deliver an operational alert to operators.
    async fn alert(&self, message: &str) -> Result<(), RatingsError>;
}

/// Short-retention blob storage for raw provider responses, kept only for
/// operator inspection after extraction failures.
#[async_trait]
pub trait ForensicsSink: Send + Sync {
    async fn store(
        &self,
        blob: &[u8],
        content_type: &str,
        ttl_seconds: u64,
    ) -> Result<String, RatingsError>;
}
