use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::RatingsError;
use crate::providers::ProviderId;
use crate::traits::StockStore;
use crate::types::Stock;

#[derive(Debug, Clone)]
struct Watchlist {
    tickers: BTreeSet<String>,
    subscribers: BTreeSet<String>,
}

/// In-memory [`StockStore`] for tests and local tooling. A single mutex
/// guards the map; none of the methods await while holding it.
#[derive(Default)]
pub struct MemoryStockStore {
    stocks: Mutex<HashMap<String, Stock>>,
    direct_subscribers: Mutex<HashMap<String, BTreeSet<String>>>,
    watchlists: Mutex<Vec<Watchlist>>,
}

impl MemoryStockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a recipient to one stock.
    pub fn subscribe(&self, ticker: &str, recipient: &str) {
        self.direct_subscribers
            .lock()
            .expect("subscriber map poisoned")
            .entry(ticker.to_string())
            .or_default()
            .insert(recipient.to_string());
    }

    /// Register a watchlist; its subscribers receive digests for every
    /// ticker it contains.
    pub fn add_watchlist(&self, tickers: &[&str], subscribers: &[&str]) {
        self.watchlists
            .lock()
            .expect("watchlist poisoned")
            .push(Watchlist {
                tickers: tickers.iter().map(|t| t.to_string()).collect(),
                subscribers: subscribers.iter().map(|s| s.to_string()).collect(),
            });
    }

    pub fn len(&self) -> usize {
        self.stocks.lock().expect("stock map poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl StockStore for MemoryStockStore {
    async fn read(&self, ticker: &str) -> Result<Stock, RatingsError> {
        self.stocks
            .lock()
            .expect("stock map poisoned")
            .get(ticker)
            .cloned()
            .ok_or_else(|| RatingsError::NotFound(format!("stock {ticker}")))
    }

    async fn insert(&self, stock: Stock) -> Result<(), RatingsError> {
        let mut stocks = self.stocks.lock().expect("stock map poisoned");
        if stocks.contains_key(&stock.ticker) {
            return Err(RatingsError::InvalidRequest(format!(
                "stock {} already exists",
                stock.ticker
            )));
        }
        stocks.insert(stock.ticker.clone(), stock);
        Ok(())
    }

    async fn write(&self, stock: &Stock) -> Result<(), RatingsError> {
        let mut stocks = self.stocks.lock().expect("stock map poisoned");
        match stocks.get_mut(&stock.ticker) {
            Some(slot) => {
                *slot = stock.clone();
                Ok(())
            }
            None => Err(RatingsError::NotFound(format!("stock {}", stock.ticker))),
        }
    }

    async fn list_eligible(&self, provider: ProviderId) -> Result<Vec<Stock>, RatingsError> {
        let stocks = self.stocks.lock().expect("stock map poisoned");
        let mut eligible: Vec<Stock> = stocks
            .values()
            .filter(|s| s.identifier(provider).is_some())
            .cloned()
            .collect();
        // Never-fetched first (None sorts before Some), then oldest first.
        eligible.sort_by_key(|s| s.last_fetch(provider));
        Ok(eligible)
    }

    async fn subscribers(&self, ticker: &str) -> Result<Vec<String>, RatingsError> {
        let mut recipients: BTreeSet<String> = self
            .direct_subscribers
            .lock()
            .expect("subscriber map poisoned")
            .get(ticker)
            .cloned()
            .unwrap_or_default();
        for watchlist in self.watchlists.lock().expect("watchlist poisoned").iter() {
            if watchlist.tickers.contains(ticker) {
                recipients.extend(watchlist.subscribers.iter().cloned());
            }
        }
        Ok(recipients.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[tokio::test]
    async fn eligible_listing_orders_never_fetched_first_then_oldest() {
        let store = MemoryStockStore::new();
        let now = Utc::now();

        let mut fresh = Stock::new("AAA", "Fresh Corp");
        fresh.msci_id = Some("fresh".into());
        fresh.msci_last_fetch = Some(now);

        let mut stale = Stock::new("BBB", "Stale Corp");
        stale.msci_id = Some("stale".into());
        stale.msci_last_fetch = Some(now - Duration::days(30));

        let mut never = Stock::new("CCC", "Never Corp");
        never.msci_id = Some("never".into());

        let mut unrelated = Stock::new("DDD", "No Id Corp");
        unrelated.yahoo_id = Some("ddd".into());

        for stock in [fresh, stale, never, unrelated] {
            store.insert(stock).await.unwrap();
        }

        let order: Vec<String> = store
            .list_eligible(ProviderId::Msci)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.ticker)
            .collect();
        assert_eq!(order, vec!["CCC", "BBB", "AAA"]);
    }

    #[tokio::test]
    async fn subscribers_merge_direct_and_watchlist() {
        let store = MemoryStockStore::new();
        store.subscribe("AAPL", "alice");
        store.add_watchlist(&["AAPL", "MSFT"], &["bob", "alice"]);

        let mut recipients = store.subscribers("AAPL").await.unwrap();
        recipients.sort();
        assert_eq!(recipients, vec!["alice", "bob"]);

        assert_eq!(store.subscribers("MSFT").await.unwrap(), vec!["bob"]);
        assert!(store.subscribers("TSLA").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn write_requires_existing_row() {
        let store = MemoryStockStore::new();
        let stock = Stock::new("AAPL", "Apple Inc.");
        assert!(matches!(
            store.write(&stock).await,
            Err(RatingsError::NotFound(_))
        ));
    }
}
