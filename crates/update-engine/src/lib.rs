//! Applies proposed attribute changes to stored stocks: computes the real
//! delta, recomputes derived scores, persists, and forwards a change digest
//! to subscribers.

mod digest;

pub use digest::build_digest;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use ratings_core::{Notifier, ProviderId, RatingsError, Stock, StockPatch, StockStore};

/// Per-call update behavior.
#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateOptions {
    /// Persist and rescore even when nothing changed.
    pub force: bool,
    /// Suppress the subscriber digest.
    pub silent: bool,
}

pub struct UpdateEngine {
    store: Arc<dyn StockStore>,
    notifier: Arc<dyn Notifier>,
    /// One lock per ticker: the read-diff-write below must be atomic with
    /// respect to concurrent updates of the same stock, while updates to
    /// different stocks proceed independently.
    row_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl UpdateEngine {
    pub fn new(store: Arc<dyn StockStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store,
            notifier,
            row_locks: DashMap::new(),
        }
    }

    fn row_lock(&self, ticker: &str) -> Arc<Mutex<()>> {
        self.row_locks
            .entry(ticker.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Apply `patch` to the stock. Returns the post-update stock (unchanged
    /// when the patch was a no-op and `force` was not set).
    pub async fn update(
        &self,
        ticker: &str,
        mut patch: StockPatch,
        options: UpdateOptions,
    ) -> Result<Stock, RatingsError> {
        patch.validate()?;

        let lock = self.row_lock(ticker);
        let guard = lock.lock().await;

        let current = self.store.read(ticker).await?;

        // Removing a provider identifier orphans every metric it owned;
        // cascade-clear them so stale values never linger.
        for provider in ProviderId::ALL {
            if patch.removes_identifier(provider) {
                for field in provider.descriptor().owned_fields {
                    patch.clear_unless_set(*field);
                }
            }
        }

        let changed = patch.changed_fields(&current);
        let is_new_data = !changed.is_empty();

        let mut updated = current.clone();
        let mut change_digest = String::new();

        if is_new_data || options.force {
            patch.apply_to(&mut updated);
            scoring_engine::recompute(&mut updated);
            change_digest = digest::build_digest(&current, &updated, &changed);
            self.store.write(&updated).await?;
            tracing::debug!(
                "updated {}: {} field(s) changed, total score {:.3}",
                ticker,
                changed.len(),
                updated.total_score
            );
        }

        drop(guard);

        if !options.silent && !change_digest.is_empty() {
            self.deliver_digest(ticker, &change_digest).await;
        }

        Ok(updated)
    }

    /// Digest delivery is fire-and-forget: a sink failure is an operational
    /// nuisance, not a reason to fail the update that already persisted.
    async fn deliver_digest(&self, ticker: &str, change_digest: &str) {
        let recipients = match self.store.subscribers(ticker).await {
            Ok(recipients) => recipients,
            Err(e) => {
                tracing::warn!("could not resolve subscribers for {}: {}", ticker, e);
                return;
            }
        };
        if recipients.is_empty() {
            return;
        }
        let message = format!("{ticker}:\n{change_digest}");
        if let Err(e) = self.notifier.send(&message, &recipients).await {
            tracing::warn!("digest delivery for {} failed: {}", ticker, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ratings_core::{
        AttributeField, MemoryStockStore, MsciEsgRating, Patch, RatingsError,
    };
    use serde_json::json;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct RecordingNotifier {
        sent: StdMutex<Vec<(String, Vec<String>)>>,
        alerts: StdMutex<Vec<String>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(
            &self,
            message: &str,
            recipients: &[String],
        ) -> Result<(), RatingsError> {
            self.sent
                .lock()
                .unwrap()
                .push((message.to_string(), recipients.to_vec()));
            Ok(())
        }

        async fn alert(&self, message: &str) -> Result<(), RatingsError> {
            self.alerts.lock().unwrap().push(message.to_string());
            Ok(())
        }
    }

    async fn engine_with(
        stock: Stock,
    ) -> (UpdateEngine, Arc<MemoryStockStore>, Arc<RecordingNotifier>) {
        let store = Arc::new(MemoryStockStore::new());
        store.insert(stock).await.unwrap();
        let notifier = Arc::new(RecordingNotifier::default());
        let engine = UpdateEngine::new(store.clone(), notifier.clone());
        (engine, store, notifier)
    }

    #[tokio::test]
    async fn empty_patch_changes_nothing_and_stays_silent() {
        let mut stock = Stock::new("AAPL", "Apple Inc.");
        stock.star_rating = Some(4);
        scoring_engine::recompute(&mut stock);
        let before = stock.clone();

        let (engine, store, notifier) = engine_with(stock).await;
        store.subscribe("AAPL", "alice");

        engine
            .update("AAPL", StockPatch::default(), UpdateOptions::default())
            .await
            .unwrap();

        assert_eq!(store.read("AAPL").await.unwrap(), before);
        assert!(notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn restated_values_do_not_notify() {
        let mut stock = Stock::new("AAPL", "Apple Inc.");
        stock.star_rating = Some(4);
        stock.prices_1mo = Some(vec![1.0, 2.0]);
        scoring_engine::recompute(&mut stock);

        let (engine, _store, notifier) = engine_with(stock).await;

        let patch = StockPatch {
            star_rating: Patch::Set(4),
            prices_1mo: Patch::Set(vec![1.0, 2.0]),
            ..Default::default()
        };
        engine
            .update("AAPL", patch, UpdateOptions::default())
            .await
            .unwrap();

        assert!(notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn new_data_is_persisted_rescored_and_announced() {
        let mut stock = Stock::new("AAPL", "Apple Inc.");
        stock.star_rating = Some(3);
        scoring_engine::recompute(&mut stock);

        let (engine, store, notifier) = engine_with(stock).await;
        store.subscribe("AAPL", "alice");
        store.add_watchlist(&["AAPL"], &["bob"]);

        let patch = StockPatch {
            star_rating: Patch::Set(5),
            ..Default::default()
        };
        let updated = engine
            .update("AAPL", patch, UpdateOptions::default())
            .await
            .unwrap();

        assert_eq!(updated.star_rating, Some(5));
        assert_eq!(updated.financial_score, 1.0 / 3.0);
        assert_eq!(store.read("AAPL").await.unwrap(), updated);

        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        let (message, recipients) = &sent[0];
        assert!(message.contains("Star rating changed from 3 to 5 (better)"));
        assert_eq!(recipients.len(), 2);
    }

    #[tokio::test]
    async fn silent_updates_skip_delivery() {
        let mut stock = Stock::new("AAPL", "Apple Inc.");
        scoring_engine::recompute(&mut stock);
        let (engine, store, notifier) = engine_with(stock).await;
        store.subscribe("AAPL", "alice");

        let patch = StockPatch {
            star_rating: Patch::Set(5),
            ..Default::default()
        };
        engine
            .update(
                "AAPL",
                patch,
                UpdateOptions {
                    silent: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(notifier.sent.lock().unwrap().is_empty());
        assert_eq!(store.read("AAPL").await.unwrap().star_rating, Some(5));
    }

    #[tokio::test]
    async fn force_rescores_without_notifying() {
        let mut stock = Stock::new("AAPL", "Apple Inc.");
        stock.star_rating = Some(4);
        // Deliberately stale derived score.
        stock.financial_score = 0.9;

        let (engine, store, notifier) = engine_with(stock).await;
        store.subscribe("AAPL", "alice");

        engine
            .update(
                "AAPL",
                StockPatch::default(),
                UpdateOptions {
                    force: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let stored = store.read("AAPL").await.unwrap();
        assert_eq!(stored.financial_score, 0.5 / 3.0);
        assert!(notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn removing_an_identifier_cascades_to_owned_fields() {
        let mut stock = Stock::new("AAPL", "Apple Inc.");
        stock.msci_id = Some("apple-inc".into());
        stock.msci_esg_rating = Some(MsciEsgRating::Aa);
        stock.msci_temperature = Some(1.6);
        stock.sp_esg_score = Some(60);
        scoring_engine::recompute(&mut stock);

        let (engine, store, _notifier) = engine_with(stock).await;

        let patch = StockPatch::from_json(json!({ "msci_id": null })).unwrap();
        engine
            .update("AAPL", patch, UpdateOptions::default())
            .await
            .unwrap();

        let stored = store.read("AAPL").await.unwrap();
        assert_eq!(stored.msci_id, None);
        assert_eq!(stored.msci_esg_rating, None);
        assert_eq!(stored.msci_temperature, None);
        // Other providers' fields are untouched.
        assert_eq!(stored.sp_esg_score, Some(60));
    }

    #[tokio::test]
    async fn unknown_stock_and_invalid_patch_fail_fast() {
        let (engine, _store, _notifier) = engine_with(Stock::new("AAPL", "Apple")).await;

        let missing = engine
            .update("MSFT", StockPatch::default(), UpdateOptions::default())
            .await;
        assert!(matches!(missing, Err(RatingsError::NotFound(_))));

        let invalid = engine
            .update(
                "AAPL",
                StockPatch {
                    star_rating: Patch::Set(9),
                    ..Default::default()
                },
                UpdateOptions::default(),
            )
            .await;
        assert!(matches!(invalid, Err(RatingsError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn concurrent_updates_of_one_stock_lose_no_writes() {
        let mut stock = Stock::new("AAPL", "Apple Inc.");
        scoring_engine::recompute(&mut stock);
        let (engine, store, _notifier) = engine_with(stock).await;
        let engine = Arc::new(engine);

        // Two providers writing disjoint fields of the same stock at the
        // same time; the row lock must serialize the read-modify-write.
        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..20 {
            let left = engine.clone();
            tasks.spawn(async move {
                let patch = StockPatch {
                    star_rating: Patch::Set(5),
                    ..Default::default()
                };
                left.update("AAPL", patch, UpdateOptions::default())
                    .await
                    .unwrap();
            });
            let right = engine.clone();
            tasks.spawn(async move {
                let patch = StockPatch {
                    sp_esg_score: Patch::Set(80),
                    ..Default::default()
                };
                right
                    .update("AAPL", patch, UpdateOptions::default())
                    .await
                    .unwrap();
            });
        }
        while tasks.join_next().await.is_some() {}

        let stored = store.read("AAPL").await.unwrap();
        assert_eq!(stored.star_rating, Some(5));
        assert_eq!(stored.sp_esg_score, Some(80));
    }

    #[test]
    fn changed_fields_feed_the_digest_subset_only() {
        let mut old = Stock::new("AAPL", "Apple Inc.");
        old.star_rating = Some(2);
        let mut new = old.clone();
        new.star_rating = Some(4);
        new.yahoo_last_fetch = Some(chrono::Utc::now());

        let digest = build_digest(
            &old,
            &new,
            &[AttributeField::StarRating, AttributeField::YahooLastFetch],
        );
        assert_eq!(digest.lines().count(), 1);
    }
}
