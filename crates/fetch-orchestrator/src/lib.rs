//! Coordinates fetch jobs across data providers: picks the eligible stocks,
//! runs extractors under a bounded worker pool, trips a circuit breaker when
//! a provider looks globally broken, and feeds every result through the
//! update engine.

mod config;
mod workspace;

pub use config::OrchestratorConfig;
pub use workspace::{FetchWorkspace, JobOutcome};

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::task::JoinSet;

use ratings_core::{
    BulkExtractor, ExtractionError, FetchOptions, ForensicsSink, IndividualExtractor,
    Notifier, ProviderDescriptor, ProviderId, RatingsError, Stock, StockPatch, StockStore,
};
use update_engine::{UpdateEngine, UpdateOptions};

enum ExtractorKind {
    Individual(Arc<dyn IndividualExtractor>),
    Bulk(Arc<dyn BulkExtractor>),
}

pub struct FetchOrchestrator {
    store: Arc<dyn StockStore>,
    update_engine: Arc<UpdateEngine>,
    notifier: Arc<dyn Notifier>,
    forensics: Arc<dyn ForensicsSink>,
    extractors: HashMap<ProviderId, ExtractorKind>,
    config: OrchestratorConfig,
}

impl FetchOrchestrator {
    pub fn new(
        store: Arc<dyn StockStore>,
        update_engine: Arc<UpdateEngine>,
        notifier: Arc<dyn Notifier>,
        forensics: Arc<dyn ForensicsSink>,
    ) -> Self {
        Self {
            store,
            update_engine,
            notifier,
            forensics,
            extractors: HashMap::new(),
            config: OrchestratorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Register the extractor for an individual-cardinality provider.
    pub fn register_individual(
        &mut self,
        provider: ProviderId,
        extractor: Arc<dyn IndividualExtractor>,
    ) -> Result<(), RatingsError> {
        if provider.descriptor().cardinality != ratings_core::FetchCardinality::Individual {
            return Err(RatingsError::InvalidRequest(format!(
                "{provider} serves bulk fetches, not individual ones"
            )));
        }
        self.extractors
            .insert(provider, ExtractorKind::Individual(extractor));
        Ok(())
    }

    /// Register the extractor for a bulk-cardinality provider.
    pub fn register_bulk(
        &mut self,
        provider: ProviderId,
        extractor: Arc<dyn BulkExtractor>,
    ) -> Result<(), RatingsError> {
        if provider.descriptor().cardinality != ratings_core::FetchCardinality::Bulk {
            return Err(RatingsError::InvalidRequest(format!(
                "{provider} serves individual fetches, not bulk ones"
            )));
        }
        self.extractors
            .insert(provider, ExtractorKind::Bulk(extractor));
        Ok(())
    }

    /// Run one fetch job against a provider. Returns the stocks that were
    /// refreshed. Per-stock failures are tolerated and recorded; the job
    /// itself fails only when a single-stock fetch fails, the breaker trips,
    /// or a bulk source is unreachable.
    pub async fn fetch_from_provider(
        &self,
        provider: ProviderId,
        options: FetchOptions,
    ) -> Result<Vec<Stock>, RatingsError> {
        let descriptor = provider.descriptor();
        let extractor = self.extractors.get(&provider).ok_or_else(|| {
            RatingsError::InvalidRequest(format!("no extractor registered for {provider}"))
        })?;

        let now = Utc::now();

        let candidates = match &options.ticker {
            Some(ticker) => {
                let stock = self.store.read(ticker).await?;
                if stock.identifier(provider).is_none() {
                    return Err(RatingsError::NotFound(format!(
                        "stock {ticker} carries no {provider} identifier"
                    )));
                }
                vec![stock]
            }
            None => self.store.list_eligible(provider).await?,
        };
        let candidate_count = candidates.len();

        let mut queued = Vec::new();
        let mut fresh = Vec::new();
        for stock in candidates {
            if !options.no_skip
                && fetched_within_ttl(&stock, provider, descriptor.ttl_seconds, now)
            {
                fresh.push(stock);
            } else {
                queued.push(stock);
            }
        }

        let workspace = Arc::new(FetchWorkspace::new(queued));
        let within_ttl = fresh.len();
        for stock in fresh {
            workspace.record_skipped(stock);
        }

        tracing::info!(
            "{} fetch: {} candidates, {} within ttl",
            provider,
            candidate_count,
            within_ttl
        );

        let ctx = Arc::new(JobContext {
            provider,
            descriptor,
            update_engine: self.update_engine.clone(),
            notifier: self.notifier.clone(),
            forensics: self.forensics.clone(),
            workspace: workspace.clone(),
            clear: options.clear,
            failure_limit: self.config.failure_limit,
            forensics_ttl_seconds: self.config.forensics_ttl_seconds,
            started_at: now,
        });

        if options.ticker.is_some() {
            self.fetch_single(&ctx, extractor).await?;
        } else {
            match extractor {
                ExtractorKind::Individual(individual) => {
                    let concurrency = options
                        .concurrency
                        .or(self.config.concurrency_override)
                        .unwrap_or(descriptor.default_concurrency)
                        .max(1);
                    run_worker_pool(&ctx, individual.clone(), concurrency).await;
                }
                ExtractorKind::Bulk(bulk) => {
                    self.fetch_bulk(&ctx, bulk.as_ref()).await?;
                }
            }
        }

        let outcome = workspace.finish();
        tracing::info!(
            "{} fetch complete: {} successful, {} failed, {} skipped",
            provider,
            outcome.successful.len(),
            outcome.failed.len(),
            outcome.skipped.len()
        );
        if outcome.tripped {
            return Err(RatingsError::Aborted {
                failures: outcome.failed.len(),
                requeued: outcome.requeued,
            });
        }
        Ok(outcome.successful)
    }

    /// Single-stock jobs fail fast: the first error goes straight back to
    /// the caller instead of the failure partition.
    async fn fetch_single(
        &self,
        ctx: &JobContext,
        extractor: &ExtractorKind,
    ) -> Result<(), RatingsError> {
        let Some(stock) = ctx.workspace.pop_queued() else {
            tracing::info!("{} single fetch: stock within ttl, nothing to do", ctx.provider);
            return Ok(());
        };

        let outcome = match extractor {
            ExtractorKind::Individual(individual) => individual.fetch_one(&stock).await,
            ExtractorKind::Bulk(bulk) => {
                let mut results = bulk.fetch_many(std::slice::from_ref(&stock)).await?;
                results.remove(&stock.ticker).unwrap_or_else(|| {
                    Err(ExtractionError::new("ticker absent from bulk payload"))
                })
            }
        };

        match outcome {
            Ok(patch) => {
                let updated = ctx.apply_success(&stock, patch).await?;
                ctx.workspace.record_success(updated);
                Ok(())
            }
            Err(error) => {
                ctx.handle_extraction_failure(&stock, &error).await;
                ctx.workspace.record_failure(stock.clone());
                Err(RatingsError::extraction(&stock.ticker, error))
            }
        }
    }

    async fn fetch_bulk(
        &self,
        ctx: &JobContext,
        bulk: &dyn BulkExtractor,
    ) -> Result<(), RatingsError> {
        let batch = ctx.workspace.queued_snapshot();
        if batch.is_empty() {
            return Ok(());
        }
        let mut results = match bulk.fetch_many(&batch).await {
            Ok(results) => results,
            Err(e) => {
                let abandoned = ctx.workspace.abandon_queue();
                tracing::error!(
                    "{} bulk fetch failed, {} stocks kept for the next run: {}",
                    ctx.provider,
                    abandoned,
                    e
                );
                return Err(RatingsError::UpstreamUnavailable(format!(
                    "{}: {e}",
                    ctx.provider
                )));
            }
        };

        // Results are applied per stock in queue order; the breaker still
        // applies to per-item extraction failures inside the payload.
        while let Some(stock) = ctx.workspace.pop_queued() {
            let outcome = results.remove(&stock.ticker).unwrap_or_else(|| {
                Err(ExtractionError::new("ticker absent from bulk payload"))
            });
            ctx.process(stock, outcome).await;
        }
        Ok(())
    }
}

/// Shared per-job state handed to every worker.
struct JobContext {
    provider: ProviderId,
    descriptor: &'static ProviderDescriptor,
    update_engine: Arc<UpdateEngine>,
    notifier: Arc<dyn Notifier>,
    forensics: Arc<dyn ForensicsSink>,
    workspace: Arc<FetchWorkspace>,
    clear: bool,
    failure_limit: usize,
    forensics_ttl_seconds: u64,
    started_at: DateTime<Utc>,
}

impl JobContext {
    /// Merge an extraction result into the store: optional wipe of the
    /// provider's old values, then the fetched values, then the fetch stamp.
    async fn apply_success(
        &self,
        stock: &Stock,
        mut patch: StockPatch,
    ) -> Result<Stock, RatingsError> {
        if self.clear {
            for field in self.descriptor.owned_fields {
                patch.clear_unless_set(*field);
            }
        }
        patch.set_last_fetch(self.provider, self.started_at);
        self.update_engine
            .update(&stock.ticker, patch, UpdateOptions::default())
            .await
    }

    async fn process(&self, stock: Stock, outcome: Result<StockPatch, ExtractionError>) {
        match outcome {
            Ok(patch) => match self.apply_success(&stock, patch).await {
                Ok(updated) => {
                    tracing::debug!("{} refreshed {}", self.provider, updated.ticker);
                    self.workspace.record_success(updated);
                }
                Err(e) => {
                    tracing::warn!(
                        "{} update for {} failed: {}",
                        self.provider,
                        stock.ticker,
                        e
                    );
                    self.record_failure(stock);
                }
            },
            Err(error) => {
                self.handle_extraction_failure(&stock, &error).await;
                self.record_failure(stock);
            }
        }
    }

    async fn handle_extraction_failure(&self, stock: &Stock, error: &ExtractionError) {
        if let Some(snapshot) = &error.raw_snapshot {
            let content_type = error
                .content_type
                .as_deref()
                .unwrap_or("application/octet-stream");
            match self
                .forensics
                .store(snapshot, content_type, self.forensics_ttl_seconds)
                .await
            {
                Ok(resource) => tracing::debug!(
                    "stored failed {} response for {} as {}",
                    self.provider,
                    stock.ticker,
                    resource
                ),
                Err(e) => tracing::warn!(
                    "could not store forensic snapshot for {}: {}",
                    stock.ticker,
                    e
                ),
            }
        }

        // A stock that previously had values from this provider just lost
        // its refresh; that regression alerts. A stock that never had them
        // stays quiet.
        if stock.has_any_owned_value(self.provider) {
            tracing::error!(
                "{} extraction failed for {}: {}",
                self.provider,
                stock.ticker,
                error.message
            );
            let message = format!(
                "{} no longer yields data for {} ({}): {}",
                self.provider, stock.ticker, stock.name, error.message
            );
            if let Err(e) = self.notifier.alert(&message).await {
                tracing::warn!("operator alert for {} failed: {}", stock.ticker, e);
            }
        } else {
            tracing::info!(
                "{} extraction failed for {} (no prior values): {}",
                self.provider,
                stock.ticker,
                error.message
            );
        }
    }

    fn record_failure(&self, stock: Stock) {
        let failures = self.workspace.record_failure(stock);
        if failures == self.failure_limit {
            let requeued = self.workspace.trip();
            tracing::warn!(
                "{} circuit breaker tripped after {} failures; {} stocks kept for the next run",
                self.provider,
                failures,
                requeued
            );
        }
    }
}

async fn run_worker_pool(
    ctx: &Arc<JobContext>,
    extractor: Arc<dyn IndividualExtractor>,
    concurrency: usize,
) {
    let mut workers = JoinSet::new();
    for _ in 0..concurrency {
        let ctx = ctx.clone();
        let extractor = extractor.clone();
        workers.spawn(async move {
            // Popping and the trip check happen atomically inside the
            // workspace; a tripped breaker starves the loop.
            while let Some(stock) = ctx.workspace.pop_queued() {
                let outcome = extractor.fetch_one(&stock).await;
                ctx.process(stock, outcome).await;
            }
        });
    }
    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined {
            tracing::error!("{} fetch worker crashed: {}", ctx.provider, e);
        }
    }
}

fn fetched_within_ttl(
    stock: &Stock,
    provider: ProviderId,
    ttl_seconds: i64,
    now: DateTime<Utc>,
) -> bool {
    stock
        .last_fetch(provider)
        .is_some_and(|at| now - at < Duration::seconds(ttl_seconds))
}
