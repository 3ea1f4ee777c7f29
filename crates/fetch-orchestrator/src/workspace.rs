//! Per-job bookkeeping: which stocks are waiting, done, skipped, or failed.

use std::collections::VecDeque;
use std::sync::Mutex;

use ratings_core::Stock;

#[derive(Debug, Default)]
struct Partitions {
    queued: VecDeque<Stock>,
    skipped: Vec<Stock>,
    successful: Vec<Stock>,
    failed: Vec<Stock>,
    tripped: bool,
    requeued_at_trip: usize,
}

/// Final partition state of a finished job. `queued` is always empty by
/// then: every stock was processed, skipped, or requeued by the breaker.
#[derive(Debug)]
pub struct JobOutcome {
    pub skipped: Vec<Stock>,
    pub successful: Vec<Stock>,
    pub failed: Vec<Stock>,
    pub tripped: bool,
    /// Stocks moved from queued to skipped when the breaker tripped.
    pub requeued: usize,
}

/// Ephemeral state of one fetch job. The stock set is partitioned into four
/// disjoint lists; a stock is in exactly one of them at any time. Workers
/// share the queue, so every transition happens under the one mutex here,
/// and pop-and-remove is atomic across workers.
pub struct FetchWorkspace {
    inner: Mutex<Partitions>,
}

impl FetchWorkspace {
    pub fn new(queued: Vec<Stock>) -> Self {
        Self {
            inner: Mutex::new(Partitions {
                queued: queued.into(),
                ..Default::default()
            }),
        }
    }

    /// Take the next stock to work on. Returns `None` once the queue is
    /// drained or the breaker has tripped.
    pub fn pop_queued(&self) -> Option<Stock> {
        let mut inner = self.lock();
        if inner.tripped {
            return None;
        }
        inner.queued.pop_front()
    }

    /// The queued stocks, in order, without removing them. Used for the
    /// single round trip of bulk providers.
    pub fn queued_snapshot(&self) -> Vec<Stock> {
        self.lock().queued.iter().cloned().collect()
    }

    pub fn record_skipped(&self, stock: Stock) {
        self.lock().skipped.push(stock);
    }

    pub fn record_success(&self, stock: Stock) {
        self.lock().successful.push(stock);
    }

    /// Returns the failure count including this one.
    pub fn record_failure(&self, stock: Stock) -> usize {
        let mut inner = self.lock();
        inner.failed.push(stock);
        inner.failed.len()
    }

    /// Trip the breaker: stop handing out work and move everything still
    /// queued to skipped, preserving it for the next scheduled run. Returns
    /// how many stocks were requeued; idempotent after the first call.
    pub fn trip(&self) -> usize {
        let mut inner = self.lock();
        if inner.tripped {
            return inner.requeued_at_trip;
        }
        inner.tripped = true;
        let remaining: Vec<Stock> = inner.queued.drain(..).collect();
        inner.requeued_at_trip = remaining.len();
        inner.skipped.extend(remaining);
        inner.requeued_at_trip
    }

    /// Move the whole queue to skipped without tripping. Used when a bulk
    /// source is unreachable and nothing was attempted per stock.
    pub fn abandon_queue(&self) -> usize {
        let mut inner = self.lock();
        let remaining: Vec<Stock> = inner.queued.drain(..).collect();
        let count = remaining.len();
        inner.skipped.extend(remaining);
        count
    }

    pub fn tripped(&self) -> bool {
        self.lock().tripped
    }

    pub fn failure_count(&self) -> usize {
        self.lock().failed.len()
    }

    pub fn finish(&self) -> JobOutcome {
        let mut inner = self.lock();
        debug_assert!(inner.queued.is_empty(), "job finished with stocks queued");
        JobOutcome {
            skipped: std::mem::take(&mut inner.skipped),
            successful: std::mem::take(&mut inner.successful),
            failed: std::mem::take(&mut inner.failed),
            tripped: inner.tripped,
            requeued: inner.requeued_at_trip,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Partitions> {
        self.inner.lock().expect("fetch workspace poisoned")
    }
}
