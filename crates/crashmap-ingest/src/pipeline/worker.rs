//! Ingestion worker
//!
//! A worker loops Claiming → Fetching → Cleaning → Delivering until it sees
//! an empty page, a fatal error, or cancellation. A failed page is not
//! retried or handed back; its range is skipped for the rest of the run.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::fetcher::PageSource;
use super::offset::{OffsetAllocator, PageClaim};
use crate::cleaner::{clean_incident, raw_key, Cleaned};
use crate::error::IngestError;
use crate::model::{Incident, RawRecord};
use crate::sink::Sink;

/// Why a worker stopped
#[derive(Debug)]
pub enum WorkerExit {
    /// Upstream returned an empty page
    Exhausted,
    /// The run's cancellation token fired
    Cancelled,
    FetchFailed(IngestError),
    DeliveryFailed(IngestError),
    /// The task panicked; reported by the coordinator
    Panicked(String),
}

impl WorkerExit {
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            WorkerExit::FetchFailed(_) | WorkerExit::DeliveryFailed(_) | WorkerExit::Panicked(_)
        )
    }
}

/// What one worker did during a run
#[derive(Debug)]
pub struct WorkerReport {
    pub worker: usize,
    pub exit: WorkerExit,
    pub pages_fetched: u64,
    pub records_fetched: u64,
    pub records_dropped: u64,
    pub records_delivered: u64,
    pub batches_delivered: u64,
    /// Offset of the last page this worker claimed
    pub last_offset: Option<u64>,
}

impl WorkerReport {
    pub(crate) fn new(worker: usize, exit: WorkerExit) -> Self {
        Self {
            worker,
            exit,
            pages_fetched: 0,
            records_fetched: 0,
            records_dropped: 0,
            records_delivered: 0,
            batches_delivered: 0,
            last_offset: None,
        }
    }
}

enum State {
    Claiming,
    Fetching(PageClaim),
    Cleaning(PageClaim, Vec<RawRecord>),
    Delivering(PageClaim, Vec<Incident>),
}

pub struct IngestionWorker {
    id: usize,
    allocator: Arc<OffsetAllocator>,
    source: Arc<dyn PageSource>,
}

impl IngestionWorker {
    pub fn new(id: usize, allocator: Arc<OffsetAllocator>, source: Arc<dyn PageSource>) -> Self {
        Self {
            id,
            allocator,
            source,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Run until a terminal state. Never panics on upstream or sink errors.
    pub async fn run<S>(self, sink: Arc<S>, cancel: CancellationToken) -> WorkerReport
    where
        S: Sink<Incident> + ?Sized,
    {
        let mut report = WorkerReport::new(self.id, WorkerExit::Exhausted);
        let mut state = State::Claiming;

        let exit = loop {
            state = match state {
                State::Claiming => {
                    if cancel.is_cancelled() {
                        info!(worker = self.id, "Cancelled, not claiming further pages");
                        break WorkerExit::Cancelled;
                    }
                    let claim = self.allocator.claim();
                    report.last_offset = Some(claim.offset);
                    State::Fetching(claim)
                }

                State::Fetching(claim) => match self.source.fetch(claim).await {
                    Ok(page) => {
                        report.pages_fetched += 1;
                        report.records_fetched += page.len() as u64;
                        State::Cleaning(claim, page)
                    }
                    Err(e) => {
                        warn!(
                            worker = self.id,
                            offset = claim.offset,
                            kind = e.kind(),
                            error = %e,
                            "Fetch failed, worker stopping; page range will not be revisited"
                        );
                        break WorkerExit::FetchFailed(e);
                    }
                },

                State::Cleaning(claim, page) => {
                    if page.is_empty() {
                        info!(worker = self.id, offset = claim.offset, "Fetched batch. No results.");
                        break WorkerExit::Exhausted;
                    }

                    let first_key = page.first().and_then(raw_key);
                    let last_key = page.last().and_then(raw_key);
                    info!(
                        worker = self.id,
                        offset = claim.offset,
                        records = page.len(),
                        first_key = first_key.as_deref().unwrap_or("-"),
                        last_key = last_key.as_deref().unwrap_or("-"),
                        "Fetched batch"
                    );

                    let mut batch = Vec::with_capacity(page.len());
                    let mut dropped = 0u64;
                    for raw in &page {
                        match clean_incident(raw) {
                            Cleaned::Kept(incident) => batch.push(incident),
                            Cleaned::Dropped(reason) => {
                                dropped += 1;
                                debug!(worker = self.id, key = ?raw_key(raw), %reason, "Record dropped");
                            }
                        }
                    }

                    if dropped > 0 {
                        warn!(
                            worker = self.id,
                            offset = claim.offset,
                            dropped,
                            "Records dropped for missing mandatory latitude/longitude"
                        );
                    }
                    report.records_dropped += dropped;
                    State::Delivering(claim, batch)
                }

                State::Delivering(claim, batch) => {
                    if !batch.is_empty() {
                        let delivered = batch.len() as u64;
                        if let Err(e) = sink.ingest(batch).await {
                            error!(
                                worker = self.id,
                                offset = claim.offset,
                                kind = e.kind(),
                                error = %e,
                                "Batch delivery failed, worker stopping"
                            );
                            break WorkerExit::DeliveryFailed(e);
                        }
                        report.batches_delivered += 1;
                        report.records_delivered += delivered;
                    }
                    State::Claiming
                }
            };
        };

        report.exit = exit;
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Serves full pages for offsets below `end`, then empty pages.
    struct FinitePages {
        end: u64,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PageSource for FinitePages {
        async fn fetch(&self, claim: PageClaim) -> Result<Vec<RawRecord>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let stop = claim.end().min(self.end);
            Ok((claim.offset..stop)
                .map(|i| match json!({"latitude": 40.7, "longitude": -73.9, "unique_key": i.to_string()}) {
                    serde_json::Value::Object(map) => map,
                    _ => unreachable!(),
                })
                .collect())
        }
    }

    struct FailingSource;

    #[async_trait]
    impl PageSource for FailingSource {
        async fn fetch(&self, claim: PageClaim) -> Result<Vec<RawRecord>> {
            Err(IngestError::decode(format!("stub?offset={}", claim.offset), "not an array"))
        }
    }

    #[derive(Default)]
    struct Collect(Mutex<Vec<usize>>);

    #[async_trait]
    impl Sink<Incident> for Collect {
        async fn ingest(&self, batch: Vec<Incident>) -> Result<()> {
            self.0.lock().unwrap().push(batch.len());
            Ok(())
        }
    }

    async fn run_single(end: u64, page_size: u64) -> (WorkerReport, usize, u64) {
        let source = Arc::new(FinitePages {
            end,
            calls: AtomicUsize::new(0),
        });
        let allocator = Arc::new(OffsetAllocator::new(page_size));
        let worker = IngestionWorker::new(0, allocator.clone(), source.clone());
        let report = worker
            .run(Arc::new(Collect::default()), CancellationToken::new())
            .await;
        (report, source.calls.load(Ordering::SeqCst), allocator.position())
    }

    #[tokio::test]
    async fn test_fetch_count_is_pages_plus_one() {
        for (end, page_size) in [(10u64, 2u64), (11, 2), (1, 5000), (0, 3), (9, 3)] {
            let (report, calls, _) = run_single(end, page_size).await;
            let expected = end.div_ceil(page_size) as usize + 1;
            assert_eq!(calls, expected, "end={end} page_size={page_size}");
            assert!(matches!(report.exit, WorkerExit::Exhausted));
            assert_eq!(report.records_delivered, end);
        }
    }

    #[tokio::test]
    async fn test_fetch_error_stops_worker_without_retry() {
        let allocator = Arc::new(OffsetAllocator::new(10));
        let worker = IngestionWorker::new(3, allocator.clone(), Arc::new(FailingSource));
        let report = worker
            .run(Arc::new(Collect::default()), CancellationToken::new())
            .await;

        assert!(matches!(report.exit, WorkerExit::FetchFailed(IngestError::Decode { .. })));
        assert!(report.exit.is_failure());
        assert_eq!(report.pages_fetched, 0);
        assert_eq!(allocator.position(), 10);
    }

    #[tokio::test]
    async fn test_cancelled_worker_claims_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let allocator = Arc::new(OffsetAllocator::new(10));
        let source = Arc::new(FinitePages {
            end: 100,
            calls: AtomicUsize::new(0),
        });
        let report = IngestionWorker::new(0, allocator.clone(), source.clone())
            .run(Arc::new(Collect::default()), cancel)
            .await;

        assert!(matches!(report.exit, WorkerExit::Cancelled));
        assert_eq!(allocator.position(), 0);
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }
}
