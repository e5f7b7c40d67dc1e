//! Worker pool for one ingestion run
//!
//! Spawns a fixed number of workers over a shared offset cursor, waits for
//! every one of them to stop, then calls the sink's finish hook. A failing
//! worker never cancels its siblings and its pages are not redistributed.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use super::fetcher::PageSource;
use super::offset::OffsetAllocator;
use super::worker::{IngestionWorker, WorkerExit, WorkerReport};
use crate::error::Result;
use crate::model::Incident;
use crate::sink::Sink;

/// Default records per upstream page
pub const DEFAULT_PAGE_SIZE: u64 = 5000;

/// Host parallelism; the job is I/O bound so this is a floor, not a ceiling.
pub fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    pub workers: usize,
    pub page_size: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: default_worker_count(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// State owned by a single run; created at start, dropped at the end
#[derive(Debug)]
pub struct RunContext {
    pub run_id: Uuid,
    pub allocator: Arc<OffsetAllocator>,
}

impl RunContext {
    pub fn new(page_size: u64) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            allocator: Arc::new(OffsetAllocator::new(page_size)),
        }
    }
}

/// Outcome of a completed run
#[derive(Debug)]
pub struct RunSummary {
    pub run_id: Uuid,
    /// One report per worker, ordered by worker id
    pub workers: Vec<WorkerReport>,
    /// Cursor position after the last claim
    pub final_offset: u64,
}

impl RunSummary {
    pub fn records_delivered(&self) -> u64 {
        self.workers.iter().map(|w| w.records_delivered).sum()
    }

    pub fn records_dropped(&self) -> u64 {
        self.workers.iter().map(|w| w.records_dropped).sum()
    }

    pub fn batches_delivered(&self) -> u64 {
        self.workers.iter().map(|w| w.batches_delivered).sum()
    }

    pub fn failed_workers(&self) -> usize {
        self.workers.iter().filter(|w| w.exit.is_failure()).count()
    }
}

pub struct IngestionCoordinator {
    config: PipelineConfig,
    source: Arc<dyn PageSource>,
}

impl IngestionCoordinator {
    pub fn new(config: PipelineConfig, source: Arc<dyn PageSource>) -> Self {
        Self { config, source }
    }

    pub fn config(&self) -> PipelineConfig {
        self.config
    }

    /// Run the pool to completion against `sink`.
    ///
    /// Returns once every worker has stopped and `sink.finish()` has run.
    /// Only a failing finish hook is an error; worker failures are reported
    /// in the summary.
    pub async fn run<S>(&self, sink: Arc<S>, cancel: CancellationToken) -> Result<RunSummary>
    where
        S: Sink<Incident> + ?Sized + 'static,
    {
        let context = RunContext::new(self.config.page_size);
        let workers = self.config.workers.max(1);

        info!(
            run_id = %context.run_id,
            workers,
            page_size = context.allocator.page_size(),
            "Starting ingestion run"
        );

        // Spawn worker tasks
        let mut handles = Vec::with_capacity(workers);
        for id in 0..workers {
            let worker = IngestionWorker::new(id, context.allocator.clone(), self.source.clone());
            let span = info_span!("worker", run_id = %context.run_id, worker = id);
            let sink = sink.clone();
            let cancel = cancel.clone();

            let handle = tokio::spawn(async move { worker.run(sink, cancel).await }.instrument(span));
            handles.push(handle);
        }

        // Wait for every worker; a panic in one never aborts the others
        let mut reports = Vec::with_capacity(workers);
        for (id, handle) in handles.into_iter().enumerate() {
            match handle.await {
                Ok(report) => reports.push(report),
                Err(e) => {
                    error!(run_id = %context.run_id, worker = id, error = %e, "Worker panicked");
                    reports.push(WorkerReport::new(id, WorkerExit::Panicked(e.to_string())));
                },
            }
        }

        let summary = RunSummary {
            run_id: context.run_id,
            workers: reports,
            final_offset: context.allocator.position(),
        };

        info!(
            run_id = %summary.run_id,
            delivered = summary.records_delivered(),
            dropped = summary.records_dropped(),
            batches = summary.batches_delivered(),
            failed_workers = summary.failed_workers(),
            final_offset = summary.final_offset,
            "All workers finished"
        );

        sink.finish().await?;
        Ok(summary)
    }
}
