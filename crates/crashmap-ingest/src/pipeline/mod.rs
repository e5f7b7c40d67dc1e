//! Concurrent paginated ingestion
//!
//! Workers share an [`OffsetAllocator`], pull pages through a [`PageSource`],
//! clean them and hand the results to a [`crate::sink::Sink`]. The
//! [`IngestionCoordinator`] owns one run from spawn to join.

pub mod coordinator;
pub mod fetcher;
pub mod offset;
pub mod worker;

pub use coordinator::{
    default_worker_count, IngestionCoordinator, PipelineConfig, RunContext, RunSummary,
    DEFAULT_PAGE_SIZE,
};
pub use fetcher::{http_client, HttpPageFetcher, PageSource, APP_TOKEN_HEADER};
pub use offset::{OffsetAllocator, PageClaim};
pub use worker::{IngestionWorker, WorkerExit, WorkerReport};
