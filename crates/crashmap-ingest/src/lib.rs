//! Crashmap Ingest Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Loads NYC motor vehicle collision records and bike station inventory
//! into Postgres for the crash map.
//!
//! - [`pipeline`]: concurrent paginated download driven by a shared offset cursor
//! - [`cleaner`]: per-record validation and normalisation
//! - [`sink`]: where cleaned batches go, either in-memory totals or the database
//! - [`stations`]: one-shot station snapshot load
//! - [`reporting`]: read-only queries over the loaded tables

#[cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]
pub mod cleaner;
#[cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]
pub mod config;
#[cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]
pub mod db;
pub mod error;
#[cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]
pub mod model;
#[cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]
pub mod pipeline;
pub mod reporting;
#[cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]
pub mod sink;
#[cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]
pub mod stations;

pub use cleaner::{clean_incident, clean_station, Cleaned, DropReason};
pub use config::IngestConfig;
pub use error::{IngestError, Result};
pub use model::{Counter, Incident, RawRecord, Station};
pub use pipeline::{IngestionCoordinator, PipelineConfig, RunSummary};
pub use sink::{Sink, StatsAccumulator, StatsReport, StoreWriter};
