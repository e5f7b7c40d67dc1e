//! Destinations for cleaned batches
//!
//! A sink is shared by every worker of a run and receives batches in
//! arbitrary interleaving; implementations must not depend on arrival order.

use async_trait::async_trait;

use crate::error::Result;

pub mod stats;
pub mod store;

pub use stats::{StatsAccumulator, StatsReport, Totals};
pub use store::{InsertOutcome, StoreWriter};

#[async_trait]
pub trait Sink<T: Send + 'static>: Send + Sync {
    /// Take one cleaned batch. Called concurrently from many workers.
    async fn ingest(&self, batch: Vec<T>) -> Result<()>;

    /// Called once after every worker has stopped.
    async fn finish(&self) -> Result<()> {
        Ok(())
    }
}
