//! Crashmap Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Ambient pieces shared by the crashmap binaries:
//!
//! - **Logging**: `tracing` subscriber setup driven by environment variables
//! - **Environment**: typed lookups with defaults for configuration structs
//!
//! # Example
//!
//! ```no_run
//! use crashmap_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     init_logging(&LogConfig::from_env()?)?;
//!     tracing::info!("ready");
//!     Ok(())
//! }
//! ```

pub mod env;
pub mod logging;
