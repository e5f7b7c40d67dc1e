//! Upstream configuration

use anyhow::{Context, Result};
use crashmap_common::env;
use std::time::Duration;
use url::Url;

use crate::pipeline::{default_worker_count, PipelineConfig, DEFAULT_PAGE_SIZE};

// ============================================================================
// Upstream Configuration Constants
// ============================================================================

/// NYC Open Data motor vehicle collisions dataset.
pub const DEFAULT_INCIDENT_ENDPOINT: &str = "https://data.cityofnewyork.us/resource/h9gi-nx95.json";

/// Citi Bike station inventory feed.
pub const DEFAULT_STATION_ENDPOINT: &str = "https://feeds.citibikenyc.com/stations/stations.json";

/// Default per-request timeout in seconds.
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 60;

/// Upstream and pool sizing configuration
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub incident_endpoint: String,
    pub station_endpoint: String,
    /// Optional Socrata app token; anonymous requests are throttled harder
    pub app_token: Option<String>,
    pub page_size: u64,
    pub workers: usize,
    pub fetch_timeout_secs: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            incident_endpoint: DEFAULT_INCIDENT_ENDPOINT.to_string(),
            station_endpoint: DEFAULT_STATION_ENDPOINT.to_string(),
            app_token: None,
            page_size: DEFAULT_PAGE_SIZE,
            workers: default_worker_count(),
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
        }
    }
}

impl IngestConfig {
    /// Load from the environment (and `.env` if present). Call
    /// [`IngestConfig::validate`] once any command-line overrides are applied.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let config = Self {
            incident_endpoint: env::optional("CRASHMAP_INCIDENT_ENDPOINT")
                .unwrap_or(defaults.incident_endpoint),
            station_endpoint: env::optional("CRASHMAP_STATION_ENDPOINT")
                .unwrap_or(defaults.station_endpoint),
            app_token: env::optional("NYC_OPEN_DATA_TOKEN"),
            page_size: env::parse_or("CRASHMAP_PAGE_SIZE", defaults.page_size)?,
            workers: env::parse_or("CRASHMAP_WORKERS", defaults.workers)?,
            fetch_timeout_secs: env::parse_or(
                "CRASHMAP_FETCH_TIMEOUT_SECS",
                defaults.fetch_timeout_secs,
            )?,
        };

        Ok(config)
    }

    /// Apply command-line overrides on top of the environment.
    pub fn with_overrides(mut self, workers: Option<usize>, page_size: Option<u64>) -> Self {
        if let Some(workers) = workers {
            self.workers = workers;
        }
        if let Some(page_size) = page_size {
            self.page_size = page_size;
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            anyhow::bail!("Page size must be greater than 0");
        }

        if self.workers == 0 {
            anyhow::bail!("Worker count must be greater than 0");
        }

        if self.fetch_timeout_secs == 0 {
            anyhow::bail!("Fetch timeout must be greater than 0");
        }

        self.incident_url()?;
        self.station_url()?;

        if self.app_token.is_none() {
            tracing::warn!("NYC_OPEN_DATA_TOKEN not set - requests will be throttled");
        }

        Ok(())
    }

    pub fn incident_url(&self) -> Result<Url> {
        Url::parse(&self.incident_endpoint)
            .with_context(|| format!("Invalid incident endpoint: {}", self.incident_endpoint))
    }

    pub fn station_url(&self) -> Result<Url> {
        Url::parse(&self.station_endpoint)
            .with_context(|| format!("Invalid station endpoint: {}", self.station_endpoint))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            workers: self.workers,
            page_size: self.page_size,
        }
    }
}
