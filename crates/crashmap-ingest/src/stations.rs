//! Bike station inventory snapshot
//!
//! A single unpaginated GET; the whole snapshot goes to the sink as one batch.

use serde::Deserialize;
use tracing::{info, warn};
use url::Url;

use crate::cleaner::{clean_station, Cleaned};
use crate::error::{IngestError, Result};
use crate::model::{RawRecord, Station};
use crate::sink::Sink;

#[derive(Debug, Deserialize)]
struct Snapshot {
    #[serde(rename = "stationBeanList")]
    stations: Vec<RawRecord>,
}

#[derive(Debug, Clone)]
pub struct StationSnapshotFetcher {
    client: reqwest::Client,
    endpoint: Url,
}

impl StationSnapshotFetcher {
    pub fn new(client: reqwest::Client, endpoint: Url) -> Self {
        Self { client, endpoint }
    }

    pub async fn fetch(&self) -> Result<Vec<RawRecord>> {
        let url = self.endpoint.as_str();
        let body = self
            .client
            .get(self.endpoint.clone())
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| IngestError::network(url, e))?
            .bytes()
            .await
            .map_err(|e| IngestError::network(url, e))?;

        decode_snapshot(url, &body)
    }
}

/// Decode `{"stationBeanList": [...]}`
pub fn decode_snapshot(url: &str, body: &[u8]) -> Result<Vec<RawRecord>> {
    serde_json::from_slice::<Snapshot>(body)
        .map(|snapshot| snapshot.stations)
        .map_err(|e| IngestError::decode(url, e))
}

/// Counts for one snapshot load
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StationLoad {
    pub fetched: usize,
    pub dropped: usize,
    pub delivered: usize,
}

/// Fetch, clean and deliver the snapshot, then finish the sink.
pub async fn load_stations<S>(fetcher: &StationSnapshotFetcher, sink: &S) -> Result<StationLoad>
where
    S: Sink<Station> + ?Sized,
{
    let raw = fetcher.fetch().await?;
    let fetched = raw.len();

    let mut stations = Vec::with_capacity(fetched);
    for entry in &raw {
        match clean_station(entry) {
            Cleaned::Kept(station) => stations.push(station),
            Cleaned::Dropped(reason) => {
                warn!(id = ?entry.get("id"), %reason, "Station dropped");
            }
        }
    }

    let load = StationLoad {
        fetched,
        dropped: fetched - stations.len(),
        delivered: stations.len(),
    };
    info!(
        fetched = load.fetched,
        dropped = load.dropped,
        "Fetched station snapshot"
    );

    if !stations.is_empty() {
        sink.ingest(stations).await?;
    }
    sink.finish().await?;

    Ok(load)
}
