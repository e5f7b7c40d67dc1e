//! Durable sink: idempotent bulk inserts into Postgres
//!
//! Each `ingest` call is one transaction. Rows whose natural key already
//! exists are skipped by `ON CONFLICT ... DO NOTHING`; any other failure
//! rolls the whole batch back and is returned to the worker.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use tracing::{info, warn};

use super::Sink;
use crate::error::Result;
use crate::model::{Incident, Station};

/// Postgres caps bind parameters per statement at u16::MAX
const MAX_BIND_PARAMS: usize = u16::MAX as usize;

const INCIDENT_COLUMNS: &[&str] = &[
    "date",
    "time",
    "borough",
    "zip_code",
    "latitude",
    "longitude",
    "on_street_name",
    "off_street_name",
    "cross_street_name",
    "number_of_persons_injured",
    "number_of_persons_killed",
    "number_of_pedestrians_injured",
    "number_of_pedestrians_killed",
    "number_of_cyclist_injured",
    "number_of_cyclist_killed",
    "number_of_motorist_injured",
    "number_of_motorist_killed",
    "contributing_factor_vehicle_1",
    "contributing_factor_vehicle_2",
    "unique_key",
    "vehicle_type_code1",
    "vehicle_type_code2",
];

const STATION_COLUMNS: &[&str] = &[
    "\"id\"",
    "\"stationName\"",
    "\"availableDocks\"",
    "\"totalDocks\"",
    "\"latitude\"",
    "\"longitude\"",
    "\"statusValue\"",
    "\"statusKey\"",
    "\"availableBikes\"",
    "\"stAddress1\"",
    "\"stAddress2\"",
    "\"postalCode\"",
];

/// Row counts for one stored batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertOutcome {
    /// New rows written
    pub inserted: u64,
    /// Rows whose key was already present
    pub duplicates: u64,
    /// Rows rejected before the insert
    pub skipped: u64,
}

#[derive(Debug, Clone)]
pub struct StoreWriter {
    pool: PgPool,
}

impl StoreWriter {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Insert a cleaned incident batch in one transaction.
    pub async fn insert_incidents(&self, batch: Vec<Incident>) -> Result<InsertOutcome> {
        let (usable, skipped) = storable(batch);

        let inserted = insert_chunked(
            &self.pool,
            &usable,
            rows_per_statement(INCIDENT_COLUMNS.len()),
            incident_insert,
        )
        .await?;

        let outcome = InsertOutcome {
            inserted,
            duplicates: usable.len() as u64 - inserted,
            skipped,
        };

        info!(
            inserted = outcome.inserted,
            duplicates = outcome.duplicates,
            skipped = outcome.skipped,
            "Stored incident batch"
        );
        if skipped > 0 {
            warn!(skipped, "Incidents skipped for missing key or non-finite location");
        }

        Ok(outcome)
    }

    /// Insert a station snapshot in one transaction.
    pub async fn insert_stations(&self, stations: Vec<Station>) -> Result<InsertOutcome> {
        let inserted = insert_chunked(
            &self.pool,
            &stations,
            rows_per_statement(STATION_COLUMNS.len()),
            station_insert,
        )
        .await?;

        let outcome = InsertOutcome {
            inserted,
            duplicates: stations.len() as u64 - inserted,
            skipped: 0,
        };

        info!(
            inserted = outcome.inserted,
            duplicates = outcome.duplicates,
            "Stored station snapshot"
        );

        Ok(outcome)
    }
}

#[async_trait]
impl Sink<Incident> for StoreWriter {
    async fn ingest(&self, batch: Vec<Incident>) -> Result<()> {
        self.insert_incidents(batch).await.map(|_| ())
    }
}

#[async_trait]
impl Sink<Station> for StoreWriter {
    async fn ingest(&self, batch: Vec<Station>) -> Result<()> {
        self.insert_stations(batch).await.map(|_| ())
    }
}

/// Keyless rows would bypass `ON CONFLICT (unique_key)` and duplicate on
/// every re-run, since a UNIQUE column admits any number of NULLs.
fn storable(batch: Vec<Incident>) -> (Vec<Incident>, u64) {
    let total = batch.len();
    let kept: Vec<Incident> = batch.into_iter().filter(Incident::is_storable).collect();
    let skipped = (total - kept.len()) as u64;
    (kept, skipped)
}

fn rows_per_statement(columns: usize) -> usize {
    (MAX_BIND_PARAMS / columns).max(1)
}

/// Run one INSERT per chunk inside a single transaction, returning rows written.
async fn insert_chunked<'r, T>(
    pool: &PgPool,
    rows: &'r [T],
    chunk_size: usize,
    build: fn(&'r [T]) -> QueryBuilder<'r, Postgres>,
) -> Result<u64> {
    if rows.is_empty() {
        return Ok(0);
    }

    let mut tx = pool.begin().await?;
    let mut inserted = 0;

    for chunk in rows.chunks(chunk_size) {
        let mut query = build(chunk);
        match query.build().execute(&mut *tx).await {
            Ok(result) => inserted += result.rows_affected(),
            Err(e) => {
                rollback(tx).await;
                return Err(e.into());
            }
        }
    }

    tx.commit().await?;
    Ok(inserted)
}

async fn rollback(tx: Transaction<'_, Postgres>) {
    if let Err(e) = tx.rollback().await {
        warn!(error = %e, "Rollback failed; connection will be discarded");
    }
}

fn insert_prefix(table: &str, columns: &[&str]) -> String {
    format!("INSERT INTO {} ({}) ", table, columns.join(", "))
}

fn incident_insert(chunk: &[Incident]) -> QueryBuilder<'_, Postgres> {
    let mut query = QueryBuilder::new(insert_prefix("incident", INCIDENT_COLUMNS));
    query.push_values(chunk, |mut row, inc| {
        row.push_bind(inc.date)
            .push_bind(inc.time)
            .push_bind(inc.borough.as_deref())
            .push_bind(inc.zip_code.as_deref())
            .push_bind(inc.latitude)
            .push_bind(inc.longitude)
            .push_bind(inc.on_street_name.as_deref())
            .push_bind(inc.off_street_name.as_deref())
            .push_bind(inc.cross_street_name.as_deref())
            .push_bind(i32::from(inc.number_of_persons_injured))
            .push_bind(i32::from(inc.number_of_persons_killed))
            .push_bind(i32::from(inc.number_of_pedestrians_injured))
            .push_bind(i32::from(inc.number_of_pedestrians_killed))
            .push_bind(i32::from(inc.number_of_cyclist_injured))
            .push_bind(i32::from(inc.number_of_cyclist_killed))
            .push_bind(i32::from(inc.number_of_motorist_injured))
            .push_bind(i32::from(inc.number_of_motorist_killed))
            .push_bind(inc.contributing_factor_vehicle_1.as_deref())
            .push_bind(inc.contributing_factor_vehicle_2.as_deref())
            .push_bind(inc.unique_key.as_deref())
            .push_bind(inc.vehicle_type_code1.as_deref())
            .push_bind(inc.vehicle_type_code2.as_deref());
    });
    query.push(" ON CONFLICT (unique_key) DO NOTHING");
    query
}

fn station_insert(chunk: &[Station]) -> QueryBuilder<'_, Postgres> {
    let mut query = QueryBuilder::new(insert_prefix("station", STATION_COLUMNS));
    query.push_values(chunk, |mut row, st| {
        row.push_bind(st.id)
            .push_bind(st.station_name.as_deref())
            .push_bind(st.available_docks)
            .push_bind(st.total_docks)
            .push_bind(st.latitude)
            .push_bind(st.longitude)
            .push_bind(st.status_value.as_deref())
            .push_bind(st.status_key)
            .push_bind(st.available_bikes)
            .push_bind(st.st_address1.as_deref())
            .push_bind(st.st_address2.as_deref())
            .push_bind(st.postal_code.as_deref());
    });
    query.push(" ON CONFLICT (\"id\") DO NOTHING");
    query
}
