//! Read-only queries consumed by the map view

use chrono::NaiveDate;
use serde::Serialize;
use sqlx::{FromRow, PgPool};

use crate::error::Result;

/// Weight of one fatality relative to one injury
pub const KILLED_WEIGHT: i64 = 5;

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct StationPoint {
    pub id: i32,
    #[sqlx(rename = "stationName")]
    #[serde(rename = "stationName")]
    pub station_name: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct IncidentPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub date: Option<NaiveDate>,
    pub severity: i64,
    pub injured: i64,
    pub killed: i64,
}

pub async fn station_points(pool: &PgPool) -> Result<Vec<StationPoint>> {
    let points = sqlx::query_as::<_, StationPoint>(
        r#"SELECT "id", "stationName", "latitude", "longitude" FROM station ORDER BY "id""#,
    )
    .fetch_all(pool)
    .await?;
    Ok(points)
}

/// Incident locations, optionally restricted to one day.
pub async fn incident_points(pool: &PgPool, day: Option<NaiveDate>) -> Result<Vec<IncidentPoint>> {
    let points = sqlx::query_as::<_, IncidentPoint>(
        r#"SELECT latitude, longitude, date,
                  (number_of_persons_injured + $1::BIGINT * number_of_persons_killed) AS severity,
                  number_of_persons_injured::BIGINT AS injured,
                  number_of_persons_killed::BIGINT AS killed
           FROM incident
           WHERE $2::DATE IS NULL OR date = $2
           ORDER BY unique_key"#,
    )
    .bind(KILLED_WEIGHT)
    .bind(day)
    .fetch_all(pool)
    .await?;
    Ok(points)
}

pub async fn incident_count(pool: &PgPool, day: Option<NaiveDate>) -> Result<i64> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM incident WHERE $1::DATE IS NULL OR date = $1")
            .bind(day)
            .fetch_one(pool)
            .await?;
    Ok(count)
}
