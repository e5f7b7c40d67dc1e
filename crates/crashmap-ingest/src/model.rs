//! Record types crossing the pipeline
//!
//! Upstream pages arrive as schema-less [`RawRecord`] maps. The cleaner
//! projects each one into a typed [`Incident`] or [`Station`]; nothing past
//! the cleaner sees a raw map.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One upstream object, exactly as decoded from the page
pub type RawRecord = serde_json::Map<String, Value>;

/// A traffic incident restricted to the persisted column set.
///
/// `latitude`/`longitude` are mandatory; every other column is always
/// populated, with `None` or `0` standing in for absent upstream values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub borough: Option<String>,
    pub zip_code: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub on_street_name: Option<String>,
    pub off_street_name: Option<String>,
    pub cross_street_name: Option<String>,
    pub number_of_persons_injured: u16,
    pub number_of_persons_killed: u16,
    pub number_of_pedestrians_injured: u16,
    pub number_of_pedestrians_killed: u16,
    pub number_of_cyclist_injured: u16,
    pub number_of_cyclist_killed: u16,
    pub number_of_motorist_injured: u16,
    pub number_of_motorist_killed: u16,
    pub contributing_factor_vehicle_1: Option<String>,
    pub contributing_factor_vehicle_2: Option<String>,
    pub unique_key: Option<String>,
    pub vehicle_type_code1: Option<String>,
    pub vehicle_type_code2: Option<String>,
}

impl Incident {
    /// Natural dedupe key
    pub fn key(&self) -> Option<&str> {
        self.unique_key.as_deref()
    }

    pub fn count(&self, counter: Counter) -> u16 {
        match counter {
            Counter::PersonsKilled => self.number_of_persons_killed,
            Counter::PersonsInjured => self.number_of_persons_injured,
            Counter::PedestriansKilled => self.number_of_pedestrians_killed,
            Counter::PedestriansInjured => self.number_of_pedestrians_injured,
            Counter::CyclistKilled => self.number_of_cyclist_killed,
            Counter::CyclistInjured => self.number_of_cyclist_injured,
            Counter::MotoristKilled => self.number_of_motorist_killed,
            Counter::MotoristInjured => self.number_of_motorist_injured,
        }
    }

    pub(crate) fn count_mut(&mut self, counter: Counter) -> &mut u16 {
        match counter {
            Counter::PersonsKilled => &mut self.number_of_persons_killed,
            Counter::PersonsInjured => &mut self.number_of_persons_injured,
            Counter::PedestriansKilled => &mut self.number_of_pedestrians_killed,
            Counter::PedestriansInjured => &mut self.number_of_pedestrians_injured,
            Counter::CyclistKilled => &mut self.number_of_cyclist_killed,
            Counter::CyclistInjured => &mut self.number_of_cyclist_injured,
            Counter::MotoristKilled => &mut self.number_of_motorist_killed,
            Counter::MotoristInjured => &mut self.number_of_motorist_injured,
        }
    }

    /// Whether the store can persist this row idempotently: it needs a
    /// natural key for `ON CONFLICT` and finite coordinates.
    pub fn is_storable(&self) -> bool {
        self.key().is_some() && self.latitude.is_finite() && self.longitude.is_finite()
    }

    /// Serialise back to the upstream shape, with every column present.
    pub fn to_raw(&self) -> RawRecord {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => RawRecord::new(),
        }
    }
}

/// Injury and fatality counters summed by the stats sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Counter {
    PersonsKilled,
    PersonsInjured,
    PedestriansKilled,
    PedestriansInjured,
    CyclistKilled,
    CyclistInjured,
    MotoristKilled,
    MotoristInjured,
}

impl Counter {
    pub const COUNT: usize = 8;

    pub const ALL: [Counter; Counter::COUNT] = [
        Counter::PersonsKilled,
        Counter::PersonsInjured,
        Counter::PedestriansKilled,
        Counter::PedestriansInjured,
        Counter::CyclistKilled,
        Counter::CyclistInjured,
        Counter::MotoristKilled,
        Counter::MotoristInjured,
    ];

    /// Upstream field and column name
    pub fn field(self) -> &'static str {
        match self {
            Counter::PersonsKilled => "number_of_persons_killed",
            Counter::PersonsInjured => "number_of_persons_injured",
            Counter::PedestriansKilled => "number_of_pedestrians_killed",
            Counter::PedestriansInjured => "number_of_pedestrians_injured",
            Counter::CyclistKilled => "number_of_cyclist_killed",
            Counter::CyclistInjured => "number_of_cyclist_injured",
            Counter::MotoristKilled => "number_of_motorist_killed",
            Counter::MotoristInjured => "number_of_motorist_injured",
        }
    }
}

/// Bike station from the inventory snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Station {
    pub id: i32,
    pub station_name: Option<String>,
    pub available_docks: Option<i32>,
    pub total_docks: Option<i32>,
    pub latitude: f64,
    pub longitude: f64,
    pub status_value: Option<String>,
    pub status_key: Option<i32>,
    pub available_bikes: Option<i32>,
    pub st_address1: Option<String>,
    pub st_address2: Option<String>,
    pub postal_code: Option<String>,
}
