//! Record validation and normalisation
//!
//! Pure functions: the same raw record always yields the same result and
//! nothing outside the return value is touched. Workers count drops; the
//! cleaner only reports why.

use chrono::{NaiveDate, NaiveTime};
use serde_json::Value;
use std::fmt;

use crate::model::{Counter, Incident, RawRecord, Station};

pub const LATITUDE: &str = "latitude";
pub const LONGITUDE: &str = "longitude";

/// The dataset has been republished under new column names; first match wins.
const DATE_FIELDS: &[&str] = &["date", "crash_date"];
const TIME_FIELDS: &[&str] = &["time", "crash_time"];
const KEY_FIELDS: &[&str] = &["unique_key", "collision_id"];

/// Outcome of cleaning one raw record
#[derive(Debug, Clone, PartialEq)]
pub enum Cleaned<T> {
    Kept(T),
    Dropped(DropReason),
}

impl<T> Cleaned<T> {
    pub fn kept(self) -> Option<T> {
        match self {
            Cleaned::Kept(value) => Some(value),
            Cleaned::Dropped(_) => None,
        }
    }

    pub fn is_dropped(&self) -> bool {
        matches!(self, Cleaned::Dropped(_))
    }
}

/// Why a record was excluded
#[derive(Debug, Clone, PartialEq)]
pub enum DropReason {
    /// A mandatory field is absent, null or empty
    Missing(&'static str),
    /// A mandatory field is present but unusable
    Invalid { field: &'static str, value: String },
    /// The record does not fit the target shape at all
    Malformed(String),
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::Missing(field) => write!(f, "missing mandatory field {}", field),
            DropReason::Invalid { field, value } => {
                write!(f, "invalid value {:?} for mandatory field {}", value, field)
            }
            DropReason::Malformed(reason) => write!(f, "malformed record: {}", reason),
        }
    }
}

/// Upstream key of a raw incident, for log lines
pub fn raw_key(raw: &RawRecord) -> Option<String> {
    text(raw, KEY_FIELDS)
}

/// Project a raw upstream record into an [`Incident`].
///
/// Non-schema fields are discarded, absent nullable fields become `None`
/// and absent counters become `0`.
pub fn clean_incident(raw: &RawRecord) -> Cleaned<Incident> {
    let latitude = match coordinate(raw, LATITUDE) {
        Ok(value) => value,
        Err(reason) => return Cleaned::Dropped(reason),
    };
    let longitude = match coordinate(raw, LONGITUDE) {
        Ok(value) => value,
        Err(reason) => return Cleaned::Dropped(reason),
    };

    let mut incident = Incident {
        date: text(raw, DATE_FIELDS).and_then(|s| parse_date(&s)),
        time: text(raw, TIME_FIELDS).and_then(|s| parse_time(&s)),
        borough: text(raw, &["borough"]),
        zip_code: text(raw, &["zip_code"]),
        latitude,
        longitude,
        on_street_name: text(raw, &["on_street_name"]),
        off_street_name: text(raw, &["off_street_name"]),
        cross_street_name: text(raw, &["cross_street_name"]),
        number_of_persons_injured: 0,
        number_of_persons_killed: 0,
        number_of_pedestrians_injured: 0,
        number_of_pedestrians_killed: 0,
        number_of_cyclist_injured: 0,
        number_of_cyclist_killed: 0,
        number_of_motorist_injured: 0,
        number_of_motorist_killed: 0,
        contributing_factor_vehicle_1: text(raw, &["contributing_factor_vehicle_1"]),
        contributing_factor_vehicle_2: text(raw, &["contributing_factor_vehicle_2"]),
        unique_key: text(raw, KEY_FIELDS),
        vehicle_type_code1: text(raw, &["vehicle_type_code1"]),
        vehicle_type_code2: text(raw, &["vehicle_type_code2"]),
    };

    for counter in Counter::ALL {
        *incident.count_mut(counter) = count(raw, counter.field());
    }

    Cleaned::Kept(incident)
}

/// Project one entry of the station snapshot into a [`Station`].
pub fn clean_station(raw: &RawRecord) -> Cleaned<Station> {
    for field in ["id", LATITUDE, LONGITUDE] {
        if present(raw, &[field]).is_none() {
            return Cleaned::Dropped(DropReason::Missing(field));
        }
    }

    // Upstream sends "" for unknown addresses and postal codes
    let normalised: RawRecord = raw
        .iter()
        .map(|(k, v)| match v {
            Value::String(s) if s.trim().is_empty() => (k.clone(), Value::Null),
            _ => (k.clone(), v.clone()),
        })
        .collect();

    match serde_json::from_value::<Station>(Value::Object(normalised)) {
        Ok(station) => Cleaned::Kept(station),
        Err(e) => Cleaned::Dropped(DropReason::Malformed(e.to_string())),
    }
}

/// First alias holding a non-null, non-blank value
fn present<'a>(raw: &'a RawRecord, fields: &[&str]) -> Option<&'a Value> {
    fields.iter().find_map(|field| match raw.get(*field) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.trim().is_empty() => None,
        Some(value) => Some(value),
    })
}

fn text(raw: &RawRecord, fields: &[&str]) -> Option<String> {
    match present(raw, fields)? {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn coordinate(raw: &RawRecord, field: &'static str) -> Result<f64, DropReason> {
    let value = present(raw, &[field]).ok_or(DropReason::Missing(field))?;
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    match parsed {
        Some(v) if v.is_finite() => Ok(v),
        _ => Err(DropReason::Invalid {
            field,
            value: value.to_string(),
        }),
    }
}

/// Counters are never null downstream; anything unreadable counts as zero.
fn count(raw: &RawRecord, field: &str) -> u16 {
    let parsed = match present(raw, &[field]) {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0 && f.fract() == 0.0).map(|f| f as u64)),
        Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    parsed.map_or(0, |v| u16::try_from(v).unwrap_or(u16::MAX))
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    let day = value.get(..10).unwrap_or(value);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

fn parse_time(value: &str) -> Option<NaiveTime> {
    ["%H:%M:%S%.f", "%H:%M:%S", "%H:%M"]
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(value, fmt).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn raw(value: Value) -> RawRecord {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    fn sample() -> RawRecord {
        raw(json!({
            "crash_date": "2019-07-01T00:00:00.000",
            "crash_time": "8:15",
            "borough": "BROOKLYN",
            "zip_code": "11238",
            "latitude": "40.68358",
            "longitude": "-73.97617",
            "location": {"type": "Point", "coordinates": [-73.97617, 40.68358]},
            "on_street_name": "FLATBUSH AVENUE  ",
            "number_of_persons_injured": "1",
            "number_of_cyclist_injured": "1",
            "contributing_factor_vehicle_1": "Driver Inattention/Distraction",
            "collision_id": 4164543,
            "vehicle_type_code1": "Bike",
            "vehicle_type_code3": "Sedan"
        }))
    }

    #[test]
    fn test_clean_projects_known_fields() {
        let incident = clean_incident(&sample()).kept().unwrap();

        assert_eq!(incident.date, NaiveDate::from_ymd_opt(2019, 7, 1));
        assert_eq!(incident.time, NaiveTime::from_hms_opt(8, 15, 0));
        assert_eq!(incident.latitude, 40.68358);
        assert_eq!(incident.on_street_name.as_deref(), Some("FLATBUSH AVENUE"));
        assert_eq!(incident.unique_key.as_deref(), Some("4164543"));
        assert_eq!(incident.number_of_persons_injured, 1);
        assert_eq!(incident.number_of_cyclist_injured, 1);
        assert_eq!(incident.number_of_motorist_killed, 0);
        assert_eq!(incident.cross_street_name, None);
    }

    #[test]
    fn test_missing_longitude_is_dropped() {
        let mut record = sample();
        record.remove(LONGITUDE);
        assert_eq!(
            clean_incident(&record),
            Cleaned::Dropped(DropReason::Missing(LONGITUDE))
        );
    }

    #[test]
    fn test_blank_or_garbage_latitude_is_dropped() {
        let mut record = sample();
        record.insert(LATITUDE.into(), json!(""));
        assert_eq!(
            clean_incident(&record),
            Cleaned::Dropped(DropReason::Missing(LATITUDE))
        );

        record.insert(LATITUDE.into(), json!("north"));
        assert!(matches!(
            clean_incident(&record),
            Cleaned::Dropped(DropReason::Invalid { field: LATITUDE, .. })
        ));
    }

    #[test]
    fn test_malformed_counter_counts_as_zero() {
        let mut record = sample();
        record.insert("number_of_persons_injured".into(), json!("n/a"));
        record.insert("number_of_persons_killed".into(), json!(-1));
        let incident = clean_incident(&record).kept().unwrap();
        assert_eq!(incident.number_of_persons_injured, 0);
        assert_eq!(incident.number_of_persons_killed, 0);
    }

    #[test]
    fn test_legacy_field_names_take_precedence() {
        let mut record = sample();
        record.insert("unique_key".into(), json!("3000001"));
        record.insert("date".into(), json!("2015-03-04T00:00:00.000"));
        let incident = clean_incident(&record).kept().unwrap();
        assert_eq!(incident.unique_key.as_deref(), Some("3000001"));
        assert_eq!(incident.date, NaiveDate::from_ymd_opt(2015, 3, 4));
        assert_eq!(raw_key(&record).as_deref(), Some("3000001"));
    }

    #[test]
    fn test_station_requires_id_and_position() {
        let mut entry = raw(json!({
            "id": 72, "stationName": "W 52 St & 11 Ave",
            "latitude": 40.767, "longitude": -73.993, "postalCode": ""
        }));
        let station = clean_station(&entry).kept().unwrap();
        assert_eq!(station.postal_code, None);

        entry.remove("id");
        assert_eq!(clean_station(&entry), Cleaned::Dropped(DropReason::Missing("id")));
    }

    #[test]
    fn test_station_with_wrong_types_is_malformed() {
        let entry = raw(json!({"id": "seventy", "latitude": 40.7, "longitude": -73.9}));
        assert!(matches!(clean_station(&entry), Cleaned::Dropped(DropReason::Malformed(_))));
    }

    const NULLABLE: &[&str] = &[
        "crash_date",
        "crash_time",
        "borough",
        "zip_code",
        "on_street_name",
        "off_street_name",
        "cross_street_name",
        "number_of_persons_injured",
        "number_of_persons_killed",
        "number_of_cyclist_injured",
        "contributing_factor_vehicle_1",
        "contributing_factor_vehicle_2",
        "collision_id",
        "vehicle_type_code1",
        "vehicle_type_code2",
    ];

    fn full_record() -> RawRecord {
        raw(json!({
            "crash_date": "2020-01-02T00:00:00.000",
            "crash_time": "23:59",
            "borough": "QUEENS",
            "zip_code": "11368",
            "latitude": 40.75,
            "longitude": "-73.86",
            "on_street_name": "ROOSEVELT AVENUE",
            "off_street_name": "",
            "cross_street_name": "104 STREET",
            "number_of_persons_injured": "3",
            "number_of_persons_killed": 1,
            "number_of_cyclist_injured": "2",
            "contributing_factor_vehicle_1": "Unspecified",
            "contributing_factor_vehicle_2": "Unspecified",
            "collision_id": "4271234",
            "vehicle_type_code1": "Sedan",
            "vehicle_type_code2": "Bike"
        }))
    }

    proptest! {
        #[test]
        fn prop_missing_mandatory_field_always_drops(
            drop_lat in any::<bool>(),
            drop_lon in any::<bool>(),
            blank in any::<bool>(),
        ) {
            prop_assume!(drop_lat || drop_lon);
            let mut record = full_record();
            for (dropped, field) in [(drop_lat, LATITUDE), (drop_lon, LONGITUDE)] {
                if dropped {
                    if blank {
                        record.insert(field.into(), Value::Null);
                    } else {
                        record.remove(field);
                    }
                }
            }
            prop_assert!(clean_incident(&record).is_dropped());
        }

        #[test]
        fn prop_absent_nullable_fields_are_explicit_and_clean_is_idempotent(
            mask in proptest::collection::vec(any::<bool>(), NULLABLE.len()),
        ) {
            let mut record = full_record();
            for (field, remove) in NULLABLE.iter().zip(mask) {
                if remove {
                    record.remove(*field);
                }
            }

            let incident = match clean_incident(&record) {
                Cleaned::Kept(incident) => incident,
                Cleaned::Dropped(reason) => return Err(TestCaseError::fail(reason.to_string())),
            };

            let projected = incident.to_raw();
            prop_assert_eq!(projected.len(), 22);
            prop_assert!(!projected.contains_key("crash_date"));
            prop_assert_eq!(clean_incident(&projected), Cleaned::Kept(incident));
        }

        #[test]
        fn prop_clean_is_deterministic(lat in -90.0f64..90.0, lon in -180.0f64..180.0, n in 0u16..500) {
            let mut record = full_record();
            record.insert(LATITUDE.into(), json!(lat.to_string()));
            record.insert(LONGITUDE.into(), json!(lon));
            record.insert("number_of_motorist_injured".into(), json!(n.to_string()));
            let first = clean_incident(&record);
            prop_assert_eq!(&first, &clean_incident(&record));
            prop_assert_eq!(first.kept().map(|i| i.number_of_motorist_injured), Some(n));
        }
    }
}
