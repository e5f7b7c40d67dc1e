//! In-memory injury/fatality totals
//!
//! Partial sums for a batch are computed before taking the lock, so the
//! critical section is a fixed-size addition.

use async_trait::async_trait;
use std::fmt;
use std::sync::Mutex;
use tracing::info;

use super::Sink;
use crate::error::Result;
use crate::model::{Counter, Incident};

/// Running sums plus the record count `n`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Totals {
    pub n: u64,
    sums: [u64; Counter::COUNT],
}

impl Totals {
    pub fn from_batch(batch: &[Incident]) -> Self {
        let mut totals = Totals {
            n: batch.len() as u64,
            ..Totals::default()
        };
        for incident in batch {
            for counter in Counter::ALL {
                totals.sums[counter as usize] += u64::from(incident.count(counter));
            }
        }
        totals
    }

    pub fn get(&self, counter: Counter) -> u64 {
        self.sums[counter as usize]
    }

    fn merge(&mut self, other: &Totals) {
        self.n += other.n;
        for (sum, add) in self.sums.iter_mut().zip(other.sums.iter()) {
            *sum += add;
        }
    }
}

/// Final summary printed after a stats run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsReport {
    pub label: String,
    pub totals: Totals,
}

impl fmt::Display for StatsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Summary results:")?;
        write!(f, "total {} records for borough {}", self.totals.n, self.label)?;
        for counter in Counter::ALL {
            write!(f, "\ntotal {}: {}", counter.field(), self.totals.get(counter))?;
        }
        Ok(())
    }
}

/// Stats sink. Counters are only reachable through [`Sink::ingest`] and
/// [`StatsAccumulator::report`].
#[derive(Debug, Default)]
pub struct StatsAccumulator {
    state: Mutex<Option<Totals>>,
    label: Option<String>,
}

impl StatsAccumulator {
    /// `label` names the filter the run used (a borough), `None` for all data
    pub fn new(label: Option<String>) -> Self {
        Self {
            state: Mutex::new(None),
            label,
        }
    }

    fn add(&self, partial: &Totals) {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        state.get_or_insert_with(Totals::default).merge(partial);
    }

    /// Snapshot of the totals, labelled with the filter given to [`StatsAccumulator::new`].
    /// Intended for after the run has joined.
    pub fn report(&self) -> StatsReport {
        let totals = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
            .unwrap_or_default();

        StatsReport {
            label: self.label.as_deref().unwrap_or("all").to_string(),
            totals,
        }
    }
}

#[async_trait]
impl Sink<Incident> for StatsAccumulator {
    async fn ingest(&self, batch: Vec<Incident>) -> Result<()> {
        self.add(&Totals::from_batch(&batch));
        Ok(())
    }

    async fn finish(&self) -> Result<()> {
        let report = self.report();
        info!(
            borough = %report.label,
            records = report.totals.n,
            persons_injured = report.totals.get(Counter::PersonsInjured),
            persons_killed = report.totals.get(Counter::PersonsKilled),
            cyclist_injured = report.totals.get(Counter::CyclistInjured),
            cyclist_killed = report.totals.get(Counter::CyclistKilled),
            "Stats run complete"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cleaner::clean_incident;
    use serde_json::json;

    fn incident(injured: u16, killed: u16, cyclist_injured: u16) -> Incident {
        let raw = json!({
            "latitude": "40.7",
            "longitude": "-73.9",
            "number_of_persons_injured": injured.to_string(),
            "number_of_persons_killed": killed.to_string(),
            "number_of_cyclist_injured": cyclist_injured.to_string(),
        });
        match raw {
            serde_json::Value::Object(map) => clean_incident(&map).kept().unwrap(),
            _ => unreachable!(),
        }
    }

    fn b1() -> Vec<Incident> {
        vec![incident(1, 0, 1), incident(3, 1, 0)]
    }

    fn b2() -> Vec<Incident> {
        vec![incident(0, 0, 0), incident(2, 2, 2), incident(5, 0, 1)]
    }

    #[tokio::test]
    async fn test_report_before_any_batch_is_zeroed() {
        let stats = StatsAccumulator::new(None);
        let report = stats.report();
        assert_eq!(report.label, "all");
        assert_eq!(report.totals, Totals::default());
    }

    #[tokio::test]
    async fn test_report_uses_constructor_label() {
        let stats = StatsAccumulator::new(Some("QUEENS".into()));
        stats.ingest(b1()).await.unwrap();
        stats.finish().await.unwrap();

        let report = stats.report();
        assert_eq!(report.label, "QUEENS");
        assert!(report.to_string().contains("total 2 records for borough QUEENS"));
    }

    #[tokio::test]
    async fn test_batch_order_does_not_matter() {
        let forward = StatsAccumulator::new(None);
        forward.ingest(b1()).await.unwrap();
        forward.ingest(b2()).await.unwrap();

        let backward = StatsAccumulator::new(None);
        backward.ingest(b2()).await.unwrap();
        backward.ingest(b1()).await.unwrap();

        assert_eq!(forward.report(), backward.report());
        assert_eq!(forward.report().totals.n, 5);
        assert_eq!(forward.report().totals.get(Counter::PersonsInjured), 11);
        assert_eq!(forward.report().totals.get(Counter::PersonsKilled), 3);
    }

    #[tokio::test]
    async fn test_concatenated_batch_matches_separate_batches() {
        let separate = StatsAccumulator::new(None);
        separate.ingest(b1()).await.unwrap();
        separate.ingest(b2()).await.unwrap();

        let joined = StatsAccumulator::new(None);
        joined.ingest(b1().into_iter().chain(b2()).collect()).await.unwrap();

        assert_eq!(separate.report(), joined.report());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_ingest_loses_nothing() {
        let stats = std::sync::Arc::new(StatsAccumulator::new(Some("BRONX".into())));
        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let stats = stats.clone();
                tokio::spawn(async move { stats.ingest(b2()).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let report = stats.report();
        assert_eq!(report.totals.n, 48);
        assert_eq!(report.totals.get(Counter::CyclistInjured), 48);
    }

    #[test]
    fn test_report_display() {
        let report = StatsReport {
            label: "QUEENS".into(),
            totals: Totals::from_batch(&b1()),
        };
        let text = report.to_string();
        assert!(text.starts_with("Summary results:\ntotal 2 records for borough QUEENS"));
        assert!(text.contains("total number_of_persons_injured: 4"));
        assert_eq!(text.lines().count(), 10);
    }
}
