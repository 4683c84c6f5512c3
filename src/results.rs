//! The results table: one row per `(library, sampler, size)` run, with its performance metrics
//! and, once summaries are available, effective samples per second.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

use crate::error::Result;
use crate::monitor::PerfMetrics;
use crate::stats::Summary;

/// Key of a run: `{library}_{sampler}_{size}`.
pub fn result_key(library: &str, sampler: &str, size: usize) -> String {
    format!("{library}_{sampler}_{size}")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    pub key: String,
    pub library: String,
    pub sampler: String,
    pub size: usize,
    pub elapsed_time: f64,
    pub current_memory: u64,
    pub peak_memory: u64,
    #[serde(rename = "ess_mean/s")]
    pub ess_mean_per_s: Option<f64>,
    #[serde(rename = "ess_tail/s")]
    pub ess_tail_per_s: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultsTable {
    rows: Vec<ResultRow>,
}

impl ResultsTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> &[ResultRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&ResultRow> {
        self.rows.iter().find(|r| r.key == key)
    }

    /// Inserts a row for the run, or replaces the metrics of an existing one. Returns the key.
    ///
    /// Replacing a row clears its ESS/s values, since they depend on the elapsed time.
    pub fn upsert(
        &mut self,
        library: &str,
        sampler: &str,
        size: usize,
        metrics: &PerfMetrics,
    ) -> String {
        let key = result_key(library, sampler, size);
        let row = ResultRow {
            key: key.clone(),
            library: library.to_string(),
            sampler: sampler.to_string(),
            size,
            elapsed_time: metrics.elapsed_time,
            current_memory: metrics.current_memory,
            peak_memory: metrics.peak_memory,
            ess_mean_per_s: None,
            ess_tail_per_s: None,
        };
        match self.rows.iter_mut().find(|r| r.key == key) {
            Some(existing) => *existing = row,
            None => self.rows.push(row),
        }
        key
    }

    /// Fills `ess_mean/s` and `ess_tail/s` for rows that lack them: the smallest ESS over the
    /// run's parameters divided by its elapsed time.
    ///
    /// Rows that already have values keep them. Returns the number of rows filled in.
    pub fn add_ess_per_second(&mut self, summaries: &BTreeMap<String, Vec<Summary>>) -> usize {
        let mut filled = 0;
        for row in self.rows.iter_mut() {
            if row.ess_mean_per_s.is_some() && row.ess_tail_per_s.is_some() {
                continue;
            }
            let Some(summary) = summaries.get(&row.key) else {
                warn!(key = %row.key, "no summary for run, ESS/s left empty");
                continue;
            };
            let min_ess = |f: fn(&Summary) -> f64| summary.iter().map(f).fold(f64::NAN, f64::min);
            row.ess_mean_per_s = Some(min_ess(|s| s.ess_mean) / row.elapsed_time);
            row.ess_tail_per_s = Some(min_ess(|s| s.ess_tail) / row.elapsed_time);
            filled += 1;
        }
        if filled == 0 {
            info!("ESS/s already present for every run");
        }
        filled
    }

    pub fn save_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut wtr = csv::Writer::from_path(path)?;
        for row in &self.rows {
            wtr.serialize(row)?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn load_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut rdr = csv::Reader::from_path(path)?;
        let rows = rdr.deserialize().collect::<std::result::Result<Vec<ResultRow>, _>>()?;
        Ok(Self { rows })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn metrics(elapsed: f64) -> PerfMetrics {
        PerfMetrics {
            elapsed_time: elapsed,
            current_memory: 10,
            peak_memory: 100,
        }
    }

    fn summary(ess_mean: f64, ess_tail: f64) -> Summary {
        Summary {
            name: "p".to_string(),
            mean: 0.0,
            sd: 1.0,
            mcse_mean: 0.1,
            ess_mean,
            ess_tail,
            r_hat: 1.0,
        }
    }

    #[test]
    fn test_upsert_by_key() {
        let mut table = ResultsTable::new();
        let key = table.upsert("classical", "metropolis", 100, &metrics(1.0));
        assert_eq!(key, "classical_metropolis_100");
        table.upsert("classical", "metropolis", 100, &metrics(3.0));
        table.upsert("kernel", "default", 100, &metrics(2.0));
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(&key).unwrap().elapsed_time, 3.0);
    }

    #[test]
    fn test_ess_per_second_computed_once() {
        let mut table = ResultsTable::new();
        let key = table.upsert("kernel", "default", 50, &metrics(2.0));
        let mut summaries = BTreeMap::new();
        summaries.insert(key.clone(), vec![summary(400.0, 300.0), summary(100.0, 500.0)]);

        assert_eq!(table.add_ess_per_second(&summaries), 1);
        let row = table.get(&key).unwrap();
        assert_eq!(row.ess_mean_per_s, Some(50.0));
        assert_eq!(row.ess_tail_per_s, Some(150.0));

        summaries.insert(key.clone(), vec![summary(1.0, 1.0)]);
        assert_eq!(table.add_ess_per_second(&summaries), 0);
        assert_eq!(table.get(&key).unwrap().ess_mean_per_s, Some(50.0));
    }

    #[test]
    fn test_csv_round_trip_keeps_ess_per_second() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("results.csv");

        let mut table = ResultsTable::new();
        let key = table.upsert("classical", "adaptive", 10, &metrics(0.5));
        table.upsert("kernel", "default", 10, &metrics(0.25));
        table.add_ess_per_second(&[(key.clone(), vec![summary(20.0, 10.0)])].into());
        table.save_csv(&path).unwrap();

        let mut loaded = ResultsTable::load_csv(&path).unwrap();
        assert_eq!(loaded, table);
        assert_eq!(loaded.get(&key).unwrap().ess_mean_per_s, Some(40.0));
        assert_eq!(loaded.get("kernel_default_10").unwrap().ess_mean_per_s, None);

        // Already-present values survive a second pass after reloading.
        loaded.add_ess_per_second(&[(key.clone(), vec![summary(1.0, 1.0)])].into());
        assert_eq!(loaded.get(&key).unwrap().ess_tail_per_s, Some(20.0));
    }
}
