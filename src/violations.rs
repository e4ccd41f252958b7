// vermon: Violation bookkeeping per objective / requirement

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};

use crate::table;

const TIMESTAMP_RING: usize = 1000;

#[derive(Debug, Default)]
pub struct ViolationStats {
    pub count: u64,
    timestamps: VecDeque<DateTime<Utc>>,
}

impl ViolationStats {
    pub fn latest(&self) -> Option<DateTime<Utc>> {
        self.timestamps.back().copied()
    }
}

/// Counts and timestamps every violated verdict, keyed by verifier name.
#[derive(Debug, Default)]
pub struct ViolationLog {
    entries: BTreeMap<String, ViolationStats>,
}

impl ViolationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-register keys so the summary table lists verifiers that have not
    /// violated anything yet.
    pub fn register<'a>(&mut self, keys: impl IntoIterator<Item = &'a str>) {
        for key in keys {
            self.entries.entry(key.to_string()).or_default();
        }
    }

    pub fn record(&mut self, key: &str, at: DateTime<Utc>) {
        let stats = self.entries.entry(key.to_string()).or_default();
        stats.count += 1;
        if stats.timestamps.len() == TIMESTAMP_RING {
            stats.timestamps.pop_front();
        }
        stats.timestamps.push_back(at);
    }

    pub fn count(&self, key: &str) -> u64 {
        self.entries.get(key).map_or(0, |s| s.count)
    }

    pub fn latest(&self, key: &str) -> Option<DateTime<Utc>> {
        self.entries.get(key).and_then(ViolationStats::latest)
    }

    /// Grid summary: one row per key with count and last violation time.
    pub fn render_table(&self) -> String {
        let rows: Vec<Vec<String>> = self
            .entries
            .iter()
            .map(|(key, stats)| {
                vec![
                    key.clone(),
                    stats.count.to_string(),
                    stats
                        .latest()
                        .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
                        .unwrap_or_else(|| "N/A".to_string()),
                ]
            })
            .collect();
        table::grid(&["Verifier", "Violations", "Last timestamp"], &rows)
    }
}
