// vermon: Per-downstream response-time rings and failure counters

use std::collections::{BTreeMap, VecDeque};
use std::time::Instant;

use crate::table;

/// Ring of the most recent latency samples for one downstream, plus its
/// failure counter.
#[derive(Debug)]
pub struct MetricsRing {
    samples: VecDeque<f64>,
    capacity: usize,
    failures: u64,
    started: Instant,
}

impl MetricsRing {
    fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            failures: 0,
            started: Instant::now(),
        }
    }

    fn record(&mut self, latency_ms: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(latency_ms);
    }

    /// Total requests seen, successful and failed.
    fn count(&self) -> u64 {
        self.samples.len() as u64 + self.failures
    }

    fn mean(&self) -> f64 {
        if self.samples.is_empty() {
            0.0
        } else {
            self.samples.iter().sum::<f64>() / self.samples.len() as f64
        }
    }

    fn min(&self) -> f64 {
        self.samples.iter().copied().fold(f64::INFINITY, f64::min)
    }

    fn max(&self) -> f64 {
        self.samples.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }

    fn median(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let mut sorted: Vec<f64> = self.samples.iter().copied().collect();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let mid = sorted.len() / 2;
        if sorted.len() % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        } else {
            sorted[mid]
        }
    }
}

/// Aggregated statistics for one downstream at snapshot time.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceStats {
    pub name: String,
    pub requests: u64,
    pub failed: u64,
    pub mean_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub median_ms: f64,
    pub per_second: f64,
}

/// Process-wide request metrics, one ring per downstream service key.
pub struct MetricsStore {
    rings: BTreeMap<String, MetricsRing>,
    capacity: usize,
    total_requests: u64,
    total_failures: u64,
}

impl MetricsStore {
    pub fn new<'a>(services: impl IntoIterator<Item = &'a str>, capacity: usize) -> Self {
        let rings = services
            .into_iter()
            .map(|name| (name.to_string(), MetricsRing::new(capacity)))
            .collect();
        Self {
            rings,
            capacity,
            total_requests: 0,
            total_failures: 0,
        }
    }

    pub fn record_latency(&mut self, service: &str, latency_ms: f64) {
        self.total_requests += 1;
        self.ring_mut(service).record(latency_ms);
    }

    pub fn record_failure(&mut self, service: &str) {
        self.total_requests += 1;
        self.total_failures += 1;
        self.ring_mut(service).failures += 1;
    }

    fn ring_mut(&mut self, service: &str) -> &mut MetricsRing {
        let capacity = self.capacity;
        self.rings
            .entry(service.to_string())
            .or_insert_with(|| MetricsRing::new(capacity))
    }

    /// Running totals used by the periodic pooler's delta computation.
    pub fn totals(&self) -> (u64, u64) {
        (self.total_requests, self.total_failures)
    }

    pub fn failures_for(&self, service: &str) -> u64 {
        self.rings.get(service).map_or(0, |r| r.failures)
    }

    pub fn snapshot(&self) -> Vec<ServiceStats> {
        let mut rows: Vec<ServiceStats> = self
            .rings
            .iter()
            .map(|(name, ring)| {
                let elapsed = ring.started.elapsed().as_secs_f64().max(f64::EPSILON);
                ServiceStats {
                    name: name.clone(),
                    requests: ring.count(),
                    failed: ring.failures,
                    mean_ms: ring.mean(),
                    min_ms: if ring.samples.is_empty() { 0.0 } else { ring.min() },
                    max_ms: if ring.samples.is_empty() { 0.0 } else { ring.max() },
                    median_ms: ring.median(),
                    per_second: ring.count() as f64 / elapsed,
                }
            })
            .collect();

        let all: Vec<f64> = self
            .rings
            .values()
            .flat_map(|r| r.samples.iter().copied())
            .collect();
        let elapsed = self
            .rings
            .values()
            .map(|r| r.started.elapsed().as_secs_f64())
            .fold(f64::EPSILON, f64::max);
        let mut aggregate = ServiceStats {
            name: String::new(),
            requests: self.total_requests,
            failed: self.total_failures,
            mean_ms: 0.0,
            min_ms: 0.0,
            max_ms: 0.0,
            median_ms: 0.0,
            per_second: self.total_requests as f64 / elapsed,
        };
        if !all.is_empty() {
            let mut sorted = all.clone();
            sorted.sort_by(|a, b| a.total_cmp(b));
            aggregate.mean_ms = sorted.iter().sum::<f64>() / sorted.len() as f64;
            aggregate.min_ms = sorted[0];
            aggregate.max_ms = sorted[sorted.len() - 1];
            let mid = sorted.len() / 2;
            aggregate.median_ms = if sorted.len() % 2 == 0 {
                (sorted[mid - 1] + sorted[mid]) / 2.0
            } else {
                sorted[mid]
            };
        }
        rows.push(aggregate);
        rows
    }

    /// Grid table of the current snapshot, last row aggregated.
    pub fn render_table(&self) -> String {
        let snapshot = self.snapshot();
        let rows: Vec<Vec<String>> = snapshot
            .iter()
            .enumerate()
            .map(|(i, s)| {
                let kind = if i + 1 == snapshot.len() { "Aggregated" } else { "GET" };
                vec![
                    kind.to_string(),
                    s.name.clone(),
                    s.requests.to_string(),
                    s.failed.to_string(),
                    format!("{:.2}", s.mean_ms),
                    format!("{:.2}", s.min_ms),
                    format!("{:.2}", s.max_ms),
                    format!("{:.2}", s.median_ms),
                    format!("{:.2}", s.per_second),
                ]
            })
            .collect();
        table::grid(
            &[
                "Type", "Name", "# reqs", "Failed reqs", "Avg (ms)", "Min (ms)", "Max (ms)",
                "Med (ms)", "req/s",
            ],
            &rows,
        )
    }
}
