// vermon-verifier: Verifier pool - routes facts to workers and collects verdicts

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use crate::config::{EvaluatorConfig, VerifierSetConfig};
use crate::error::VerifierResult;
use crate::fact::{Outcome, RecentTraces, VerdictRecord};
use crate::worker::VerifierWorker;

const TRACE_RING_CAPACITY: usize = 100;
const TRACE_LOG_EVERY: u64 = 10;

/// Owns one [`VerifierWorker`] per configured name.
///
/// Safe for concurrent callers: per-worker serialization happens inside each
/// worker's submission lock, and the bookkeeping maps sit behind their own
/// mutexes.
pub struct VerifierPool {
    workers: HashMap<String, VerifierWorker>,
    last_outcomes: parking_lot::Mutex<HashMap<String, Outcome>>,
    traces: parking_lot::Mutex<HashMap<String, RecentTraces>>,
    wait: Duration,
}

impl VerifierPool {
    /// Start one worker per configured verifier name.
    pub fn spawn(set: &VerifierSetConfig, cfg: &EvaluatorConfig) -> VerifierResult<Self> {
        let mut workers = HashMap::new();
        let mut traces = HashMap::new();
        for name in &set.verifiers {
            let worker = VerifierWorker::spawn(name.clone(), cfg)?;
            info!(verifier = %name, "verifier worker started");
            workers.insert(name.clone(), worker);
            traces.insert(
                name.clone(),
                RecentTraces::new(name.clone(), TRACE_RING_CAPACITY, TRACE_LOG_EVERY),
            );
        }
        Ok(Self {
            workers,
            last_outcomes: parking_lot::Mutex::new(HashMap::new()),
            traces: parking_lot::Mutex::new(traces),
            wait: cfg.read_timeout + cfg.verdict_slack,
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.workers.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.workers.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Last outcome recorded for a worker, if it has evaluated anything yet.
    pub fn last_outcome(&self, name: &str) -> Option<Outcome> {
        self.last_outcomes.lock().get(name).copied()
    }

    /// Submit one framed fact line to each named target and collect one
    /// verdict per target, in target order. Unknown targets are skipped.
    pub async fn evaluate<S: AsRef<str>>(&self, fact: &str, targets: &[S]) -> Vec<VerdictRecord> {
        let mut records = Vec::with_capacity(targets.len());
        for target in targets {
            let name = target.as_ref();
            let Some(worker) = self.workers.get(name) else {
                warn!(verifier = name, fact, "fact routed to unknown verifier target");
                continue;
            };

            self.traces
                .lock()
                .entry(name.to_string())
                .or_insert_with(|| {
                    RecentTraces::new(name.to_string(), TRACE_RING_CAPACITY, TRACE_LOG_EVERY)
                })
                .push(fact);

            let outcome = match worker.submit(fact, self.wait).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(verifier = name, error = %e, "submission failed, assuming violation");
                    Outcome::Violated
                }
            };

            let transition = {
                let mut last = self.last_outcomes.lock();
                let prev = last.insert(name.to_string(), outcome);
                prev.is_some_and(|p| p != outcome)
            };

            records.push(VerdictRecord {
                verifier: name.to_string(),
                outcome,
                transition,
                at: Utc::now(),
            });
        }
        records
    }

    /// Close all worker queues and reap the evaluator children.
    pub async fn shutdown(&self) {
        for worker in self.workers.values() {
            worker.shutdown().await;
        }
    }
}
