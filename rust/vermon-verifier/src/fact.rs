// vermon-verifier: Predicate facts, verdicts, and trace bookkeeping

use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Utc};

/// Outcome of evaluating one predicate fact against one verifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Satisfied,
    Violated,
}

impl Outcome {
    /// Wire encoding used in tier-2 requirement facts: 1 = satisfied, 0 = violated.
    pub fn bit(&self) -> u8 {
        match self {
            Outcome::Satisfied => 1,
            Outcome::Violated => 0,
        }
    }

    pub fn is_violated(&self) -> bool {
        matches!(self, Outcome::Violated)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Satisfied => write!(f, "satisfied"),
            Outcome::Violated => write!(f, "violated"),
        }
    }
}

/// One verdict as returned by the pool for a single (fact, target) submission.
#[derive(Debug, Clone)]
pub struct VerdictRecord {
    /// Name of the verifier that produced the verdict.
    pub verifier: String,
    pub outcome: Outcome,
    /// True when the outcome differs from this worker's previously recorded one.
    pub transition: bool,
    /// Wall-clock time the verdict was read.
    pub at: DateTime<Utc>,
}

/// Frame a fact body with its integer timestamp: `@<secs> <body>`.
///
/// The caller is responsible for per-target monotonicity; this only formats.
pub fn frame(secs: u64, body: &str) -> String {
    format!("@{secs} {body}")
}

/// Bounded ring of the most recent submissions for one verifier, dumped to the
/// log every `log_every` entries. Purely diagnostic.
#[derive(Debug)]
pub struct RecentTraces {
    name: String,
    entries: VecDeque<String>,
    capacity: usize,
    counter: u64,
    log_every: u64,
}

impl RecentTraces {
    pub fn new(name: impl Into<String>, capacity: usize, log_every: u64) -> Self {
        Self {
            name: name.into(),
            entries: VecDeque::with_capacity(capacity),
            capacity,
            counter: 0,
            log_every,
        }
    }

    pub fn push(&mut self, line: &str) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(line.trim_end().to_string());
        self.counter += 1;
        if self.log_every > 0 && self.counter % self.log_every == 0 {
            tracing::debug!(
                verifier = %self.name,
                recent = ?self.entries,
                "recent trace submissions"
            );
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
