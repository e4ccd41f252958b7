// vermon-verifier: MFOTL verifier workers and pool
// Supervises long-lived evaluator subprocesses fed by bounded trace queues

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod config;
pub mod error;
pub mod fact;
pub mod pool;
pub mod worker;

pub use config::{EvaluatorConfig, VerifierSetConfig};
pub use error::{VerifierError, VerifierResult};
pub use fact::{frame, Outcome, RecentTraces, VerdictRecord};
pub use pool::VerifierPool;
pub use worker::VerifierWorker;
