// vermon: Periodic pooler - derived throughput and defect facts on a timer

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

use crate::core::Core;

/// Every `interval`, compute the request/failure deltas since the previous
/// window and submit the throughput and defect facts.
pub fn spawn(core: Arc<Core>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // An interval's first tick fires immediately; consume it so the first
        // delta spans a full window.
        tick.tick().await;
        let mut last = core.metrics.lock().totals();
        loop {
            tick.tick().await;
            let totals = core.metrics.lock().totals();
            let delta_requests = totals.0.saturating_sub(last.0);
            let delta_failures = totals.1.saturating_sub(last.1);
            last = totals;
            debug!(delta_requests, delta_failures, "pooling window closed");
            core.submit_throughput_and_defect(delta_requests, delta_failures)
                .await;
        }
    })
}
