// vermon: Objective -> requirement verdict bridge (objective mode only)

use std::collections::BTreeMap;
use std::time::Duration;

use tracing::{info, warn};

use vermon_verifier::VerdictRecord;

use crate::error::{GatewayError, GatewayResult};
use crate::table;

/// Tier-1 objectives that can appear in requirement bit vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Objective {
    Response,
    ReqsThroughput,
    RelDefect,
    AvailSaas,
    RelFail,
    FailDetector,
}

impl Objective {
    /// Name used for the objective's verifier and its req-mode endpoint.
    pub fn name(&self) -> &'static str {
        match self {
            Objective::Response => "response",
            Objective::ReqsThroughput => "reqs-throughput",
            Objective::RelDefect => "rel-defect",
            Objective::AvailSaas => "avail-saas",
            Objective::RelFail => "rel-fail",
            Objective::FailDetector => "fail-detector",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "response" => Some(Objective::Response),
            "reqs-throughput" => Some(Objective::ReqsThroughput),
            "rel-defect" => Some(Objective::RelDefect),
            "avail-saas" => Some(Objective::AvailSaas),
            "rel-fail" => Some(Objective::RelFail),
            "fail-detector" => Some(Objective::FailDetector),
            _ => None,
        }
    }
}

/// Posts tier-1 verdict changes to the requirement instance.
///
/// Only transitions travel: steady state is never re-asserted, so the tier-2
/// state machine sees exactly one event per objective flip.
pub struct VerdictBridge {
    client: reqwest::Client,
    base: String,
    bits: parking_lot::Mutex<BTreeMap<Objective, u8>>,
}

impl VerdictBridge {
    pub fn new(requirement_verifier: &str) -> GatewayResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| GatewayError::Config(format!("failed to build bridge client: {e}")))?;
        let base = if requirement_verifier.starts_with("http://")
            || requirement_verifier.starts_with("https://")
        {
            requirement_verifier.trim_end_matches('/').to_string()
        } else {
            format!("http://{requirement_verifier}")
        };
        Ok(Self {
            client,
            base,
            bits: parking_lot::Mutex::new(BTreeMap::new()),
        })
    }

    /// Handle one tier-1 verdict. Non-transitions and verdicts of verifiers
    /// that are not objectives produce no tier-2 traffic.
    pub async fn on_verdict(&self, record: &VerdictRecord) {
        let Some(objective) = Objective::from_name(&record.verifier) else {
            return;
        };
        if !record.transition {
            return;
        }

        let bit = record.outcome.bit();
        let notification = {
            let mut bits = self.bits.lock();
            bits.insert(objective, bit);
            let rows: Vec<Vec<String>> = bits
                .iter()
                .map(|(o, b)| vec![o.name().to_string(), b.to_string()])
                .collect();
            table::grid(&["Objective", "Current verdict"], &rows)
        };
        info!(
            objective = objective.name(),
            verdict = bit,
            "verdict change notification:\n{notification}"
        );

        let url = format!("{}/{}", self.base, objective.name());
        let form = [("verdict", if bit == 1 { "true" } else { "false" })];
        match self.client.post(&url).form(&form).send().await {
            Ok(response) if !response.status().is_success() => {
                warn!(%url, status = %response.status(), "requirement instance rejected verdict");
            }
            Ok(_) => {}
            Err(e) => {
                warn!(%url, error = %e, "failed to deliver verdict to requirement instance");
            }
        }
    }

    /// Current bit of one objective, 0 when never bridged.
    pub fn bit(&self, objective: Objective) -> u8 {
        self.bits.lock().get(&objective).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn objective_names_round_trip() {
        for objective in [
            Objective::Response,
            Objective::ReqsThroughput,
            Objective::RelDefect,
            Objective::AvailSaas,
            Objective::RelFail,
            Objective::FailDetector,
        ] {
            assert_eq!(Objective::from_name(objective.name()), Some(objective));
        }
        assert_eq!(Objective::from_name("R1.1_latency"), None);
    }

    #[test]
    fn bare_host_port_gets_http_scheme() {
        let bridge = VerdictBridge::new("reqver:9000").unwrap();
        assert_eq!(bridge.base, "http://reqver:9000");
        let bridge = VerdictBridge::new("http://reqver:9000/").unwrap();
        assert_eq!(bridge.base, "http://reqver:9000");
    }
}
