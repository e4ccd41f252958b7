// vermon: Requirement state - composes objective verdict bits into tier-2 facts

use std::collections::BTreeMap;

use crate::bridge::Objective;

/// One composite requirement: which verifier judges it, the predicate name it
/// uses on the wire, and the positional objective list forming its bit vector.
#[derive(Debug, Clone)]
pub struct RequirementRule {
    pub verifier: String,
    pub pattern: String,
    pub objectives: Vec<Objective>,
}

/// The objective -> requirement mapping. Data, not code: a deployment that
/// regroups objectives edits this table only.
#[derive(Debug, Clone)]
pub struct RequirementMap {
    pub rules: Vec<RequirementRule>,
}

impl Default for RequirementMap {
    fn default() -> Self {
        Self {
            rules: vec![
                RequirementRule {
                    verifier: "req-1".to_string(),
                    pattern: "req1".to_string(),
                    objectives: vec![
                        Objective::Response,
                        Objective::RelDefect,
                        Objective::ReqsThroughput,
                    ],
                },
                RequirementRule {
                    verifier: "req-2".to_string(),
                    pattern: "req2".to_string(),
                    objectives: vec![
                        Objective::AvailSaas,
                        Objective::RelFail,
                        Objective::Response,
                        Objective::ReqsThroughput,
                    ],
                },
                RequirementRule {
                    verifier: "req-3".to_string(),
                    pattern: "req3".to_string(),
                    objectives: vec![
                        Objective::FailDetector,
                        Objective::Response,
                        Objective::ReqsThroughput,
                    ],
                },
            ],
        }
    }
}

/// One tier-2 fact body awaiting framing and submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequirementFact {
    pub verifier: String,
    pub body: String,
}

/// Tracks the latest bit per objective and synthesizes requirement facts.
pub struct RequirementState {
    map: RequirementMap,
    verdicts: BTreeMap<Objective, (u8, f64)>,
}

impl RequirementState {
    pub fn new(map: RequirementMap) -> Self {
        Self {
            map,
            verdicts: BTreeMap::new(),
        }
    }

    /// Record one tier-1 verdict bit and build a tier-2 fact body for every
    /// requirement whose objective list references it. Objectives never
    /// reported read as 0.
    pub fn apply(&mut self, objective: Objective, bit: u8, ts: f64) -> Vec<RequirementFact> {
        self.verdicts.insert(objective, (bit, ts));
        self.map
            .rules
            .iter()
            .filter(|rule| rule.objectives.contains(&objective))
            .map(|rule| {
                let bits: Vec<String> = rule
                    .objectives
                    .iter()
                    .map(|o| self.bit(*o).to_string())
                    .collect();
                RequirementFact {
                    verifier: rule.verifier.clone(),
                    body: format!("{}({})", rule.pattern, bits.join(", ")),
                }
            })
            .collect()
    }

    pub fn bit(&self, objective: Objective) -> u8 {
        self.verdicts.get(&objective).map_or(0, |(bit, _)| *bit)
    }

    pub fn verifier_names(&self) -> Vec<String> {
        self.map.rules.iter().map(|r| r.verifier.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_mapping_matches_deployment() {
        let map = RequirementMap::default();
        assert_eq!(map.rules[0].pattern, "req1");
        assert_eq!(
            map.rules[0].objectives,
            vec![
                Objective::Response,
                Objective::RelDefect,
                Objective::ReqsThroughput
            ]
        );
        assert_eq!(map.rules[1].objectives.len(), 4);
        assert_eq!(map.rules[2].objectives.len(), 3);
    }

    #[test]
    fn apply_builds_positional_bit_vectors() {
        let mut state = RequirementState::new(RequirementMap::default());

        // Response satisfied: referenced by all three requirements.
        let facts = state.apply(Objective::Response, 1, 100.0);
        assert_eq!(facts.len(), 3);
        assert_eq!(facts[0].verifier, "req-1");
        assert_eq!(facts[0].body, "req1(1, 0, 0)");
        // Response sits at position 3 of req2 and position 2 of req3.
        assert_eq!(facts[1].body, "req2(0, 0, 1, 0)");
        assert_eq!(facts[2].body, "req3(0, 1, 0)");
    }

    #[test]
    fn bits_accumulate_across_objectives() {
        let mut state = RequirementState::new(RequirementMap::default());
        state.apply(Objective::Response, 1, 100.0);
        state.apply(Objective::ReqsThroughput, 1, 101.0);

        let facts = state.apply(Objective::RelDefect, 1, 102.0);
        // RelDefect only appears in req1.
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].body, "req1(1, 1, 1)");

        let facts = state.apply(Objective::Response, 0, 103.0);
        assert_eq!(facts[0].body, "req1(0, 1, 1)");
    }

    #[test]
    fn unreported_objectives_read_zero() {
        let mut state = RequirementState::new(RequirementMap::default());
        let facts = state.apply(Objective::ReqsThroughput, 1, 100.0);
        // req2: [avail-saas, rel-fail, response, reqs-throughput]
        assert_eq!(facts[1].body, "req2(0, 0, 0, 1)");
        assert_eq!(state.bit(Objective::AvailSaas), 0);
    }
}
