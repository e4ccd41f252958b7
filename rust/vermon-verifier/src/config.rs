// vermon-verifier: Verifier set and evaluator configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{VerifierError, VerifierResult};

/// The set of verifier names to start, loaded from
/// `/etc/verifier-config/verifiers_config.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifierSetConfig {
    pub verifiers: Vec<String>,
}

impl VerifierSetConfig {
    pub fn from_file(path: &Path) -> VerifierResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            VerifierError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            VerifierError::Config(format!("failed to parse {}: {e}", path.display()))
        })
    }

    pub fn new(verifiers: Vec<String>) -> Self {
        Self { verifiers }
    }
}

/// How evaluator children are launched and talked to.
#[derive(Debug, Clone)]
pub struct EvaluatorConfig {
    /// Evaluator binary; receives `-sig <file> -formula <file>`.
    pub binary: String,
    /// Directory holding `<name>.sig` / `<name>.mfotl` pairs.
    pub spec_dir: PathBuf,
    /// How long a worker waits for one stdout line per submission.
    pub read_timeout: Duration,
    /// Extra wait the pool grants on top of the worker read timeout.
    pub verdict_slack: Duration,
    /// Bound of the per-worker ingress/egress queues.
    pub queue_depth: usize,
    /// Grace period between stdin EOF and a hard kill at shutdown.
    pub shutdown_grace: Duration,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            binary: "monpoly".to_string(),
            spec_dir: PathBuf::from("edge-mon-specs"),
            read_timeout: Duration::from_millis(100),
            verdict_slack: Duration::from_millis(50),
            queue_depth: 64,
            shutdown_grace: Duration::from_secs(2),
        }
    }
}

impl EvaluatorConfig {
    pub fn sig_path(&self, name: &str) -> PathBuf {
        self.spec_dir.join(format!("{name}.sig"))
    }

    pub fn formula_path(&self, name: &str) -> PathBuf {
        self.spec_dir.join(format!("{name}.mfotl"))
    }

    /// Verify both spec files exist. Missing specs are fatal at startup: a
    /// worker spawned against a missing formula would hold no usable state.
    pub fn check_spec(&self, name: &str) -> VerifierResult<()> {
        for path in [self.sig_path(name), self.formula_path(name)] {
            if !path.exists() {
                return Err(VerifierError::SpecMissing(path.display().to_string()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_verifier_list() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"verifiers": ["R1.1_latency", "R1.3_failure_rate"]}}"#
        )
        .unwrap();
        let set = VerifierSetConfig::from_file(file.path()).unwrap();
        assert_eq!(set.verifiers, vec!["R1.1_latency", "R1.3_failure_rate"]);
    }

    #[test]
    fn missing_config_is_an_error() {
        let err = VerifierSetConfig::from_file(Path::new("/nonexistent/config.json"))
            .expect_err("missing file must not parse");
        assert!(matches!(err, VerifierError::Config(_)));
    }

    #[test]
    fn spec_paths_follow_naming_scheme() {
        let cfg = EvaluatorConfig {
            spec_dir: PathBuf::from("online-boutique-reqs"),
            ..Default::default()
        };
        assert_eq!(
            cfg.sig_path("req-1"),
            PathBuf::from("online-boutique-reqs/req-1.sig")
        );
        assert_eq!(
            cfg.formula_path("req-1"),
            PathBuf::from("online-boutique-reqs/req-1.mfotl")
        );
    }

    #[test]
    fn check_spec_rejects_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = EvaluatorConfig {
            spec_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        assert!(matches!(
            cfg.check_spec("ghost"),
            Err(VerifierError::SpecMissing(_))
        ));

        std::fs::write(cfg.sig_path("real"), "p(string)\n").unwrap();
        std::fs::write(cfg.formula_path("real"), "TRUE\n").unwrap();
        assert!(cfg.check_spec("real").is_ok());
    }
}
