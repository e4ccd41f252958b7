// vermon: Configuration - process mode, env, and the two JSON config files

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use vermon_verifier::{EvaluatorConfig, VerifierSetConfig};

use crate::error::{GatewayError, GatewayResult};

pub const DEFAULT_SERVICE_PATHS_FILE: &str = "/etc/service-config/service_paths.json";
pub const DEFAULT_VERIFIER_CONFIG_FILE: &str = "/etc/verifier-config/verifiers_config.json";

/// Spec directories per process role.
const OBJECTIVE_SPEC_DIR: &str = "edge-mon-specs";
const REQUIREMENT_SPEC_DIR: &str = "online-boutique-reqs";

/// Which tier this process verifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Mode {
    /// Tier-1: primitive objectives over observed traffic.
    Obj,
    /// Tier-2: composite requirements over objective verdicts.
    Req,
}

/// Which protocol surface the process binds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerType {
    Http,
    Grpc,
}

impl ServerType {
    pub fn parse(value: &str) -> GatewayResult<Self> {
        match value {
            "fastapi" => Ok(ServerType::Http),
            "grpc" => Ok(ServerType::Grpc),
            other => Err(GatewayError::Config(format!(
                "unsupported SERVER_TYPE '{other}' (expected 'fastapi' or 'grpc')"
            ))),
        }
    }
}

/// Everything the gateway needs at startup. Loaded once; there is no runtime
/// reconfiguration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub mode: Mode,
    /// `host:port` of the requirement instance the bridge posts to.
    pub requirement_verifier: String,
    pub port: u16,
    pub server_type: ServerType,
    /// Downstream service key -> URL, with the `http://` prefix already
    /// substituted by `SERVICE_DOMAIN`. Empty in req mode.
    pub services: HashMap<String, String>,
    pub verifier_set: VerifierSetConfig,
    pub evaluator: EvaluatorConfig,
    /// Integer host identifier carried in throughput/defect facts.
    pub host_id: i64,
    /// TTL of the AddItem/EmptyCart pairing caches.
    pub cache_ttl: Duration,
    pub session_ttl: Duration,
    pub session_sweep_interval: Duration,
    /// Cadence of the derived-metrics pooler.
    pub pool_interval: Duration,
    /// Print the metrics and violation tables every this many requests.
    pub snapshot_every: u64,
    pub metrics_ring_capacity: usize,
    pub forward_timeout: Duration,
    /// gRPC cart backend, only meaningful for the grpc surface.
    pub cart_service_addr: Option<String>,
}

impl GatewayConfig {
    /// Build the configuration from the process environment and config files.
    /// Any malformed or missing file is fatal; the caller exits non-zero.
    pub fn from_env(mode: Mode, requirement_verifier: String) -> GatewayResult<Self> {
        let port = std::env::var("SERVER_PORT")
            .map_err(|_| GatewayError::Config("SERVER_PORT is not set".into()))?
            .parse::<u16>()
            .map_err(|e| GatewayError::Config(format!("invalid SERVER_PORT: {e}")))?;

        let server_type = match std::env::var("SERVER_TYPE") {
            Ok(value) => ServerType::parse(&value)?,
            Err(_) => ServerType::Http,
        };

        let requirement_verifier = std::env::var("REQUIREMENT_VERIFIER_SERVICE")
            .unwrap_or(requirement_verifier);

        let services = if mode == Mode::Obj {
            let path = std::env::var("SERVICE_PATHS_FILE")
                .unwrap_or_else(|_| DEFAULT_SERVICE_PATHS_FILE.to_string());
            let domain =
                std::env::var("SERVICE_DOMAIN").unwrap_or_else(|_| "http://".to_string());
            load_service_paths(Path::new(&path), &domain)?
        } else {
            HashMap::new()
        };

        let verifier_config = std::env::var("VERIFIER_CONFIG_FILE")
            .unwrap_or_else(|_| DEFAULT_VERIFIER_CONFIG_FILE.to_string());
        let verifier_set = VerifierSetConfig::from_file(Path::new(&verifier_config))?;

        let mut config = Self::defaults_for(mode, requirement_verifier);
        config.port = port;
        config.server_type = server_type;
        config.services = services;
        config.verifier_set = verifier_set;
        if let Ok(binary) = std::env::var("EVALUATOR_BIN") {
            config.evaluator.binary = binary;
        }
        if let Ok(dir) = std::env::var("VERIFIER_SPEC_DIR") {
            config.evaluator.spec_dir = PathBuf::from(dir);
        }
        config.cart_service_addr = std::env::var("CART_SERVICE_ADDR").ok();
        Ok(config)
    }

    /// Defaults without touching the environment or the filesystem. The
    /// starting point for tests and for `from_env`.
    pub fn defaults_for(mode: Mode, requirement_verifier: String) -> Self {
        let spec_dir = match mode {
            Mode::Obj => OBJECTIVE_SPEC_DIR,
            Mode::Req => REQUIREMENT_SPEC_DIR,
        };
        Self {
            mode,
            requirement_verifier,
            port: 0,
            server_type: ServerType::Http,
            services: HashMap::new(),
            verifier_set: VerifierSetConfig::new(Vec::new()),
            evaluator: EvaluatorConfig {
                spec_dir: PathBuf::from(spec_dir),
                ..Default::default()
            },
            host_id: 1,
            cache_ttl: Duration::from_secs(60),
            session_ttl: Duration::from_secs(60),
            session_sweep_interval: Duration::from_secs(10),
            pool_interval: Duration::from_secs(10),
            snapshot_every: 50,
            metrics_ring_capacity: 10_000,
            forward_timeout: Duration::from_secs(60),
            cart_service_addr: None,
        }
    }
}

/// Read the service-key -> URL map, substituting the `http://` prefix with
/// the deployment domain.
pub fn load_service_paths(
    path: &Path,
    domain: &str,
) -> GatewayResult<HashMap<String, String>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| GatewayError::Config(format!("failed to read {}: {e}", path.display())))?;
    let raw: HashMap<String, String> = serde_json::from_str(&content)
        .map_err(|e| GatewayError::Config(format!("failed to parse {}: {e}", path.display())))?;
    Ok(raw
        .into_iter()
        .map(|(key, url)| (key, url.replacen("http://", domain, 1)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn server_type_accepts_only_known_values() {
        assert_eq!(ServerType::parse("fastapi").unwrap(), ServerType::Http);
        assert_eq!(ServerType::parse("grpc").unwrap(), ServerType::Grpc);
        assert!(ServerType::parse("quic").is_err());
    }

    #[test]
    fn service_paths_substitute_domain() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"cart": "http://cartservice:7070/cart", "index": "http://frontend:8080/"}}"#
        )
        .unwrap();
        let paths = load_service_paths(file.path(), "http://10.0.0.7:").unwrap();
        assert_eq!(paths["cart"], "http://10.0.0.7:cartservice:7070/cart");
        assert_eq!(paths["index"], "http://10.0.0.7:frontend:8080/");
    }

    #[test]
    fn missing_service_paths_file_is_fatal() {
        let err = load_service_paths(Path::new("/nonexistent/paths.json"), "http://").unwrap_err();
        assert!(matches!(err, GatewayError::Config(_)));
    }

    #[test]
    fn spec_dir_follows_mode() {
        let obj = GatewayConfig::defaults_for(Mode::Obj, "req:9000".into());
        assert_eq!(obj.evaluator.spec_dir, PathBuf::from("edge-mon-specs"));
        let req = GatewayConfig::defaults_for(Mode::Req, "req:9000".into());
        assert_eq!(
            req.evaluator.spec_dir,
            PathBuf::from("online-boutique-reqs")
        );
    }
}
