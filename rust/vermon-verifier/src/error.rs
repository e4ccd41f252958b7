// vermon-verifier: Error types

use thiserror::Error;

/// Verifier result type
pub type VerifierResult<T> = Result<T, VerifierError>;

/// Verifier error types
#[derive(Debug, Error)]
pub enum VerifierError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("missing verifier spec file: {0}")]
    SpecMissing(String),

    #[error("failed to spawn evaluator for '{name}': {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unknown verifier target: {0}")]
    UnknownTarget(String),

    #[error("verifier '{0}' queues are closed")]
    ChannelClosed(String),
}
