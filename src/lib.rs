// vermon: Runtime verification gateway
// Proxies a shopping-style microservice app, lifts the traffic into MFOTL
// traces, and judges tier-1 objectives plus tier-2 composite requirements

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod bridge;
pub mod config;
pub mod core;
pub mod error;
pub mod event;
pub mod forwarder;
#[cfg(feature = "grpc")]
pub mod grpc;
pub mod http;
pub mod metrics;
pub mod pooler;
pub mod preprocessor;
pub mod requirements;
pub mod session;
pub mod table;
pub mod violations;

use std::sync::Arc;

pub use crate::core::Core;
pub use config::{GatewayConfig, Mode, ServerType};
pub use error::{GatewayError, GatewayResult};

/// Build the core, start the background tasks for the configured mode, and
/// serve the selected protocol surface until shutdown.
pub async fn run(config: GatewayConfig) -> GatewayResult<()> {
    let mode = config.mode;
    let server_type = config.server_type;
    let core = Core::new(config)?;

    let mut background = Vec::new();
    if mode == Mode::Obj {
        background.push(session::spawn_sweeper(
            Arc::clone(&core),
            core.config.session_sweep_interval,
        ));
        background.push(pooler::spawn(Arc::clone(&core), core.config.pool_interval));
    }

    let result = match server_type {
        ServerType::Http => http::serve(Arc::clone(&core)).await,
        ServerType::Grpc => serve_grpc(Arc::clone(&core)).await,
    };

    for task in background {
        task.abort();
    }
    core.shutdown().await;
    result
}

#[cfg(feature = "grpc")]
async fn serve_grpc(core: Arc<Core>) -> GatewayResult<()> {
    grpc::serve(core).await
}

#[cfg(not(feature = "grpc"))]
async fn serve_grpc(_core: Arc<Core>) -> GatewayResult<()> {
    Err(GatewayError::Config(
        "SERVER_TYPE=grpc but the gRPC surface is not compiled in; rebuild with --features grpc"
            .to_string(),
    ))
}
