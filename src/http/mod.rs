// vermon: HTTP protocol surface (the `fastapi` SERVER_TYPE)

pub mod obj;
pub mod req;

use std::sync::Arc;

use axum::Router;
use tracing::info;

use crate::config::Mode;
use crate::core::Core;
use crate::error::GatewayResult;

/// Router for the configured process mode.
pub fn router(core: Arc<Core>) -> Router {
    match core.config.mode {
        Mode::Obj => obj::router(core),
        Mode::Req => req::router(core),
    }
}

/// Bind the configured port and serve until interrupted.
pub async fn serve(core: Arc<Core>) -> GatewayResult<()> {
    let addr = format!("0.0.0.0:{}", core.config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, mode = ?core.config.mode, "gateway listening");

    let app = router(Arc::clone(&core));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
