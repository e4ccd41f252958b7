// vermon: Requirement-mode HTTP surface - tier-1 verdict intake

use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde::{Deserialize, Deserializer};

use crate::bridge::Objective;
use crate::core::Core;
use crate::error::GatewayResult;

pub fn router(core: Arc<Core>) -> Router {
    Router::new()
        .route("/response", post(response_verdict))
        .route("/reqs-throughput", post(throughput_verdict))
        .route("/rel-defect", post(defect_verdict))
        .route("/healthz", get(healthz))
        .with_state(core)
}

#[derive(Debug, Deserialize)]
struct VerdictForm {
    #[serde(deserialize_with = "bool_from_form")]
    verdict: bool,
}

/// Verdicts arrive as `true`/`false` or `1`/`0` depending on the sender.
fn bool_from_form<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    match raw.as_str() {
        "true" | "True" | "1" => Ok(true),
        "false" | "False" | "0" => Ok(false),
        other => Err(serde::de::Error::custom(format!(
            "invalid verdict value '{other}'"
        ))),
    }
}

async fn response_verdict(
    State(core): State<Arc<Core>>,
    Form(form): Form<VerdictForm>,
) -> GatewayResult<Json<serde_json::Value>> {
    core.apply_requirement_verdict(Objective::Response, form.verdict)
        .await?;
    Ok(Json(serde_json::json!({"status": "OK"})))
}

async fn throughput_verdict(
    State(core): State<Arc<Core>>,
    Form(form): Form<VerdictForm>,
) -> GatewayResult<Json<serde_json::Value>> {
    core.apply_requirement_verdict(Objective::ReqsThroughput, form.verdict)
        .await?;
    Ok(Json(serde_json::json!({"status": "OK"})))
}

async fn defect_verdict(
    State(core): State<Arc<Core>>,
    Form(form): Form<VerdictForm>,
) -> GatewayResult<Json<serde_json::Value>> {
    core.apply_requirement_verdict(Objective::RelDefect, form.verdict)
        .await?;
    Ok(Json(serde_json::json!({"status": "OK"})))
}

async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "OK"}))
}
