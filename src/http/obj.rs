// vermon: Objective-mode HTTP surface - the proxied shop endpoints

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde::Deserialize;
use tracing::info;

use crate::core::Core;
use crate::error::GatewayResult;
use crate::event::{self, Event};
use crate::forwarder::ProxyMethod;

pub fn router(core: Arc<Core>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/cart", get(get_cart).post(add_to_cart))
        .route("/cart/empty", post(empty_cart))
        .route("/cart/checkout", post(checkout))
        .route("/logout", get(logout))
        .route("/product/:product_id", get(get_product))
        .route("/setCurrency", post(set_currency))
        .route("/metrics", post(ingest_metrics))
        .route("/healthz", get(healthz))
        .with_state(core)
}

/// Pass the downstream's final status and parsed body straight through.
fn proxy_response(status: u16, body: serde_json::Value) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
    (status, Json(body)).into_response()
}

async fn index(
    State(core): State<Arc<Core>>,
    Query(query): Query<HashMap<String, String>>,
) -> GatewayResult<Response> {
    let (status, body) = core
        .handle_proxy("index", ProxyMethod::Get, None, &[], query)
        .await?;
    Ok(proxy_response(status, body))
}

async fn get_cart(
    State(core): State<Arc<Core>>,
    Query(query): Query<HashMap<String, String>>,
) -> GatewayResult<Response> {
    let (status, body) = core
        .handle_proxy("cart", ProxyMethod::Get, None, &[], query)
        .await?;
    Ok(proxy_response(status, body))
}

#[derive(Debug, Deserialize)]
struct AddToCartForm {
    product_id: String,
    quantity: i64,
    user: String,
}

async fn add_to_cart(
    State(core): State<Arc<Core>>,
    Query(query): Query<HashMap<String, String>>,
    Form(form): Form<AddToCartForm>,
) -> GatewayResult<Response> {
    let data = HashMap::from([
        ("product_id".to_string(), form.product_id),
        ("quantity".to_string(), form.quantity.to_string()),
        ("user".to_string(), form.user),
    ]);
    let (status, body) = core
        .handle_proxy("cart", ProxyMethod::Post, Some(data), &[], query)
        .await?;
    Ok(proxy_response(status, body))
}

async fn empty_cart(
    State(core): State<Arc<Core>>,
    Query(query): Query<HashMap<String, String>>,
) -> GatewayResult<Response> {
    let (status, body) = core
        .handle_proxy("empty", ProxyMethod::Post, None, &[], query)
        .await?;
    Ok(proxy_response(status, body))
}

#[derive(Debug, Deserialize)]
struct CheckoutForm {
    email: String,
    street_address: String,
    zip_code: String,
    city: String,
    state: String,
    country: String,
    credit_card_number: String,
    credit_card_expiration_month: i64,
    credit_card_expiration_year: i64,
    credit_card_cvv: String,
}

async fn checkout(
    State(core): State<Arc<Core>>,
    Query(query): Query<HashMap<String, String>>,
    Form(form): Form<CheckoutForm>,
) -> GatewayResult<Response> {
    let data = HashMap::from([
        ("email".to_string(), form.email),
        ("street_address".to_string(), form.street_address),
        ("zip_code".to_string(), form.zip_code),
        ("city".to_string(), form.city),
        ("state".to_string(), form.state),
        ("country".to_string(), form.country),
        ("credit_card_number".to_string(), form.credit_card_number),
        (
            "credit_card_expiration_month".to_string(),
            form.credit_card_expiration_month.to_string(),
        ),
        (
            "credit_card_expiration_year".to_string(),
            form.credit_card_expiration_year.to_string(),
        ),
        ("credit_card_cvv".to_string(), form.credit_card_cvv),
    ]);
    let (status, body) = core
        .handle_proxy("checkout", ProxyMethod::Post, Some(data), &[], query)
        .await?;
    Ok(proxy_response(status, body))
}

async fn logout(
    State(core): State<Arc<Core>>,
    Query(query): Query<HashMap<String, String>>,
) -> GatewayResult<Response> {
    let (status, body) = core
        .handle_proxy("logout", ProxyMethod::Get, None, &[], query)
        .await?;
    Ok(proxy_response(status, body))
}

async fn get_product(
    State(core): State<Arc<Core>>,
    Path(product_id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> GatewayResult<Response> {
    let (status, body) = core
        .handle_proxy(
            "product",
            ProxyMethod::Get,
            None,
            &[product_id.as_str()],
            query,
        )
        .await?;
    Ok(proxy_response(status, body))
}

#[derive(Debug, Deserialize)]
struct SetCurrencyForm {
    currency_code: String,
}

async fn set_currency(
    State(core): State<Arc<Core>>,
    Query(query): Query<HashMap<String, String>>,
    Form(form): Form<SetCurrencyForm>,
) -> GatewayResult<Response> {
    let data = HashMap::from([("currency_code".to_string(), form.currency_code)]);
    let (status, body) = core
        .handle_proxy("currency", ProxyMethod::Post, Some(data), &[], query)
        .await?;
    Ok(proxy_response(status, body))
}

#[derive(Debug, Default, Deserialize)]
struct MetricsBody {
    #[serde(default)]
    cpu: f64,
    #[serde(default)]
    memory: f64,
}

#[derive(Debug, Deserialize)]
struct MetricsIngest {
    #[serde(default)]
    service_name: String,
    #[serde(default)]
    metrics: MetricsBody,
}

/// Host metrics ingress, called by the external metrics agent.
async fn ingest_metrics(
    State(core): State<Arc<Core>>,
    Json(payload): Json<MetricsIngest>,
) -> Json<serde_json::Value> {
    info!(
        "[{}] CPU: {:.2}% | Memory: {:.2} MB",
        payload.service_name.to_uppercase(),
        payload.metrics.cpu,
        payload.metrics.memory
    );
    core.observe(Event::Metrics {
        cpu: payload.metrics.cpu,
        mem: payload.metrics.memory,
        ts: event::now_ts(),
    })
    .await;
    Json(serde_json::json!({"status": "ok"}))
}

async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "OK"}))
}
