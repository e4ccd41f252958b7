// vermon: Request forwarder - proxies client calls to the configured downstreams

use std::collections::HashMap;
use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, COOKIE, SET_COOKIE};
use reqwest::redirect::Policy;
use tracing::debug;

use crate::error::{GatewayError, GatewayResult};
use crate::session::SESSION_COOKIE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyMethod {
    Get,
    Post,
}

impl ProxyMethod {
    fn as_reqwest(&self) -> reqwest::Method {
        match self {
            ProxyMethod::Get => reqwest::Method::GET,
            ProxyMethod::Post => reqwest::Method::POST,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyMethod::Get => "GET",
            ProxyMethod::Post => "POST",
        }
    }
}

/// Result of one forwarded call.
#[derive(Debug)]
pub struct ForwardReply {
    pub status: u16,
    /// Parsed JSON body, or the raw text wrapped in a JSON string.
    pub body: serde_json::Value,
    pub latency_ms: f64,
    /// Session id from a `Set-Cookie: shop_session-id=...` response header.
    pub session_id: Option<String>,
}

impl ForwardReply {
    /// Whether the interaction counts as observed traffic (2xx, or a 302
    /// that survived the single redirect hop).
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status) || self.status == 302
    }
}

/// Stateless HTTP proxy over the configured service map. Cookies are managed
/// by the caller through the session tracker, not by a client cookie store.
pub struct RequestForwarder {
    client: reqwest::Client,
    services: HashMap<String, String>,
}

impl RequestForwarder {
    pub fn new(services: HashMap<String, String>, timeout: Duration) -> GatewayResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(Policy::limited(1))
            .build()
            .map_err(|e| GatewayError::Config(format!("failed to build http client: {e}")))?;
        Ok(Self { client, services })
    }

    pub fn service_keys(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }

    /// Forward one call, preserving method, form body, query string, and the
    /// session cookie. Network errors surface as `Downstream`, which the HTTP
    /// layer maps to 502.
    pub async fn forward(
        &self,
        service: &str,
        method: ProxyMethod,
        form: Option<&HashMap<String, String>>,
        path_params: &[&str],
        query: &HashMap<String, String>,
        session_id: Option<&str>,
    ) -> GatewayResult<ForwardReply> {
        let base = self
            .services
            .get(service)
            .ok_or_else(|| GatewayError::UnknownService(service.to_string()))?;
        let url = if path_params.is_empty() {
            base.clone()
        } else {
            format!("{}/{}", base.trim_end_matches('/'), path_params.join("/"))
        };

        let mut request = self.client.request(method.as_reqwest(), &url);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(form) = form {
            request = request.form(form);
        }
        if let Some(sid) = session_id {
            request = request.header(COOKIE, format!("{SESSION_COOKIE}={sid}"));
        }

        let started = Instant::now();
        let response = request
            .send()
            .await
            .map_err(|e| GatewayError::Downstream(e.to_string()))?;
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        let status = response.status().as_u16();
        let session_id = extract_session_cookie(response.headers());
        let bytes = response
            .bytes()
            .await
            .map_err(|e| GatewayError::Downstream(e.to_string()))?;
        let body = match serde_json::from_slice::<serde_json::Value>(&bytes) {
            Ok(value) => value,
            Err(_) => serde_json::Value::String(String::from_utf8_lossy(&bytes).into_owned()),
        };

        debug!(service, %url, status, latency_ms, "forwarded request");
        Ok(ForwardReply {
            status,
            body,
            latency_ms,
            session_id,
        })
    }
}

fn extract_session_cookie(headers: &HeaderMap) -> Option<String> {
    let prefix = format!("{SESSION_COOKIE}=");
    headers.get_all(SET_COOKIE).iter().find_map(|value| {
        let value = value.to_str().ok()?;
        let rest = value.strip_prefix(&prefix)?;
        Some(rest.split(';').next()?.trim().to_string())
    })
}

/// Best-effort extraction of item ids from a cart response body. A body that
/// does not look like a cart yields an empty list and never fails the call.
pub fn parse_cart_items(body: &serde_json::Value) -> Vec<String> {
    body.get("items")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    item.get("product_id")
                        .or_else(|| item.get("id"))
                        .and_then(|v| v.as_str())
                        .map(str::to_string)
                })
                .collect()
        })
        .unwrap_or_default()
}
