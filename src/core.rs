// vermon: Core - the one value the adapters and background tasks share

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use vermon_verifier::{VerdictRecord, VerifierPool};

use crate::bridge::{Objective, VerdictBridge};
use crate::config::{GatewayConfig, Mode};
use crate::error::{GatewayError, GatewayResult};
use crate::event::{self, Event, EventKind};
use crate::forwarder::{self, ForwardReply, ProxyMethod, RequestForwarder};
use crate::metrics::MetricsStore;
use crate::preprocessor::{round3, TracePreprocessor};
use crate::requirements::{RequirementMap, RequirementState};
use crate::session::SessionTracker;
use crate::violations::ViolationLog;

/// Objective verifiers fed by measured facts rather than semantic events.
pub const RESPONSE_VERIFIER: &str = "response";
pub const THROUGHPUT_VERIFIER: &str = "reqs-throughput";
pub const DEFECT_VERIFIER: &str = "rel-defect";

/// Shared gateway state. Built once at startup and passed explicitly to every
/// handler; there are no process-wide singletons.
pub struct Core {
    pub config: GatewayConfig,
    pub pool: VerifierPool,
    pub preprocessor: Mutex<TracePreprocessor>,
    pub metrics: Mutex<MetricsStore>,
    pub sessions: Mutex<SessionTracker>,
    pub violations: Mutex<ViolationLog>,
    bridge: Option<VerdictBridge>,
    requirements: Option<Mutex<RequirementState>>,
    forwarder: RequestForwarder,
}

impl Core {
    pub fn new(config: GatewayConfig) -> GatewayResult<Arc<Self>> {
        let pool = VerifierPool::spawn(&config.verifier_set, &config.evaluator)?;
        let forwarder =
            RequestForwarder::new(config.services.clone(), config.forward_timeout)?;
        let metrics = MetricsStore::new(
            config.services.keys().map(String::as_str),
            config.metrics_ring_capacity,
        );
        let mut violations = ViolationLog::new();
        let names = pool.names();
        violations.register(names.iter().map(String::as_str));

        let (bridge, requirements) = match config.mode {
            Mode::Obj => (
                Some(VerdictBridge::new(&config.requirement_verifier)?),
                None,
            ),
            Mode::Req => (
                None,
                Some(Mutex::new(RequirementState::new(RequirementMap::default()))),
            ),
        };

        let preprocessor = TracePreprocessor::new(config.cache_ttl);
        let sessions = SessionTracker::new(config.session_ttl);

        Ok(Arc::new(Self {
            config,
            pool,
            preprocessor: Mutex::new(preprocessor),
            metrics: Mutex::new(metrics),
            sessions: Mutex::new(sessions),
            violations: Mutex::new(violations),
            bridge,
            requirements,
            forwarder,
        }))
    }

    /// Route one semantic event through the preprocessor and the pool.
    pub async fn observe(&self, event: Event) {
        debug!(kind = event.kind(), "observing event");
        let facts = self.preprocessor.lock().transform(&event);
        for fact in facts {
            let records = self.pool.evaluate(&fact.line, &[fact.target.as_str()]).await;
            self.record_verdicts(&records).await;
        }
    }

    /// Count a semantic event the catalogue does not know.
    pub fn note_ignored_event(&self, kind: &str) {
        self.preprocessor.lock().note_ignored(kind);
    }

    /// Frame and submit a directly-measured objective fact (response time,
    /// pooler deltas) through the same per-target clamp the event facts use.
    pub async fn submit_objective_fact(&self, target: &str, ts: f64, body: String) {
        if !self.pool.contains(target) {
            debug!(verifier = target, "objective verifier not configured, dropping fact");
            return;
        }
        let fact = self.preprocessor.lock().route(target, ts, body);
        let records = self.pool.evaluate(&fact.line, &[fact.target.as_str()]).await;
        self.record_verdicts(&records).await;
    }

    async fn record_verdicts(&self, records: &[VerdictRecord]) {
        for record in records {
            if record.outcome.is_violated() {
                self.violations.lock().record(&record.verifier, record.at);
            }
            if let Some(bridge) = &self.bridge {
                bridge.on_verdict(record).await;
            }
        }
    }

    /// Periodic derived facts: request throughput and defect counts since the
    /// previous window.
    pub async fn submit_throughput_and_defect(&self, delta_requests: u64, delta_failures: u64) {
        let ts = event::now_ts();
        let host = self.config.host_id;
        self.submit_objective_fact(
            THROUGHPUT_VERIFIER,
            ts,
            format!("requests({host}, {delta_requests})"),
        )
        .await;
        self.submit_objective_fact(
            DEFECT_VERIFIER,
            ts,
            format!("defect({host}, {delta_failures}) totalrequests({host}, {delta_requests})"),
        )
        .await;
    }

    /// Tier-1 verdict intake; requirement mode only.
    pub async fn apply_requirement_verdict(
        &self,
        objective: Objective,
        verdict: bool,
    ) -> GatewayResult<()> {
        let Some(requirements) = &self.requirements else {
            return Err(GatewayError::InvalidPayload(
                "verdict intake is only served in requirement mode".to_string(),
            ));
        };
        let ts = event::now_ts();
        let facts = requirements.lock().apply(objective, u8::from(verdict), ts);
        for fact in facts {
            self.submit_objective_fact(&fact.verifier, ts, fact.body).await;
        }
        Ok(())
    }

    /// Current bit of one objective in the requirement table (req mode).
    pub fn requirement_bit(&self, objective: Objective) -> Option<u8> {
        self.requirements
            .as_ref()
            .map(|state| state.lock().bit(objective))
    }

    /// Proxy one client call: forward it, record latency or failure, track
    /// the session cookie, and synthesize the semantic events on success.
    pub async fn handle_proxy(
        &self,
        service: &str,
        method: ProxyMethod,
        form: Option<HashMap<String, String>>,
        path_params: &[&str],
        query: HashMap<String, String>,
    ) -> GatewayResult<(u16, serde_json::Value)> {
        let user = resolve_user(&query, form.as_ref());
        let known_session = self.sessions.lock().session_for(&user);

        let reply = match self
            .forwarder
            .forward(
                service,
                method,
                form.as_ref(),
                path_params,
                &query,
                known_session.as_deref(),
            )
            .await
        {
            Ok(reply) => reply,
            Err(e @ GatewayError::Downstream(_)) => {
                self.metrics.lock().record_failure(service);
                self.maybe_print_tables();
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        {
            let mut sessions = self.sessions.lock();
            match &reply.session_id {
                Some(sid) => sessions.bind(&user, sid),
                None => sessions.touch(&user),
            }
        }
        let session = reply.session_id.clone().or(known_session);

        if reply.is_success() {
            self.metrics.lock().record_latency(service, reply.latency_ms);
            let ts = event::now_ts();
            self.submit_objective_fact(
                RESPONSE_VERIFIER,
                ts,
                format!(
                    "responsetime({}, {})",
                    self.config.host_id,
                    round3(reply.latency_ms)
                ),
            )
            .await;
            match synthesize_event(service, method, &user, session.as_deref(), form.as_ref(), &reply, ts)
            {
                Some(event) => self.observe(event).await,
                None => self.note_ignored_event(service),
            }
        } else {
            self.metrics.lock().record_failure(service);
        }

        self.maybe_print_tables();
        Ok((reply.status, reply.body))
    }

    fn maybe_print_tables(&self) {
        let should_print = {
            let metrics = self.metrics.lock();
            let (total, _) = metrics.totals();
            total > 0 && total % self.config.snapshot_every == 0
        };
        if should_print {
            info!("request metrics:\n{}", self.metrics.lock().render_table());
            info!(
                "verifier violations:\n{}",
                self.violations.lock().render_table()
            );
        }
    }

    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
    }
}

/// Form field wins over the query parameter; only POSTs carry a form.
fn resolve_user(query: &HashMap<String, String>, form: Option<&HashMap<String, String>>) -> String {
    form.and_then(|f| f.get("user").cloned())
        .or_else(|| query.get("user").cloned())
        .unwrap_or_else(|| "user1".to_string())
}

fn synthesize_event(
    service: &str,
    method: ProxyMethod,
    user: &str,
    session: Option<&str>,
    form: Option<&HashMap<String, String>>,
    reply: &ForwardReply,
    ts: f64,
) -> Option<Event> {
    match event::event_kind_for(service, method)? {
        EventKind::AddItem => {
            let item = form.and_then(|f| f.get("product_id"))?;
            Some(Event::AddItem {
                user: user.to_string(),
                session: session.map(str::to_string),
                item: item.clone(),
                ts,
            })
        }
        EventKind::GetCart => {
            // Cart contents are only parseable from a 2xx body; a lingering
            // 302 carries no cart and must not look empty.
            if !(200..300).contains(&reply.status) {
                return None;
            }
            Some(Event::GetCart {
                user: user.to_string(),
                session: session.map(str::to_string),
                cart: forwarder::parse_cart_items(&reply.body),
                ts,
            })
        }
        EventKind::EmptyCart => Some(Event::EmptyCart {
            user: user.to_string(),
            ts,
        }),
        EventKind::Checkout => Some(Event::CartOp {
            user: user.to_string(),
            op: "checkout".to_string(),
            status: reply.status,
            ts,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_resolution_prefers_form_then_query() {
        let mut query = HashMap::new();
        let mut form = HashMap::new();
        assert_eq!(resolve_user(&query, Some(&form)), "user1");

        query.insert("user".to_string(), "alice".to_string());
        assert_eq!(resolve_user(&query, Some(&form)), "alice");

        // On a POST the form field overrides the query parameter.
        form.insert("user".to_string(), "bob".to_string());
        assert_eq!(resolve_user(&query, Some(&form)), "bob");

        // GETs have no form: the query parameter applies.
        assert_eq!(resolve_user(&query, None), "alice");
    }

    #[test]
    fn add_item_event_requires_product_id() {
        let reply = ForwardReply {
            status: 200,
            body: serde_json::json!({}),
            latency_ms: 1.0,
            session_id: None,
        };
        let mut form = HashMap::new();
        assert!(synthesize_event(
            "cart",
            ProxyMethod::Post,
            "alice",
            None,
            Some(&form),
            &reply,
            1.0
        )
        .is_none());

        form.insert("product_id".to_string(), "OLJCESPC7Z".to_string());
        let event = synthesize_event(
            "cart",
            ProxyMethod::Post,
            "alice",
            Some("s1"),
            Some(&form),
            &reply,
            1.0,
        );
        assert!(matches!(event, Some(Event::AddItem { item, .. }) if item == "OLJCESPC7Z"));
    }

    #[test]
    fn get_cart_event_skipped_on_redirect_status() {
        let reply = ForwardReply {
            status: 302,
            body: serde_json::json!(""),
            latency_ms: 1.0,
            session_id: None,
        };
        assert!(synthesize_event(
            "cart",
            ProxyMethod::Get,
            "alice",
            None,
            None,
            &reply,
            1.0
        )
        .is_none());
    }

    #[test]
    fn checkout_becomes_cart_op() {
        let reply = ForwardReply {
            status: 200,
            body: serde_json::json!({}),
            latency_ms: 1.0,
            session_id: None,
        };
        let event = synthesize_event(
            "checkout",
            ProxyMethod::Post,
            "alice",
            None,
            None,
            &reply,
            1.0,
        );
        assert!(
            matches!(event, Some(Event::CartOp { op, status, .. }) if op == "checkout" && status == 200)
        );
    }
}
