// vermon: Trace preprocessor - turns semantic events into routed predicate facts

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use tracing::debug;

use crate::event::Event;

/// Tier-1 cart verifier targets.
pub const LATENCY_VERIFIER: &str = "R1.1_latency";
pub const EMPTY_CART_LATENCY_VERIFIER: &str = "R1.2_empty_cart_latency";
pub const EMPTY_CART_SEQUENCE_VERIFIER: &str = "R1.2_empty_cart_sequence";
pub const FAILURE_RATE_VERIFIER: &str = "R1.3_failure_rate";
pub const RESOURCE_USAGE_VERIFIER: &str = "R1.4_resource_usage";

/// One framed fact line destined for one verifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutedFact {
    pub target: String,
    pub line: String,
}

/// Stateful event-to-fact transformer.
///
/// Owns the temporal pairing caches and the per-target clamp that keeps
/// every verifier's timestamp stream non-decreasing. Callers serialize access
/// through a mutex; the caches must never be observed mid-update.
pub struct TracePreprocessor {
    /// (user, session) -> FIFO of AddItem timestamps awaiting a GetCart.
    add_item: HashMap<(String, String), VecDeque<f64>>,
    /// user -> EmptyCart timestamp awaiting an empty GetCart.
    empty_cart: HashMap<String, f64>,
    ttl: f64,
    /// Highest timestamp already emitted per target.
    last_ts: HashMap<String, u64>,
    ignored_events: u64,
}

impl TracePreprocessor {
    pub fn new(ttl: Duration) -> Self {
        Self {
            add_item: HashMap::new(),
            empty_cart: HashMap::new(),
            ttl: ttl.as_secs_f64(),
            last_ts: HashMap::new(),
            ignored_events: 0,
        }
    }

    /// Transform one semantic event into zero or more routed facts.
    pub fn transform(&mut self, event: &Event) -> Vec<RoutedFact> {
        match event {
            Event::AddItem {
                user, session, ts, ..
            } => {
                let key = (user.clone(), session.clone().unwrap_or_default());
                self.add_item.entry(key).or_default().push_back(*ts);
                Vec::new()
            }
            Event::EmptyCart { user, ts } => {
                self.empty_cart.insert(user.clone(), *ts);
                Vec::new()
            }
            Event::GetCart {
                user,
                session,
                cart,
                ts,
            } => self.get_cart(user, session.as_deref().unwrap_or(""), cart, *ts),
            Event::CartOp {
                user, op, status, ts,
            } => {
                let label = if (200..300).contains(status) { "ok" } else { "fail" };
                vec![self.route(
                    FAILURE_RATE_VERIFIER,
                    *ts,
                    format!(r#"CartOp("{user}", "{op}", "{label}")"#),
                )]
            }
            Event::Metrics { cpu, mem, ts } => {
                vec![self.route(
                    RESOURCE_USAGE_VERIFIER,
                    *ts,
                    format!("CartServiceUsage({cpu}, {mem})"),
                )]
            }
        }
    }

    fn get_cart(&mut self, user: &str, session: &str, cart: &[String], ts: f64) -> Vec<RoutedFact> {
        self.sweep(ts);
        let mut facts = Vec::new();

        if cart.is_empty() {
            if let Some(cached) = self.empty_cart.remove(user) {
                let latency = round3(ts - cached);
                facts.push(self.route(
                    EMPTY_CART_LATENCY_VERIFIER,
                    ts,
                    format!(r#"cart_empty_latency("{user}", {latency})"#),
                ));
            }
        }

        let key = (user.to_string(), session.to_string());
        // Each cached AddItem timestamp pairs with at most one GetCart.
        let popped = if let Some(queue) = self.add_item.get_mut(&key) {
            let t0 = queue.pop_front();
            if queue.is_empty() {
                self.add_item.remove(&key);
            }
            t0
        } else {
            None
        };
        if let Some(t0) = popped {
            let latency = round3(ts - t0);
            facts.push(self.route(
                LATENCY_VERIFIER,
                ts,
                format!(r#"reflect_latency("{user}", {latency})"#),
            ));
        }

        // The sequence monitor sees every GetCart, expired caches or not.
        facts.push(self.route(
            EMPTY_CART_SEQUENCE_VERIFIER,
            ts,
            format!(r#"GetCart("{user}")"#),
        ));
        facts
    }

    /// Frame a fact body for a target, clamping the timestamp so the target's
    /// stream stays non-decreasing.
    pub fn route(&mut self, target: &str, ts: f64, body: String) -> RoutedFact {
        let mut secs = if ts <= 0.0 { 0 } else { ts.floor() as u64 };
        let last = self.last_ts.entry(target.to_string()).or_insert(0);
        if secs < *last {
            secs = *last;
        }
        *last = secs;
        RoutedFact {
            target: target.to_string(),
            line: vermon_verifier::frame(secs, &body),
        }
    }

    /// Drop cache entries older than the TTL. Runs before every lookup so no
    /// expired entry is ever read.
    fn sweep(&mut self, now: f64) {
        let ttl = self.ttl;
        for queue in self.add_item.values_mut() {
            while queue.front().is_some_and(|t0| now - t0 > ttl) {
                queue.pop_front();
            }
        }
        self.add_item.retain(|_, queue| !queue.is_empty());
        self.empty_cart.retain(|_, t0| now - *t0 <= ttl);
    }

    /// Count an event the catalogue does not know. Dropped silently apart
    /// from this counter.
    pub fn note_ignored(&mut self, kind: &str) {
        self.ignored_events += 1;
        debug!(kind, total = self.ignored_events, "ignored semantic event");
    }

    pub fn ignored_events(&self) -> u64 {
        self.ignored_events
    }

    pub fn cached_add_items(&self) -> usize {
        self.add_item.values().map(VecDeque::len).sum()
    }

    pub fn cached_empty_carts(&self) -> usize {
        self.empty_cart.len()
    }
}

pub(crate) fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pre() -> TracePreprocessor {
        TracePreprocessor::new(Duration::from_secs(60))
    }

    fn add_item(user: &str, session: &str, item: &str, ts: f64) -> Event {
        Event::AddItem {
            user: user.into(),
            session: Some(session.into()),
            item: item.into(),
            ts,
        }
    }

    fn get_cart(user: &str, session: &str, cart: &[&str], ts: f64) -> Event {
        Event::GetCart {
            user: user.into(),
            session: Some(session.into()),
            cart: cart.iter().map(|s| s.to_string()).collect(),
            ts,
        }
    }

    #[test]
    fn add_item_then_get_cart_emits_reflect_latency() {
        let mut p = pre();
        assert!(p.transform(&add_item("alice", "s1", "OLJCESPC7Z", 100.0)).is_empty());

        let facts = p.transform(&get_cart("alice", "s1", &["OLJCESPC7Z"], 100.12));
        assert_eq!(facts.len(), 2);
        assert_eq!(facts[0].target, LATENCY_VERIFIER);
        assert_eq!(facts[0].line, r#"@100 reflect_latency("alice", 0.12)"#);
        assert_eq!(facts[1].target, EMPTY_CART_SEQUENCE_VERIFIER);
        assert_eq!(facts[1].line, r#"@100 GetCart("alice")"#);
    }

    #[test]
    fn cached_timestamps_are_consumed_fifo_and_at_most_once() {
        let mut p = pre();
        p.transform(&add_item("alice", "sX", "A", 10.0));
        p.transform(&add_item("alice", "sX", "B", 11.0));

        let first = p.transform(&get_cart("alice", "sX", &["A", "B"], 12.0));
        assert_eq!(first[0].line, r#"@12 reflect_latency("alice", 2)"#);

        let second = p.transform(&get_cart("alice", "sX", &["A", "B"], 13.0));
        assert_eq!(second[0].line, r#"@13 reflect_latency("alice", 2)"#);

        // Both cached timestamps are spent now.
        let third = p.transform(&get_cart("alice", "sX", &["A", "B"], 14.0));
        assert_eq!(third.len(), 1);
        assert_eq!(third[0].target, EMPTY_CART_SEQUENCE_VERIFIER);
    }

    #[test]
    fn expired_add_item_is_swept_but_sequence_fact_still_emitted() {
        let mut p = pre();
        p.transform(&add_item("alice", "s1", "A", 0.0));

        let facts = p.transform(&get_cart("alice", "s1", &["A"], 120.0));
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].target, EMPTY_CART_SEQUENCE_VERIFIER);
        assert_eq!(p.cached_add_items(), 0);
    }

    #[test]
    fn empty_cart_pairing_requires_empty_cart_contents() {
        let mut p = pre();
        p.transform(&Event::EmptyCart {
            user: "bob".into(),
            ts: 50.0,
        });

        // Cart still has items: no pairing, entry stays.
        let facts = p.transform(&get_cart("bob", "s1", &["A"], 51.0));
        assert_eq!(facts.len(), 1);
        assert_eq!(p.cached_empty_carts(), 1);

        let facts = p.transform(&get_cart("bob", "s1", &[], 52.5));
        assert_eq!(facts.len(), 2);
        assert_eq!(facts[0].target, EMPTY_CART_LATENCY_VERIFIER);
        assert_eq!(facts[0].line, r#"@52 cart_empty_latency("bob", 2.5)"#);
        // Entry consumed.
        assert_eq!(p.cached_empty_carts(), 0);
        let facts = p.transform(&get_cart("bob", "s1", &[], 53.0));
        assert_eq!(facts.len(), 1);
    }

    #[test]
    fn cart_op_labels_follow_status() {
        let mut p = pre();
        let ok = p.transform(&Event::CartOp {
            user: "alice".into(),
            op: "checkout".into(),
            status: 200,
            ts: 5.0,
        });
        assert_eq!(ok[0].target, FAILURE_RATE_VERIFIER);
        assert_eq!(ok[0].line, r#"@5 CartOp("alice", "checkout", "ok")"#);

        let fail = p.transform(&Event::CartOp {
            user: "alice".into(),
            op: "checkout".into(),
            status: 302,
            ts: 6.0,
        });
        assert_eq!(fail[0].line, r#"@6 CartOp("alice", "checkout", "fail")"#);
    }

    #[test]
    fn metrics_route_to_resource_usage() {
        let mut p = pre();
        let facts = p.transform(&Event::Metrics {
            cpu: 12.5,
            mem: 256.0,
            ts: 9.0,
        });
        assert_eq!(facts[0].target, RESOURCE_USAGE_VERIFIER);
        assert_eq!(facts[0].line, "@9 CartServiceUsage(12.5, 256)");
    }

    #[test]
    fn timestamps_are_clamped_per_target() {
        let mut p = pre();
        let first = p.route(FAILURE_RATE_VERIFIER, 100.0, "CartOp(\"a\", \"x\", \"ok\")".into());
        assert!(first.line.starts_with("@100 "));

        // An earlier timestamp for the same target is clamped forward.
        let second = p.route(FAILURE_RATE_VERIFIER, 90.0, "CartOp(\"a\", \"y\", \"ok\")".into());
        assert!(second.line.starts_with("@100 "));

        // Other targets keep their own clock.
        let other = p.route(RESOURCE_USAGE_VERIFIER, 90.0, "CartServiceUsage(1, 2)".into());
        assert!(other.line.starts_with("@90 "));
    }

    #[test]
    fn ignored_events_are_counted() {
        let mut p = pre();
        p.note_ignored("Unknown");
        p.note_ignored("Unknown");
        assert_eq!(p.ignored_events(), 2);
    }
}
