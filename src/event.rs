// vermon: Semantic events observed at the gateway edge

use std::time::{SystemTime, UNIX_EPOCH};

use crate::forwarder::ProxyMethod;

/// One observed client interaction, already lifted out of HTTP. Produced by
/// the request forwarder and the metrics ingress; consumed only by the
/// trace preprocessor.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    AddItem {
        user: String,
        session: Option<String>,
        item: String,
        ts: f64,
    },
    GetCart {
        user: String,
        session: Option<String>,
        cart: Vec<String>,
        ts: f64,
    },
    EmptyCart {
        user: String,
        ts: f64,
    },
    CartOp {
        user: String,
        op: String,
        status: u16,
        ts: f64,
    },
    Metrics {
        cpu: f64,
        mem: f64,
        ts: f64,
    },
}

impl Event {
    pub fn ts(&self) -> f64 {
        match self {
            Event::AddItem { ts, .. }
            | Event::GetCart { ts, .. }
            | Event::EmptyCart { ts, .. }
            | Event::CartOp { ts, .. }
            | Event::Metrics { ts, .. } => *ts,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Event::AddItem { .. } => "AddItem",
            Event::GetCart { .. } => "GetCart",
            Event::EmptyCart { .. } => "EmptyCart",
            Event::CartOp { .. } => "CartOp",
            Event::Metrics { .. } => "Metrics",
        }
    }
}

/// Which semantic event a successful proxied interaction maps to, keyed by
/// the downstream service key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    AddItem,
    GetCart,
    EmptyCart,
    /// Checkout has no dedicated event; it surfaces as a cart operation.
    Checkout,
}

pub fn event_kind_for(service: &str, method: ProxyMethod) -> Option<EventKind> {
    match (service, method) {
        ("cart", ProxyMethod::Post) => Some(EventKind::AddItem),
        ("cart", ProxyMethod::Get) => Some(EventKind::GetCart),
        ("empty", ProxyMethod::Post) => Some(EventKind::EmptyCart),
        ("checkout", ProxyMethod::Post) => Some(EventKind::Checkout),
        _ => None,
    }
}

/// Current wall clock as float seconds since the epoch, the timestamp unit
/// carried by every semantic event.
pub fn now_ts() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cart_interactions_map_to_events() {
        assert_eq!(
            event_kind_for("cart", ProxyMethod::Post),
            Some(EventKind::AddItem)
        );
        assert_eq!(
            event_kind_for("cart", ProxyMethod::Get),
            Some(EventKind::GetCart)
        );
        assert_eq!(
            event_kind_for("empty", ProxyMethod::Post),
            Some(EventKind::EmptyCart)
        );
        assert_eq!(
            event_kind_for("checkout", ProxyMethod::Post),
            Some(EventKind::Checkout)
        );
    }

    #[test]
    fn non_cart_interactions_map_to_nothing() {
        assert_eq!(event_kind_for("index", ProxyMethod::Get), None);
        assert_eq!(event_kind_for("currency", ProxyMethod::Post), None);
        assert_eq!(event_kind_for("logout", ProxyMethod::Get), None);
        assert_eq!(event_kind_for("product", ProxyMethod::Get), None);
    }
}
