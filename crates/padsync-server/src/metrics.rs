//! Prometheus metrics for padsync

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

/// padsync metrics collector
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,

    // Connection metrics
    pub connections_total: IntCounter,
    pub connections_active: IntGauge,

    // Message metrics, labeled by outcome
    pub messages_total: IntCounterVec,

    // Room metrics
    pub rooms_active: IntGauge,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        let registry = Registry::new();

        let connections_total = IntCounter::new(
            "padsync_connections_total",
            "Total number of accepted connections",
        )
        .unwrap();

        let connections_active = IntGauge::new(
            "padsync_connections_active",
            "Number of active connections",
        )
        .unwrap();

        let messages_total = IntCounterVec::new(
            Opts::new("padsync_messages_total", "Total messages processed"),
            &["outcome"],
        )
        .unwrap();

        let rooms_active =
            IntGauge::new("padsync_rooms_active", "Number of live rooms").unwrap();

        registry.register(Box::new(connections_total.clone())).unwrap();
        registry.register(Box::new(connections_active.clone())).unwrap();
        registry.register(Box::new(messages_total.clone())).unwrap();
        registry.register(Box::new(rooms_active.clone())).unwrap();

        Self {
            registry,
            connections_total,
            connections_active,
            messages_total,
            rooms_active,
        }
    }

    /// Record a new connection
    pub fn record_connection(&self) {
        self.connections_total.inc();
        self.connections_active.inc();
    }

    /// Record a connection closed
    pub fn record_disconnection(&self) {
        self.connections_active.dec();
    }

    /// Record a processed message by outcome ("ok" or "malformed")
    pub fn record_message(&self, outcome: &str) {
        self.messages_total.with_label_values(&[outcome]).inc();
    }

    /// Export metrics in Prometheus text format
    pub fn export(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if encoder.encode(&metric_families, &mut buffer).is_err() {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
