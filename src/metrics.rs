//! Metrics sink abstraction, narrow enough that tests can swap in a no-op
//! and production can swap in a Prometheus-backed registry.

use lazy_static::lazy_static;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

pub trait MetricsSink: Send + Sync {
    fn record_packet_decoded(&self, packet_id: u16);
    fn record_packet_dropped(&self, packet_id: u16, reason: &str);
    fn record_lock_wait(&self, entity_kind: &str, duration_secs: f64);
    fn record_broadcast(&self, stream: &str, member_count: usize);
    fn record_session_count(&self, n: i64);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetricsSink;

impl MetricsSink for NoopMetricsSink {
    fn record_packet_decoded(&self, _packet_id: u16) {}
    fn record_packet_dropped(&self, _packet_id: u16, _reason: &str) {}
    fn record_lock_wait(&self, _entity_kind: &str, _duration_secs: f64) {}
    fn record_broadcast(&self, _stream: &str, _member_count: usize) {}
    fn record_session_count(&self, _n: i64) {}
}

lazy_static! {
    static ref PACKETS_DECODED: IntCounterVec = IntCounterVec::new(
        Opts::new("bancho_packets_decoded_total", "Packets successfully decoded"),
        &["packet_id"]
    )
    .unwrap();
    static ref PACKETS_DROPPED: IntCounterVec = IntCounterVec::new(
        Opts::new("bancho_packets_dropped_total", "Packets dropped before or after decoding"),
        &["packet_id", "reason"]
    )
    .unwrap();
    static ref LOCK_WAIT: Histogram = Histogram::with_opts(HistogramOpts::new(
        "bancho_lock_wait_seconds",
        "Time spent waiting to acquire an entity lock"
    ))
    .unwrap();
    static ref BROADCAST_MEMBERS: IntCounterVec = IntCounterVec::new(
        Opts::new("bancho_broadcast_members_total", "Members reached by stream broadcasts"),
        &["stream"]
    )
    .unwrap();
    static ref SESSIONS_ACTIVE: IntGauge =
        IntGauge::new("bancho_sessions_active", "Currently connected sessions").unwrap();
}

/// A Prometheus-backed [`MetricsSink`]. The scrape HTTP endpoint itself is
/// out of scope; callers own exposing [`PrometheusMetricsSink::gather`]
/// behind whatever admin surface they run.
pub struct PrometheusMetricsSink {
    registry: Registry,
}

impl PrometheusMetricsSink {
    pub fn new() -> Self {
        let registry = Registry::new();
        registry.register(Box::new(PACKETS_DECODED.clone())).ok();
        registry.register(Box::new(PACKETS_DROPPED.clone())).ok();
        registry.register(Box::new(LOCK_WAIT.clone())).ok();
        registry.register(Box::new(BROADCAST_MEMBERS.clone())).ok();
        registry.register(Box::new(SESSIONS_ACTIVE.clone())).ok();
        Self { registry }
    }

    pub fn gather(&self) -> String {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&families, &mut buffer).unwrap();
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl Default for PrometheusMetricsSink {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSink for PrometheusMetricsSink {
    fn record_packet_decoded(&self, packet_id: u16) {
        PACKETS_DECODED.with_label_values(&[&packet_id.to_string()]).inc();
    }

    fn record_packet_dropped(&self, packet_id: u16, reason: &str) {
        PACKETS_DROPPED
            .with_label_values(&[&packet_id.to_string(), reason])
            .inc();
    }

    fn record_lock_wait(&self, _entity_kind: &str, duration_secs: f64) {
        LOCK_WAIT.observe(duration_secs);
    }

    fn record_broadcast(&self, stream: &str, member_count: usize) {
        BROADCAST_MEMBERS
            .with_label_values(&[stream])
            .inc_by(member_count as u64);
    }

    fn record_session_count(&self, n: i64) {
        SESSIONS_ACTIVE.set(n);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_sink_does_nothing_observable() {
        let sink = NoopMetricsSink;
        sink.record_packet_decoded(5);
        sink.record_session_count(10);
    }

    #[test]
    fn prometheus_sink_gathers_registered_families() {
        let sink = PrometheusMetricsSink::new();
        sink.record_packet_decoded(5);
        sink.record_session_count(3);
        let text = sink.gather();
        assert!(text.contains("bancho_packets_decoded_total"));
        assert!(text.contains("bancho_sessions_active"));
    }
}
