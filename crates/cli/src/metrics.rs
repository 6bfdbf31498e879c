use anyhow::Result;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::convert::TryFrom;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-local Prometheus registry served at `/metrics`.
pub struct Metrics {
    registry: Registry,
    ingest: IntCounterVec,
    similarity: IntCounterVec,
    projection_failures: IntCounter,
    outbox_pending: IntGauge,
    failures_seen: AtomicU64,
}

impl Metrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let ingest = IntCounterVec::new(
            Opts::new("shutter_ingest_total", "Ingestion requests by outcome"),
            &["outcome"],
        )?;
        let similarity = IntCounterVec::new(
            Opts::new("shutter_similarity_total", "Similarity queries by outcome"),
            &["outcome"],
        )?;
        let projection_failures = IntCounter::with_opts(Opts::new(
            "shutter_projection_failures_total",
            "Search index projection attempts that failed",
        ))?;
        let outbox_pending = IntGauge::with_opts(Opts::new(
            "shutter_outbox_pending",
            "Projection jobs still eligible for retry",
        ))?;

        registry.register(Box::new(ingest.clone()))?;
        registry.register(Box::new(similarity.clone()))?;
        registry.register(Box::new(projection_failures.clone()))?;
        registry.register(Box::new(outbox_pending.clone()))?;

        Ok(Self {
            registry,
            ingest,
            similarity,
            projection_failures,
            outbox_pending,
            failures_seen: AtomicU64::new(0),
        })
    }

    pub fn record_ingest(&self, outcome: &str) {
        self.ingest.with_label_values(&[outcome]).inc();
    }

    pub fn record_similarity(&self, outcome: &str) {
        self.similarity.with_label_values(&[outcome]).inc();
    }

    /// Advances the failure counter to the projector's running total.
    pub fn sync_projection_failures(&self, total: u64) {
        let previous = self.failures_seen.swap(total, Ordering::SeqCst);
        if total > previous {
            self.projection_failures.inc_by(total - previous);
        }
    }

    pub fn set_outbox_pending(&self, pending: u64) {
        self.outbox_pending.set(i64::try_from(pending).unwrap_or(i64::MAX));
    }

    /// Text exposition format.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    pub fn content_type(&self) -> String {
        TextEncoder::new().format_type().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_registered_series() {
        let metrics = Metrics::new().unwrap();
        metrics.record_ingest("ok");
        metrics.record_ingest("ok");
        metrics.record_similarity("soft");
        metrics.set_outbox_pending(3);

        let text = metrics.render().unwrap();
        assert!(text.contains("shutter_ingest_total{outcome=\"ok\"} 2"));
        assert!(text.contains("shutter_similarity_total{outcome=\"soft\"} 1"));
        assert!(text.contains("shutter_outbox_pending 3"));
    }

    #[test]
    fn failure_counter_follows_running_total() {
        let metrics = Metrics::new().unwrap();
        metrics.sync_projection_failures(2);
        metrics.sync_projection_failures(2);
        metrics.sync_projection_failures(5);
        assert_eq!(metrics.projection_failures.get(), 5);
    }
}
