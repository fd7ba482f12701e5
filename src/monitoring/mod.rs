use anyhow::Result;
use prometheus::{
    Counter, CounterVec, Encoder, Gauge, Histogram, HistogramOpts, Opts, Registry, TextEncoder,
};
use tracing::{info, warn};

use crate::ice_phishing::alerts::{Alert, Severity};

pub struct DetectorMetrics {
    registry: Registry,

    // Event metrics
    pub transactions_processed: Counter,
    pub events_dropped: Counter,
    pub approvals_recorded: Counter,
    pub transfers_correlated: Counter,

    // Alert metrics
    pub alerts_emitted: CounterVec,

    // Classifier metrics
    pub cache_hits: Counter,
    pub cache_misses: Counter,
    pub collaborator_errors: CounterVec,

    // State metrics
    pub tracked_spenders: Gauge,
    pub sweeps: Counter,
    pub buckets_reclaimed: Counter,

    // Performance metrics
    pub transaction_latency: Histogram,
}

impl DetectorMetrics {
    pub fn new() -> Result<Self> {
        info!("📊 Initializing detector metrics");

        let registry = Registry::new();

        let transactions_processed = Counter::new(
            "ice_phishing_transactions_total",
            "Total number of transactions processed",
        )?;
        let events_dropped = Counter::new(
            "ice_phishing_events_dropped_total",
            "Approval or transfer events dropped because an address could not be classified",
        )?;
        let approvals_recorded = Counter::new(
            "ice_phishing_approvals_recorded_total",
            "Total number of approvals tracked",
        )?;
        let transfers_correlated = Counter::new(
            "ice_phishing_transfers_correlated_total",
            "Total number of transfers linked to a tracked approval",
        )?;

        let alerts_emitted = CounterVec::new(
            Opts::new("ice_phishing_alerts_total", "Total number of alerts emitted"),
            &["alert_id", "severity"],
        )?;

        let cache_hits = Counter::new("ice_phishing_cache_hits_total", "Classifier cache hits")?;
        let cache_misses =
            Counter::new("ice_phishing_cache_misses_total", "Classifier cache misses")?;
        let collaborator_errors = CounterVec::new(
            Opts::new(
                "ice_phishing_collaborator_errors_total",
                "Failed or timed out collaborator calls",
            ),
            &["collaborator"],
        )?;

        let tracked_spenders =
            Gauge::new("ice_phishing_tracked_spenders", "Number of spender buckets held")?;
        let sweeps = Counter::new("ice_phishing_sweeps_total", "Total number of retention sweeps")?;
        let buckets_reclaimed = Counter::new(
            "ice_phishing_buckets_reclaimed_total",
            "Spender buckets removed by sweeps",
        )?;

        let transaction_latency = Histogram::with_opts(HistogramOpts::new(
            "ice_phishing_transaction_seconds",
            "Time spent processing one transaction",
        ))?;

        registry.register(Box::new(transactions_processed.clone()))?;
        registry.register(Box::new(events_dropped.clone()))?;
        registry.register(Box::new(approvals_recorded.clone()))?;
        registry.register(Box::new(transfers_correlated.clone()))?;
        registry.register(Box::new(alerts_emitted.clone()))?;
        registry.register(Box::new(cache_hits.clone()))?;
        registry.register(Box::new(cache_misses.clone()))?;
        registry.register(Box::new(collaborator_errors.clone()))?;
        registry.register(Box::new(tracked_spenders.clone()))?;
        registry.register(Box::new(sweeps.clone()))?;
        registry.register(Box::new(buckets_reclaimed.clone()))?;
        registry.register(Box::new(transaction_latency.clone()))?;

        info!("✅ Detector metrics initialized");

        Ok(Self {
            registry,
            transactions_processed,
            events_dropped,
            approvals_recorded,
            transfers_correlated,
            alerts_emitted,
            cache_hits,
            cache_misses,
            collaborator_errors,
            tracked_spenders,
            sweeps,
            buckets_reclaimed,
            transaction_latency,
        })
    }

    pub fn export_metrics(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    pub fn record_transaction(&self, seconds: f64) {
        self.transactions_processed.inc();
        self.transaction_latency.observe(seconds);
    }

    pub fn record_event_dropped(&self) {
        self.events_dropped.inc();
    }

    pub fn record_approval(&self) {
        self.approvals_recorded.inc();
    }

    pub fn record_correlated_transfer(&self) {
        self.transfers_correlated.inc();
    }

    pub fn record_alert(&self, alert: &Alert) {
        let severity = match alert.severity {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        self.alerts_emitted.with_label_values(&[alert.alert_id.as_str(), severity]).inc();
    }

    pub fn record_cache_lookup(&self, hit: bool) {
        if hit {
            self.cache_hits.inc();
        } else {
            self.cache_misses.inc();
        }
    }

    pub fn record_collaborator_error(&self, collaborator: &str) {
        self.collaborator_errors.with_label_values(&[collaborator]).inc();
        warn!("📊 Recorded {} collaborator error", collaborator);
    }

    pub fn set_tracked_spenders(&self, count: usize) {
        self.tracked_spenders.set(count as f64);
    }

    pub fn record_sweep(&self, buckets_removed: usize) {
        self.sweeps.inc();
        self.buckets_reclaimed.inc_by(buckets_removed as f64);
    }
}
