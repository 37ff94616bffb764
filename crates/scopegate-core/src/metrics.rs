//! ---
//! sg_section: "04-resolution-evaluation"
//! sg_subsection: "module"
//! sg_type: "source"
//! sg_scope: "code"
//! sg_description: "Prometheus collectors for authorization decisions."
//! sg_version: "v0.1.0"
//! sg_owner: "tbd"
//! ---
use prometheus::{Histogram, HistogramOpts, IntCounterVec, Opts, Registry};
use std::sync::Arc;

use crate::evaluator::Verdict;
use crate::resolver::StoreKind;

/// Authorization metrics exported via Prometheus.
#[derive(Clone)]
pub struct AuthzMetrics {
    registry: Arc<Registry>,
    decisions_total: IntCounterVec,
    rejected_claims_total: IntCounterVec,
    store_failures_total: IntCounterVec,
    evaluation_seconds: Histogram,
}

impl AuthzMetrics {
    /// Register metrics with the provided registry.
    pub fn new(registry: Arc<Registry>) -> anyhow::Result<Self> {
        let decisions_total = IntCounterVec::new(
            Opts::new("scopegate_decisions_total", "Authorization decisions by verdict"),
            &["verdict"],
        )?;
        let rejected_claims_total = IntCounterVec::new(
            Opts::new(
                "scopegate_rejected_claims_total",
                "Malformed claims or directives skipped during resolution",
            ),
            &["kind"],
        )?;
        let store_failures_total = IntCounterVec::new(
            Opts::new(
                "scopegate_store_failures_total",
                "Store calls that failed or timed out",
            ),
            &["store"],
        )?;
        let evaluation_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "scopegate_evaluation_seconds",
                "Time spent resolving and evaluating one request",
            )
            .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5]),
        )?;

        registry.register(Box::new(decisions_total.clone()))?;
        registry.register(Box::new(rejected_claims_total.clone()))?;
        registry.register(Box::new(store_failures_total.clone()))?;
        registry.register(Box::new(evaluation_seconds.clone()))?;

        Ok(Self {
            registry,
            decisions_total,
            rejected_claims_total,
            store_failures_total,
            evaluation_seconds,
        })
    }

    /// Access the underlying registry.
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Count one decision.
    pub fn record_decision(&self, verdict: Verdict) {
        self.decisions_total
            .with_label_values(&[verdict.as_str()])
            .inc();
    }

    /// Count skipped claims of `kind` (`role_claim`, `directive`).
    pub fn record_rejected(&self, kind: &str, count: usize) {
        if count > 0 {
            self.rejected_claims_total
                .with_label_values(&[kind])
                .inc_by(count as u64);
        }
    }

    /// Count one failed store call.
    pub fn record_store_failure(&self, store: StoreKind) {
        self.store_failures_total
            .with_label_values(&[store.as_str()])
            .inc();
    }

    /// Observe end-to-end evaluation latency.
    pub fn observe_evaluation(&self, seconds: f64) {
        self.evaluation_seconds.observe(seconds);
    }

    /// Current decision count for `verdict`.
    pub fn decisions(&self, verdict: Verdict) -> u64 {
        self.decisions_total
            .with_label_values(&[verdict.as_str()])
            .get()
    }
}
