//! Prometheus metrics for the operator.

use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

/// Reconciliation counters.
#[derive(Clone)]
pub struct OperatorMetrics {
    registry: Registry,
    reconciliations: IntCounterVec,
}

impl OperatorMetrics {
    /// Creates the counters in a fresh registry.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let reconciliations = IntCounterVec::new(
            Opts::new("talos_operator_reconciliations_total", "Reconcile passes by kind and result"),
            &["kind", "result"],
        )?;
        registry.register(Box::new(reconciliations.clone()))?;
        Ok(Self {
            registry,
            reconciliations,
        })
    }

    /// Counts one reconcile pass.
    pub fn observe(&self, kind: &str, success: bool) {
        let result = if success { "success" } else { "error" };
        self.reconciliations.with_label_values(&[kind, result]).inc();
    }

    /// Prometheus text exposition of all metrics.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

impl std::fmt::Debug for OperatorMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperatorMetrics").finish_non_exhaustive()
    }
}
