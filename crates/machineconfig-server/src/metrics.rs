//! Prometheus metrics for the provisioning server.

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

/// Request and registration counters.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    requests: IntCounterVec,
    machines_registered: IntCounter,
}

impl Metrics {
    /// Creates the counters in a fresh registry.
    ///
    /// # Errors
    ///
    /// Fails if a metric cannot be created or registered.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let requests = IntCounterVec::new(
            Opts::new("machineconfig_requests_total", "Provisioning requests by outcome"),
            &["outcome"],
        )?;
        let machines_registered = IntCounter::new(
            "machineconfig_machines_registered_total",
            "Machines created by the provisioning server",
        )?;
        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(machines_registered.clone()))?;

        Ok(Self {
            registry,
            requests,
            machines_registered,
        })
    }

    /// Counts a finished request.
    pub fn observe_request(&self, outcome: &str) {
        self.requests.with_label_values(&[outcome]).inc();
    }

    /// Counts a newly created Machine.
    pub fn observe_registration(&self) {
        self.machines_registered.inc();
    }

    /// Renders all metrics in the Prometheus text format.
    ///
    /// # Errors
    ///
    /// Fails if encoding fails.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}
