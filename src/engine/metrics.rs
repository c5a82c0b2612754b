//! Prometheus metrics for the engine and the client pool

use crate::error::{Error, Result};
use crate::remote::PoolStatsSnapshot;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry};

/// Poll and pool metrics
#[derive(Debug, Clone)]
pub struct EngineMetrics {
    polls: IntCounterVec,
    transitions: IntCounterVec,
    poll_duration: HistogramVec,
    pool: IntGaugeVec,
}

impl EngineMetrics {
    /// Create unregistered metrics
    pub fn new() -> Self {
        // metric definitions are static; construction cannot fail
        Self {
            polls: IntCounterVec::new(
                Opts::new("provisioning_polls_total", "Polls by controller, state and outcome"),
                &["controller", "state", "outcome"],
            )
            .expect("valid metric definition"),
            transitions: IntCounterVec::new(
                Opts::new("provisioning_transitions_total", "State changes by controller"),
                &["controller", "from", "to"],
            )
            .expect("valid metric definition"),
            poll_duration: HistogramVec::new(
                HistogramOpts::new(
                    "provisioning_poll_duration_seconds",
                    "Duration of one poll",
                ),
                &["controller"],
            )
            .expect("valid metric definition"),
            pool: IntGaugeVec::new(
                Opts::new("provisioning_client_pool", "Client pool counters"),
                &["counter"],
            )
            .expect("valid metric definition"),
        }
    }

    /// Register all metrics with a registry
    pub fn register(&self, registry: &Registry) -> Result<()> {
        let map = |e: prometheus::Error| Error::Internal(format!("Metric registration failed: {}", e));
        registry.register(Box::new(self.polls.clone())).map_err(map)?;
        registry.register(Box::new(self.transitions.clone())).map_err(map)?;
        registry.register(Box::new(self.poll_duration.clone())).map_err(map)?;
        registry.register(Box::new(self.pool.clone())).map_err(map)?;
        Ok(())
    }

    pub fn record_poll(&self, controller: &str, state: &str, outcome: &str, seconds: f64) {
        self.polls
            .with_label_values(&[controller, state, outcome])
            .inc();
        self.poll_duration
            .with_label_values(&[controller])
            .observe(seconds);
    }

    pub fn record_transition(&self, controller: &str, from: &str, to: &str) {
        if from != to {
            self.transitions
                .with_label_values(&[controller, from, to])
                .inc();
        }
    }

    /// Publish a pool statistics snapshot
    pub fn observe_pool(&self, stats: &PoolStatsSnapshot) {
        let values = [
            ("created", stats.created),
            ("reused", stats.reused),
            ("returned", stats.returned),
            ("discarded", stats.discarded),
            ("validation_failures", stats.validation_failures),
            ("expired", stats.expired),
            ("borrow_timeouts", stats.borrow_timeouts),
            ("checked_out", stats.checked_out),
        ];
        for (name, value) in values {
            self.pool
                .with_label_values(&[name])
                .set(value as i64);
        }
    }

    pub fn polls(&self, controller: &str, state: &str, outcome: &str) -> u64 {
        self.polls
            .with_label_values(&[controller, state, outcome])
            .get()
    }
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_gather() {
        let registry = Registry::new();
        let metrics = EngineMetrics::new();
        metrics.register(&registry).unwrap();

        metrics.record_poll("vm", "CREATING", "pending", 0.01);
        metrics.record_transition("vm", "CREATING", "CREATING");
        metrics.observe_pool(&PoolStatsSnapshot {
            created: 2,
            ..Default::default()
        });

        assert_eq!(metrics.polls("vm", "CREATING", "pending"), 1);
        let names: Vec<_> = registry
            .gather()
            .iter()
            .map(|f| f.get_name().to_string())
            .collect();
        assert!(names.contains(&"provisioning_polls_total".to_string()));
        assert!(names.contains(&"provisioning_client_pool".to_string()));
        // self-transitions are not counted
        assert!(!names.contains(&"provisioning_transitions_total".to_string()));
    }

    #[test]
    fn test_double_registration_fails() {
        let registry = Registry::new();
        let metrics = EngineMetrics::new();
        metrics.register(&registry).unwrap();
        assert!(metrics.register(&registry).is_err());
    }
}
