//! ---
//! mtce_section: "03-persistence-logging"
//! mtce_subsection: "module"
//! mtce_type: "source"
//! mtce_scope: "code"
//! mtce_description: "Metrics collection and export utilities."
//! mtce_version: "v0.0.0-prealpha"
//! mtce_owner: "tbd"
//! ---
use anyhow::Result;
use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts};

use crate::SharedRegistry;

/// Metric families describing the host fleet and maintenance decisions.
#[derive(Clone, Debug)]
pub struct MaintenanceMetrics {
    hosts: IntGauge,
    heartbeat_losses: IntCounterVec,
    mnfa_active: IntGauge,
    mnfa_occurrences: IntCounter,
    ar_disabled: IntCounterVec,
    actions_adopted: IntCounterVec,
    handler_failures: IntCounterVec,
}

impl MaintenanceMetrics {
    pub fn new(registry: &SharedRegistry) -> Result<Self> {
        let hosts = IntGauge::with_opts(Opts::new(
            "mtce_hosts",
            "Number of hosts held in the maintenance registry",
        ))?;
        registry.register(Box::new(hosts.clone()))?;

        let heartbeat_losses = IntCounterVec::new(
            Opts::new(
                "mtce_heartbeat_losses_total",
                "Heartbeat loss declarations by network",
            ),
            &["network"],
        )?;
        registry.register(Box::new(heartbeat_losses.clone()))?;

        let mnfa_active = IntGauge::with_opts(Opts::new(
            "mtce_mnfa_active",
            "Indicator (0/1) whether multi-node failure avoidance is active",
        ))?;
        registry.register(Box::new(mnfa_active.clone()))?;

        let mnfa_occurrences = IntCounter::with_opts(Opts::new(
            "mtce_mnfa_occurrences_total",
            "Completed multi-node failure avoidance episodes",
        ))?;
        registry.register(Box::new(mnfa_occurrences.clone()))?;

        let ar_disabled = IntCounterVec::new(
            Opts::new(
                "mtce_auto_recovery_disabled_total",
                "Hosts whose auto-recovery was disabled, by cause",
            ),
            &["cause"],
        )?;
        registry.register(Box::new(ar_disabled.clone()))?;

        let actions_adopted = IntCounterVec::new(
            Opts::new(
                "mtce_admin_actions_total",
                "Administrative actions adopted by a host",
            ),
            &["action"],
        )?;
        registry.register(Box::new(actions_adopted.clone()))?;

        let handler_failures = IntCounterVec::new(
            Opts::new(
                "mtce_handler_failures_total",
                "Handler invocations that returned an error",
            ),
            &["handler"],
        )?;
        registry.register(Box::new(handler_failures.clone()))?;

        Ok(Self {
            hosts,
            heartbeat_losses,
            mnfa_active,
            mnfa_occurrences,
            ar_disabled,
            actions_adopted,
            handler_failures,
        })
    }

    pub fn set_hosts(&self, count: usize) {
        self.hosts.set(count as i64);
    }

    pub fn record_heartbeat_loss(&self, network: &str) {
        self.heartbeat_losses.with_label_values(&[network]).inc();
    }

    pub fn set_mnfa_active(&self, active: bool) {
        self.mnfa_active.set(i64::from(active));
    }

    pub fn record_mnfa_occurrence(&self) {
        self.mnfa_occurrences.inc();
    }

    pub fn record_ar_disabled(&self, cause: &str) {
        self.ar_disabled.with_label_values(&[cause]).inc();
    }

    pub fn record_action(&self, action: &str) {
        self.actions_adopted.with_label_values(&[action]).inc();
    }

    pub fn record_handler_failure(&self, handler: &str) {
        self.handler_failures.with_label_values(&[handler]).inc();
    }

    pub fn heartbeat_losses(&self, network: &str) -> u64 {
        self.heartbeat_losses.with_label_values(&[network]).get()
    }

    pub fn mnfa_occurrences(&self) -> u64 {
        self.mnfa_occurrences.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::new_registry;

    #[test]
    fn counters_are_gathered() {
        let registry = new_registry();
        let metrics = MaintenanceMetrics::new(&registry).unwrap();
        metrics.set_hosts(3);
        metrics.record_heartbeat_loss("Mgmnt");
        metrics.record_heartbeat_loss("Mgmnt");
        metrics.set_mnfa_active(true);
        metrics.record_mnfa_occurrence();

        assert_eq!(metrics.heartbeat_losses("Mgmnt"), 2);
        assert_eq!(metrics.mnfa_occurrences(), 1);
        let names: Vec<String> = registry
            .gather()
            .iter()
            .map(|family| family.get_name().to_owned())
            .collect();
        assert!(names.contains(&"mtce_hosts".to_owned()));
        assert!(names.contains(&"mtce_mnfa_active".to_owned()));
    }

    #[test]
    fn double_registration_is_rejected() {
        let registry = new_registry();
        MaintenanceMetrics::new(&registry).unwrap();
        assert!(MaintenanceMetrics::new(&registry).is_err());
    }
}
